//! Access resolution: who is asking, and on whose behalf.
//!
//! Resolution order per request: identity (session token → authoritative user
//! row) → scope (role + bound company) → impersonation overlay (admin-only).
//! Everything fails closed: a lookup failure never degrades into "no
//! restriction".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use fleetdesk_auth::{
    AccessContext, AdminModeRequest, ImpersonationMarker, Principal, Role, Scope, SessionToken,
};
use fleetdesk_core::{CompanyId, UserId};

use crate::store::{DirectoryStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No valid session: missing token, unknown token, expired session, or a
    /// session pointing at a deleted user.
    #[error("no session")]
    NoSession,

    /// The principal's role or company binding could not be resolved.
    #[error("scope resolution failed")]
    ScopeResolutionFailed,

    /// The admin-mode request was present but did not validate.
    #[error("admin mode rejected: {0}")]
    ImpersonationRejected(String),

    #[error(transparent)]
    Store(StoreError),
}

/// Resolves the [`AccessContext`] for a request.
///
/// One instance per process; holds only the directory-store handle, so
/// concurrent requests share nothing mutable.
#[derive(Clone)]
pub struct AccessResolver {
    directory: Arc<dyn DirectoryStore>,
}

impl AccessResolver {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Load the authenticated principal with its authoritative role.
    #[instrument(skip(self, token), err)]
    pub async fn resolve_identity(
        &self,
        token: Option<&SessionToken>,
        now: DateTime<Utc>,
    ) -> Result<Principal, AccessError> {
        let token = token.ok_or(AccessError::NoSession)?;

        let session = self
            .directory
            .find_session(token)
            .await
            .map_err(AccessError::Store)?
            .ok_or(AccessError::NoSession)?;

        session.validate(now).map_err(|_| AccessError::NoSession)?;

        let user = self
            .directory
            .find_user(session.user_id)
            .await
            .map_err(AccessError::Store)?
            .ok_or(AccessError::NoSession)?;

        Ok(Principal::new(user.id, user.email, user.role))
    }

    /// Derive the principal's scope from its role and company binding.
    #[instrument(skip(self, principal), fields(role = principal.role.as_str()), err)]
    pub async fn resolve_scope(&self, principal: &Principal) -> Result<Scope, AccessError> {
        match principal.role {
            Role::Admin => Ok(Scope::global_admin()),
            Role::Client => Ok(Scope::client()),
            Role::Owner => {
                let company = self
                    .directory
                    .owned_company(principal.id)
                    .await
                    .map_err(|_| AccessError::ScopeResolutionFailed)?
                    .ok_or(AccessError::ScopeResolutionFailed)?;
                Ok(Scope::company(Role::Owner, company))
            }
            Role::Manager => {
                let company = self
                    .directory
                    .managed_company(principal.id)
                    .await
                    .map_err(|_| AccessError::ScopeResolutionFailed)?
                    .ok_or(AccessError::ScopeResolutionFailed)?;
                Ok(Scope::company(Role::Manager, company))
            }
        }
    }

    /// Resolve the admin-mode overlay, if any.
    ///
    /// Grants only when all of: the request carries the explicit flag + company
    /// pair, the *freshly resolved* role is admin, the server-side marker for
    /// this admin names the same company, and the company still exists. For
    /// non-admin principals the request pair is ignored entirely: an
    /// impersonation signal must never leak into owner/manager/client scopes.
    #[instrument(skip(self, principal, admin_mode), err)]
    pub async fn resolve_impersonation(
        &self,
        principal: &Principal,
        admin_mode: &AdminModeRequest,
    ) -> Result<Option<CompanyId>, AccessError> {
        let Some(target) = admin_mode.target() else {
            return Ok(None);
        };

        if principal.role != Role::Admin {
            return Ok(None);
        }

        let marker = self
            .directory
            .find_impersonation(principal.id)
            .await
            .map_err(AccessError::Store)?
            .ok_or_else(|| {
                AccessError::ImpersonationRejected("no admin-mode marker".to_string())
            })?;

        if marker.company_id != target {
            return Err(AccessError::ImpersonationRejected(
                "marker does not match requested company".to_string(),
            ));
        }

        let exists = self
            .directory
            .company_exists(target)
            .await
            .map_err(AccessError::Store)?;
        if !exists {
            return Err(AccessError::ImpersonationRejected(
                "company does not exist".to_string(),
            ));
        }

        Ok(Some(target))
    }

    /// Full per-request resolution: identity → scope → impersonation overlay.
    ///
    /// Idempotent: resolving twice with no intervening state change yields the
    /// same context.
    pub async fn resolve(
        &self,
        token: Option<&SessionToken>,
        admin_mode: &AdminModeRequest,
        now: DateTime<Utc>,
    ) -> Result<AccessContext, AccessError> {
        let principal = self.resolve_identity(token, now).await?;
        let scope = self.resolve_scope(&principal).await?;

        let scope = match self.resolve_impersonation(&principal, admin_mode).await? {
            Some(company) => scope.impersonating(company),
            None => scope,
        };

        Ok(AccessContext::new(principal, scope))
    }

    /// Enter Admin Mode: store the marker that records this admin's entry
    /// into a company. Admin-only; the company must exist.
    #[instrument(skip(self, principal), fields(admin_id = %principal.id, company_id = %company_id), err)]
    pub async fn enter_admin_mode(
        &self,
        principal: &Principal,
        company_id: CompanyId,
        now: DateTime<Utc>,
    ) -> Result<ImpersonationMarker, AccessError> {
        if principal.role != Role::Admin {
            return Err(AccessError::ImpersonationRejected(
                "only admins can enter admin mode".to_string(),
            ));
        }

        let exists = self
            .directory
            .company_exists(company_id)
            .await
            .map_err(AccessError::Store)?;
        if !exists {
            return Err(AccessError::ImpersonationRejected(
                "company does not exist".to_string(),
            ));
        }

        let marker = ImpersonationMarker {
            admin_id: principal.id,
            company_id,
            issued_at: now,
        };
        self.directory
            .put_impersonation(marker.clone())
            .await
            .map_err(AccessError::Store)?;
        Ok(marker)
    }

    /// Leave Admin Mode: drop the marker. Idempotent.
    #[instrument(skip(self), fields(admin_id = %admin_id), err)]
    pub async fn exit_admin_mode(&self, admin_id: UserId) -> Result<(), AccessError> {
        self.directory
            .clear_impersonation(admin_id)
            .await
            .map_err(AccessError::Store)
    }
}

impl core::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessResolver").finish_non_exhaustive()
    }
}
