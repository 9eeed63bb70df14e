//! The permission gate: the single chokepoint for role/company-scope checks.
//!
//! Every protected operation calls [`check`] before touching the store. The
//! check is pure and idempotent; it can run once for a collection read and
//! again for each company-scoped sub-resource without side effects.

use serde::Serialize;
use thiserror::Error;

use fleetdesk_core::CompanyId;

use crate::{Principal, Role, Scope};

/// The resolved identity + scope a request is acting with.
///
/// Built once per request by the access resolver and threaded explicitly
/// through every call, never pulled from ambient process-wide state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessContext {
    pub principal: Principal,
    pub scope: Scope,
}

impl AccessContext {
    pub fn new(principal: Principal, scope: Scope) -> Self {
        Self { principal, scope }
    }

    /// The company this context is bound to, if any.
    pub fn company_id(&self) -> Option<CompanyId> {
        self.scope.company_id
    }
}

/// Denial produced by the gate.
///
/// Deliberately opaque: a `Forbidden` answer never reveals whether the target
/// entity exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("access denied")]
    Forbidden,
}

/// Allow or reject an operation before any store mutation runs.
///
/// - `allowed`: the role whitelist for the operation.
/// - `target_company`: set when the operation touches a company-owned entity.
///
/// A global admin passes any company target. A company-bound scope (owner,
/// manager, or an admin impersonating a company) must match the target
/// exactly. A scope with no company (client) fails any company-targeted
/// check.
pub fn check(
    ctx: &AccessContext,
    allowed: &[Role],
    target_company: Option<CompanyId>,
) -> Result<(), GateError> {
    if !allowed.contains(&ctx.scope.role) {
        return Err(GateError::Forbidden);
    }

    if let Some(target) = target_company {
        if !ctx.scope.covers(target) {
            return Err(GateError::Forbidden);
        }
    }

    Ok(())
}
