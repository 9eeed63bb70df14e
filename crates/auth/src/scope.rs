use serde::{Deserialize, Serialize};

use fleetdesk_core::CompanyId;

use crate::Role;

/// The authorization scope a request is acting within.
///
/// Owner/manager scopes always carry their company. An admin scope carries a
/// company only while impersonating ("Admin Mode"); the company is a derived,
/// request-scoped property; it is never persisted on the admin's user row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub role: Role,
    pub company_id: Option<CompanyId>,
}

impl Scope {
    /// Global admin scope (no company restriction).
    pub fn global_admin() -> Self {
        Self {
            role: Role::Admin,
            company_id: None,
        }
    }

    /// Company-bound scope (owner/manager, or an impersonating admin).
    pub fn company(role: Role, company_id: CompanyId) -> Self {
        Self {
            role,
            company_id: Some(company_id),
        }
    }

    /// Client scope: bound to the principal itself, not to a company.
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            company_id: None,
        }
    }

    /// Overlay an impersonated company onto an admin scope.
    ///
    /// Non-admin scopes are returned untouched; impersonation must never leak
    /// into owner/manager/client scopes.
    pub fn impersonating(self, company_id: CompanyId) -> Self {
        match self.role {
            Role::Admin => Self {
                role: Role::Admin,
                company_id: Some(company_id),
            },
            _ => self,
        }
    }

    /// True when this scope may act on data of `company_id`.
    pub fn covers(&self, company_id: CompanyId) -> bool {
        match (self.role, self.company_id) {
            // A global admin covers everything; an impersonating admin is
            // confined to the company it entered.
            (Role::Admin, None) => true,
            (_, Some(own)) => own == company_id,
            (_, None) => false,
        }
    }
}
