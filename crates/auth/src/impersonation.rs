use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetdesk_core::{CompanyId, UserId};

/// Server-side record that an admin entered a company ("Admin Mode").
///
/// The marker lives for one browser session and is referenced, not carried,
/// by the client. It records context for the UI and the audit trail; it never
/// grants scope on its own: the admin role is re-derived from storage on
/// every request, and the request must still name the company explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationMarker {
    pub admin_id: UserId,
    pub company_id: CompanyId,
    pub issued_at: DateTime<Utc>,
}

/// The client-supplied half of the impersonation signal.
///
/// Extracted from the request by the HTTP layer; a bare flag without a
/// company id is treated as absent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AdminModeRequest {
    pub enabled: bool,
    pub company_id: Option<CompanyId>,
}

impl AdminModeRequest {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn entering(company_id: CompanyId) -> Self {
        Self {
            enabled: true,
            company_id: Some(company_id),
        }
    }

    /// The requested target, when the signal is complete.
    pub fn target(&self) -> Option<CompanyId> {
        if self.enabled { self.company_id } else { None }
    }
}
