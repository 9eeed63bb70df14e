use axum::http::StatusCode;
use serde::Deserialize;

use fleetdesk_auth::AccessContext;
use fleetdesk_core::CompanyId;

use crate::app::errors;

/// Optional explicit company for global-admin calls.
#[derive(Debug, Deserialize, Default)]
pub struct CompanyQuery {
    pub company_id: Option<CompanyId>,
}

/// The company a company-scoped operation targets.
///
/// Scoped callers (owner/manager, impersonating admin) default to their own
/// company; a global admin must name one explicitly. The gate still validates
/// the result against the caller's scope, so an explicit foreign company is
/// denied there, not here.
pub fn target_company(
    ctx: &AccessContext,
    explicit: Option<CompanyId>,
) -> Result<CompanyId, axum::response::Response> {
    explicit.or(ctx.scope.company_id).ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "company_required",
            "a company_id is required for globally-scoped calls",
        )
    })
}
