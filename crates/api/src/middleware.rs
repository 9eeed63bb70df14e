use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use fleetdesk_auth::{AdminModeRequest, SessionToken};
use fleetdesk_core::CompanyId;
use fleetdesk_infra::{AccessError, AccessResolver};

use crate::context::RequestAccess;

#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<AccessResolver>,
}

/// Resolve the full access context for the request and stash it in
/// extensions. Identity, scope and the admin-mode overlay are all re-derived
/// from the store here, once per request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers()).map(SessionToken::new);
    let admin_mode = extract_admin_mode(req.headers())?;

    let ctx = state
        .resolver
        .resolve(token.as_ref(), &admin_mode, Utc::now())
        .await
        .map_err(|e| match e {
            AccessError::NoSession => StatusCode::UNAUTHORIZED,
            AccessError::ScopeResolutionFailed => StatusCode::FORBIDDEN,
            AccessError::ImpersonationRejected(_) => StatusCode::FORBIDDEN,
            AccessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    req.extensions_mut().insert(RequestAccess::new(ctx));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// The explicit impersonation pair: `x-admin-mode: 1` plus
/// `x-admin-company: <company uuid>`.
fn extract_admin_mode(headers: &HeaderMap) -> Result<AdminModeRequest, StatusCode> {
    let enabled = headers
        .get("x-admin-mode")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !enabled {
        return Ok(AdminModeRequest::off());
    }

    let company = headers
        .get("x-admin-company")
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let company: CompanyId = company.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok(AdminModeRequest::entering(company))
}
