use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};

use crate::context::RequestAccess;

pub fn protected_router() -> Router {
    Router::new().route("/whoami", get(whoami))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The resolved identity + effective scope of the caller. Useful for the UI
/// to render the Admin Mode banner without re-deriving anything.
pub async fn whoami(Extension(access): Extension<RequestAccess>) -> impl IntoResponse {
    let ctx = access.context();
    Json(serde_json::json!({
        "principal_id": ctx.principal.id,
        "email": ctx.principal.email,
        "role": ctx.principal.role,
        "company_id": ctx.scope.company_id,
    }))
}
