use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use fleetdesk_infra::AccessError;

use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestAccess;

pub fn router() -> Router {
    Router::new()
        .route("/admin-mode/enter", post(enter))
        .route("/admin-mode/exit", post(exit))
}

/// Enter Admin Mode for a company: writes the server-side marker. Follow-up
/// requests must still carry the explicit `x-admin-mode`/`x-admin-company`
/// pair; the marker alone grants nothing.
pub async fn enter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Json(body): Json<dto::EnterAdminModeRequest>,
) -> axum::response::Response {
    let ctx = access.context();

    match services
        .resolver
        .enter_admin_mode(&ctx.principal, body.company_id, Utc::now())
        .await
    {
        Ok(marker) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "company_id": marker.company_id,
                "issued_at": marker.issued_at,
            })),
        )
            .into_response(),
        Err(AccessError::ImpersonationRejected(_)) => {
            errors::json_error(StatusCode::FORBIDDEN, "forbidden", "access denied")
        }
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub async fn exit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
) -> axum::response::Response {
    let ctx = access.context();

    match services.resolver.exit_admin_mode(ctx.principal.id).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "exited": true }))).into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}
