use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use fleetdesk_auth::{check, Role};

use crate::app::routes::common::{target_company, CompanyQuery};
use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestAccess;

pub fn router() -> Router {
    Router::new().route("/payments", get(list_payments))
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<CompanyQuery>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, &[Role::Owner, Role::Manager, Role::Admin], None) {
        return errors::gate_error_to_response(e);
    }

    let company = match target_company(ctx, query.company_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = check(ctx, &[Role::Owner, Role::Manager, Role::Admin], Some(company)) {
        return errors::gate_error_to_response(e);
    }

    match services.rentals.list_payments(company).await {
        Ok(payments) => {
            let items: Vec<_> = payments.iter().map(dto::payment_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "payments": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
