use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use fleetdesk_audit::{AuditAction, AuditEntity, NewAuditRecord};
use fleetdesk_auth::{check, Role};
use fleetdesk_core::{ContractId, VersionToken};
use fleetdesk_infra::{ClosingFee, CreateContractInput};
use fleetdesk_rental::RentalPeriod;

use crate::app::routes::common::{target_company, CompanyQuery};
use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestAccess;

const CONTRACT_ROLES: &[Role] = &[Role::Owner, Role::Manager, Role::Admin];

pub fn router() -> Router {
    Router::new()
        .route("/contracts", get(list_contracts).post(create_contract))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/close", post(close_contract))
}

/// Create a contract (optionally fulfilling a booking). The heavy lifting
/// (optimistic lock, atomicity, payments, audit) belongs to the workflow engine.
pub async fn create_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Json(body): Json<dto::CreateContractRequest>,
) -> axum::response::Response {
    let ctx = access.context();

    let period = match RentalPeriod::new(body.starts_on, body.ends_on) {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    };

    let input = CreateContractInput {
        client_id: body.client_id,
        vehicle_id: body.vehicle_id,
        period,
        total_amount: body.total_amount,
        deposit_amount: body.deposit_amount,
        booking_id: body.booking_id,
        vehicle_version: body.vehicle_version.map(VersionToken::new),
    };

    match services.workflows.create_contract(ctx, input).await {
        Ok(done) => {
            (StatusCode::CREATED, Json(dto::completed_contract_json(&done))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_contracts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<CompanyQuery>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, CONTRACT_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let company = match target_company(ctx, query.company_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = check(ctx, CONTRACT_ROLES, Some(company)) {
        return errors::gate_error_to_response(e);
    }

    match services.rentals.list_contracts(company).await {
        Ok(contracts) => {
            let items: Vec<_> = contracts.iter().map(dto::contract_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "contracts": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, CONTRACT_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let id: ContractId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid contract id")
        }
    };

    let contract = match services.rentals.find_contract(id).await {
        Ok(Some(c)) => c,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    if let Err(e) = check(ctx, CONTRACT_ROLES, Some(contract.company_id)) {
        return errors::gate_error_to_response(e);
    }

    // Single-entity contract reads leave a view trail.
    services
        .recorder
        .record(NewAuditRecord {
            actor_id: ctx.principal.id,
            role: ctx.scope.role,
            company_id: Some(contract.company_id),
            entity: AuditEntity::Contract,
            entity_id: *contract.id.as_uuid(),
            action: AuditAction::View,
            before_state: None,
            after_state: None,
        })
        .await;

    (StatusCode::OK, Json(dto::contract_json(&contract))).into_response()
}

pub async fn close_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Path(id): Path<String>,
    body: Option<Json<dto::CloseContractRequest>>,
) -> axum::response::Response {
    let ctx = access.context();

    let id: ContractId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid contract id")
        }
    };

    let fees = body
        .map(|Json(b)| b.fees)
        .unwrap_or_default()
        .into_iter()
        .map(|f| ClosingFee {
            label: f.label,
            amount: f.amount,
        })
        .collect();

    match services.workflows.close_contract(ctx, id, fees).await {
        Ok(done) => (StatusCode::OK, Json(dto::completed_contract_json(&done))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
