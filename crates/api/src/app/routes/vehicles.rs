use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use fleetdesk_audit::{AuditAction, AuditEntity, NewAuditRecord};
use fleetdesk_auth::{check, Role};
use fleetdesk_core::VehicleId;
use fleetdesk_infra::NewVehicle;

use crate::app::routes::common::{target_company, CompanyQuery};
use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestAccess;

const FLEET_ROLES: &[Role] = &[Role::Owner, Role::Manager, Role::Admin];

pub fn router() -> Router {
    Router::new()
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
        .route("/vehicles/:id", get(get_vehicle))
}

pub async fn list_vehicles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<CompanyQuery>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, FLEET_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let company = match target_company(ctx, query.company_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = check(ctx, FLEET_ROLES, Some(company)) {
        return errors::gate_error_to_response(e);
    }

    match services.rentals.list_vehicles(company).await {
        Ok(vehicles) => {
            let items: Vec<_> = vehicles.iter().map(dto::vehicle_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "vehicles": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, FLEET_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let id: VehicleId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid vehicle id")
        }
    };

    let vehicle = match services.rentals.find_vehicle(id).await {
        Ok(Some(v)) => v,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    // Second gate pass against the concrete owning company.
    if let Err(e) = check(ctx, FLEET_ROLES, Some(vehicle.company_id)) {
        return errors::gate_error_to_response(e);
    }

    (StatusCode::OK, Json(dto::vehicle_json(&vehicle))).into_response()
}

pub async fn create_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Json(body): Json<dto::CreateVehicleRequest>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, FLEET_ROLES, None) {
        return errors::gate_error_to_response(e);
    }

    let company = match target_company(ctx, body.company_id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = check(ctx, FLEET_ROLES, Some(company)) {
        return errors::gate_error_to_response(e);
    }

    if body.plate.trim().is_empty() || body.model.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "plate and model are required",
        );
    }

    let vehicle = match services
        .rentals
        .insert_vehicle(NewVehicle {
            company_id: company,
            plate: body.plate,
            model: body.model,
            daily_rate: body.daily_rate,
        })
        .await
    {
        Ok(v) => v,
        Err(e) => return errors::store_error_to_response(e),
    };

    services
        .recorder
        .record(NewAuditRecord {
            actor_id: ctx.principal.id,
            role: ctx.scope.role,
            company_id: Some(vehicle.company_id),
            entity: AuditEntity::Vehicle,
            entity_id: *vehicle.id.as_uuid(),
            action: AuditAction::Create,
            before_state: None,
            after_state: serde_json::to_value(&vehicle).ok(),
        })
        .await;

    (StatusCode::CREATED, Json(dto::vehicle_json(&vehicle))).into_response()
}
