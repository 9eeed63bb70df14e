use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use fleetdesk_audit::{AuditAction, AuditEntity, NewAuditRecord};
use fleetdesk_auth::{check, Role};
use fleetdesk_infra::NewBooking;
use fleetdesk_rental::RentalPeriod;

use crate::app::routes::common::{target_company, CompanyQuery};
use crate::app::{dto, errors, services::AppServices};
use crate::context::RequestAccess;

pub fn router() -> Router {
    Router::new().route("/bookings", get(list_bookings).post(create_booking))
}

/// Clients see their own bookings; company staff see the company's.
pub async fn list_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Query(query): Query<CompanyQuery>,
) -> axum::response::Response {
    let ctx = access.context();

    if ctx.scope.role == Role::Client {
        return match services.rentals.list_client_bookings(ctx.principal.id).await {
            Ok(bookings) => {
                let items: Vec<_> = bookings.iter().map(dto::booking_json).collect();
                (StatusCode::OK, Json(serde_json::json!({ "bookings": items }))).into_response()
            }
            Err(e) => errors::store_error_to_response(e),
        };
    }

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

    match services.rentals.list_bookings(company).await {
        Ok(bookings) => {
            let items: Vec<_> = bookings.iter().map(dto::booking_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "bookings": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// A client requests a vehicle for a date range. The booking stays pending
/// until a manager turns it into a contract.
pub async fn create_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(access): Extension<RequestAccess>,
    Json(body): Json<dto::CreateBookingRequest>,
) -> axum::response::Response {
    let ctx = access.context();
    if let Err(e) = check(ctx, &[Role::Client], None) {
        return errors::gate_error_to_response(e);
    }

    let period = match RentalPeriod::new(body.starts_on, body.ends_on) {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
    };

    let vehicle = match services.rentals.find_vehicle(body.vehicle_id).await {
        Ok(Some(v)) => v,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let booking = match services
        .rentals
        .insert_booking(NewBooking {
            company_id: vehicle.company_id,
            // Forced to the caller: a client books for itself only.
            client_id: ctx.principal.id,
            vehicle_id: vehicle.id,
            period,
        })
        .await
    {
        Ok(b) => b,
        Err(e) => return errors::store_error_to_response(e),
    };

    services
        .recorder
        .record(NewAuditRecord {
            actor_id: ctx.principal.id,
            role: ctx.scope.role,
            company_id: Some(booking.company_id),
            entity: AuditEntity::Booking,
            entity_id: *booking.id.as_uuid(),
            action: AuditAction::Create,
            before_state: None,
            after_state: serde_json::to_value(&booking).ok(),
        })
        .await;

    (StatusCode::CREATED, Json(dto::booking_json(&booking))).into_response()
}
