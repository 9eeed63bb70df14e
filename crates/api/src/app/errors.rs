use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fleetdesk_auth::GateError;
use fleetdesk_infra::{StoreError, WorkflowError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Denials stay opaque: no entity names, no existence hints.
pub fn gate_error_to_response(_err: GateError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "access denied")
}

pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::Forbidden => {
            json_error(StatusCode::FORBIDDEN, "forbidden", "access denied")
        }
        WorkflowError::Conflict { .. } => json_error(
            StatusCode::CONFLICT,
            "conflict",
            "someone else just modified this vehicle; refresh and retry",
        ),
        WorkflowError::VehicleUnavailable { .. } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "vehicle_unavailable",
            "car is no longer available, choose another",
        ),
        WorkflowError::ContractClosed { status } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "contract_closed",
            format!("contract is already {}", status.as_str()),
        ),
        WorkflowError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        WorkflowError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        WorkflowError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Backend(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}
