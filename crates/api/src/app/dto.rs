//! Request/response DTOs and JSON mapping helpers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use fleetdesk_core::{BookingId, CompanyId, UserId, VehicleId};
use fleetdesk_infra::{Completed, PostCommitWarning};
use fleetdesk_rental::{Booking, Contract, Payment, Vehicle};

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    /// Required for a global admin; scoped callers inherit their company.
    pub company_id: Option<CompanyId>,
    pub plate: String,
    pub model: String,
    /// Daily rate in the smallest currency unit.
    pub daily_rate: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub vehicle_id: VehicleId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub total_amount: u64,
    pub deposit_amount: u64,
    pub booking_id: Option<BookingId>,
    /// The vehicle version the caller read earlier; omit to let the engine
    /// read the current one just before the transaction.
    pub vehicle_version: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ClosingFeeRequest {
    pub label: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct CloseContractRequest {
    #[serde(default)]
    pub fees: Vec<ClosingFeeRequest>,
}

#[derive(Debug, Deserialize)]
pub struct EnterAdminModeRequest {
    pub company_id: CompanyId,
}

pub fn vehicle_json(v: &Vehicle) -> JsonValue {
    json!({
        "id": v.id,
        "company_id": v.company_id,
        "plate": v.plate,
        "model": v.model,
        "daily_rate": v.daily_rate,
        "status": v.status,
        "version": v.version,
        "created_at": v.created_at,
    })
}

pub fn booking_json(b: &Booking) -> JsonValue {
    json!({
        "id": b.id,
        "company_id": b.company_id,
        "client_id": b.client_id,
        "vehicle_id": b.vehicle_id,
        "starts_on": b.period.starts_on,
        "ends_on": b.period.ends_on,
        "status": b.status,
        "created_at": b.created_at,
    })
}

pub fn contract_json(c: &Contract) -> JsonValue {
    json!({
        "id": c.id,
        "company_id": c.company_id,
        "client_id": c.client_id,
        "vehicle_id": c.vehicle_id,
        "manager_id": c.manager_id,
        "starts_on": c.period.starts_on,
        "ends_on": c.period.ends_on,
        "total_amount": c.total_amount,
        "deposit_amount": c.deposit_amount,
        "status": c.status,
        "created_at": c.created_at,
        "closed_at": c.closed_at,
    })
}

pub fn payment_json(p: &Payment) -> JsonValue {
    json!({
        "id": p.id,
        "company_id": p.company_id,
        "contract_id": p.contract_id,
        "kind": p.kind,
        "label": p.label,
        "amount": p.amount,
        "status": p.status,
        "created_at": p.created_at,
    })
}

fn warnings_json(warnings: &[PostCommitWarning]) -> JsonValue {
    json!(warnings)
}

/// A committed workflow result plus its post-commit warnings, if any.
pub fn completed_contract_json(done: &Completed<Contract>) -> JsonValue {
    json!({
        "contract": contract_json(&done.value),
        "warnings": warnings_json(&done.warnings),
    })
}
