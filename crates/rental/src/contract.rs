use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fleetdesk_core::{
    CompanyId, ContractId, DomainError, DomainResult, Entity, UserId, ValueObject, VehicleId,
};

/// Rental contract lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Completed,
    Cancelled,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "active" => Ok(ContractStatus::Active),
            "completed" => Ok(ContractStatus::Completed),
            "cancelled" => Ok(ContractStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown contract status: {other}"
            ))),
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }
}

/// The rental date range, end-exclusive of nothing: both dates are rental days.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPeriod {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl RentalPeriod {
    pub fn new(starts_on: NaiveDate, ends_on: NaiveDate) -> DomainResult<Self> {
        if ends_on < starts_on {
            return Err(DomainError::validation(
                "rental period ends before it starts",
            ));
        }
        Ok(Self { starts_on, ends_on })
    }

    /// Number of charged rental days (same-day rental counts as one day).
    pub fn days(&self) -> i64 {
        (self.ends_on - self.starts_on).num_days() + 1
    }
}

impl ValueObject for RentalPeriod {}

/// A signed rental contract.
///
/// Contracts are created only through the transactional workflow engine;
/// nothing inserts a contract row directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub company_id: CompanyId,
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    /// The owner/manager (or impersonating admin) who signed the contract.
    pub manager_id: UserId,
    pub period: RentalPeriod,
    /// Total rental fee in the smallest currency unit.
    pub total_amount: u64,
    /// Deposit in the smallest currency unit.
    pub deposit_amount: u64,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Entity for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Contract {
    /// Check the close precondition: a completed or cancelled contract cannot
    /// be closed again, and closing it twice must not touch the vehicle.
    pub fn ensure_closable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "contract is already {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }
}
