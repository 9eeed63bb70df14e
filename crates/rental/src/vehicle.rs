use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetdesk_core::{CompanyId, DomainError, DomainResult, Entity, VehicleId, VersionToken};

/// Availability lifecycle of a rental vehicle.
///
/// `Available → Booked/Rented` happens only inside a successful
/// contract-creation transaction; `Rented/Booked → Available` only via
/// contract completion or cancellation. Maintenance is a manual toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Available,
    Booked,
    Rented,
    Maintenance,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::Booked => "booked",
            VehicleStatus::Rented => "rented",
            VehicleStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "booked" => Ok(VehicleStatus::Booked),
            "rented" => Ok(VehicleStatus::Rented),
            "maintenance" => Ok(VehicleStatus::Maintenance),
            other => Err(DomainError::validation(format!(
                "unknown vehicle status: {other}"
            ))),
        }
    }
}

/// A company's rental unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub company_id: CompanyId,
    pub plate: String,
    pub model: String,
    /// Daily rate in the smallest currency unit (e.g. cents).
    pub daily_rate: u64,
    pub status: VehicleStatus,
    pub version: VersionToken,
    pub created_at: DateTime<Utc>,
}

impl Entity for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Vehicle {
    /// Status after handing the vehicle to a client under a new contract.
    ///
    /// Only an available vehicle can start a rental; everything else is the
    /// `VehicleUnavailable` case surfaced to the caller.
    pub fn begin_rental(&self) -> DomainResult<VehicleStatus> {
        match self.status {
            VehicleStatus::Available => Ok(VehicleStatus::Rented),
            VehicleStatus::Booked | VehicleStatus::Rented | VehicleStatus::Maintenance => {
                Err(DomainError::invariant(format!(
                    "vehicle is not available (status: {})",
                    self.status.as_str()
                )))
            }
        }
    }

    /// Status after the contract on this vehicle completes or cancels.
    pub fn end_rental(&self) -> DomainResult<VehicleStatus> {
        match self.status {
            VehicleStatus::Booked | VehicleStatus::Rented => Ok(VehicleStatus::Available),
            VehicleStatus::Available | VehicleStatus::Maintenance => {
                Err(DomainError::invariant(format!(
                    "vehicle has no active rental to end (status: {})",
                    self.status.as_str()
                )))
            }
        }
    }
}
