use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetdesk_core::{BookingId, CompanyId, DomainError, DomainResult, Entity, UserId, VehicleId};

use crate::contract::RentalPeriod;

/// Booking lifecycle: a client's pending request for a vehicle, fulfilled
/// when a manager turns it into a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Fulfilled => "fulfilled",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "fulfilled" => Ok(BookingStatus::Fulfilled),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown booking status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub company_id: CompanyId,
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    pub period: RentalPeriod,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for Booking {
    type Id = BookingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Booking {
    /// Only a pending booking may be fulfilled by a contract.
    pub fn ensure_fulfillable(&self) -> DomainResult<()> {
        match self.status {
            BookingStatus::Pending => Ok(()),
            BookingStatus::Fulfilled | BookingStatus::Cancelled => {
                Err(DomainError::invariant(format!(
                    "booking is already {}",
                    self.status.as_str()
                )))
            }
        }
    }
}
