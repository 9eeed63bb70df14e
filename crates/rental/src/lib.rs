//! `fleetdesk-rental` — rental domain entities and their state machines.
//!
//! Pure decision logic only: which status transitions are legal, when a
//! contract may close, how closing fees classify. Persistence and
//! orchestration live in `fleetdesk-infra`.

pub mod booking;
pub mod contract;
pub mod payment;
pub mod vehicle;

pub use booking::{Booking, BookingStatus};
pub use contract::{Contract, ContractStatus, RentalPeriod};
pub use payment::{Payment, PaymentKind, PaymentStatus};
pub use vehicle::{Vehicle, VehicleStatus};
