//! Storage ports.
//!
//! Three ports, one concern each: `DirectoryStore` (users, companies,
//! sessions, impersonation markers), `RentalStore` (vehicles, bookings,
//! contracts, payments, and the two atomic units), `AuditLogStore` (the
//! append-only trail). Adapters: [`memory::InMemoryStore`] for tests/dev,
//! [`postgres::PostgresStore`] for deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use fleetdesk_audit::{AuditRecord, NewAuditRecord};
use fleetdesk_auth::{ImpersonationMarker, Role, Session, SessionToken};
use fleetdesk_core::{
    BookingId, CompanyId, ContractId, UserId, VehicleId, VersionToken,
};
use fleetdesk_rental::{
    Booking, Contract, ContractStatus, Payment, PaymentKind, RentalPeriod, Vehicle, VehicleStatus,
};

/// Infrastructure-level store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writer won (e.g. unique-constraint race).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    /// Backend failure (connection, query, pool).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure of one of the atomic units.
///
/// These carry the domain outcome decided *inside* the transaction so the
/// workflow engine can map them faithfully: a version mismatch is retryable,
/// an unavailable vehicle is user-actionable, and neither writes anything.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The vehicle row moved on since the caller read it.
    #[error("optimistic lock conflict (expected {expected}, found {found})")]
    VersionConflict {
        expected: VersionToken,
        found: VersionToken,
    },

    /// The vehicle is not available for a new contract.
    #[error("vehicle unavailable (status: {status:?})")]
    VehicleUnavailable { status: VehicleStatus },

    /// The contract is already in a terminal status.
    #[error("contract already {status:?}")]
    AlreadyClosed { status: ContractStatus },

    /// The referenced booking cannot be fulfilled by this contract.
    #[error("booking rejected: {0}")]
    BookingRejected(String),

    /// Cross-company rows reached the transaction; refused outright.
    #[error("company isolation violation: {0}")]
    CompanyIsolation(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A stored user row, role authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

/// A stored company row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRecord {
    pub id: CompanyId,
    pub name: String,
    pub owner_id: UserId,
}

/// Input for a vehicle insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub company_id: CompanyId,
    pub plate: String,
    pub model: String,
    pub daily_rate: u64,
}

/// Input for a booking insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub company_id: CompanyId,
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    pub period: RentalPeriod,
}

/// Input for a payment insert (always starts pending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub company_id: CompanyId,
    pub contract_id: ContractId,
    pub kind: PaymentKind,
    pub label: Option<String>,
    pub amount: u64,
}

/// Everything the contract-creation atomic unit needs.
///
/// The id is minted by the workflow engine so the caller learns it even when
/// post-commit steps degrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDraft {
    pub id: ContractId,
    pub company_id: CompanyId,
    pub client_id: UserId,
    pub vehicle_id: VehicleId,
    pub manager_id: UserId,
    pub period: RentalPeriod,
    pub total_amount: u64,
    pub deposit_amount: u64,
    pub booking_id: Option<BookingId>,
}

/// Users, companies, sessions, impersonation markers.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn company_exists(&self, id: CompanyId) -> Result<bool, StoreError>;

    /// Company with `owner_id = user`, if any.
    async fn owned_company(&self, owner_id: UserId) -> Result<Option<CompanyId>, StoreError>;

    /// Company with an active manager-membership row for `user`, if any.
    async fn managed_company(&self, manager_id: UserId) -> Result<Option<CompanyId>, StoreError>;

    /// Store the admin-mode marker, replacing any previous one for the admin.
    async fn put_impersonation(&self, marker: ImpersonationMarker) -> Result<(), StoreError>;

    async fn find_impersonation(
        &self,
        admin_id: UserId,
    ) -> Result<Option<ImpersonationMarker>, StoreError>;

    async fn clear_impersonation(&self, admin_id: UserId) -> Result<(), StoreError>;
}

/// Vehicles, bookings, contracts, payments, plus the two atomic units.
#[async_trait]
pub trait RentalStore: Send + Sync {
    async fn insert_vehicle(&self, vehicle: NewVehicle) -> Result<Vehicle, StoreError>;

    async fn find_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;

    async fn list_vehicles(&self, company_id: CompanyId) -> Result<Vec<Vehicle>, StoreError>;

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, StoreError>;

    async fn find_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    async fn list_bookings(&self, company_id: CompanyId) -> Result<Vec<Booking>, StoreError>;

    async fn list_client_bookings(&self, client_id: UserId) -> Result<Vec<Booking>, StoreError>;

    async fn find_contract(&self, id: ContractId) -> Result<Option<Contract>, StoreError>;

    async fn list_contracts(&self, company_id: CompanyId) -> Result<Vec<Contract>, StoreError>;

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError>;

    async fn list_payments(&self, company_id: CompanyId) -> Result<Vec<Payment>, StoreError>;

    /// Atomic unit: create a contract.
    ///
    /// In one transaction: re-read the vehicle, compare its version against
    /// `expected` (mismatch → [`TxError::VersionConflict`], nothing written),
    /// verify it is available, insert the contract row (active), flip the
    /// vehicle to rented bumping its version, and mark the originating
    /// booking fulfilled. All-or-nothing.
    async fn commit_contract(
        &self,
        draft: ContractDraft,
        expected: VersionToken,
    ) -> Result<Contract, TxError>;

    /// Atomic unit: close a contract.
    ///
    /// In one transaction: re-check the contract status (terminal →
    /// [`TxError::AlreadyClosed`], no vehicle change), set it completed, and
    /// free the vehicle bumping its version.
    async fn commit_contract_close(&self, id: ContractId) -> Result<Contract, TxError>;
}

/// The append-only audit trail.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError>;

    /// Most recent first. `company_id = None` is the global-admin view (all
    /// records); scoped callers always pass their company.
    async fn list_audit(
        &self,
        company_id: Option<CompanyId>,
        limit: u32,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    /// Clear records in scope; returns how many were deleted.
    async fn clear_audit(&self, company_id: Option<CompanyId>) -> Result<u64, StoreError>;
}
