//! `fleetdesk-infra` — storage ports and adapters, access resolution, and the
//! transactional workflow engine.
//!
//! The ports (`DirectoryStore`, `RentalStore`, `AuditLogStore`) keep the rest
//! of the system storage-agnostic: tests and dev run on [`InMemoryStore`],
//! deployments on [`PostgresStore`]. The two atomic units (contract creation
//! and contract close) live behind the `RentalStore` port so each adapter
//! can make them genuinely transactional.

pub mod access;
pub mod audit_sink;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod integration_tests;

pub use access::{AccessError, AccessResolver};
pub use audit_sink::StoreAuditSink;
pub use store::memory::InMemoryStore;
pub use store::postgres::PostgresStore;
pub use store::{
    AuditLogStore, CompanyRecord, ContractDraft, DirectoryStore, NewBooking, NewPayment,
    NewVehicle, RentalStore, StoreError, TxError, UserRecord,
};
pub use workflow::{
    ClosingFee, Completed, CreateContractInput, PostCommitWarning, RentalWorkflows, WorkflowError,
};
