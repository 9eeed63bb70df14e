//! `fleetdesk-audit` — append-only audit trail model and recorder.
//!
//! Every state-changing mutation produces exactly one audit record. The
//! recorder is awaited so ordering with the triggering mutation is preserved,
//! but it is infallible from the caller's perspective: audit is
//! observability, not a correctness precondition.

pub mod record;
pub mod recorder;

pub use record::{AuditAction, AuditEntity, AuditRecord, NewAuditRecord};
pub use recorder::{AuditError, AuditRecorder, AuditSink};
