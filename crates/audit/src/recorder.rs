use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::NewAuditRecord;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit append failed: {0}")]
    Append(String),
}

/// Port for persisting append-only audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one audit record.
    async fn append(&self, record: NewAuditRecord) -> Result<(), AuditError>;
}

/// Best-effort audit recorder.
///
/// The append is awaited, so when both the mutation and the audit write
/// succeed their store ordering is preserved. A failed append is reported on
/// the operational channel and swallowed: it must never fail or roll back the
/// triggering business operation. Callers that want to surface a soft warning
/// can inspect the returned flag.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record a mutation. Returns `false` when the append was lost (already
    /// logged); the caller's operation proceeds either way.
    pub async fn record(&self, record: NewAuditRecord) -> bool {
        let entity = record.entity.as_str();
        let action = record.action.as_str();
        match self.sink.append(record).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    entity,
                    action,
                    error = %err,
                    "audit record lost"
                );
                false
            }
        }
    }
}

impl core::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}
