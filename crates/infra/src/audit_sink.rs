//! Bridges the audit recorder port onto a storage adapter.

use std::sync::Arc;

use async_trait::async_trait;

use fleetdesk_audit::{AuditError, AuditSink, NewAuditRecord};

use crate::store::AuditLogStore;

/// [`AuditSink`] over any [`AuditLogStore`].
pub struct StoreAuditSink {
    store: Arc<dyn AuditLogStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn append(&self, record: NewAuditRecord) -> Result<(), AuditError> {
        self.store
            .append_audit(record)
            .await
            .map(|_| ())
            .map_err(|e| AuditError::Append(e.to_string()))
    }
}
