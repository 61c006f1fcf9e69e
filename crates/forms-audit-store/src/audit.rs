//! Audit record storage traits.

use async_trait::async_trait;
use forms_audit_core::{AuditFilter, AuditRecord, AuditRecordInput, Pagination};

use crate::error::StoreError;

/// Result of [`AuditStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    /// Matching records, newest first.
    pub documents: Vec<AuditRecord>,
    /// Count of all matching records. Only computed for paginated requests.
    pub total_items: Option<u64>,
}

/// Trait for append-only audit record storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// List records matching `filter`, sorted by `createdAt` descending.
    ///
    /// With `pagination` only the requested page is returned and
    /// `total_items` is set. Without it every matching record is returned.
    async fn list(
        &self,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> Result<ListResult, StoreError>;

    /// Start a transaction for writing records.
    async fn begin(&self) -> Result<Box<dyn AuditTransaction>, StoreError>;

    /// Insert a record inside `tx`.
    async fn create(
        &self,
        record: &AuditRecordInput,
        tx: &mut dyn AuditTransaction,
    ) -> Result<String, StoreError> {
        tracing::debug!(message_id = %record.message_id, "Inserting audit record");

        match tx.insert(record).await {
            Ok(id) => {
                tracing::debug!(message_id = %record.message_id, id = %id, "Inserted audit record");
                Ok(id)
            }
            Err(e) => {
                tracing::error!(
                    message_id = %record.message_id,
                    error = %e,
                    "Failed to insert audit record"
                );
                Err(e)
            }
        }
    }
}

/// A unit of work over the audit store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait AuditTransaction: Send {
    /// Insert a record, returning its store-assigned ID.
    ///
    /// Fails with [`StoreError::Conflict`] if the message ID is taken.
    async fn insert(&mut self, record: &AuditRecordInput) -> Result<String, StoreError>;

    /// Make the writes durable.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard the writes.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
