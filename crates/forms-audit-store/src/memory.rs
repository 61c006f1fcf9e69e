//! In-memory backends.
//!
//! These hold everything behind std locks and are used by the test suites
//! and by the CLI's offline commands. They honor the same contracts as the
//! Postgres backend: unique message IDs, insert-if-absent cache metadata and
//! receipt-handle checked queue deletes.

use async_trait::async_trait;
use forms_audit_core::{AuditFilter, AuditRecord, AuditRecordInput, ConsolidatedAuditRecord, Pagination};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use uuid::Uuid;

use crate::audit::{AuditStore, AuditTransaction, ListResult};
use crate::cache::{CacheMetadata, CacheRow, CacheStore};
use crate::error::StoreError;
use crate::queue::{MessageQueue, QueueMessage, ReceiveOptions};

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AuditState {
    /// Committed records with their insertion sequence.
    records: Vec<(u64, AuditRecord)>,
    /// Committed and in-flight message IDs.
    message_ids: HashSet<String>,
    next_seq: u64,
}

/// Audit store backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStore {
    state: Arc<Mutex<AuditState>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed records in insertion order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.state
            .lock()
            .map(|s| s.records.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn list(
        &self,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> Result<ListResult, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::LockError)?;

        let mut matching: Vec<&(u64, AuditRecord)> = state
            .records
            .iter()
            .filter(|(_, record)| filter.matches(record))
            .collect();

        // Newest first; later inserts win ties.
        matching.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b_seq.cmp(a_seq))
        });

        let total = matching.len() as u64;
        let (skip, limit) = match pagination {
            Some(p) => (p.skip(), p.limit()),
            None => (0, usize::MAX),
        };

        let documents = matching
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();

        Ok(ListResult {
            documents,
            total_items: pagination.map(|_| total),
        })
    }

    async fn begin(&self) -> Result<Box<dyn AuditTransaction>, StoreError> {
        Ok(Box::new(MemoryAuditTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            finished: false,
        }))
    }
}

/// Transaction over a [`MemoryAuditStore`].
///
/// Inserted message IDs are reserved immediately so concurrent transactions
/// see the conflict; reservations are released on rollback or drop.
#[derive(Debug)]
pub struct MemoryAuditTransaction {
    state: Arc<Mutex<AuditState>>,
    pending: Vec<(u64, AuditRecord)>,
    finished: bool,
}

impl MemoryAuditTransaction {
    fn release(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.finished = true;

        if let Ok(mut state) = self.state.lock() {
            for (_, record) in pending {
                state.message_ids.remove(record.message_id());
            }
        }
    }
}

#[async_trait]
impl AuditTransaction for MemoryAuditTransaction {
    async fn insert(&mut self, record: &AuditRecordInput) -> Result<String, StoreError> {
        if self.finished {
            return Err(StoreError::TransactionClosed);
        }

        let seq = {
            let mut state = self.state.lock().map_err(|_| StoreError::LockError)?;
            if !state.message_ids.insert(record.message_id.clone()) {
                return Err(StoreError::Conflict {
                    message_id: record.message_id.clone(),
                });
            }
            state.next_seq += 1;
            state.next_seq
        };

        let id = format!("{seq:024x}");
        self.pending
            .push((seq, AuditRecord::new(id.clone(), record.clone())));
        Ok(id)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionClosed);
        }

        let pending = std::mem::take(&mut self.pending);
        self.finished = true;

        let mut state = self.state.lock().map_err(|_| StoreError::LockError)?;
        state.records.extend(pending);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::TransactionClosed);
        }
        self.release();
        Ok(())
    }
}

impl Drop for MemoryAuditTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CacheEntry {
    metadata: Option<CacheMetadata>,
    rows: BTreeMap<i32, CacheRow>,
}

/// Cache store backed by a map keyed on entity ID.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entry rows stored for an entity, metadata excluded.
    pub fn row_count(&self, entity_id: &str) -> usize {
        self.entries
            .read()
            .map(|e| e.get(entity_id).map(|entry| entry.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn metadata_exists(&self, entity_id: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockError)?;
        Ok(entries
            .get(entity_id)
            .is_some_and(|entry| entry.metadata.is_some()))
    }

    async fn find_metadata(&self, entity_id: &str) -> Result<Option<CacheMetadata>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockError)?;
        Ok(entries
            .get(entity_id)
            .and_then(|entry| entry.metadata.clone()))
    }

    async fn insert_metadata_if_absent(
        &self,
        metadata: &CacheMetadata,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockError)?;
        let entry = entries.entry(metadata.entity_id.clone()).or_default();

        if entry.metadata.is_some() {
            return Ok(false);
        }
        entry.metadata = Some(metadata.clone());
        Ok(true)
    }

    async fn insert_rows(&self, rows: &[CacheRow]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockError)?;

        for row in rows {
            let taken = entries
                .get(&row.entity_id)
                .is_some_and(|entry| entry.rows.contains_key(&row.sort_index));
            if taken {
                return Err(StoreError::DuplicateCacheRow {
                    entity_id: row.entity_id.clone(),
                    sort_index: row.sort_index,
                });
            }
        }

        for row in rows {
            entries
                .entry(row.entity_id.clone())
                .or_default()
                .rows
                .insert(row.sort_index, row.clone());
        }
        Ok(())
    }

    async fn read_rows(
        &self,
        entity_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ConsolidatedAuditRecord>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockError)?;
        Ok(entries
            .get(entity_id)
            .map(|entry| {
                entry
                    .rows
                    .range(0..)
                    .skip(skip)
                    .take(limit)
                    .map(|(_, row)| row.data.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockError)?;
        Ok(entries
            .remove(entity_id)
            .map(|entry| entry.rows.len() as u64 + u64::from(entry.metadata.is_some()))
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct QueuedMessage {
    id: String,
    body: String,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

/// FIFO queue with visibility timeouts.
///
/// `receive` never blocks; the wait time is ignored.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<QueuedMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages not yet deleted, visible or not.
    pub fn depth(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, options: ReceiveOptions) -> Result<Vec<QueueMessage>, StoreError> {
        let mut messages = self.messages.lock().map_err(|_| StoreError::LockError)?;
        let now = Instant::now();

        let received = messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(options.max_messages)
            .map(|m| {
                let receipt_handle = Uuid::new_v4().to_string();
                m.receipt_handle = Some(receipt_handle.clone());
                m.visible_at = now + options.visibility_timeout;
                QueueMessage::new(m.id.clone(), m.body.clone(), receipt_handle)
            })
            .collect();

        Ok(received)
    }

    async fn delete(&self, id: &str, receipt_handle: &str) -> Result<(), StoreError> {
        let mut messages = self.messages.lock().map_err(|_| StoreError::LockError)?;

        let Some(pos) = messages.iter().position(|m| m.id == id) else {
            // Already deleted
            return Ok(());
        };

        if messages[pos].receipt_handle.as_deref() != Some(receipt_handle) {
            return Err(StoreError::StaleReceipt {
                message_id: id.to_string(),
            });
        }

        messages.remove(pos);
        Ok(())
    }

    async fn send(&self, body: &str) -> Result<String, StoreError> {
        let mut messages = self.messages.lock().map_err(|_| StoreError::LockError)?;
        let id = Uuid::new_v4().to_string();

        messages.push_back(QueuedMessage {
            id: id.clone(),
            body: body.to_string(),
            receipt_handle: None,
            visible_at: Instant::now(),
        });
        Ok(id)
    }
}
