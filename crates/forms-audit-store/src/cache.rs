//! Consolidated result cache storage.
//!
//! Each cached entity is stored as one metadata row at
//! [`METADATA_SORT_INDEX`] plus one row per consolidated entry at
//! `sort_index = 0..N`. The metadata row doubles as the population lock: it
//! is created with an atomic insert-if-absent, and only the caller that
//! created it writes the entry rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forms_audit_core::ConsolidatedAuditRecord;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Sort index reserved for the metadata row.
pub const METADATA_SORT_INDEX: i32 = -1;

/// Metadata row of a cached entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub entity_id: String,
    /// Number of consolidated entries for the entity.
    pub total_items: u64,
    pub cached_at: DateTime<Utc>,
}

/// One cached consolidated entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRow {
    pub entity_id: String,
    /// Position in the newest-first timeline, starting at 0.
    pub sort_index: i32,
    pub data: ConsolidatedAuditRecord,
    pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether a metadata row exists for the entity.
    async fn metadata_exists(&self, entity_id: &str) -> Result<bool, StoreError>;

    /// Fetch the metadata row for the entity.
    async fn find_metadata(&self, entity_id: &str) -> Result<Option<CacheMetadata>, StoreError>;

    /// Atomically create the metadata row if none exists.
    ///
    /// Returns `true` when this call created it and `false` when a row was
    /// already present, in which case nothing is written.
    async fn insert_metadata_if_absent(&self, metadata: &CacheMetadata)
    -> Result<bool, StoreError>;

    /// Bulk insert entry rows.
    async fn insert_rows(&self, rows: &[CacheRow]) -> Result<(), StoreError>;

    /// Claim the metadata row and, if this call created it, write `rows`.
    ///
    /// Returns whether this call populated the entity. Backends that can
    /// make both writes visible together should override this.
    async fn populate(
        &self,
        metadata: &CacheMetadata,
        rows: &[CacheRow],
    ) -> Result<bool, StoreError> {
        if !self.insert_metadata_if_absent(metadata).await? {
            return Ok(false);
        }
        self.insert_rows(rows).await?;
        Ok(true)
    }

    /// Read entry rows ordered by sort index.
    async fn read_rows(
        &self,
        entity_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ConsolidatedAuditRecord>, StoreError>;

    /// Delete the metadata row and every entry row of the entity.
    ///
    /// Returns the number of rows removed.
    async fn delete_entity(&self, entity_id: &str) -> Result<u64, StoreError>;
}
