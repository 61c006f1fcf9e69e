//! Consolidated result cache.
//!
//! Caches an entity's full consolidated timeline so pages can be served
//! without re-reading and re-consolidating its records. Every failure in here
//! is logged and degrades to a miss or a no-op; callers never see an error.

use chrono::Utc;
use forms_audit_core::{ConsolidatedAuditRecord, Pagination};
use forms_audit_store::{CacheMetadata, CacheRow, CacheStore};
use std::sync::Arc;

use crate::consolidation::ConsolidatedPage;
use crate::error::AuditError;

/// Cache of consolidated timelines keyed by entity ID.
pub struct ConsolidatedCache {
    store: Arc<dyn CacheStore>,
    enabled: bool,
}

impl ConsolidatedCache {
    pub fn new(store: Arc<dyn CacheStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a timeline is cached for the entity.
    pub async fn is_populated(&self, entity_id: &str) -> bool {
        if !self.enabled {
            return false;
        }

        match self.store.metadata_exists(entity_id).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "Failed to check consolidated cache");
                false
            }
        }
    }

    /// A page of the cached timeline, or `None` on a miss.
    pub async fn get(&self, entity_id: &str, pagination: Pagination) -> Option<ConsolidatedPage> {
        if !self.enabled {
            return None;
        }

        match self.read(entity_id, pagination).await {
            Ok(Some(page)) => {
                tracing::debug!(entity_id, total_items = page.total_items, "Consolidated cache hit");
                Some(page)
            }
            Ok(None) => {
                tracing::debug!(entity_id, "Consolidated cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "Failed to read consolidated cache");
                None
            }
        }
    }

    async fn read(
        &self,
        entity_id: &str,
        pagination: Pagination,
    ) -> Result<Option<ConsolidatedPage>, AuditError> {
        let Some(metadata) = self
            .store
            .find_metadata(entity_id)
            .await
            .map_err(AuditError::cache)?
        else {
            return Ok(None);
        };

        let documents = self
            .store
            .read_rows(entity_id, pagination.skip(), pagination.limit())
            .await
            .map_err(AuditError::cache)?;

        Ok(Some(ConsolidatedPage {
            documents,
            total_items: metadata.total_items,
        }))
    }

    /// Store an entity's full timeline.
    ///
    /// Only the caller that creates the metadata row writes entries; anyone
    /// racing it returns without writing. If writing the entries fails the
    /// whole entity is dropped from the cache.
    pub async fn populate(
        &self,
        entity_id: &str,
        timeline: &[ConsolidatedAuditRecord],
        total_items: u64,
    ) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.write(entity_id, timeline, total_items).await {
            tracing::warn!(entity_id, error = %e, "Failed to populate consolidated cache");
            self.invalidate(entity_id).await;
        }
    }

    async fn write(
        &self,
        entity_id: &str,
        timeline: &[ConsolidatedAuditRecord],
        total_items: u64,
    ) -> Result<(), AuditError> {
        let cached_at = Utc::now();
        let metadata = CacheMetadata {
            entity_id: entity_id.to_string(),
            total_items,
            cached_at,
        };

        let rows: Vec<CacheRow> = timeline
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let sort_index = i32::try_from(index)
                    .map_err(|_| AuditError::Cache(format!("timeline too long: {index}")))?;
                Ok(CacheRow {
                    entity_id: entity_id.to_string(),
                    sort_index,
                    data: entry.clone(),
                    cached_at,
                })
            })
            .collect::<Result<_, AuditError>>()?;

        let populated = self
            .store
            .populate(&metadata, &rows)
            .await
            .map_err(AuditError::cache)?;
        if !populated {
            tracing::debug!(entity_id, "Consolidated cache already populated");
            return Ok(());
        }

        tracing::debug!(entity_id, rows = rows.len(), "Populated consolidated cache");
        Ok(())
    }

    /// Drop everything cached for the entity.
    pub async fn invalidate(&self, entity_id: &str) {
        if !self.enabled {
            return;
        }

        match self.store.delete_entity(entity_id).await {
            Ok(removed) => {
                tracing::debug!(entity_id, removed, "Invalidated consolidated cache");
            }
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "Failed to invalidate consolidated cache");
            }
        }
    }
}
