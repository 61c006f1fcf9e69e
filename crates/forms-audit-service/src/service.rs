//! Audit read path.

use forms_audit_core::{
    AuditFilter, AuditQueryResult, AuditRecord, ConsolidatedAuditRecord, Pagination, QueryConfig,
};
use forms_audit_store::AuditStore;
use std::sync::Arc;

use crate::cache::ConsolidatedCache;
use crate::consolidation::ConsolidationEngine;
use crate::error::AuditError;

/// Serves raw and consolidated audit trails.
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    engine: ConsolidationEngine,
    cache: Arc<ConsolidatedCache>,
    query: QueryConfig,
}

impl AuditService {
    pub fn new(
        store: Arc<dyn AuditStore>,
        engine: ConsolidationEngine,
        cache: Arc<ConsolidatedCache>,
        query: QueryConfig,
    ) -> Self {
        Self {
            store,
            engine,
            cache,
            query,
        }
    }

    /// Build a page request from optional query parameters.
    pub fn pagination(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Pagination, AuditError> {
        Ok(self.query.pagination(page, per_page)?)
    }

    // Re-apply the configured cap to requests built elsewhere.
    fn capped(&self, pagination: Pagination) -> Result<Pagination, AuditError> {
        Ok(Pagination::with_max(
            pagination.page,
            pagination.per_page,
            self.query.max_results,
        )?)
    }

    /// A page of the entity's audit records, newest first.
    pub async fn read_audit_events(
        &self,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> Result<AuditQueryResult<AuditRecord>, AuditError> {
        let pagination = self.capped(pagination)?;
        let listed = self.store.list(filter, Some(pagination)).await?;
        let total_items = listed
            .total_items
            .unwrap_or(listed.documents.len() as u64);

        tracing::debug!(
            entity_id = %filter.entity_id,
            page = pagination.page,
            returned = listed.documents.len(),
            total_items,
            "Read audit events"
        );
        Ok(AuditQueryResult::new(listed.documents, total_items, pagination))
    }

    /// A page of the entity's consolidated timeline.
    ///
    /// Served from the cache when possible. Category-filtered requests bypass
    /// the cache, which only holds unfiltered timelines.
    pub async fn read_consolidated_audit_events(
        &self,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> Result<AuditQueryResult<ConsolidatedAuditRecord>, AuditError> {
        let pagination = self.capped(pagination)?;
        let cacheable = filter.category.is_none() && self.cache.is_enabled();

        if !cacheable {
            let page = self.engine.consolidate(filter, pagination).await?;
            return Ok(AuditQueryResult::new(
                page.documents,
                page.total_items,
                pagination,
            ));
        }

        if let Some(page) = self.cache.get(&filter.entity_id, pagination).await {
            return Ok(AuditQueryResult::new(
                page.documents,
                page.total_items,
                pagination,
            ));
        }

        let timeline = self.engine.timeline(filter).await?;
        let total_items = timeline.len() as u64;
        self.cache
            .populate(&filter.entity_id, &timeline, total_items)
            .await;

        Ok(AuditQueryResult::new(
            pagination.apply(&timeline),
            total_items,
            pagination,
        ))
    }
}
