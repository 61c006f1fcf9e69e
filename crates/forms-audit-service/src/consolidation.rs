//! Consolidated audit timelines.
//!
//! A timeline is built from one entity's records, newest first:
//!
//! 1. Records whose payload shows no observable change are dropped, as
//!    decided by the [`ComparatorRegistry`].
//! 2. Consecutive [`CONSOLIDATING_TYPE`] records by the same author are
//!    merged into a single entry represented by the newest of them, carrying
//!    the count and time span of the run.
//! 3. Entries are ordered by their representative's `createdAt`, newest first.

use chrono::{DateTime, Utc};
use forms_audit_core::{
    AuditEventType, AuditFilter, AuditRecord, Comparator, ComparatorRegistry,
    ConsolidatedAuditRecord, Consolidation, Pagination,
};
use forms_audit_store::AuditStore;
use serde_json::Value;
use std::sync::Arc;

use crate::error::AuditError;

/// The event kind whose consecutive same-author runs are merged.
pub const CONSOLIDATING_TYPE: AuditEventType = AuditEventType::FormUpdated;

/// One page of a consolidated timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedPage {
    pub documents: Vec<ConsolidatedAuditRecord>,
    /// Number of entries in the whole timeline.
    pub total_items: u64,
}

/// Whether a record reflects an observable change.
pub fn has_observable_change(record: &AuditRecord, registry: &ComparatorRegistry) -> bool {
    let Some(data) = record.data() else {
        return true;
    };

    match registry.resolve(record.event_type()) {
        None | Some(Comparator::NoComparisonNeeded) => true,
        Some(Comparator::FieldPath(pair)) => {
            let (previous, new) = pair.resolve(data);
            !same_value(previous, new)
        }
        Some(Comparator::MultiField { fields }) => fields.iter().any(|pair| {
            let (previous, new) = pair.resolve(data);
            has_content(new) && !same_value(previous, new)
        }),
    }
}

// Missing and null compare equal.
fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    a == b
}

fn has_content(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// A run of merged records being accumulated.
struct Run {
    representative: AuditRecord,
    count: usize,
    newest: DateTime<Utc>,
    oldest: DateTime<Utc>,
}

impl Run {
    fn start(record: AuditRecord) -> Self {
        let created_at = record.created_at();
        Self {
            representative: record,
            count: 1,
            newest: created_at,
            oldest: created_at,
        }
    }

    fn absorb(&mut self, record: &AuditRecord) {
        self.count += 1;
        self.newest = self.newest.max(record.created_at());
        self.oldest = self.oldest.min(record.created_at());
    }

    fn finish(self) -> ConsolidatedAuditRecord {
        ConsolidatedAuditRecord::new(
            self.representative,
            Consolidation {
                consolidated_count: self.count,
                consolidated_from: self.oldest,
                consolidated_to: self.newest,
            },
        )
    }
}

/// Build the consolidated timeline from records sorted newest first.
pub fn consolidate_timeline(
    records: Vec<AuditRecord>,
    registry: &ComparatorRegistry,
) -> Vec<ConsolidatedAuditRecord> {
    let mut runs: Vec<Run> = Vec::new();
    let mut prev_author: Option<String> = None;
    let mut prev_type: Option<AuditEventType> = None;

    for record in records {
        if !has_observable_change(&record, registry) {
            continue;
        }

        let event_type = record.event_type();
        let author = &record.created_by().id;
        let starts_run = event_type != CONSOLIDATING_TYPE
            || prev_author.as_ref() != Some(author)
            || prev_type != Some(CONSOLIDATING_TYPE);

        prev_author = Some(author.clone());
        prev_type = Some(event_type);

        if starts_run {
            runs.push(Run::start(record));
        } else if let Some(run) = runs.last_mut() {
            run.absorb(&record);
        }
    }

    let mut timeline: Vec<ConsolidatedAuditRecord> = runs.into_iter().map(Run::finish).collect();
    timeline.sort_by(|a, b| b.record.created_at().cmp(&a.record.created_at()));
    timeline
}

/// Reads records from the audit store and consolidates them.
pub struct ConsolidationEngine {
    store: Arc<dyn AuditStore>,
    registry: ComparatorRegistry,
}

impl ConsolidationEngine {
    pub fn new(store: Arc<dyn AuditStore>, registry: ComparatorRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &ComparatorRegistry {
        &self.registry
    }

    /// The entity's full consolidated timeline.
    pub async fn timeline(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<ConsolidatedAuditRecord>, AuditError> {
        let listed = self.store.list(filter, None).await?;
        let fetched = listed.documents.len();
        let timeline = consolidate_timeline(listed.documents, &self.registry);

        tracing::debug!(
            entity_id = %filter.entity_id,
            records = fetched,
            entries = timeline.len(),
            "Consolidated audit records"
        );
        Ok(timeline)
    }

    /// One page of the entity's consolidated timeline.
    pub async fn consolidate(
        &self,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> Result<ConsolidatedPage, AuditError> {
        let timeline = self.timeline(filter).await?;
        Ok(ConsolidatedPage {
            total_items: timeline.len() as u64,
            documents: pagination.apply(&timeline),
        })
    }
}
