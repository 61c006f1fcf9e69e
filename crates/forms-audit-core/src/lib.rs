//! # forms-audit-core
//!
//! Types shared by every forms audit crate:
//!
//! - [`record`]: audit messages, records and consolidated timeline entries
//! - [`pagination`]: page requests and query response envelopes
//! - [`registry`]: the event-type comparator registry used to drop no-op events
//! - [`config`]: YAML service configuration

pub mod config;
pub mod pagination;
pub mod record;
pub mod registry;

use serde::{Deserialize, Serialize};

pub use config::{AuditServiceConfig, CacheConfig, ConfigError, QueryConfig, QueueConfig};
pub use pagination::{
    AuditQueryResult, DEFAULT_PER_PAGE, MAX_RESULTS, Pagination, PaginationError,
    PaginationResult,
};
pub use record::{
    AuditEventCategory, AuditEventSource, AuditEventType, AuditMessage, AuditRecord,
    AuditRecordInput, AuditUser, ConsolidatedAuditRecord, Consolidation,
};
pub use registry::{Comparator, ComparatorRegistry, FieldPair};

/// Selects the audit records of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    /// Entity whose trail is requested.
    pub entity_id: String,
    /// Restrict to one category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<AuditEventCategory>,
}

impl AuditFilter {
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: AuditEventCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Whether a record satisfies this filter.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        record.entity_id() == self.entity_id
            && self.category.is_none_or(|c| c == record.category())
    }
}
