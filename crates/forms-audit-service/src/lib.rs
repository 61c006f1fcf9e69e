//! # forms-audit-service
//!
//! Ingestion and read path for forms audit events.
//!
//! Events arrive on a queue, are validated by the [`MessageMapper`] and
//! persisted one transaction per message by the [`IngestionPipeline`]. The
//! [`AuditService`] serves an entity's raw trail and its consolidated
//! timeline, built by the [`ConsolidationEngine`] and cached in the
//! [`ConsolidatedCache`].
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryAuditStore::new());
//! let cache = Arc::new(ConsolidatedCache::new(Arc::new(MemoryCacheStore::new()), true));
//! let engine = ConsolidationEngine::new(store.clone(), ComparatorRegistry::forms_default());
//! let service = AuditService::new(store, engine, cache, QueryConfig::default());
//!
//! let page = service
//!     .read_consolidated_audit_events(&AuditFilter::entity("form-1"), Pagination::default())
//!     .await?;
//! ```

pub mod cache;
pub mod consolidation;
pub mod error;
pub mod mapper;
pub mod pipeline;
pub mod service;

pub use cache::ConsolidatedCache;
pub use consolidation::{
    CONSOLIDATING_TYPE, ConsolidatedPage, ConsolidationEngine, consolidate_timeline,
    has_observable_change,
};
pub use error::{AuditError, ErrorClass, ValidationErrors, Violation};
pub use mapper::{MESSAGE_SCHEMA, MessageMapper};
pub use pipeline::{BatchOutcome, Consumer, FailedMessage, IngestionPipeline, SavedMessage};
pub use service::AuditService;
