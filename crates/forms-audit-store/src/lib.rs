//! # forms-audit-store
//!
//! Storage traits and backends for the forms audit service.
//!
//! - [`AuditStore`]: append-only audit records with transactional inserts
//! - [`CacheStore`]: the consolidated result cache
//! - [`MessageQueue`]: the queue audit events arrive on
//!
//! Two backends implement all three: [`memory`] for tests and offline use,
//! and [`postgres`] for production.

pub mod audit;
pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod queue;

pub use audit::{AuditStore, AuditTransaction, ListResult};
pub use cache::{CacheMetadata, CacheRow, CacheStore, METADATA_SORT_INDEX};
pub use error::StoreError;
pub use memory::{MemoryAuditStore, MemoryCacheStore, MemoryQueue};
pub use postgres::PgStore;
pub use queue::{MessageQueue, QueueMessage, ReceiveOptions};
