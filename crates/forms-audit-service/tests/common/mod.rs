#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use forms_audit_core::{ComparatorRegistry, QueryConfig};
use forms_audit_service::{
    AuditService, ConsolidatedCache, ConsolidationEngine, IngestionPipeline, MessageMapper,
};
use forms_audit_store::{
    AuditStore, CacheStore, MemoryAuditStore, MemoryCacheStore, MemoryQueue, MessageQueue,
    QueueMessage,
};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

pub const ENTITY_ID: &str = "689b7ab1d0eeac9711a7fb33";

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 23, 10, minute, 0).unwrap()
}

pub fn body(event_type: &str, user: &str, minute: u32, data: Option<Value>) -> Value {
    let mut body = json!({
        "entityId": ENTITY_ID,
        "category": "FORM",
        "type": event_type,
        "schemaVersion": 1,
        "source": "FORMS_MANAGER",
        "createdAt": at(minute).to_rfc3339(),
        "createdBy": { "id": user, "displayName": user },
        "messageCreatedAt": at(minute).to_rfc3339()
    });
    if let Some(data) = data {
        body["data"] = data;
    }
    body
}

pub fn change(field: &str, previous: Value, new: Value) -> Value {
    json!({
        "formId": ENTITY_ID,
        "slug": "audit-form",
        "changes": {
            "previous": { field: previous },
            "new": { field: new }
        }
    })
}

pub fn created(user: &str, minute: u32) -> Value {
    body("FORM_CREATED", user, minute, None)
}

pub fn updated(user: &str, minute: u32, previous: i64, new: i64) -> Value {
    body(
        "FORM_UPDATED",
        user,
        minute,
        Some(change("definition", json!(previous), json!(new))),
    )
}

pub fn title_updated(user: &str, minute: u32, previous: &str, new: &str) -> Value {
    body(
        "FORM_TITLE_UPDATED",
        user,
        minute,
        Some(change("title", json!(previous), json!(new))),
    )
}

pub fn envelope(body: &Value) -> QueueMessage {
    QueueMessage::new(
        Uuid::new_v4().to_string(),
        body.to_string(),
        Uuid::new_v4().to_string(),
    )
}

/// Registry in which a form update is a no-op when its definition is unchanged.
pub fn update_registry() -> ComparatorRegistry {
    use forms_audit_core::{AuditEventType, Comparator, FieldPair};

    ComparatorRegistry::forms_default().with(
        AuditEventType::FormUpdated,
        Comparator::FieldPath(FieldPair::change("definition")),
    )
}

/// Everything wired against in-memory backends.
pub struct Harness {
    pub store: Arc<MemoryAuditStore>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub queue: Arc<MemoryQueue>,
    pub cache: Arc<ConsolidatedCache>,
    pub pipeline: Arc<IngestionPipeline>,
    pub service: AuditService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_registry(ComparatorRegistry::forms_default())
    }

    pub fn with_registry(registry: ComparatorRegistry) -> Self {
        let store = Arc::new(MemoryAuditStore::new());
        let cache_store = Arc::new(MemoryCacheStore::new());
        let queue = Arc::new(MemoryQueue::new());

        Self::build(
            store.clone(),
            cache_store.clone(),
            queue.clone(),
            registry,
            store,
            cache_store,
            queue,
        )
    }

    /// Wire components over `audit`, `cache` and `queue`, keeping handles to
    /// the underlying memory backends for inspection.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        audit: Arc<dyn AuditStore>,
        cache: Arc<dyn CacheStore>,
        queue: Arc<dyn MessageQueue>,
        registry: ComparatorRegistry,
        store: Arc<MemoryAuditStore>,
        cache_store: Arc<MemoryCacheStore>,
        memory_queue: Arc<MemoryQueue>,
    ) -> Self {
        let cache = Arc::new(ConsolidatedCache::new(cache, true));
        let pipeline = Arc::new(IngestionPipeline::new(
            MessageMapper::new().unwrap(),
            audit.clone(),
            queue,
            cache.clone(),
        ));
        let engine = ConsolidationEngine::new(audit.clone(), registry);
        let service = AuditService::new(audit, engine, cache.clone(), QueryConfig::default());

        Self {
            store,
            cache_store,
            queue: memory_queue,
            cache,
            pipeline,
            service,
        }
    }

    /// Send bodies through the queue and ingest them in one batch.
    pub async fn ingest(&self, bodies: &[Value]) {
        let messages: Vec<QueueMessage> = bodies.iter().map(envelope).collect();
        let outcome = self.pipeline.process_batch(messages).await;
        assert!(outcome.failed.is_empty(), "unexpected failures: {:?}", outcome.failed);
    }
}
