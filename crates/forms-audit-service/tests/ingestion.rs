mod common;

use async_trait::async_trait;
use common::*;
use forms_audit_core::{
    AuditFilter, AuditRecordInput, ComparatorRegistry, Pagination, QueueConfig,
};
use forms_audit_service::{AuditError, Consumer, MessageMapper};
use forms_audit_store::{
    AuditStore, AuditTransaction, ListResult, MemoryAuditStore, MemoryCacheStore, MemoryQueue,
    MessageQueue, QueueMessage, ReceiveOptions, StoreError,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn receive_all() -> ReceiveOptions {
    ReceiveOptions {
        max_messages: 10,
        visibility_timeout: Duration::from_secs(60),
        wait_time: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_batch_partitions_saved_and_failed() {
    let harness = Harness::new();
    harness.queue.send(&created("userA", 1).to_string()).await.unwrap();
    harness.queue.send(&title_updated("userA", 2, "A", "B").to_string()).await.unwrap();
    harness.queue.send(&json!({ "entityId": "" }).to_string()).await.unwrap();

    let messages = harness.queue.receive(receive_all()).await.unwrap();
    let outcome = harness.pipeline.process_batch(messages).await;

    assert_eq!(outcome.saved.len(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert!(matches!(outcome.failed[0].error, AuditError::Validation(_)));

    // Invalid messages stay on the queue for redelivery.
    assert_eq!(harness.queue.depth(), 1);
    assert_eq!(harness.store.len(), 2);
    assert!(outcome.saved.iter().all(|s| s.entity_id == ENTITY_ID));
}

#[tokio::test]
async fn test_duplicate_in_batch_is_reported_once_and_stored_once() {
    let harness = Harness::new();
    let body = created("userA", 1).to_string();
    let first = QueueMessage::new("dup-1", body.clone(), "receipt-a");
    let second = QueueMessage::new("dup-1", body, "receipt-b");

    let outcome = harness.pipeline.process_batch(vec![first, second]).await;

    assert_eq!(outcome.saved.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failed[0].error.is_conflict());
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn test_redelivered_duplicate_is_deleted_from_queue() {
    let harness = Harness::new();
    harness.queue.send(&created("userA", 1).to_string()).await.unwrap();

    let messages = harness
        .queue
        .receive(ReceiveOptions {
            visibility_timeout: Duration::ZERO,
            ..receive_all()
        })
        .await
        .unwrap();
    let original = messages[0].clone();

    // First attempt commits, but pretend the delete was lost by inserting
    // the record directly and leaving the message on the queue.
    let record = MessageMapper::new().unwrap().map(&original).unwrap();
    let mut tx = harness.store.begin().await.unwrap();
    tx.insert(&record).await.unwrap();
    tx.commit().await.unwrap();

    let redelivered = harness.queue.receive(receive_all()).await.unwrap();
    let outcome = harness.pipeline.process_batch(redelivered).await;

    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failed[0].error.is_conflict());
    assert_eq!(harness.queue.depth(), 0);
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn test_missing_fields_fail_without_touching_store() {
    let harness = Harness::new();
    let no_id = QueueMessage {
        id: None,
        body: Some(created("userA", 1).to_string()),
        receipt_handle: Some("r".to_string()),
    };
    let no_receipt = QueueMessage {
        id: Some("m-2".to_string()),
        body: Some(created("userA", 1).to_string()),
        receipt_handle: None,
    };

    let outcome = harness.pipeline.process_batch(vec![no_id, no_receipt]).await;

    assert_eq!(outcome.failed.len(), 2);
    assert!(matches!(outcome.failed[0].error, AuditError::MissingField("MessageId")));
    assert!(matches!(outcome.failed[1].error, AuditError::MissingField("ReceiptHandle")));
    assert!(harness.store.is_empty());
}

/// Queue whose first delete of one message ID fails.
struct FlakyDeleteQueue {
    inner: Arc<MemoryQueue>,
    fail_id: Mutex<Option<String>>,
}

#[async_trait]
impl MessageQueue for FlakyDeleteQueue {
    async fn receive(&self, options: ReceiveOptions) -> Result<Vec<QueueMessage>, StoreError> {
        self.inner.receive(options).await
    }

    async fn delete(&self, id: &str, receipt_handle: &str) -> Result<(), StoreError> {
        let fail = {
            let mut fail_id = self.fail_id.lock().unwrap();
            fail_id.take_if(|fail_id| fail_id.as_str() == id).is_some()
        };
        if fail {
            return Err(StoreError::LockError);
        }
        self.inner.delete(id, receipt_handle).await
    }

    async fn send(&self, body: &str) -> Result<String, StoreError> {
        self.inner.send(body).await
    }
}

#[tokio::test]
async fn test_failed_delete_keeps_record_and_message_for_redelivery() {
    let store = Arc::new(MemoryAuditStore::new());
    let cache_store = Arc::new(MemoryCacheStore::new());
    let memory_queue = Arc::new(MemoryQueue::new());

    let failing_id = memory_queue.send(&created("userA", 1).to_string()).await.unwrap();
    memory_queue.send(&title_updated("userA", 2, "A", "B").to_string()).await.unwrap();

    let queue = Arc::new(FlakyDeleteQueue {
        inner: memory_queue.clone(),
        fail_id: Mutex::new(Some(failing_id.clone())),
    });
    let harness = Harness::build(
        store.clone(),
        cache_store.clone(),
        queue.clone(),
        ComparatorRegistry::forms_default(),
        store,
        cache_store,
        memory_queue,
    );

    let redeliver_now = ReceiveOptions {
        visibility_timeout: Duration::ZERO,
        ..receive_all()
    };
    let messages = queue.receive(redeliver_now).await.unwrap();
    let outcome = harness.pipeline.process_batch(messages).await;

    // Both records are committed; only the failed delete leaves a message behind.
    assert_eq!(outcome.saved.len(), 2);
    assert!(outcome.failed.is_empty());
    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.queue.depth(), 1);

    let redelivered = queue.receive(receive_all()).await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].id.as_deref(), Some(failing_id.as_str()));

    let outcome = harness.pipeline.process_batch(redelivered).await;
    assert_eq!(outcome.failed.len(), 1);
    assert!(outcome.failed[0].error.is_conflict());
    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.queue.depth(), 0);
}

/// Audit store whose transactions never commit.
struct CommitFailingStore {
    inner: Arc<MemoryAuditStore>,
}

struct CommitFailingTransaction {
    inner: Box<dyn AuditTransaction>,
}

#[async_trait]
impl AuditStore for CommitFailingStore {
    async fn list(
        &self,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> Result<ListResult, StoreError> {
        self.inner.list(filter, pagination).await
    }

    async fn begin(&self) -> Result<Box<dyn AuditTransaction>, StoreError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(CommitFailingTransaction { inner }))
    }
}

#[async_trait]
impl AuditTransaction for CommitFailingTransaction {
    async fn insert(&mut self, record: &AuditRecordInput) -> Result<String, StoreError> {
        self.inner.insert(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await?;
        Err(StoreError::LockError)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_failed_commit_leaves_message_on_queue() {
    let store = Arc::new(MemoryAuditStore::new());
    let cache_store = Arc::new(MemoryCacheStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let audit = Arc::new(CommitFailingStore {
        inner: store.clone(),
    });
    let harness = Harness::build(
        audit,
        cache_store.clone(),
        queue.clone(),
        ComparatorRegistry::forms_default(),
        store,
        cache_store,
        queue,
    );

    let id = harness.queue.send(&created("userA", 1).to_string()).await.unwrap();
    let messages = harness.queue.receive(receive_all()).await.unwrap();
    let outcome = harness.pipeline.process_batch(messages).await;

    assert!(outcome.saved.is_empty());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].message.id.as_deref(), Some(id.as_str()));
    assert!(matches!(outcome.failed[0].error, AuditError::TransientStore(_)));
    assert!(!outcome.failed[0].error.is_permanent());

    assert!(harness.store.is_empty());
    assert_eq!(harness.queue.depth(), 1);
}

#[tokio::test]
async fn test_saving_invalidates_cached_timeline() {
    let harness = Harness::new();
    harness.ingest(&[created("userA", 1)]).await;

    let filter = AuditFilter::entity(ENTITY_ID);
    harness
        .service
        .read_consolidated_audit_events(&filter, Pagination::default())
        .await
        .unwrap();
    assert!(harness.cache.is_populated(ENTITY_ID).await);

    harness.ingest(&[title_updated("userA", 2, "A", "B")]).await;
    assert!(!harness.cache.is_populated(ENTITY_ID).await);

    let result = harness
        .service
        .read_consolidated_audit_events(&filter, Pagination::default())
        .await
        .unwrap();
    assert_eq!(result.total_items(), 2);
}

#[tokio::test]
async fn test_consumer_run_once_on_empty_queue() {
    let harness = Harness::new();
    let consumer = Consumer::new(
        harness.pipeline.clone(),
        harness.queue.clone(),
        QueueConfig::default(),
    );

    let outcome = consumer.run_once().await.unwrap();
    assert!(outcome.is_empty());
}

#[tokio::test]
async fn test_consumer_drains_queue_until_shutdown() {
    let harness = Harness::new();
    for minute in 1..=12 {
        harness
            .queue
            .send(&title_updated("userA", minute, "A", &format!("T{minute}")).to_string())
            .await
            .unwrap();
    }

    let config = QueueConfig {
        receive_interval_ms: 10,
        ..QueueConfig::default()
    };
    let consumer = Consumer::new(harness.pipeline.clone(), harness.queue.clone(), config);

    consumer
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert_eq!(harness.queue.depth(), 0);
    assert_eq!(harness.store.len(), 12);
}
