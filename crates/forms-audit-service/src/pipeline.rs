//! Audit event ingestion.
//!
//! Each message in a batch is handled independently and concurrently:
//! map and validate, insert inside a transaction, commit, then delete the
//! source message from the queue. A failure before the commit rolls back
//! that message alone and leaves it on the queue for redelivery. Duplicates
//! are the exception: their record is already durable, so the message is
//! deleted even though it is reported as failed.

use forms_audit_core::QueueConfig;
use forms_audit_store::{AuditStore, AuditTransaction, MessageQueue, QueueMessage, ReceiveOptions};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;

use crate::cache::ConsolidatedCache;
use crate::error::AuditError;
use crate::mapper::MessageMapper;

/// A message that was persisted and acknowledged.
#[derive(Debug, Clone)]
pub struct SavedMessage {
    pub message: QueueMessage,
    /// Store-assigned record ID.
    pub record_id: String,
    pub entity_id: String,
}

/// A message that could not be persisted.
#[derive(Debug)]
pub struct FailedMessage {
    pub message: QueueMessage,
    pub error: AuditError,
}

/// Per-message outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub saved: Vec<SavedMessage>,
    pub failed: Vec<FailedMessage>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.saved.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record inserted but not yet committed.
struct Persisted {
    record_id: String,
    entity_id: String,
    message_id: String,
    receipt_handle: String,
}

/// Persists queue messages as audit records.
pub struct IngestionPipeline {
    mapper: MessageMapper,
    store: Arc<dyn AuditStore>,
    queue: Arc<dyn MessageQueue>,
    cache: Arc<ConsolidatedCache>,
}

impl IngestionPipeline {
    pub fn new(
        mapper: MessageMapper,
        store: Arc<dyn AuditStore>,
        queue: Arc<dyn MessageQueue>,
        cache: Arc<ConsolidatedCache>,
    ) -> Self {
        Self {
            mapper,
            store,
            queue,
            cache,
        }
    }

    /// Process a batch, partitioning it into saved and failed messages.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchOutcome {
        let results = join_all(messages.into_iter().map(|m| self.process_message(m))).await;

        let mut outcome = BatchOutcome::default();
        for result in results {
            match result {
                Ok(saved) => outcome.saved.push(saved),
                Err(failed) => outcome.failed.push(failed),
            }
        }
        outcome
    }

    /// Process one message in its own transaction.
    pub async fn process_message(
        &self,
        message: QueueMessage,
    ) -> Result<SavedMessage, FailedMessage> {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(
                    message_id = message.display_id(),
                    error = %e,
                    "Failed to start transaction"
                );
                return Err(FailedMessage {
                    message,
                    error: e.into(),
                });
            }
        };

        let persisted = self.persist(&message, tx.as_mut()).await;

        match persisted {
            Ok(persisted) => {
                if let Err(e) = tx.commit().await {
                    tracing::error!(
                        message_id = message.display_id(),
                        error = %e,
                        "Failed to commit audit record"
                    );
                    return Err(FailedMessage {
                        message,
                        error: e.into(),
                    });
                }

                tracing::info!(
                    message_id = message.display_id(),
                    entity_id = %persisted.entity_id,
                    record_id = %persisted.record_id,
                    "Saved audit event"
                );
                self.acknowledge(&persisted).await;
                self.cache.invalidate(&persisted.entity_id).await;

                Ok(SavedMessage {
                    message,
                    record_id: persisted.record_id,
                    entity_id: persisted.entity_id,
                })
            }
            Err(error) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(
                        message_id = message.display_id(),
                        error = %e,
                        "Failed to roll back transaction"
                    );
                }

                if error.is_conflict() {
                    self.acknowledge_duplicate(&message).await;
                } else {
                    tracing::error!(
                        message_id = message.display_id(),
                        error = %error,
                        "Failed to save audit event"
                    );
                }

                Err(FailedMessage { message, error })
            }
        }
    }

    async fn persist(
        &self,
        message: &QueueMessage,
        tx: &mut dyn AuditTransaction,
    ) -> Result<Persisted, AuditError> {
        let record = self.mapper.map(message)?;
        let receipt_handle = message
            .receipt_handle
            .clone()
            .ok_or(AuditError::MissingField("ReceiptHandle"))?;

        let record_id = self.store.create(&record, tx).await?;

        Ok(Persisted {
            record_id,
            entity_id: record.message.entity_id,
            message_id: record.message_id,
            receipt_handle,
        })
    }

    // The record is durable by now. A message whose delete fails is
    // redelivered and then acknowledged as a duplicate.
    async fn acknowledge(&self, persisted: &Persisted) {
        if let Err(e) = self
            .queue
            .delete(&persisted.message_id, &persisted.receipt_handle)
            .await
        {
            tracing::warn!(
                message_id = %persisted.message_id,
                error = %e,
                "Failed to delete saved message"
            );
        }
    }

    async fn acknowledge_duplicate(&self, message: &QueueMessage) {
        tracing::warn!(message_id = message.display_id(), "Duplicate audit event, deleting message");

        let (Some(id), Some(receipt_handle)) = (&message.id, &message.receipt_handle) else {
            return;
        };
        if let Err(e) = self.queue.delete(id, receipt_handle).await {
            tracing::warn!(message_id = %id, error = %e, "Failed to delete duplicate message");
        }
    }
}

/// Receives batches from the queue and feeds them to the pipeline.
pub struct Consumer {
    pipeline: Arc<IngestionPipeline>,
    queue: Arc<dyn MessageQueue>,
    config: QueueConfig,
}

impl Consumer {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        queue: Arc<dyn MessageQueue>,
        config: QueueConfig,
    ) -> Self {
        Self {
            pipeline,
            queue,
            config,
        }
    }

    fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            max_messages: self.config.batch_size(),
            visibility_timeout: self.config.visibility_timeout(),
            wait_time: self.config.wait_time(),
        }
    }

    /// Receive and process a single batch.
    pub async fn run_once(&self) -> Result<BatchOutcome, AuditError> {
        let messages = self.queue.receive(self.receive_options()).await?;
        Ok(self.handle(messages).await)
    }

    async fn handle(&self, messages: Vec<QueueMessage>) -> BatchOutcome {
        if messages.is_empty() {
            tracing::debug!("No queue messages received");
            return BatchOutcome::default();
        }

        tracing::info!(count = messages.len(), "Received queue messages");
        let outcome = self.pipeline.process_batch(messages).await;
        tracing::info!(
            saved = outcome.saved.len(),
            failed = outcome.failed.len(),
            "Processed queue messages"
        );
        outcome
    }

    /// Run until `shutdown` resolves.
    ///
    /// A batch already being processed is finished before returning.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.receive_interval();

        tracing::info!(
            batch_size = self.config.batch_size(),
            interval_ms = interval.as_millis() as u64,
            "Starting audit event consumer"
        );

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => break,
                result = self.queue.receive(self.receive_options()) => result,
            };

            let idle = match received {
                Ok(messages) => self.handle(messages).await.is_empty(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive queue messages");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        tracing::info!("Audit event consumer stopped");
    }
}
