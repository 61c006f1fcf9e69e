//! Message queue abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StoreError;

/// A message received from the audit event queue.
///
/// Every field is optional on the wire; the mapper rejects envelopes that
/// lack an ID or a body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: Option<String>,
    pub body: Option<String>,
    pub receipt_handle: Option<String>,
}

impl QueueMessage {
    pub fn new(
        id: impl Into<String>,
        body: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            body: Some(body.into()),
            receipt_handle: Some(receipt_handle.into()),
        }
    }

    /// ID for log lines.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<missing>")
    }
}

/// Options for a single receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to return.
    pub max_messages: usize,
    /// How long returned messages stay hidden from other receivers.
    pub visibility_timeout: Duration,
    /// Longest the call may wait for messages to arrive.
    pub wait_time: Duration,
}

/// Trait for the queue the audit events arrive on.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive up to `options.max_messages` messages.
    async fn receive(&self, options: ReceiveOptions) -> Result<Vec<QueueMessage>, StoreError>;

    /// Delete a message. The receipt handle must come from the latest receive.
    async fn delete(&self, id: &str, receipt_handle: &str) -> Result<(), StoreError>;

    /// Enqueue a message body, returning its ID.
    async fn send(&self, body: &str) -> Result<String, StoreError>;
}
