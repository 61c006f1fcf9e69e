//! Queue consumer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest batch a single receive may return.
pub const MAX_BATCH_SIZE: usize = 10;

/// Configuration for the audit event consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delay between polls when the queue is empty, in milliseconds.
    #[serde(default = "default_receive_interval_ms")]
    pub receive_interval_ms: u64,

    /// Maximum messages per batch (capped at 10).
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// How long a received message stays hidden from other consumers.
    /// Defaults to twice the receive interval.
    #[serde(default)]
    pub visibility_timeout_secs: Option<u64>,

    /// Longest a single receive waits for messages to arrive, in seconds.
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            receive_interval_ms: default_receive_interval_ms(),
            max_messages: default_max_messages(),
            visibility_timeout_secs: None,
            wait_time_secs: default_wait_time_secs(),
        }
    }
}

impl QueueConfig {
    pub fn receive_interval(&self) -> Duration {
        Duration::from_millis(self.receive_interval_ms)
    }

    /// Batch size, never more than [`MAX_BATCH_SIZE`].
    pub fn batch_size(&self) -> usize {
        self.max_messages.clamp(1, MAX_BATCH_SIZE)
    }

    pub fn visibility_timeout(&self) -> Duration {
        match self.visibility_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.receive_interval() * 2,
        }
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }
}

fn default_receive_interval_ms() -> u64 {
    30_000
}

fn default_max_messages() -> usize {
    MAX_BATCH_SIZE
}

fn default_wait_time_secs() -> u64 {
    20
}
