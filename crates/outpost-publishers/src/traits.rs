//! Publisher abstraction trait
//!
//! This module defines the Publisher trait that all delivery backends must implement.

use async_trait::async_trait;
use thiserror::Error;

use outpost_core::models::TaskRecord;
use outpost_core::PublisherKind;

/// Errors raised while building a publisher.
///
/// Delivery failures are not represented here: `publish` returns the backend
/// error as-is so the consumer can record it on the task.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for publisher construction
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Delivery backend abstraction.
///
/// Implementations perform exactly one externally visible side effect per
/// call and must not retry internally. Any hang must be bounded by the
/// adapter's own client timeout.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Backend family, used to tag metrics.
    fn kind(&self) -> PublisherKind;

    /// Deliver the task's payload to its destination.
    async fn publish(&self, task: &TaskRecord) -> anyhow::Result<()>;
}

/// Serialized message body sent to every backend.
pub(crate) fn message_body(task: &TaskRecord) -> anyhow::Result<String> {
    serde_json::to_string(&task.payload.body).map_err(|e| {
        anyhow::anyhow!("Failed to serialize body of task {}: {}", task.id, e)
    })
}

/// FIFO queues and topics are named with a `.fifo` suffix.
#[cfg(any(feature = "publisher-sns", feature = "publisher-sqs"))]
pub(crate) fn is_fifo(destination: &str) -> bool {
    destination.ends_with(".fifo")
}
