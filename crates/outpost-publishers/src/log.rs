use async_trait::async_trait;

use outpost_core::models::TaskRecord;
use outpost_core::PublisherKind;

use crate::traits::{message_body, Publisher};

/// Dry-run adapter: logs each delivery instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    fn kind(&self) -> PublisherKind {
        PublisherKind::Log
    }

    async fn publish(&self, task: &TaskRecord) -> anyhow::Result<()> {
        let body = message_body(task)?;
        tracing::info!(
            task_id = %task.id,
            destination = %task.payload.destination,
            attempt = task.number_of_attempts,
            body = %body,
            "Task published (log publisher)"
        );
        Ok(())
    }
}
