use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client;

use outpost_core::models::TaskRecord;
use outpost_core::PublisherKind;

use crate::traits::{is_fifo, message_body, Publisher};

/// Sends each task as one SQS message to the queue URL in its destination.
#[derive(Clone)]
pub struct SqsPublisher {
    client: Client,
}

impl SqsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_env(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let config = crate::aws::load_sdk_config(region, endpoint_url).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl Publisher for SqsPublisher {
    fn kind(&self) -> PublisherKind {
        PublisherKind::Sqs
    }

    #[tracing::instrument(skip(self, task), fields(task.id = %task.id, queue_url = %task.payload.destination))]
    async fn publish(&self, task: &TaskRecord) -> anyhow::Result<()> {
        let queue_url = &task.payload.destination;
        let task_id = task.id.to_string();

        let attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(&task_id)
            .build()
            .context("Failed to build SQS message attribute")?;

        let mut request = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(message_body(task)?)
            .message_attributes("outpost_task_id", attribute);

        if is_fifo(queue_url) {
            request = request
                .message_group_id(queue_url)
                .message_deduplication_id(&task_id);
        }

        let output = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("SQS SendMessage failed: {}", DisplayErrorContext(e)))?;

        tracing::debug!(
            task_id = %task.id,
            message_id = output.message_id().unwrap_or_default(),
            "Task sent to SQS"
        );
        Ok(())
    }
}
