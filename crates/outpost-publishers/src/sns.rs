use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client;

use outpost_core::models::TaskRecord;
use outpost_core::PublisherKind;

use crate::traits::{is_fifo, message_body, Publisher};

/// Publishes each task to the SNS topic ARN in its destination.
#[derive(Clone)]
pub struct SnsPublisher {
    client: Client,
}

impl SnsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_env(region: Option<String>, endpoint_url: Option<String>) -> Self {
        let config = crate::aws::load_sdk_config(region, endpoint_url).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl Publisher for SnsPublisher {
    fn kind(&self) -> PublisherKind {
        PublisherKind::Sns
    }

    #[tracing::instrument(skip(self, task), fields(task.id = %task.id, topic_arn = %task.payload.destination))]
    async fn publish(&self, task: &TaskRecord) -> anyhow::Result<()> {
        let topic_arn = &task.payload.destination;
        let task_id = task.id.to_string();

        let attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(&task_id)
            .build()
            .context("Failed to build SNS message attribute")?;

        let mut request = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .message(message_body(task)?)
            .message_attributes("outpost_task_id", attribute);

        if is_fifo(topic_arn) {
            request = request
                .message_group_id(topic_arn)
                .message_deduplication_id(&task_id);
        }

        let output = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("SNS Publish failed: {}", DisplayErrorContext(e)))?;

        tracing::debug!(
            task_id = %task.id,
            message_id = output.message_id().unwrap_or_default(),
            "Task published to SNS"
        );
        Ok(())
    }
}
