#[cfg(feature = "publisher-http")]
use crate::HttpPublisher;
#[cfg(feature = "publisher-sns")]
use crate::SnsPublisher;
#[cfg(feature = "publisher-sqs")]
use crate::SqsPublisher;
use crate::{LogPublisher, Publisher, PublisherResult};
use outpost_core::{PublisherConfig, PublisherKind};
use std::sync::Arc;

/// Create the publisher adapter selected by configuration.
pub async fn create_publisher(config: &PublisherConfig) -> PublisherResult<Arc<dyn Publisher>> {
    tracing::info!(publisher = %config.kind, "Creating publisher");

    match config.kind {
        #[cfg(feature = "publisher-sns")]
        PublisherKind::Sns => {
            let publisher =
                SnsPublisher::from_env(config.aws_region.clone(), config.aws_endpoint_url.clone())
                    .await;
            Ok(Arc::new(publisher))
        }

        #[cfg(not(feature = "publisher-sns"))]
        PublisherKind::Sns => Err(crate::PublisherError::ConfigError(
            "SNS publisher not available (publisher-sns feature not enabled)".to_string(),
        )),

        #[cfg(feature = "publisher-sqs")]
        PublisherKind::Sqs => {
            let publisher =
                SqsPublisher::from_env(config.aws_region.clone(), config.aws_endpoint_url.clone())
                    .await;
            Ok(Arc::new(publisher))
        }

        #[cfg(not(feature = "publisher-sqs"))]
        PublisherKind::Sqs => Err(crate::PublisherError::ConfigError(
            "SQS publisher not available (publisher-sqs feature not enabled)".to_string(),
        )),

        #[cfg(feature = "publisher-http")]
        PublisherKind::Http => {
            let publisher = HttpPublisher::new(
                config.http_base_url.clone(),
                std::time::Duration::from_secs(config.http_timeout_secs),
            )?;
            Ok(Arc::new(publisher))
        }

        #[cfg(not(feature = "publisher-http"))]
        PublisherKind::Http => Err(crate::PublisherError::ConfigError(
            "HTTP publisher not available (publisher-http feature not enabled)".to_string(),
        )),

        PublisherKind::Log => Ok(Arc::new(LogPublisher::new())),
    }
}
