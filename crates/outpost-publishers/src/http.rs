//! HTTP task-runner adapter.
//!
//! Invokes a remote task by POSTing `{ task_id, task, attempt, body }` as JSON.
//! The destination is either an absolute URL or a task name appended to the
//! configured base URL. Any non-2xx response counts as a failed publish.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use outpost_core::models::TaskRecord;
use outpost_core::PublisherKind;

use crate::traits::{Publisher, PublisherError, PublisherResult};

#[derive(Clone)]
pub struct HttpPublisher {
    client: Client,
    base_url: Option<String>,
}

impl HttpPublisher {
    pub fn new(base_url: Option<String>, timeout: Duration) -> PublisherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("outpost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublisherError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        if let Some(ref base) = base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(PublisherError::ConfigError(format!(
                    "OUTPOST_HTTP_BASE_URL must be an http(s) URL, got {}",
                    base
                )));
            }
        }

        Ok(Self { client, base_url })
    }

    /// Resolve a task destination to the URL to call.
    pub fn endpoint_for(&self, destination: &str) -> anyhow::Result<String> {
        if destination.starts_with("http://") || destination.starts_with("https://") {
            return Ok(destination.to_string());
        }

        let base = self.base_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Destination {} is not a URL and OUTPOST_HTTP_BASE_URL is not configured",
                destination
            )
        })?;

        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            destination.trim_start_matches('/')
        ))
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn kind(&self) -> PublisherKind {
        PublisherKind::Http
    }

    #[tracing::instrument(skip(self, task), fields(task.id = %task.id, task.name = %task.payload.destination))]
    async fn publish(&self, task: &TaskRecord) -> anyhow::Result<()> {
        let url = self.endpoint_for(&task.payload.destination)?;

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "task_id": task.id,
                "task": task.payload.destination,
                "attempt": task.number_of_attempts,
                "body": task.payload.body,
            }))
            .send()
            .await
            .with_context(|| format!("Task runner request to {} failed", url))?;

        let status = response.status();
        response
            .error_for_status()
            .with_context(|| format!("Task runner at {} rejected the task", url))?;

        tracing::debug!(task_id = %task.id, status = status.as_u16(), "Task handed to runner");
        Ok(())
    }
}
