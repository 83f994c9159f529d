//! Consumer loop: claim one record, publish it, record the outcome.
//!
//! Each cycle runs entirely inside one exclusive claim. The attempt counter,
//! the outcome transition and the new visibility time are saved and committed
//! together, so a record is delivered by at most one loop at a time and a
//! crash mid-cycle leaves the record exactly as it was before the claim.
//!
//! Publisher errors never escape a cycle; they turn into a retry or a terminal
//! failure. Store errors escape to [`Consumer::run`], which reports them and
//! keeps going.

use anyhow::{anyhow, Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use outpost_core::Clock;
use outpost_db::{ClaimOutcome, TaskStore};
use outpost_infra::{ErrorReporter, MetricsSink, NoopMetricsSink, TracingErrorReporter};
use outpost_publishers::Publisher;

use crate::metrics::TaskMetrics;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownFlag;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was eligible.
    Idle,
    Succeeded,
    /// Publish failed; the record stays enqueued behind a backoff.
    Retrying,
    /// Publish failed on the last allowed attempt.
    Failed,
}

pub struct Consumer {
    id: usize,
    store: Arc<dyn TaskStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    metrics: TaskMetrics,
    reporter: Arc<dyn ErrorReporter>,
    policy: RetryPolicy,
    poll_interval: Duration,
    shutdown: ShutdownFlag,
}

impl Consumer {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            id: 0,
            store,
            publisher,
            clock,
            metrics: TaskMetrics::new(Arc::new(NoopMetricsSink)),
            reporter: Arc::new(TracingErrorReporter),
            policy: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = TaskMetrics::new(sink);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs one claim/publish/record cycle.
    #[tracing::instrument(skip(self), fields(consumer = self.id))]
    pub async fn process_one(&self) -> Result<CycleOutcome> {
        let claim_time = self.clock.now();
        let mut claim = match self
            .store
            .claim_one(claim_time)
            .await
            .context("Failed to claim task")?
        {
            ClaimOutcome::Found(claim) => claim,
            ClaimOutcome::NotFound => {
                tracing::trace!("No tasks available");
                return Ok(CycleOutcome::Idle);
            }
        };

        let mut record = claim.record().clone();
        let attempt = record.begin_attempt()?;

        let started_at = self.clock.now();
        let wait = (started_at - record.visible_after)
            .to_std()
            .unwrap_or_default();

        let timer = Instant::now();
        let result = match AssertUnwindSafe(self.publisher.publish(&record))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("Publisher panicked: {}", panic_message(&*panic))),
        };
        let execution = timer.elapsed();

        let now = self.clock.now();
        let mut terminal_error = None;
        let outcome = match result {
            Ok(()) => {
                record.mark_succeeded(now)?;
                tracing::info!(
                    task_id = %record.id,
                    destination = %record.payload.destination,
                    attempt,
                    "Task published"
                );
                CycleOutcome::Succeeded
            }
            Err(e) if self.policy.should_retry(attempt) => {
                let visible_after = record.schedule_retry(now, self.policy.backoff(attempt))?;
                tracing::warn!(
                    task_id = %record.id,
                    error = %e,
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    visible_after = %visible_after,
                    "Publish failed, scheduling retry"
                );
                CycleOutcome::Retrying
            }
            Err(e) => {
                let (message, stacktrace) =
                    failure_details(&e, attempt, self.publisher.kind().as_str());
                record.mark_failed(now, message, stacktrace)?;
                tracing::error!(
                    task_id = %record.id,
                    error = %e,
                    attempt,
                    "Publish failed after max attempts"
                );
                terminal_error = Some(e);
                CycleOutcome::Failed
            }
        };

        claim
            .save(&record)
            .await
            .context("Failed to save task outcome")?;
        claim
            .commit()
            .await
            .context("Failed to commit task outcome")?;

        if let Some(e) = terminal_error {
            let e = e.context(format!("Task {} failed permanently", record.id));
            self.reporter.report(&e, "publish");
        }

        self.metrics.record_cycle(
            &record,
            outcome == CycleOutcome::Succeeded,
            self.publisher.kind(),
            wait,
            execution,
        );

        Ok(outcome)
    }

    /// Processes records until the shutdown flag is raised.
    pub async fn run(self) {
        tracing::info!(
            consumer = self.id,
            queue_type = %self.publisher.kind(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_attempts = self.policy.max_attempts,
            "Consumer started"
        );

        while !self.shutdown.is_raised() {
            let cycle = AssertUnwindSafe(self.process_one())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(anyhow!("Consumer cycle panicked: {}", panic_message(&*panic)))
                });
            match cycle {
                Ok(CycleOutcome::Idle) => {
                    self.shutdown.sleep(self.poll_interval).await;
                }
                Ok(_) => {}
                Err(e) => {
                    self.reporter.report(&e, "consumer loop");
                    self.shutdown.sleep(self.poll_interval).await;
                }
            }
        }

        tracing::info!(consumer = self.id, "Consumer stopped");
    }
}

/// Text stored on a failed record. Adapters can fail with an empty message,
/// so both fields fall back to a description of the failure.
fn failure_details(err: &anyhow::Error, attempt: i32, queue_type: &str) -> (String, String) {
    let fallback = format!(
        "publish failed after {} attempts ({})",
        attempt, queue_type
    );
    let non_empty = |text: String| {
        if text.trim().is_empty() {
            fallback.clone()
        } else {
            text
        }
    };
    (
        non_empty(format!("{:#}", err)),
        non_empty(format!("{:?}", err)),
    )
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::models::TaskPayload;
    use outpost_core::ManualClock;
    use outpost_db::MemoryTaskStore;
    use outpost_publishers::LogPublisher;
    use serde_json::json;

    #[test]
    fn failure_details_keep_the_error_chain() {
        let err = anyhow!("connection refused").context("SendMessage failed");
        let (message, stacktrace) = failure_details(&err, 3, "sqs");
        assert_eq!(message, "SendMessage failed: connection refused");
        assert!(stacktrace.contains("connection refused"));
    }

    #[test]
    fn failure_details_never_empty() {
        let (message, stacktrace) = failure_details(&anyhow!(""), 3, "sns");
        assert_eq!(message, "publish failed after 3 attempts (sns)");
        assert!(!stacktrace.trim().is_empty());
    }

    #[test]
    fn panic_payloads_are_readable() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
        assert_eq!(panic_message(&*owned), "index out of bounds");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[tokio::test]
    async fn empty_store_is_idle() {
        let consumer = Consumer::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(LogPublisher::new()),
            Arc::new(ManualClock::default()),
            ShutdownFlag::new(),
        );
        assert_eq!(consumer.process_one().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_is_raised() {
        let store = MemoryTaskStore::new();
        let clock = Arc::new(ManualClock::default());
        let record = store.enqueue(TaskPayload::new("jobs", json!({})), clock.now());
        let shutdown = ShutdownFlag::new();
        let consumer = Consumer::new(
            Arc::new(store.clone()),
            Arc::new(LogPublisher::new()),
            clock,
            shutdown.clone(),
        )
        .with_poll_interval(Duration::from_millis(5));

        let handle = tokio::spawn(consumer.run());
        while store.get(record.id).map(|r| r.is_terminal()) != Some(true) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        shutdown.raise();
        handle.await.unwrap();
    }
}
