//! Task metrics and the queue-depth reporter.

use std::sync::Arc;
use std::time::Duration;

use outpost_core::models::{TaskRecord, TaskState};
use outpost_core::PublisherKind;
use outpost_db::TaskStore;
use outpost_infra::MetricsSink;

use crate::shutdown::ShutdownFlag;

pub const TASKS_PROCESSED: &str = "outpost.tasks.processed";
pub const TASKS_WAIT_TIME: &str = "outpost.tasks.wait_time";
pub const TASKS_EXECUTION_TIME: &str = "outpost.tasks.execution_time";
pub const TASKS_TURNAROUND_TIME: &str = "outpost.tasks.turnaround_time";
pub const TASKS_COUNT: &str = "outpost.tasks.count";

/// Emits the per-cycle metrics for one processed record.
#[derive(Clone)]
pub struct TaskMetrics {
    sink: Arc<dyn MetricsSink>,
}

impl TaskMetrics {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// `record` is the state saved at the end of the cycle. `wait` runs from
    /// the moment the record became visible to execution start; `execution`
    /// is the publish call alone.
    pub fn record_cycle(
        &self,
        record: &TaskRecord,
        succeeded: bool,
        queue_type: PublisherKind,
        wait: Duration,
        execution: Duration,
    ) {
        let tags = [
            ("end_state", record.state.as_str()),
            ("result", if succeeded { "success" } else { "error" }),
            ("queue_type", queue_type.as_str()),
        ];

        self.sink.increment(TASKS_PROCESSED, &tags);
        self.sink.timing(TASKS_WAIT_TIME, wait, &tags);
        self.sink.timing(TASKS_EXECUTION_TIME, execution, &tags);

        if succeeded {
            if let Some(turnaround) = record.turnaround().and_then(|d| d.to_std().ok()) {
                self.sink.timing(TASKS_TURNAROUND_TIME, turnaround, &tags);
            }
        }
    }
}

/// Periodically publishes the record count per state as a gauge.
pub struct DepthReporter {
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    shutdown: ShutdownFlag,
}

impl DepthReporter {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            store,
            sink,
            interval,
            shutdown,
        }
    }

    pub async fn report_once(&self) -> anyhow::Result<()> {
        let counts = self.store.count_by_state().await?;
        for state in TaskState::ALL {
            let count = counts
                .iter()
                .find(|(s, _)| *s == state)
                .map(|(_, n)| *n)
                .unwrap_or(0);
            self.sink
                .gauge(TASKS_COUNT, count, &[("state", state.as_str())]);
        }
        Ok(())
    }

    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Queue depth reporter started"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.report_once().await {
                        tracing::error!(error = %e, "Queue depth report failed");
                    }
                }
                _ = self.shutdown.raised() => break,
            }
        }

        tracing::info!("Queue depth reporter stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use outpost_core::models::TaskPayload;
    use outpost_db::MemoryTaskStore;
    use outpost_infra::{MetricKind, RecordingMetricsSink};
    use serde_json::json;

    #[test]
    fn successful_cycle_emits_turnaround() {
        let sink = Arc::new(RecordingMetricsSink::new());
        let metrics = TaskMetrics::new(sink.clone());
        let created = Utc::now();
        let mut record = TaskRecord::new(TaskPayload::new("jobs", json!({})), created);
        record.begin_attempt().unwrap();
        record
            .mark_succeeded(created + TimeDelta::seconds(3))
            .unwrap();

        metrics.record_cycle(
            &record,
            true,
            PublisherKind::Sqs,
            Duration::from_millis(10),
            Duration::from_millis(20),
        );

        let processed = sink.named(TASKS_PROCESSED);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].tag("end_state"), Some("succeeded"));
        assert_eq!(processed[0].tag("result"), Some("success"));
        assert_eq!(processed[0].tag("queue_type"), Some("sqs"));
        assert_eq!(sink.named(TASKS_TURNAROUND_TIME)[0].value, 3.0);
    }

    #[test]
    fn failed_cycle_skips_turnaround() {
        let sink = Arc::new(RecordingMetricsSink::new());
        let metrics = TaskMetrics::new(sink.clone());
        let record = TaskRecord::new(TaskPayload::new("jobs", json!({})), Utc::now());

        metrics.record_cycle(
            &record,
            false,
            PublisherKind::Log,
            Duration::ZERO,
            Duration::ZERO,
        );

        assert_eq!(sink.named(TASKS_PROCESSED)[0].tag("result"), Some("error"));
        assert_eq!(sink.named(TASKS_EXECUTION_TIME).len(), 1);
        assert!(sink.named(TASKS_TURNAROUND_TIME).is_empty());
    }

    #[tokio::test]
    async fn depth_report_covers_every_state() {
        let store = Arc::new(MemoryTaskStore::new());
        let now = Utc::now();
        store.enqueue(TaskPayload::new("a", json!({})), now);
        store.enqueue(TaskPayload::new("b", json!({})), now);
        let sink = Arc::new(RecordingMetricsSink::new());
        let reporter = DepthReporter::new(
            store,
            sink.clone(),
            Duration::from_secs(30),
            ShutdownFlag::new(),
        );

        reporter.report_once().await.unwrap();

        let gauges = sink.named(TASKS_COUNT);
        assert_eq!(gauges.len(), TaskState::ALL.len());
        assert!(gauges.iter().all(|g| g.kind == MetricKind::Gauge));
        let enqueued = gauges
            .iter()
            .find(|g| g.tag("state") == Some("enqueued"))
            .unwrap();
        assert_eq!(enqueued.value, 2.0);
    }

    #[tokio::test]
    async fn depth_reporter_stops_on_shutdown() {
        let shutdown = ShutdownFlag::new();
        let reporter = DepthReporter::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(RecordingMetricsSink::new()),
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        let handle = tokio::spawn(reporter.run());
        shutdown.raise();
        handle.await.unwrap();
    }
}
