//! Process supervisor: runs the consumer loops and the depth reporter until
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use outpost_core::{Clock, WorkerConfig};
use outpost_db::TaskStore;
use outpost_infra::{ErrorReporter, MetricsSink};
use outpost_publishers::Publisher;

use crate::consumer::Consumer;
use crate::metrics::DepthReporter;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownFlag;

pub struct Supervisor {
    store: Arc<dyn TaskStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<dyn ErrorReporter>,
    config: WorkerConfig,
    shutdown: ShutdownFlag,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn MetricsSink>,
        reporter: Arc<dyn ErrorReporter>,
        config: WorkerConfig,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            metrics,
            reporter,
            config,
            shutdown,
        }
    }

    fn consumer(&self, id: usize) -> Consumer {
        Consumer::new(
            self.store.clone(),
            self.publisher.clone(),
            self.clock.clone(),
            self.shutdown.clone(),
        )
        .with_id(id)
        .with_metrics(self.metrics.clone())
        .with_reporter(self.reporter.clone())
        .with_policy(RetryPolicy::from_config(&self.config))
        .with_poll_interval(Duration::from_millis(self.config.poll_interval_ms))
    }

    /// Returns after shutdown once every loop has finished its current cycle.
    pub async fn run(self) {
        let consumers = self.config.consumers.max(1);
        tracing::info!(
            consumers,
            queue_type = %self.publisher.kind(),
            depth_interval_secs = self.config.depth_interval_secs,
            "Supervisor starting"
        );

        let mut tasks = JoinSet::new();
        for id in 0..consumers {
            tasks.spawn(self.consumer(id).run());
        }

        if self.config.depth_interval_secs > 0 {
            let reporter = DepthReporter::new(
                self.store.clone(),
                self.metrics.clone(),
                Duration::from_secs(self.config.depth_interval_secs),
                self.shutdown.clone(),
            );
            tasks.spawn(reporter.run());
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Supervised task terminated abnormally");
            }
        }

        tracing::info!("Supervisor stopped");
    }
}
