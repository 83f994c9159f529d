//! Outpost – reliable task-dispatch consumer.
//!
//! `outpost run` (the default) starts the consumer service. The remaining
//! subcommands are operator helpers against the same database.

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use outpost_core::models::{TaskPayload, TaskRecord};
use outpost_core::{Config, PublisherKind, SystemClock};
use outpost_db::{PgTaskStore, TaskStore};
use outpost_infra::{init_telemetry, shutdown_telemetry, MetricsSink, TracingErrorReporter};
use outpost_publishers::create_publisher;
use outpost_worker::{install_signal_handlers, ShutdownFlag, Supervisor};

#[derive(Parser)]
#[command(name = "outpost", about = "Reliable task-dispatch consumer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consumer service until SIGINT/SIGTERM/SIGQUIT
    Run {
        /// Number of consumer loops (overrides OUTPOST_CONSUMERS)
        #[arg(long)]
        consumers: Option<usize>,
        /// Publisher backend: sns, sqs, http or log (overrides OUTPOST_PUBLISHER)
        #[arg(long)]
        publisher: Option<String>,
    },
    /// Insert a new enqueued task
    Enqueue {
        /// Topic ARN, queue URL or task-runner path
        #[arg(long)]
        destination: String,
        /// JSON message body
        #[arg(long, default_value = "{}")]
        body: String,
        /// Hide the task for this many seconds
        #[arg(long, default_value = "0")]
        delay_secs: i64,
    },
    /// Print task counts by state
    Stats,
    /// Print a single task as JSON
    Show {
        /// Task UUID
        id: Uuid,
    },
    /// Withdraw an enqueued task
    Delete {
        /// Task UUID
        id: Uuid,
    },
}

#[cfg(feature = "observability-opentelemetry")]
fn metrics_sink(config: &Config) -> Arc<dyn MetricsSink> {
    if config.otel_enabled && config.otel_endpoint.is_some() {
        Arc::new(outpost_infra::OtelMetricsSink::global("outpost"))
    } else {
        Arc::new(outpost_infra::TracingMetricsSink)
    }
}

#[cfg(not(feature = "observability-opentelemetry"))]
fn metrics_sink(_config: &Config) -> Arc<dyn MetricsSink> {
    Arc::new(outpost_infra::TracingMetricsSink)
}

async fn run_service(config: Config, store: PgTaskStore) -> Result<()> {
    let publisher = create_publisher(&config.publisher)
        .await
        .context("Failed to create publisher")?;

    let shutdown = ShutdownFlag::new();
    install_signal_handlers(shutdown.clone());

    Supervisor::new(
        Arc::new(store),
        publisher,
        Arc::new(SystemClock),
        metrics_sink(&config),
        Arc::new(TracingErrorReporter),
        config.worker.clone(),
        shutdown,
    )
    .run()
    .await;

    Ok(())
}

async fn execute(command: Commands, config: Config) -> Result<()> {
    let store = PgTaskStore::connect(
        &config.database_url,
        config.db_max_connections,
        Duration::from_secs(config.db_timeout_seconds),
    )
    .await?;

    match command {
        Commands::Run { .. } => run_service(config, store).await?,
        Commands::Enqueue {
            destination,
            body,
            delay_secs,
        } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body must be valid JSON")?;
            let delay = TimeDelta::try_seconds(delay_secs.max(0))
                .context("--delay-secs is out of range")?;
            let now = Utc::now();
            let mut record = TaskRecord::new(TaskPayload::new(destination, body), now);
            record.visible_after = now + delay;
            let record = store.insert(&record).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Stats => {
            for (state, count) in store.count_by_state().await? {
                println!("{:<10} {}", state.as_str(), count);
            }
        }
        Commands::Show { id } => match store.get(id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("Task {} not found", id),
        },
        Commands::Delete { id } => {
            if store.delete(id, Utc::now()).await? {
                println!("Deleted task {}", id);
            } else {
                anyhow::bail!("Task {} is not enqueued or is currently claimed", id);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        consumers: None,
        publisher: None,
    });

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Commands::Run {
        consumers,
        publisher,
    } = &command
    {
        if let Some(consumers) = consumers {
            config.worker.consumers = *consumers;
        }
        if let Some(publisher) = publisher {
            config.publisher.kind = publisher.parse::<PublisherKind>()?;
        }
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    init_telemetry(
        config.otel_enabled,
        config.otel_endpoint.clone(),
        config.otel_service_name.clone(),
        config.otel_service_version.clone(),
        config.otel_protocol.clone(),
        config.environment.clone(),
        config.otel_metrics_interval_secs,
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment,
        publisher = %config.publisher.kind,
        "Configuration loaded and validated successfully"
    );

    let result = execute(command, config).await;
    shutdown_telemetry().await;
    result
}
