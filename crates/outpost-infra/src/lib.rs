//! Outpost Infra – ambient services for the consumer.
//!
//! - [`telemetry`]: tracing subscriber setup, with an OTLP pipeline behind the
//!   `observability-opentelemetry` feature
//! - [`metrics`]: the tag-based [`MetricsSink`] interface and its sinks
//! - [`reporting`]: the error-reporting channel for terminal and loop failures

pub mod metrics;
pub mod reporting;
pub mod telemetry;

#[cfg(feature = "observability-opentelemetry")]
pub use metrics::OtelMetricsSink;
pub use metrics::{
    MetricEvent, MetricKind, MetricsSink, NoopMetricsSink, RecordingMetricsSink,
    TracingMetricsSink,
};
pub use reporting::{ErrorReporter, RecordingErrorReporter, TracingErrorReporter};
pub use telemetry::{init_telemetry, shutdown_telemetry};
