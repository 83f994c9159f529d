//! Telemetry initialization
//!
//! Standard tracing by default; traces and metrics exported over OTLP when the
//! `observability-opentelemetry` feature is enabled.

#[cfg(feature = "observability-opentelemetry")]
mod init_opentelemetry;

#[cfg(not(feature = "observability-opentelemetry"))]
mod init_basic;

#[cfg(feature = "observability-opentelemetry")]
pub use init_opentelemetry::{init_telemetry, shutdown_telemetry};

#[cfg(not(feature = "observability-opentelemetry"))]
pub use init_basic::{init_telemetry, shutdown_telemetry};

pub(crate) const DEFAULT_FILTER: &str = "outpost=debug,outpost_worker=debug,outpost_publishers=info,outpost_db=info";
