use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use super::DEFAULT_FILTER;

/// Initialize basic tracing (without OpenTelemetry)
#[allow(clippy::too_many_arguments)]
pub fn init_telemetry(
    enabled: bool,
    _endpoint: Option<String>,
    _service_name: String,
    _service_version: String,
    _protocol: String,
    _environment: String,
    _metrics_interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let console_fmt = tracing_subscriber::fmt::layer()
        .event_format(Format::default().compact().with_target(false));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(console_fmt)
        .try_init()?;

    if enabled {
        tracing::warn!("OpenTelemetry requested but feature not enabled, using standard tracing");
    }
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown (OpenTelemetry feature not enabled)");
}
