use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    metrics::{self as sdkmetrics, PeriodicReader},
    trace::{self as sdktrace, BatchConfig, BatchSpanProcessor, RandomIdGenerator, Sampler},
    Resource,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::DEFAULT_FILTER;

/// Kept so shutdown can flush the last metric export.
static METER_PROVIDER: Mutex<Option<sdkmetrics::SdkMeterProvider>> = Mutex::new(None);

/// Initialize OpenTelemetry telemetry (traces, metrics)
#[allow(clippy::too_many_arguments)]
pub fn init_telemetry(
    enabled: bool,
    endpoint: Option<String>,
    service_name: String,
    service_version: String,
    protocol: String,
    environment: String,
    metrics_interval_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = match endpoint {
        Some(endpoint) if enabled => endpoint,
        _ => {
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;

            tracing::info!("OpenTelemetry disabled, using standard tracing");
            return Ok(());
        }
    };

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    // One instance per consumer process
    let instance_id =
        env::var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

    let resource = Resource::new(vec![
        KeyValue::new(SERVICE_NAME, service_name.clone()),
        KeyValue::new(SERVICE_VERSION, service_version),
        KeyValue::new("deployment.environment", environment.clone()),
        KeyValue::new("host.name", hostname.clone()),
        KeyValue::new("service.instance.id", instance_id.clone()),
    ]);

    let span_exporter = if protocol == "http" {
        opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| format!("Failed to build HTTP span exporter: {}", e))?
    } else {
        opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .build()
            .map_err(|e| format!("Failed to build gRPC span exporter: {}", e))?
    };

    let batch_processor =
        BatchSpanProcessor::builder(span_exporter, opentelemetry_sdk::runtime::Tokio)
            .with_batch_config(BatchConfig::default())
            .build();

    let tracer_provider = sdktrace::TracerProvider::builder()
        .with_span_processor(batch_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let tracer = tracer_provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(tracer_provider);

    let metric_exporter = if protocol == "http" {
        opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(&endpoint)
            .with_temporality(sdkmetrics::Temporality::Cumulative)
            .build()
            .map_err(|e| format!("Failed to build HTTP metric exporter: {}", e))?
    } else {
        opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&endpoint)
            .with_temporality(sdkmetrics::Temporality::Cumulative)
            .build()
            .map_err(|e| format!("Failed to build gRPC metric exporter: {}", e))?
    };

    let otlp_reader = PeriodicReader::builder(metric_exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(metrics_interval_secs))
        .build();

    let meter_provider = sdkmetrics::SdkMeterProvider::builder()
        .with_reader(otlp_reader)
        .with_resource(resource)
        .build();

    register_meter_provider(meter_provider);

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .try_init()?;

    tracing::info!(
        endpoint = %endpoint,
        protocol = %protocol,
        environment = %environment,
        metrics_interval_secs = metrics_interval_secs,
        hostname = %hostname,
        instance_id = %instance_id,
        "OpenTelemetry initialized successfully"
    );

    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::info!("Shutting down OpenTelemetry...");

    opentelemetry::global::shutdown_tracer_provider();
    shutdown_meter_provider();

    tracing::info!("OpenTelemetry shutdown complete");
}

fn register_meter_provider(provider: sdkmetrics::SdkMeterProvider) {
    opentelemetry::global::set_meter_provider(provider.clone());
    *METER_PROVIDER.lock().unwrap_or_else(|e| e.into_inner()) = Some(provider);
}

/// Shuts down the registered meter provider, if any. Returns whether one was
/// registered.
fn shutdown_meter_provider() -> bool {
    let provider = METER_PROVIDER
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    match provider {
        Some(provider) => {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down meter provider");
            }
            true
        }
        None => false,
    }
}
