//! Configuration module
//!
//! Settings are read from the environment (with `.env` support via dotenvy),
//! falling back to defaults. `Config::validate` rejects combinations the
//! consumer cannot run with.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::OutpostError;

// Common constants
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const HTTP_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: i32 = 3;
const POLL_INTERVAL_MS: u64 = 500;
const MAX_BACKOFF_SECS: u64 = 300;
const CONSUMERS: usize = 1;
const DEPTH_INTERVAL_SECS: u64 = 30;
const OTEL_METRICS_INTERVAL_SECS: u64 = 30;

/// Delivery backend a consumer publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublisherKind {
    Sns,
    Sqs,
    Http,
    Log,
}

impl PublisherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherKind::Sns => "sns",
            PublisherKind::Sqs => "sqs",
            PublisherKind::Http => "http",
            PublisherKind::Log => "log",
        }
    }
}

impl Display for PublisherKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PublisherKind {
    type Err = OutpostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sns" => Ok(PublisherKind::Sns),
            "sqs" => Ok(PublisherKind::Sqs),
            "http" => Ok(PublisherKind::Http),
            "log" => Ok(PublisherKind::Log),
            _ => Err(OutpostError::Config(format!(
                "Invalid publisher: {} (expected sns, sqs, http or log)",
                s
            ))),
        }
    }
}

/// Settings for the publisher adapter selected at startup.
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub kind: PublisherKind,
    pub http_base_url: Option<String>,
    pub http_timeout_secs: u64,
    pub aws_region: Option<String>,
    /// Custom endpoint for AWS-compatible services (LocalStack, ElasticMQ).
    pub aws_endpoint_url: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            kind: PublisherKind::Log,
            http_base_url: None,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            aws_region: None,
            aws_endpoint_url: None,
        }
    }
}

/// Retry policy and loop pacing for consumers.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_attempts: i32,
    pub poll_interval_ms: u64,
    /// Upper bound for the `2^attempts` backoff.
    pub max_backoff_secs: u64,
    /// Number of consumer loops run by one process.
    pub consumers: usize,
    /// Interval between queue-depth gauges. 0 = disabled.
    pub depth_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            poll_interval_ms: POLL_INTERVAL_MS,
            max_backoff_secs: MAX_BACKOFF_SECS,
            consumers: CONSUMERS,
            depth_interval_secs: DEPTH_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    pub publisher: PublisherConfig,
    pub worker: WorkerConfig,
    // OpenTelemetry configuration
    pub otel_enabled: bool,
    pub otel_endpoint: Option<String>,
    pub otel_service_name: String,
    pub otel_service_version: String,
    pub otel_protocol: String,
    pub otel_metrics_interval_secs: u64,
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, OutpostError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OutpostError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let publisher_kind = match lookup("OUTPOST_PUBLISHER") {
            Some(value) => value.parse()?,
            None => PublisherKind::Log,
        };

        let publisher = PublisherConfig {
            kind: publisher_kind,
            http_base_url: lookup("OUTPOST_HTTP_BASE_URL"),
            http_timeout_secs: parse_or(lookup("OUTPOST_HTTP_TIMEOUT_SECS"), HTTP_TIMEOUT_SECS),
            aws_region: lookup("AWS_REGION"),
            aws_endpoint_url: lookup("AWS_ENDPOINT_URL"),
        };

        let worker = WorkerConfig {
            max_attempts: parse_or(lookup("OUTPOST_MAX_ATTEMPTS"), MAX_ATTEMPTS),
            poll_interval_ms: parse_or(lookup("OUTPOST_POLL_INTERVAL_MS"), POLL_INTERVAL_MS),
            max_backoff_secs: parse_or(lookup("OUTPOST_MAX_BACKOFF_SECS"), MAX_BACKOFF_SECS),
            consumers: parse_or(lookup("OUTPOST_CONSUMERS"), CONSUMERS),
            depth_interval_secs: parse_or(
                lookup("OUTPOST_DEPTH_INTERVAL_SECS"),
                DEPTH_INTERVAL_SECS,
            ),
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| config_error("DATABASE_URL must be set"))?,
            db_max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), DB_MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(lookup("DB_TIMEOUT_SECONDS"), DB_TIMEOUT_SECS),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            publisher,
            worker,
            otel_enabled: parse_or(lookup("OTEL_ENABLED"), false),
            otel_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otel_service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| "outpost".to_string()),
            otel_service_version: lookup("OTEL_SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            otel_protocol: lookup("OTEL_EXPORTER_OTLP_PROTOCOL")
                .unwrap_or_else(|| "grpc".to_string()),
            otel_metrics_interval_secs: parse_or(
                lookup("OTEL_METRICS_INTERVAL_SECS"),
                OTEL_METRICS_INTERVAL_SECS,
            ),
        })
    }

    /// Pooled connections the running service holds at most: one per
    /// consumer for the whole claim, plus one for the depth reporter.
    pub fn required_connections(&self) -> usize {
        self.worker.consumers + usize::from(self.worker.depth_interval_secs > 0)
    }

    pub fn validate(&self) -> Result<(), OutpostError> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(config_error(
                "DATABASE_URL must be a valid PostgreSQL connection string",
            ));
        }

        if self.worker.max_attempts < 1 {
            return Err(config_error("OUTPOST_MAX_ATTEMPTS must be at least 1"));
        }

        if self.worker.consumers == 0 {
            return Err(config_error("OUTPOST_CONSUMERS must be at least 1"));
        }

        if self.required_connections() > self.db_max_connections as usize {
            return Err(OutpostError::Config(format!(
                "DB_MAX_CONNECTIONS ({}) is too small for {} consumers; at least {} are needed",
                self.db_max_connections,
                self.worker.consumers,
                self.required_connections()
            )));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(config_error("OUTPOST_POLL_INTERVAL_MS must be positive"));
        }

        if self.publisher.kind == PublisherKind::Http && self.publisher.http_timeout_secs == 0 {
            return Err(config_error(
                "OUTPOST_HTTP_TIMEOUT_SECS must be positive for the http publisher",
            ));
        }

        Ok(())
    }
}

fn config_error(message: &str) -> OutpostError {
    OutpostError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, OutpostError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/outpost")]).unwrap();

        assert_eq!(config.publisher.kind, PublisherKind::Log);
        assert_eq!(config.worker.max_attempts, 3);
        assert_eq!(config.worker.poll_interval_ms, 500);
        assert_eq!(config.worker.max_backoff_secs, 300);
        assert_eq!(config.worker.consumers, 1);
        assert!(!config.otel_enabled);
        config.validate().unwrap();
    }

    #[test]
    fn database_url_is_required() {
        assert!(config_from(&[]).is_err());
    }

    #[test]
    fn publisher_kind_parses_case_insensitively() {
        let config = config_from(&[
            ("DATABASE_URL", "postgresql://db/outpost"),
            ("OUTPOST_PUBLISHER", "SQS"),
            ("OUTPOST_MAX_ATTEMPTS", "5"),
        ])
        .unwrap();
        assert_eq!(config.publisher.kind, PublisherKind::Sqs);
        assert_eq!(config.worker.max_attempts, 5);
    }

    #[test]
    fn unknown_publisher_is_rejected() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://db/outpost"),
            ("OUTPOST_PUBLISHER", "celeryish"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Invalid publisher"));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/outpost"),
            ("OUTPOST_POLL_INTERVAL_MS", "soon"),
        ])
        .unwrap();
        assert_eq!(config.worker.poll_interval_ms, 500);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = config_from(&[("DATABASE_URL", "mysql://db/outpost")]).unwrap();
        assert!(config.validate().is_err());

        config.database_url = "postgres://db/outpost".to_string();
        config.worker.max_attempts = 0;
        assert!(config.validate().is_err());

        config.worker.max_attempts = 3;
        config.worker.consumers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn consumers_must_fit_in_the_pool() {
        let mut config = config_from(&[
            ("DATABASE_URL", "postgres://db/outpost"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("OUTPOST_CONSUMERS", "4"),
        ])
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, OutpostError::Config(_)));
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS (4)"));

        config.worker.consumers = 3;
        config.validate().unwrap();

        // Without the depth reporter every connection can go to a consumer.
        config.worker.consumers = 4;
        config.worker.depth_interval_secs = 0;
        config.validate().unwrap();
    }
}
