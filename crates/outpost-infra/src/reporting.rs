//! Error-reporting channel.
//!
//! Terminal publish failures and loop-level failures are reported here, on
//! top of ordinary logging. The default reporter logs at error level with the
//! full error chain; an exception tracker can be plugged in behind the trait.

use std::sync::Mutex;

pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &anyhow::Error, context: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &anyhow::Error, context: &str) {
        tracing::error!(
            error = %error,
            details = ?error,
            context = context,
            "Error reported"
        );
    }
}

/// Keeps `(context, message)` pairs for assertions.
#[derive(Debug, Default)]
pub struct RecordingErrorReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ErrorReporter for RecordingErrorReporter {
    fn report(&self, error: &anyhow::Error, context: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((context.to_string(), format!("{:#}", error)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn recording_reporter_keeps_full_chain() {
        let reporter = RecordingErrorReporter::new();
        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("publish failed")
            .unwrap_err();

        reporter.report(&err, "terminal_failure");

        assert_eq!(
            reporter.reports(),
            vec![(
                "terminal_failure".to_string(),
                "publish failed: connection refused".to_string()
            )]
        );
        TracingErrorReporter.report(&err, "terminal_failure");
    }
}
