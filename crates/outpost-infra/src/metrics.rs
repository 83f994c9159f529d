//! Metrics sinks
//!
//! [`MetricsSink`] is a small counter/timer/gauge interface with string tags.
//! Emission is fire-and-forget: sinks never return errors and must not block
//! task processing.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[cfg(feature = "observability-opentelemetry")]
use opentelemetry::{
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};
#[cfg(feature = "observability-opentelemetry")]
use std::collections::HashMap;

pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, tags: &[(&str, &str)]);
    fn timing(&self, name: &str, value: Duration, tags: &[(&str, &str)]);
    fn gauge(&self, name: &str, value: i64, tags: &[(&str, &str)]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment(&self, _name: &str, _tags: &[(&str, &str)]) {}
    fn timing(&self, _name: &str, _value: Duration, _tags: &[(&str, &str)]) {}
    fn gauge(&self, _name: &str, _value: i64, _tags: &[(&str, &str)]) {}
}

/// Emits each metric as a debug-level tracing event under the
/// `outpost::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        tracing::debug!(target: "outpost::metrics", metric = name, kind = "counter", value = 1, tags = ?tags);
    }

    fn timing(&self, name: &str, value: Duration, tags: &[(&str, &str)]) {
        tracing::debug!(
            target: "outpost::metrics",
            metric = name,
            kind = "timer",
            value_ms = value.as_secs_f64() * 1000.0,
            tags = ?tags
        );
    }

    fn gauge(&self, name: &str, value: i64, tags: &[(&str, &str)]) {
        tracing::debug!(target: "outpost::metrics", metric = name, kind = "gauge", value, tags = ?tags);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Timer,
    Gauge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub kind: MetricKind,
    pub name: String,
    /// 1 for counters, seconds for timers, the reading for gauges.
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

impl MetricEvent {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every emitted metric in memory (tests, diagnostics).
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MetricEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, kind: MetricKind, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.lock().push(MetricEvent {
            kind,
            name: name.to_string(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<MetricEvent> {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.record(MetricKind::Counter, name, 1.0, tags);
    }

    fn timing(&self, name: &str, value: Duration, tags: &[(&str, &str)]) {
        self.record(MetricKind::Timer, name, value.as_secs_f64(), tags);
    }

    fn gauge(&self, name: &str, value: i64, tags: &[(&str, &str)]) {
        self.record(MetricKind::Gauge, name, value as f64, tags);
    }
}

/// Records metrics on the global OpenTelemetry meter.
///
/// Instruments are created on first use and cached by name; timers are
/// histograms in seconds.
#[cfg(feature = "observability-opentelemetry")]
pub struct OtelMetricsSink {
    meter: Meter,
    counters: Mutex<HashMap<String, Counter<u64>>>,
    histograms: Mutex<HashMap<String, Histogram<f64>>>,
    gauges: Mutex<HashMap<String, Gauge<i64>>>,
}

#[cfg(feature = "observability-opentelemetry")]
impl OtelMetricsSink {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            counters: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn global(name: &'static str) -> Self {
        Self::new(opentelemetry::global::meter(name))
    }

    fn attributes(tags: &[(&str, &str)]) -> Vec<KeyValue> {
        tags.iter()
            .map(|(k, v)| KeyValue::new(k.to_string(), v.to_string()))
            .collect()
    }
}

#[cfg(feature = "observability-opentelemetry")]
impl MetricsSink for OtelMetricsSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| self.meter.u64_counter(name.to_string()).build());
        counter.add(1, &Self::attributes(tags));
    }

    fn timing(&self, name: &str, value: Duration, tags: &[(&str, &str)]) {
        let mut histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
        let histogram = histograms.entry(name.to_string()).or_insert_with(|| {
            self.meter
                .f64_histogram(name.to_string())
                .with_unit("s")
                .build()
        });
        histogram.record(value.as_secs_f64(), &Self::attributes(tags));
    }

    fn gauge(&self, name: &str, value: i64, tags: &[(&str, &str)]) {
        let mut gauges = self.gauges.lock().unwrap_or_else(|e| e.into_inner());
        let gauge = gauges
            .entry(name.to_string())
            .or_insert_with(|| self.meter.i64_gauge(name.to_string()).build());
        gauge.record(value, &Self::attributes(tags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_kind_value_and_tags() {
        let sink = RecordingMetricsSink::new();
        sink.increment("tasks", &[("result", "success")]);
        sink.timing("latency", Duration::from_millis(1500), &[]);
        sink.gauge("depth", 7, &[("state", "enqueued")]);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, MetricKind::Counter);
        assert_eq!(events[0].tag("result"), Some("success"));
        assert_eq!(events[1].value, 1.5);
        assert_eq!(sink.named("depth")[0].value, 7.0);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn tracing_and_noop_sinks_accept_everything() {
        for sink in [&TracingMetricsSink as &dyn MetricsSink, &NoopMetricsSink] {
            sink.increment("tasks", &[("queue_type", "sqs")]);
            sink.timing("latency", Duration::from_secs(1), &[]);
            sink.gauge("depth", 0, &[]);
        }
    }
}
