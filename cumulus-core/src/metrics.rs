//! Operation metrics keyed by resource type and verb

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::timeouts::Verb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// One completed lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationMetric {
    pub type_name: String,
    pub verb: Verb,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Destination for operation metrics
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: &OperationMetric);
}

/// Writes every metric to the log under the `cumulus::metrics` target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&self, metric: &OperationMetric) {
        log::info!(
            target: "cumulus::metrics",
            "{} {} {} in {}ms",
            metric.type_name,
            metric.verb,
            metric.outcome.as_str(),
            metric.elapsed.as_millis()
        );
    }
}

/// Keeps metrics in memory for later inspection or summaries
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    records: Mutex<Vec<OperationMetric>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OperationMetric> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Operation count per (type, verb, outcome)
    pub fn counts(&self) -> HashMap<(String, Verb, Outcome), usize> {
        let mut counts = HashMap::new();
        for m in self.records() {
            *counts.entry((m.type_name, m.verb, m.outcome)).or_insert(0) += 1;
        }
        counts
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, metric: &OperationMetric) {
        if let Ok(mut records) = self.records.lock() {
            records.push(metric.clone());
        }
    }
}
