use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Thread-safe request counters keyed by analysis kind.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Default)]
struct Metrics {
    processed: BTreeMap<String, usize>,
    errors: BTreeMap<String, usize>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub errors: usize,
    pub by_kind: BTreeMap<String, (usize, usize)>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_processed(&self, kind: &str) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics.processed.entry(kind.to_string()).or_default() += 1;
        }
    }

    pub fn record_error(&self, kind: &str) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics.errors.entry(kind.to_string()).or_default() += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let Ok(metrics) = self.inner.lock() else {
            return MetricsSnapshot::default();
        };
        let mut by_kind: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for (kind, &count) in &metrics.processed {
            by_kind.entry(kind.clone()).or_default().0 = count;
        }
        for (kind, &count) in &metrics.errors {
            by_kind.entry(kind.clone()).or_default().1 = count;
        }
        MetricsSnapshot {
            processed: metrics.processed.values().sum(),
            errors: metrics.errors.values().sum(),
            by_kind,
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
