//! Metrics sink: counters, timers, and gauges keyed by name + labels.
//!
//! Fire-and-forget by contract — recording a metric must never block or fail
//! a turn. The sink is an injected instance (constructed once per process),
//! not an ambient global.

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Label set: sorted key→value pairs. Sorted so that label order never
/// produces distinct series.
pub type Labels = BTreeMap<String, String>;

/// Build a [`Labels`] map from `(key, value)` pairs.
#[must_use]
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// Fire-and-forget metrics sink.
pub trait MetricsSink: Send + Sync {
    /// Increment a counter.
    fn counter(&self, name: &str, labels: &Labels, value: u64);

    /// Record a duration in milliseconds.
    fn timer_ms(&self, name: &str, labels: &Labels, ms: u64);

    /// Set a gauge to an absolute value.
    fn gauge(&self, name: &str, labels: &Labels, value: f64);
}

/// Sink that drops everything. Default for embedders that do not observe.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &str, _labels: &Labels, _value: u64) {}
    fn timer_ms(&self, _name: &str, _labels: &Labels, _ms: u64) {}
    fn gauge(&self, _name: &str, _labels: &Labels, _value: f64) {}
}

/// Series key: metric name plus label set.
type SeriesKey = (String, Labels);

#[derive(Default)]
struct Recorded {
    counters: BTreeMap<SeriesKey, u64>,
    timers: BTreeMap<SeriesKey, Vec<u64>>,
    gauges: BTreeMap<SeriesKey, f64>,
}

/// In-memory recorder, used by tests and embedding hosts that poll.
#[derive(Default)]
pub struct MemoryMetrics {
    recorded: Mutex<Recorded>,
}

impl MemoryMetrics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter series, 0 if never incremented.
    #[must_use]
    pub fn counter_value(&self, name: &str, labels: &Labels) -> u64 {
        let key = (name.to_owned(), labels.clone());
        self.recorded
            .lock()
            .counters
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// All recorded durations for a timer series.
    #[must_use]
    pub fn timer_values(&self, name: &str, labels: &Labels) -> Vec<u64> {
        let key = (name.to_owned(), labels.clone());
        self.recorded
            .lock()
            .timers
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Last value of a gauge series.
    #[must_use]
    pub fn gauge_value(&self, name: &str, labels: &Labels) -> Option<f64> {
        let key = (name.to_owned(), labels.clone());
        self.recorded.lock().gauges.get(&key).copied()
    }

    /// Names of all counter series with at least one increment.
    #[must_use]
    pub fn counter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .recorded
            .lock()
            .counters
            .keys()
            .map(|(name, _)| name.clone())
            .collect();
        names.dedup();
        names
    }
}

impl MetricsSink for MemoryMetrics {
    fn counter(&self, name: &str, labels: &Labels, value: u64) {
        let mut recorded = self.recorded.lock();
        *recorded
            .counters
            .entry((name.to_owned(), labels.clone()))
            .or_insert(0) += value;
    }

    fn timer_ms(&self, name: &str, labels: &Labels, ms: u64) {
        let mut recorded = self.recorded.lock();
        recorded
            .timers
            .entry((name.to_owned(), labels.clone()))
            .or_default()
            .push(ms);
    }

    fn gauge(&self, name: &str, labels: &Labels, value: f64) {
        let mut recorded = self.recorded.lock();
        let _ = recorded
            .gauges
            .insert((name.to_owned(), labels.clone()), value);
    }
}
