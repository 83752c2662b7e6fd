//! Named metrics with a snapshot hook.
//!
//! The collection is a per-instance facade, not process-wide state: the
//! broker owns one and increments it on the hot paths. Counters and gauges
//! are lock-free atomics; summaries take a short mutex per observation.
//! How a snapshot is rendered for scraping is the caller's concern.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Signed gauge that can move in both directions.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Aggregate view of a summary's observations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryData {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

/// Streaming min/max/sum/count over observed samples.
#[derive(Debug, Default)]
pub struct Summary {
    inner: Mutex<SummaryData>,
}

impl Summary {
    pub fn observe(&self, value: f64) {
        let mut data = self.inner.lock().expect("summary lock poisoned");
        if data.count == 0 {
            data.min = value;
            data.max = value;
        } else {
            data.min = data.min.min(value);
            data.max = data.max.max(value);
        }
        data.count += 1;
        data.sum += value;
    }

    pub fn data(&self) -> SummaryData {
        *self.inner.lock().expect("summary lock poisoned")
    }
}

type CounterFn = Arc<dyn Fn() -> u64 + Send + Sync>;

enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Summary(Arc<Summary>),
    CounterFn(CounterFn),
}

/// One observed metric value in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Summary(SummaryData),
}

/// Snapshot of every registered metric, keyed by name.
pub type MetricsSnapshot = BTreeMap<String, MetricValue>;

/// A named collection of counters, gauges, summaries, and counter
/// functions (pull-style values computed at snapshot time).
#[derive(Default)]
pub struct Metrics {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter registered under `name`, creating it on first use.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        match metrics.get(name) {
            Some(Metric::Counter(c)) => Arc::clone(c),
            _ => {
                let c = Arc::new(Counter::default());
                metrics.insert(name.to_string(), Metric::Counter(Arc::clone(&c)));
                c
            }
        }
    }

    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        match metrics.get(name) {
            Some(Metric::Gauge(g)) => Arc::clone(g),
            _ => {
                let g = Arc::new(Gauge::default());
                metrics.insert(name.to_string(), Metric::Gauge(Arc::clone(&g)));
                g
            }
        }
    }

    pub fn summary(&self, name: &str) -> Arc<Summary> {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        match metrics.get(name) {
            Some(Metric::Summary(s)) => Arc::clone(s),
            _ => {
                let s = Arc::new(Summary::default());
                metrics.insert(name.to_string(), Metric::Summary(Arc::clone(&s)));
                s
            }
        }
    }

    /// Registers a function evaluated on every snapshot, e.g. uptime.
    pub fn counter_fn(&self, name: &str, f: impl Fn() -> u64 + Send + Sync + 'static) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        metrics.insert(name.to_string(), Metric::CounterFn(Arc::new(f)));
    }

    /// Consistent view of all registered metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().expect("metrics lock poisoned");
        metrics
            .iter()
            .map(|(name, metric)| {
                let value = match metric {
                    Metric::Counter(c) => MetricValue::Counter(c.value()),
                    Metric::Gauge(g) => MetricValue::Gauge(g.value()),
                    Metric::Summary(s) => MetricValue::Summary(s.data()),
                    Metric::CounterFn(f) => MetricValue::Counter(f()),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_shared_by_name() {
        let metrics = Metrics::new();
        metrics.counter("bus.messages").inc();
        metrics.counter("bus.messages").add(2);
        assert_eq!(metrics.counter("bus.messages").value(), 3);
    }

    #[test]
    fn summary_tracks_min_and_max() {
        let summary = Summary::default();
        summary.observe(0.5);
        summary.observe(0.1);
        summary.observe(0.9);

        let data = summary.data();
        assert_eq!(data.count, 3);
        assert_eq!(data.min, 0.1);
        assert_eq!(data.max, 0.9);
        assert!((data.sum - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_evaluates_counter_fns() {
        let metrics = Metrics::new();
        metrics.counter("a").add(5);
        metrics.gauge("b").set(-2);
        metrics.counter_fn("c", || 42);

        let snap = metrics.snapshot();
        assert_eq!(snap["a"], MetricValue::Counter(5));
        assert_eq!(snap["b"], MetricValue::Gauge(-2));
        assert_eq!(snap["c"], MetricValue::Counter(42));
    }
}
