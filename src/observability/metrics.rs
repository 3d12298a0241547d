//! Invocation metrics.
//!
//! Provides counters and histograms for invocation statistics, a registry
//! with Prometheus-style text export, and the [`InvocationMetrics`] hook the
//! eager future reports through. Recording is best-effort and never affects
//! the outcome of an invocation.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counter series incremented once per issued invocation, labelled by action.
pub const INVOCATIONS_TOTAL: &str = "farcall_invocations_total";
/// Histogram series of `apply` latency in seconds, labelled by strategy.
pub const APPLY_SECONDS: &str = "farcall_apply_seconds";

/// Default latency buckets, in seconds.
pub const DEFAULT_LATENCY_BUCKETS: &[f64] = &[
    0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
];

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: String,
    value: AtomicU64,
}

impl Counter {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Increments the counter by 1.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Adds a value to the counter.
    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    /// Returns the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Returns the series name, labels included.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A histogram for distribution tracking.
#[derive(Debug)]
pub struct Histogram {
    name: String,
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum: AtomicU64, // f64 bits
    count: AtomicU64,
}

impl Histogram {
    pub(crate) fn new(name: impl Into<String>, buckets: &[f64]) -> Self {
        let mut buckets = buckets.to_vec();
        buckets.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            name: name.into(),
            buckets,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Observes a value.
    pub fn observe(&self, value: f64) {
        let idx = self
            .buckets
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.buckets.len());
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .sum
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(v) => current = v,
            }
        }
    }

    /// Returns the total count of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the sum of observations.
    #[must_use]
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    /// Returns the series name, labels included.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Point-in-time copy of a [`Metrics`] registry, keyed by series name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Counter values.
    pub counters: BTreeMap<String, u64>,
    /// Histogram totals.
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

/// Totals of one histogram series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Number of observations.
    pub count: u64,
    /// Sum of observations.
    pub sum: f64,
}

fn series(name: &str, label: &str, value: &str) -> String {
    format!("{name}{{{label}=\"{value}\"}}")
}

/// Registry of per-action counters and per-strategy histograms.
///
/// Series are keyed by the static label value, so recording into an existing
/// series is a read-locked map lookup with no allocation. Labelled series
/// names are only rendered on first creation and at export.
#[derive(Debug, Default)]
pub struct Metrics {
    invocations: RwLock<BTreeMap<&'static str, Arc<Counter>>>,
    latencies: RwLock<BTreeMap<&'static str, Arc<Histogram>>>,
}

impl Metrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the invocation counter for `action`.
    pub fn invocation_counter(&self, action: &'static str) -> Arc<Counter> {
        if let Some(counter) = self.invocations.read().get(action) {
            return Arc::clone(counter);
        }
        Arc::clone(self.invocations.write().entry(action).or_insert_with(|| {
            Arc::new(Counter::new(series(INVOCATIONS_TOTAL, "action", action)))
        }))
    }

    /// Gets or creates the apply-latency histogram for `strategy`.
    pub fn latency_histogram(&self, strategy: &'static str) -> Arc<Histogram> {
        if let Some(hist) = self.latencies.read().get(strategy) {
            return Arc::clone(hist);
        }
        Arc::clone(self.latencies.write().entry(strategy).or_insert_with(|| {
            Arc::new(Histogram::new(
                series(APPLY_SECONDS, "strategy", strategy),
                DEFAULT_LATENCY_BUCKETS,
            ))
        }))
    }

    /// Returns how many invocations of `action` were issued.
    #[must_use]
    pub fn invocations(&self, action: &str) -> u64 {
        self.invocations.read().get(action).map_or(0, |c| c.get())
    }

    /// Returns the apply-latency histogram for `strategy`, if any apply was timed.
    #[must_use]
    pub fn apply_latency(&self, strategy: &str) -> Option<Arc<Histogram>> {
        self.latencies.read().get(strategy).cloned()
    }

    /// Captures every series as plain values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .invocations
            .read()
            .values()
            .map(|counter| (counter.name().to_string(), counter.get()))
            .collect();
        let histograms = self
            .latencies
            .read()
            .values()
            .map(|hist| {
                (
                    hist.name().to_string(),
                    HistogramSnapshot {
                        count: hist.count(),
                        sum: hist.sum(),
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            counters,
            histograms,
        }
    }

    /// Exports metrics in Prometheus text format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut output = String::new();

        let counters = self.invocations.read();
        if !counters.is_empty() {
            let _ = writeln!(output, "# TYPE {INVOCATIONS_TOTAL} counter");
        }
        for counter in counters.values() {
            let _ = writeln!(output, "{} {}", counter.name(), counter.get());
        }

        let histograms = self.latencies.read();
        if !histograms.is_empty() {
            let _ = writeln!(output, "# TYPE {APPLY_SECONDS} histogram");
        }
        for hist in histograms.values() {
            // `name{label="v"}` -> `name_bucket{label="v",le="..."}`
            let (base, labels) = hist
                .name
                .split_once('{')
                .map_or((hist.name.as_str(), ""), |(b, l)| (b, l.trim_end_matches('}')));
            let mut cumulative = 0;
            for (i, count) in hist.counts.iter().enumerate() {
                cumulative += count.load(Ordering::Relaxed);
                let le = hist
                    .buckets
                    .get(i)
                    .map_or_else(|| "+Inf".to_string(), ToString::to_string);
                let _ = writeln!(output, "{base}_bucket{{{labels},le=\"{le}\"}} {cumulative}");
            }
            let _ = writeln!(output, "{base}_sum{{{labels}}} {}", hist.sum());
            let _ = writeln!(output, "{base}_count{{{labels}}} {}", hist.count());
        }

        output
    }
}

/// Hook through which invocations report diagnostics.
///
/// Implementations must not block and must not fail.
pub trait InvocationMetrics: Send + Sync + 'static {
    /// Called once per issued invocation, before its continuation is built.
    fn invocation_recorded(&self, action: &'static str);

    /// Called with the wall time of one `apply`, when profiling is enabled.
    fn apply_timed(&self, strategy: &'static str, elapsed: Duration);
}

/// Metrics hook that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl InvocationMetrics for NoOpMetrics {
    fn invocation_recorded(&self, _: &'static str) {}

    fn apply_timed(&self, _: &'static str, _: Duration) {}
}

impl InvocationMetrics for Metrics {
    fn invocation_recorded(&self, action: &'static str) {
        if let Some(counter) = self.invocations.read().get(action) {
            counter.increment();
            return;
        }
        self.invocation_counter(action).increment();
    }

    fn apply_timed(&self, strategy: &'static str, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        if let Some(hist) = self.latencies.read().get(strategy) {
            hist.observe(seconds);
            return;
        }
        self.latency_histogram(strategy).observe(seconds);
    }
}

/// Times one `apply` and reports it when dropped.
#[must_use = "the timer reports when dropped"]
pub struct ApplyTimer<'a> {
    metrics: &'a dyn InvocationMetrics,
    strategy: &'static str,
    started: Instant,
}

impl<'a> ApplyTimer<'a> {
    /// Starts a timer when `enabled`; returns `None` otherwise.
    pub fn start_if(
        enabled: bool,
        metrics: &'a dyn InvocationMetrics,
        strategy: &'static str,
    ) -> Option<Self> {
        enabled.then(|| Self {
            metrics,
            strategy,
            started: Instant::now(),
        })
    }
}

impl Drop for ApplyTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .apply_timed(self.strategy, self.started.elapsed());
    }
}

impl std::fmt::Debug for ApplyTimer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyTimer")
            .field("strategy", &self.strategy)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
