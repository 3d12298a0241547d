//! Diagnostics for invocations.
//!
//! Logging goes through `tracing` at the call sites; this module holds the
//! numeric side: per-action invocation counters and optional per-strategy
//! `apply` latency histograms, exportable as Prometheus text or as a
//! serializable snapshot.

pub mod metrics;

pub use metrics::{
    ApplyTimer, Counter, Histogram, HistogramSnapshot, InvocationMetrics, Metrics, MetricsSnapshot,
    NoOpMetrics,
};
