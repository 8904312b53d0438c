//! In-process metrics for the capsule service
//!
//! Counters and latency histograms, exported as Prometheus text on `/metrics`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::domain::DenialReason;

/// Shared metrics registry
pub struct MetricsRegistry {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    started: Instant,
}

/// Look up `name`, inserting a default entry on first use.
async fn entry<V: Default>(map: &RwLock<HashMap<String, Arc<V>>>, name: &str) -> Arc<V> {
    if let Some(existing) = map.read().await.get(name) {
        return existing.clone();
    }
    map.write()
        .await
        .entry(name.to_string())
        .or_default()
        .clone()
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::default(),
            histograms: RwLock::default(),
            started: Instant::now(),
        }
    }

    pub async fn inc_counter(&self, name: &str) {
        entry(&self.counters, name)
            .await
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value; zero for a counter never incremented
    pub async fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .await
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Count one denied fetch under its reason
    pub async fn record_denial(&self, reason: DenialReason) {
        self.inc_counter(&metric_names::fetch_denied(reason)).await;
    }

    /// Record a latency observation, in seconds
    pub async fn observe_histogram(&self, name: &str, seconds: f64) {
        entry(&self.histograms, name).await.observe(seconds);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Prometheus text exposition
    pub async fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP capsule_uptime_seconds Time since service start");
        let _ = writeln!(out, "# TYPE capsule_uptime_seconds gauge");
        let _ = writeln!(out, "capsule_uptime_seconds {}\n", self.uptime_seconds());

        let counters = self.counters.read().await;
        let mut names: Vec<_> = counters.keys().collect();
        names.sort();
        for name in names {
            let metric = prometheus_name(name);
            let _ = writeln!(out, "# TYPE {metric} counter");
            let _ = writeln!(out, "{metric} {}", counters[name].load(Ordering::Relaxed));
        }

        let histograms = self.histograms.read().await;
        let mut names: Vec<_> = histograms.keys().collect();
        names.sort();
        for name in names {
            histograms[name].write_prometheus(&prometheus_name(name), &mut out);
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prometheus_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

/// Latency buckets, seconds
const LATENCY_BUCKETS: [f64; 11] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Fixed-bucket latency histogram. Per-bucket counts are non-cumulative;
/// export accumulates them.
pub struct Histogram {
    per_bucket: [AtomicU64; LATENCY_BUCKETS.len()],
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            per_bucket: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

impl Histogram {
    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);

        if let Some(i) = LATENCY_BUCKETS.iter().position(|le| seconds <= *le) {
            self.per_bucket[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn write_prometheus(&self, metric: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {metric} histogram");

        let mut cumulative = 0;
        for (le, hits) in LATENCY_BUCKETS.iter().zip(&self.per_bucket) {
            cumulative += hits.load(Ordering::Relaxed);
            let _ = writeln!(out, "{metric}_bucket{{le=\"{le}\"}} {cumulative}");
        }

        let count = self.count();
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{metric}_bucket{{le=\"+Inf\"}} {count}");
        let _ = writeln!(out, "{metric}_sum {sum}");
        let _ = writeln!(out, "{metric}_count {count}");
    }
}

/// Predefined metric names
pub mod metric_names {
    use crate::domain::DenialReason;

    pub const ARTIFACTS_CREATED: &str = "capsule.artifacts.created";
    pub const FETCH_GRANTED: &str = "capsule.fetch.granted";
    pub const VERIFY_REQUESTS: &str = "capsule.verify.requests";
    pub const FETCH_LATENCY: &str = "capsule.fetch.latency_seconds";

    /// `capsule.fetch.denied.<reason>`
    pub fn fetch_denied(reason: DenialReason) -> String {
        format!("capsule.fetch.denied.{}", reason.as_str())
    }
}

/// Await `f`, recording its wall time under `metric_name`
pub async fn timed<F, T>(metrics: &MetricsRegistry, metric_name: &str, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    metrics
        .observe_histogram(metric_name, start.elapsed().as_secs_f64())
        .await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_increments() {
        let registry = MetricsRegistry::new();

        for _ in 0..3 {
            registry.inc_counter(metric_names::VERIFY_REQUESTS).await;
        }

        assert_eq!(registry.get_counter(metric_names::VERIFY_REQUESTS).await, 3);
        assert_eq!(registry.get_counter("missing").await, 0);
    }

    #[tokio::test]
    async fn test_denials_are_counted_per_reason() {
        let registry = MetricsRegistry::new();

        registry.record_denial(DenialReason::InvalidKey).await;
        registry.record_denial(DenialReason::InvalidKey).await;
        registry.record_denial(DenialReason::Expired).await;

        assert_eq!(
            registry
                .get_counter(&metric_names::fetch_denied(DenialReason::InvalidKey))
                .await,
            2
        );
        assert_eq!(registry.get_counter("capsule.fetch.denied.expired").await, 1);
    }

    #[tokio::test]
    async fn test_timed_records_histogram() {
        let registry = MetricsRegistry::new();

        let value = timed(&registry, metric_names::FETCH_LATENCY, async { 42 }).await;
        assert_eq!(value, 42);

        let histograms = registry.histograms.read().await;
        assert_eq!(histograms[metric_names::FETCH_LATENCY].count(), 1);
    }

    #[test]
    fn test_histogram_buckets_accumulate() {
        let histogram = Histogram::default();
        histogram.observe(0.004);
        histogram.observe(0.2);
        histogram.observe(60.0);

        let mut out = String::new();
        histogram.write_prometheus("lat", &mut out);
        assert!(out.contains("lat_bucket{le=\"0.005\"} 1\n"));
        assert!(out.contains("lat_bucket{le=\"0.25\"} 2\n"));
        assert!(out.contains("lat_bucket{le=\"5\"} 2\n"));
        assert!(out.contains("lat_bucket{le=\"+Inf\"} 3\n"));
        assert!(out.contains("lat_count 3\n"));
    }

    #[tokio::test]
    async fn test_prometheus_format() {
        let registry = MetricsRegistry::new();

        registry.inc_counter(metric_names::FETCH_GRANTED).await;
        registry.record_denial(DenialReason::UntrustedDomain).await;
        registry.observe_histogram("test.latency", 0.004).await;

        let prometheus = registry.to_prometheus().await;
        assert!(prometheus.contains("capsule_fetch_granted 1"));
        assert!(prometheus.contains("capsule_fetch_denied_untrusted_domain 1"));
        assert!(prometheus.contains("test_latency_bucket{le=\"0.005\"} 1"));
        assert!(prometheus.contains("test_latency_count 1"));
    }
}
