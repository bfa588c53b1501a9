//! Crawler metrics
//!
//! Lock-free counters, gauges and histograms with Prometheus text
//! exposition. One `CrawlerMetrics` is shared by every instance in the
//! process and served by the admin HTTP surface.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Atomic counter for thread-safe incrementing.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for thread-safe value tracking.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counter labelled by HTTP status code.
#[derive(Debug, Default)]
pub struct StatusCounters {
    counts: DashMap<u16, AtomicU64>,
}

impl StatusCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, status: u16) {
        self.counts
            .entry(status)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, status: u16) -> u64 {
        self.counts
            .get(&status)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// All (status, count) pairs, sorted by status for stable exposition.
    pub fn sorted(&self) -> Vec<(u16, u64)> {
        let mut pairs: Vec<_> = self
            .counts
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect();
        pairs.sort_unstable_by_key(|(status, _)| *status);
        pairs
    }
}

/// Histogram over byte sizes with exponential buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Inclusive upper bounds per bucket
    buckets: Vec<u64>,
    counts: Vec<AtomicU64>,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Content-size buckets: 100B to 10MB, factor 10, six buckets.
    pub fn content_size() -> Self {
        Self::with_buckets(vec![
            100,
            1_000,
            10_000,
            100_000,
            1_000_000,
            10_000_000,
        ])
    }

    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in self.buckets.iter().enumerate() {
            if value <= bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.buckets
    }

    /// Non-cumulative per-bucket counts.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

/// All metrics emitted by the crawling engine.
#[derive(Debug)]
pub struct CrawlerMetrics {
    /// Total HTTP requests made
    pub requests_total: Counter,
    /// Requests by response status code
    pub requests_by_status: StatusCounters,
    /// Failed requests (transport, DNS, TLS, timeout)
    pub request_errors_total: Counter,
    /// Pages successfully parsed
    pub pages_crawled_total: Counter,
    /// Size of crawled content in bytes
    pub content_size_bytes: Histogram,
    /// 1 when full-content capture is enabled, else 0
    pub full_content_enabled: Gauge,
}

impl CrawlerMetrics {
    pub fn new(full_content_enabled: bool) -> Self {
        let metrics = Self {
            requests_total: Counter::new(),
            requests_by_status: StatusCounters::new(),
            request_errors_total: Counter::new(),
            pages_crawled_total: Counter::new(),
            content_size_bytes: Histogram::content_size(),
            full_content_enabled: Gauge::new(),
        };
        metrics
            .full_content_enabled
            .set(u64::from(full_content_enabled));
        metrics
    }

    pub fn shared(full_content_enabled: bool) -> Arc<Self> {
        Arc::new(Self::new(full_content_enabled))
    }

    /// Point-in-time snapshot of the scalar metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.get(),
            request_errors_total: self.request_errors_total.get(),
            pages_crawled_total: self.pages_crawled_total.get(),
            content_bytes_total: self.content_size_bytes.sum(),
            full_content_enabled: self.full_content_enabled.get() == 1,
        }
    }

    /// Export all metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        write_counter(
            &mut out,
            "crawler_requests_total",
            "Total number of HTTP requests made",
            self.requests_total.get(),
        );

        let _ = writeln!(
            out,
            "# HELP crawler_requests_by_status_total Number of requests by status code"
        );
        let _ = writeln!(out, "# TYPE crawler_requests_by_status_total counter");
        for (status, count) in self.requests_by_status.sorted() {
            let _ = writeln!(
                out,
                "crawler_requests_by_status_total{{status=\"{}\"}} {}",
                status, count
            );
        }
        let _ = writeln!(out);

        write_counter(
            &mut out,
            "crawler_request_errors_total",
            "Total number of failed requests",
            self.request_errors_total.get(),
        );
        write_counter(
            &mut out,
            "crawler_pages_crawled_total",
            "Total number of pages successfully crawled",
            self.pages_crawled_total.get(),
        );
        write_histogram(
            &mut out,
            "crawler_content_size_bytes",
            "Size of crawled content in bytes",
            &self.content_size_bytes,
        );
        write_gauge(
            &mut out,
            "crawler_full_content_enabled",
            "Indicates if full content scraping is enabled (1) or disabled (0)",
            self.full_content_enabled.get(),
        );

        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} gauge", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let counts = hist.bucket_counts();
    let mut cumulative = 0u64;
    for (i, &bound) in hist.boundaries().iter().enumerate() {
        cumulative += counts[i];
        let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, cumulative);
    }
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, hist.count());
    let _ = writeln!(out, "{}_sum {}", name, hist.sum());
    let _ = writeln!(out, "{}_count {}", name, hist.count());
    let _ = writeln!(out);
}

/// Serializable snapshot for debugging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub request_errors_total: u64,
    pub pages_crawled_total: u64,
    pub content_bytes_total: u64,
    pub full_content_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.set(1);
        assert_eq!(gauge.get(), 1);
        gauge.set(0);
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_status_counters_sorted_output() {
        let counters = StatusCounters::new();
        counters.inc(404);
        counters.inc(200);
        counters.inc(200);

        assert_eq!(counters.get(200), 2);
        assert_eq!(counters.get(404), 1);
        assert_eq!(counters.get(500), 0);
        assert_eq!(counters.sorted(), vec![(200, 2), (404, 1)]);
    }

    #[test]
    fn test_histogram_buckets_and_overflow() {
        let hist = Histogram::content_size();

        hist.observe(5);
        hist.observe(50_000);
        hist.observe(100_000_000); // beyond the last bucket

        assert_eq!(hist.count(), 3);
        assert_eq!(hist.sum(), 100_050_005);
        assert_eq!(hist.overflow_count(), 1);

        let counts = hist.bucket_counts();
        assert_eq!(counts[0], 1); // le=100
        assert_eq!(counts[3], 1); // le=100000
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = CrawlerMetrics::new(true);
        metrics.requests_total.add(42);
        metrics.requests_by_status.inc(200);
        metrics.content_size_bytes.observe(5);

        let output = metrics.to_prometheus();

        assert!(output.contains("# TYPE crawler_requests_total counter"));
        assert!(output.contains("crawler_requests_total 42"));
        assert!(output.contains("crawler_requests_by_status_total{status=\"200\"} 1"));
        assert!(output.contains("# TYPE crawler_content_size_bytes histogram"));
        assert!(output.contains("crawler_content_size_bytes_bucket{le=\"100\"} 1"));
        assert!(output.contains("crawler_content_size_bytes_bucket{le=\"+Inf\"} 1"));
        assert!(output.contains("crawler_content_size_bytes_sum 5"));
        assert!(output.contains("crawler_full_content_enabled 1"));
    }

    #[test]
    fn test_snapshot() {
        let metrics = CrawlerMetrics::new(false);
        metrics.requests_total.add(7);
        metrics.pages_crawled_total.add(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 7);
        assert_eq!(snapshot.pages_crawled_total, 3);
        assert!(!snapshot.full_content_enabled);
    }
}
