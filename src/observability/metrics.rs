//! Prometheus metrics for HTTP requests.
//!
//! Counters and latency histograms keyed by `(method, path, status_code)`,
//! plus an in-flight gauge. Label combinations are created on first use;
//! the number of distinct path labels is capped.

use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};

use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use regex::Regex;
use tracing::error;

use crate::config::MetricsConfig;

/// Latency buckets in seconds, shared by every label combination.
pub const DEFAULT_LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Path label used once the path cap is reached.
pub const OVERFLOW_PATH: &str = "__overflow__";

/// Content type of [`MetricsRecorder::snapshot`].
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const REQUESTS_TOTAL: &str = "http_requests_total";
const REQUEST_DURATION: &str = "http_request_duration_seconds";

static PATH_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_path_regex() -> &'static Regex {
    PATH_REGEX.get_or_init(|| Regex::new(r"/\d+(/|$)").expect("Invalid regex"))
}

/// One completed request.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSample {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_seconds: f64,
}

/// Request counters and latency histograms.
///
/// Safe to share between tasks; all updates are atomic.
pub struct MetricsRecorder {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    http_requests_in_flight: IntGauge,
    known_paths: RwLock<HashSet<String>>,
    max_paths: usize,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_config(&MetricsConfig::default())
    }

    pub fn with_config(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new(REQUESTS_TOTAL, "Total number of HTTP requests"),
            &["method", "path", "status_code"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(REQUEST_DURATION, "Duration of HTTP requests in seconds")
                .buckets(DEFAULT_LATENCY_BUCKETS.to_vec()),
            &["method", "path", "status_code"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let http_requests_in_flight = IntGauge::new(
            "http_requests_in_flight",
            "HTTP requests currently being handled",
        )?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            known_paths: RwLock::new(HashSet::new()),
            max_paths: config.max_paths,
        })
    }

    /// Count the request and observe its duration. Never fails.
    pub fn record(&self, sample: &MetricSample) {
        let path = self.path_label(&sample.path);
        let status = sample.status_code.to_string();
        let labels = [sample.method.as_str(), path.as_str(), status.as_str()];

        self.http_requests_total.with_label_values(&labels).inc();
        self.http_request_duration_seconds
            .with_label_values(&labels)
            .observe(sample.duration_seconds);
    }

    /// Mark a request as in flight until the guard is dropped.
    pub fn track_in_flight(&self) -> InFlightGuard {
        self.http_requests_in_flight.inc();
        InFlightGuard {
            gauge: self.http_requests_in_flight.clone(),
        }
    }

    /// Render every metric in the Prometheus text exposition format.
    pub fn snapshot(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Metrics output is not valid UTF-8");
            String::new()
        })
    }

    /// Counter value for one label set, without creating the series.
    pub fn requests_total(&self, method: &str, path: &str, status_code: u16) -> u64 {
        self.find(REQUESTS_TOTAL, method, path, status_code)
            .map(|m| m.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Histogram `(count, sum)` for one label set, without creating the series.
    pub fn latency(&self, method: &str, path: &str, status_code: u16) -> (u64, f64) {
        self.find(REQUEST_DURATION, method, path, status_code)
            .map(|m| {
                let h = m.get_histogram();
                (h.get_sample_count(), h.get_sample_sum())
            })
            .unwrap_or((0, 0.0))
    }

    pub fn in_flight(&self) -> i64 {
        self.http_requests_in_flight.get()
    }

    fn find(
        &self,
        name: &str,
        method: &str,
        path: &str,
        status_code: u16,
    ) -> Option<prometheus::proto::Metric> {
        let status = status_code.to_string();
        let family: MetricFamily = self
            .registry
            .gather()
            .into_iter()
            .find(|f| f.get_name() == name)?;
        family.get_metric().iter().find_map(|m| {
            let matches = m.get_label().iter().all(|l| match l.get_name() {
                "method" => l.get_value() == method,
                "path" => l.get_value() == path,
                "status_code" => l.get_value() == status,
                _ => true,
            });
            matches.then(|| m.clone())
        })
    }

    /// Normalized path, or [`OVERFLOW_PATH`] once the cap is reached.
    fn path_label(&self, path: &str) -> String {
        let normalized = normalize_path(path);

        if self
            .known_paths
            .read()
            .map(|known| known.contains(&normalized))
            .unwrap_or(false)
        {
            return normalized;
        }

        let mut known = match self.known_paths.write() {
            Ok(known) => known,
            Err(poisoned) => poisoned.into_inner(),
        };
        if known.contains(&normalized) {
            return normalized;
        }
        if known.len() >= self.max_paths {
            return OVERFLOW_PATH.to_string();
        }
        known.insert(normalized.clone());
        normalized
    }
}

/// Decrements the in-flight gauge on drop.
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Normalize path for metrics (replace numeric IDs with placeholders).
///
/// Examples:
/// - `/users/123` -> `/users/:id`
/// - `/users/123/posts/456` -> `/users/:id/posts/:id`
fn normalize_path(path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    get_path_regex().replace_all(path, "/:id$1").to_string()
}
