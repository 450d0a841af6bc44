//! Per-endpoint request metrics.
//!
//! A [`Metrics`] value owns the four metric families the pipeline updates.
//! It is built explicitly and handed to the stages that need it, so two
//! pipelines in one process (or two tests) never share counters by accident.
//! Register it with whatever Prometheus registry the process scrapes:
//!
//! ```rust
//! use gatehouse::metrics::Metrics;
//!
//! let registry = prometheus::Registry::new();
//! let metrics = Metrics::new().unwrap();
//! metrics.register(&registry).unwrap();
//! ```
//!
//! | Family | Type | Updated by |
//! |---|---|---|
//! | `grpc_request_count_total` | counter | metrics stage, every call |
//! | `grpc_request_failure_count_total` | counter | metrics stage, failures that are not application errors |
//! | `grpc_request_application_error_count_total` | counter | application-error stage |
//! | `grpc_request_time_ms` | histogram | metrics stage, every call |

use prometheus::core::Collector;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

const NAMESPACE: &str = "grpc";
const ENDPOINT: &str = "endpoint";

/// Live metric handles. Clones share the underlying series.
#[derive(Clone)]
pub struct Metrics {
    requests: IntCounterVec,
    failures: IntCounterVec,
    application_errors: IntCounterVec,
    request_time_ms: HistogramVec,
}

impl Metrics {
    /// Creates the metric families without registering them anywhere.
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            requests: IntCounterVec::new(
                Opts::new("request_count_total", "Counter for received gRPC requests")
                    .namespace(NAMESPACE),
                &[ENDPOINT],
            )?,
            failures: IntCounterVec::new(
                Opts::new("request_failure_count_total", "Counter for failed gRPC requests")
                    .namespace(NAMESPACE),
                &[ENDPOINT],
            )?,
            application_errors: IntCounterVec::new(
                Opts::new(
                    "request_application_error_count_total",
                    "Counter for failed gRPC requests with application errors",
                )
                .namespace(NAMESPACE),
                &[ENDPOINT],
            )?,
            request_time_ms: HistogramVec::new(
                HistogramOpts::new("request_time_ms", "Time to serve gRPC requests in milliseconds")
                    .namespace(NAMESPACE)
                    // 16 ms .. 8.2 s
                    .buckets(prometheus::exponential_buckets(16.0, 2.0, 10)?),
                &[ENDPOINT],
            )?,
        })
    }

    /// The live collectors, for registration with an external registry.
    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.requests.clone()),
            Box::new(self.failures.clone()),
            Box::new(self.application_errors.clone()),
            Box::new(self.request_time_ms.clone()),
        ]
    }

    /// Registers every family with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        for collector in self.collectors() {
            registry.register(collector)?;
        }
        Ok(())
    }

    pub(crate) fn inc_request(&self, endpoint: &str) {
        self.requests.with_label_values(&[endpoint]).inc();
    }

    pub(crate) fn inc_failure(&self, endpoint: &str) {
        self.failures.with_label_values(&[endpoint]).inc();
    }

    pub(crate) fn inc_application_error(&self, endpoint: &str) {
        self.application_errors.with_label_values(&[endpoint]).inc();
    }

    pub(crate) fn observe_ms(&self, endpoint: &str, ms: f64) {
        self.request_time_ms.with_label_values(&[endpoint]).observe(ms);
    }

    // ── Read-back, mostly for tests and dashboards ───────────────────────────

    pub fn request_count(&self, endpoint: &str) -> u64 {
        self.requests.with_label_values(&[endpoint]).get()
    }

    pub fn failure_count(&self, endpoint: &str) -> u64 {
        self.failures.with_label_values(&[endpoint]).get()
    }

    pub fn application_error_count(&self, endpoint: &str) -> u64 {
        self.application_errors.with_label_values(&[endpoint]).get()
    }

    /// Number of latency observations recorded for `endpoint`.
    pub fn latency_count(&self, endpoint: &str) -> u64 {
        self.request_time_ms.with_label_values(&[endpoint]).get_sample_count()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
