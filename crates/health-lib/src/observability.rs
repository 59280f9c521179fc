//! Observability infrastructure for the collector and the analyzer
//!
//! Provides:
//! - Prometheus metrics (collection/send latency, delivery outcomes,
//!   classification latency, analyses per class, errors per kind)
//! - Structured JSON logging with tracing

use crate::error::ErrorKind;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HealthMetricsInner> = OnceLock::new();

struct HealthMetricsInner {
    // collector side
    collection_latency_seconds: Histogram,
    send_latency_seconds: Histogram,
    samples_sent: IntCounter,
    send_retries: IntCounter,
    send_failures: IntCounter,
    collection_errors: IntCounter,
    // analyzer side
    classification_latency_seconds: Histogram,
    analyses: IntCounterVec,
    analysis_errors: IntCounterVec,
    records_stored: IntCounter,
    model_info: GaugeVec,
}

impl HealthMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "host_health_collection_latency_seconds",
                "Time spent reading one host sample",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            send_latency_seconds: register_histogram!(
                "host_health_send_latency_seconds",
                "Time from first send attempt to classification, retries included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register send_latency_seconds"),

            samples_sent: register_int_counter!(
                "host_health_samples_sent_total",
                "Samples delivered and classified"
            )
            .expect("Failed to register samples_sent"),

            send_retries: register_int_counter!(
                "host_health_send_retries_total",
                "Delivery attempts repeated after a transient failure"
            )
            .expect("Failed to register send_retries"),

            send_failures: register_int_counter!(
                "host_health_send_failures_total",
                "Samples dropped after delivery failed"
            )
            .expect("Failed to register send_failures"),

            collection_errors: register_int_counter!(
                "host_health_collection_errors_total",
                "Collection cycles aborted by a host read failure"
            )
            .expect("Failed to register collection_errors"),

            classification_latency_seconds: register_histogram!(
                "host_health_classification_latency_seconds",
                "Time spent in the classifier per analysis",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register classification_latency_seconds"),

            analyses: register_int_counter_vec!(
                "host_health_analyses_total",
                "Successful analyses by predicted class",
                &["predicted_class"]
            )
            .expect("Failed to register analyses"),

            analysis_errors: register_int_counter_vec!(
                "host_health_analysis_errors_total",
                "Failed analyses by error kind",
                &["kind"]
            )
            .expect("Failed to register analysis_errors"),

            records_stored: register_int_counter!(
                "host_health_records_stored_total",
                "Analysis records committed to the store"
            )
            .expect("Failed to register records_stored"),

            model_info: register_gauge_vec!(
                "host_health_model_info",
                "Information about the loaded classification model",
                &["version"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Handle to the process-wide metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct HealthMetrics {
    inner: &'static HealthMetricsInner,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(HealthMetricsInner::new),
        }
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner.collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_send_latency(&self, duration_secs: f64) {
        self.inner.send_latency_seconds.observe(duration_secs);
    }

    pub fn inc_samples_sent(&self) {
        self.inner.samples_sent.inc();
    }

    pub fn inc_send_retries(&self) {
        self.inner.send_retries.inc();
    }

    pub fn inc_send_failures(&self) {
        self.inner.send_failures.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner.collection_errors.inc();
    }

    pub fn observe_classification_latency(&self, duration_secs: f64) {
        self.inner
            .classification_latency_seconds
            .observe(duration_secs);
    }

    /// Count one successful analysis
    pub fn inc_analyses(&self, predicted_class: u32) {
        self.inner
            .analyses
            .with_label_values(&[&predicted_class.to_string()])
            .inc();
    }

    pub fn inc_analysis_errors(&self, kind: ErrorKind) {
        self.inner
            .analysis_errors
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_records_stored(&self) {
        self.inner.records_stored.inc();
    }

    /// Publish the loaded model version, replacing any previous one
    pub fn set_model_version(&self, version: &str) {
        self.inner.model_info.reset();
        self.inner
            .model_info
            .with_label_values(&[version])
            .set(1.0);
    }

    /// Current number of analyses recorded for `predicted_class`
    pub fn analyses_for(&self, predicted_class: u32) -> u64 {
        self.inner
            .analyses
            .with_label_values(&[&predicted_class.to_string()])
            .get()
    }

    pub fn analysis_errors_for(&self, kind: ErrorKind) -> u64 {
        self.inner
            .analysis_errors
            .with_label_values(&[kind.as_str()])
            .get()
    }
}

/// Render the default registry in the Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Structured logger for pipeline events
///
/// Every event carries a stable `event` field and the emitting node.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, analyzer_endpoint: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            analyzer_endpoint = %analyzer_endpoint,
            "Host agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Host agent shutting down"
        );
    }

    /// A cycle delivered its sample and got a classification back
    pub fn log_sample_sent(&self, predicted_class: u32, recommendation: &str, elapsed: Duration) {
        info!(
            event = "sample_sent",
            node = %self.node_name,
            predicted_class = predicted_class,
            recommendation = %recommendation,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sample classified by analyzer"
        );
    }

    /// A cycle was skipped; `stage` is `collect` or `send`
    pub fn log_cycle_failure(&self, stage: &str, error: &str) {
        warn!(
            event = "cycle_failed",
            node = %self.node_name,
            stage = %stage,
            error = %error,
            "Collection cycle failed, sample dropped"
        );
    }

    pub fn log_analyzer_startup(&self, version: &str, model_version: &str, database: &str) {
        info!(
            event = "analyzer_started",
            node = %self.node_name,
            analyzer_version = %version,
            model_version = %model_version,
            database = %database,
            "Health analyzer started"
        );
    }

    pub fn log_sample_classified(&self, record_id: i64, predicted_class: u32, cpu_usage_pct: f64) {
        info!(
            event = "sample_classified",
            node = %self.node_name,
            record_id = record_id,
            predicted_class = predicted_class,
            cpu_usage_pct = cpu_usage_pct,
            "Sample classified and stored"
        );
    }

    pub fn log_analysis_failure(&self, kind: ErrorKind, error: &str) {
        match kind {
            ErrorKind::InvalidSample => {
                info!(
                    event = "analysis_failed",
                    node = %self.node_name,
                    kind = %kind,
                    error = %error,
                    "Rejected invalid sample"
                );
            }
            _ => {
                warn!(
                    event = "analysis_failed",
                    node = %self.node_name,
                    kind = %kind,
                    error = %error,
                    "Analysis failed"
                );
            }
        }
    }
}
