//! Prometheus metrics for payment connectors.
//!
//! All metrics follow the naming convention: `pc_connector_<metric>_<unit>`
//! and carry `daemon` and `asset` labels.
//!
//! ## Metric Types
//!
//! - **Counter**: requests and errors per connector method
//! - **Gauge**: funds, last synced block, overall payment totals
//! - **Histogram**: method duration

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::fmt;
use std::sync::Arc;

use crate::TelemetryError;

/// How severe a reported failure is.
///
/// `High` pages an operator, `Middle` marks a failed background cycle,
/// `Low` marks bad caller input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Caller input problem.
    Low,
    /// Background cycle failure; retried automatically.
    Middle,
    /// Needs attention.
    High,
}

impl Severity {
    /// Label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Middle => "middle",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests processed per connector method
    pub static ref REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("pc_connector_requests_total", "Total requests processed"),
        &["daemon", "asset", "method"]
    ).expect("metric creation failed");

    /// Requests that ended with an error
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("pc_connector_errors_total", "Total requests which processing ended with error"),
        &["daemon", "asset", "method", "severity"]
    ).expect("metric creation failed");

    /// Method duration histogram
    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "pc_connector_request_duration_seconds",
            "Time spent processing connector requests"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["daemon", "asset", "method"]
    ).expect("metric creation failed");

    /// Confirmed funds under control of the connector
    pub static ref CURRENT_FUNDS: GaugeVec = GaugeVec::new(
        Opts::new("pc_connector_current_funds", "Confirmed funds available"),
        &["daemon", "asset"]
    ).expect("metric creation failed");

    /// Height of the last synced block
    pub static ref LAST_BLOCK_NUMBER: GaugeVec = GaugeVec::new(
        Opts::new("pc_connector_last_block_number", "Height of the last synced block"),
        &["daemon", "asset"]
    ).expect("metric creation failed");

    /// Sum of completed incoming payments
    pub static ref OVERALL_RECEIVED: GaugeVec = GaugeVec::new(
        Opts::new("pc_connector_overall_received", "Sum of completed incoming payments"),
        &["daemon", "asset"]
    ).expect("metric creation failed");

    /// Sum of completed outgoing payments
    pub static ref OVERALL_SENT: GaugeVec = GaugeVec::new(
        Opts::new("pc_connector_overall_sent", "Sum of completed outgoing payments"),
        &["daemon", "asset"]
    ).expect("metric creation failed");

    /// Sum of media fees paid
    pub static ref OVERALL_FEE: GaugeVec = GaugeVec::new(
        Opts::new("pc_connector_overall_fee", "Sum of media fees paid"),
        &["daemon", "asset"]
    ).expect("metric creation failed");
}

/// Handle to the metrics registry.
#[derive(Clone)]
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics in the global registry.
///
/// Registering twice is reported as an error by Prometheus; callers hold
/// the returned handle for the process lifetime.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
        Box::new(REQUEST_DURATION.clone()),
        Box::new(CURRENT_FUNDS.clone()),
        Box::new(LAST_BLOCK_NUMBER.clone()),
        Box::new(OVERALL_RECEIVED.clone()),
        Box::new(OVERALL_SENT.clone()),
        Box::new(OVERALL_FEE.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
