//! Metrics Adapters
//!
//! `MetricsSink` implementations: Prometheus gauges and counters from
//! `connector-telemetry`, a no-op sink, and a recording sink for tests.

use std::collections::HashMap;

use connector_telemetry::{
    Severity, CURRENT_FUNDS, ERRORS_TOTAL, LAST_BLOCK_NUMBER, OVERALL_FEE, OVERALL_RECEIVED,
    OVERALL_SENT, REQUESTS_TOTAL, REQUEST_DURATION,
};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use shared_types::{Amount, Asset};

use crate::ports::MetricsSink;

fn coins(amount: Amount) -> f64 {
    amount.to_coins().to_f64().unwrap_or_default()
}

/// Reports to the Prometheus metric set, labelled by daemon and asset.
#[derive(Clone, Debug)]
pub struct PrometheusMetrics {
    daemon: String,
    asset: String,
}

impl PrometheusMetrics {
    /// Sink for the connector of `asset` talking to `daemon`.
    pub fn new(daemon: impl Into<String>, asset: Asset) -> Self {
        Self {
            daemon: daemon.into(),
            asset: asset.to_string(),
        }
    }

    fn gauge_labels(&self) -> [&str; 2] {
        [self.daemon.as_str(), self.asset.as_str()]
    }
}

impl MetricsSink for PrometheusMetrics {
    fn add_request(&self, method: &str) {
        REQUESTS_TOTAL
            .with_label_values(&[self.daemon.as_str(), self.asset.as_str(), method])
            .inc();
    }

    fn add_error(&self, method: &str, severity: Severity) {
        ERRORS_TOTAL
            .with_label_values(&[
                self.daemon.as_str(),
                self.asset.as_str(),
                method,
                severity.as_str(),
            ])
            .inc();
    }

    fn add_request_duration(&self, method: &str, seconds: f64) {
        REQUEST_DURATION
            .with_label_values(&[self.daemon.as_str(), self.asset.as_str(), method])
            .observe(seconds);
    }

    fn current_funds(&self, funds: Amount) {
        CURRENT_FUNDS
            .with_label_values(&self.gauge_labels())
            .set(coins(funds));
    }

    fn block_number(&self, height: u64) {
        LAST_BLOCK_NUMBER
            .with_label_values(&self.gauge_labels())
            .set(height as f64);
    }

    fn overall_received(&self, amount: Amount) {
        OVERALL_RECEIVED
            .with_label_values(&self.gauge_labels())
            .set(coins(amount));
    }

    fn overall_sent(&self, amount: Amount) {
        OVERALL_SENT
            .with_label_values(&self.gauge_labels())
            .set(coins(amount));
    }

    fn overall_fee(&self, amount: Amount) {
        OVERALL_FEE
            .with_label_values(&self.gauge_labels())
            .set(coins(amount));
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add_request(&self, _method: &str) {}
    fn add_error(&self, _method: &str, _severity: Severity) {}
    fn add_request_duration(&self, _method: &str, _seconds: f64) {}
    fn current_funds(&self, _funds: Amount) {}
    fn block_number(&self, _height: u64) {}
    fn overall_received(&self, _amount: Amount) {}
    fn overall_sent(&self, _amount: Amount) {}
    fn overall_fee(&self, _amount: Amount) {}
}

/// Values seen by a [`RecordingMetrics`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordedMetrics {
    /// Request count per method.
    pub requests: HashMap<String, u64>,
    /// Errors in report order.
    pub errors: Vec<(String, Severity)>,
    /// Finished calls.
    pub durations: u64,
    /// Last reported funds.
    pub current_funds: Option<Amount>,
    /// Last reported height.
    pub block_number: Option<u64>,
    /// Last reported received total.
    pub overall_received: Option<Amount>,
    /// Last reported sent total.
    pub overall_sent: Option<Amount>,
    /// Last reported fee total.
    pub overall_fee: Option<Amount>,
}

/// Keeps every reported value for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    recorded: Mutex<RecordedMetrics>,
}

impl RecordingMetrics {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded.
    pub fn snapshot(&self) -> RecordedMetrics {
        self.recorded.lock().clone()
    }

    /// Severities reported for `method`.
    pub fn errors_of(&self, method: &str) -> Vec<Severity> {
        self.recorded
            .lock()
            .errors
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Requests counted for `method`.
    pub fn requests_of(&self, method: &str) -> u64 {
        self.recorded
            .lock()
            .requests
            .get(method)
            .copied()
            .unwrap_or_default()
    }
}

impl MetricsSink for RecordingMetrics {
    fn add_request(&self, method: &str) {
        *self
            .recorded
            .lock()
            .requests
            .entry(method.to_string())
            .or_default() += 1;
    }

    fn add_error(&self, method: &str, severity: Severity) {
        self.recorded
            .lock()
            .errors
            .push((method.to_string(), severity));
    }

    fn add_request_duration(&self, _method: &str, _seconds: f64) {
        self.recorded.lock().durations += 1;
    }

    fn current_funds(&self, funds: Amount) {
        self.recorded.lock().current_funds = Some(funds);
    }

    fn block_number(&self, height: u64) {
        self.recorded.lock().block_number = Some(height);
    }

    fn overall_received(&self, amount: Amount) {
        self.recorded.lock().overall_received = Some(amount);
    }

    fn overall_sent(&self, amount: Amount) {
        self.recorded.lock().overall_sent = Some(amount);
    }

    fn overall_fee(&self, amount: Amount) {
        self.recorded.lock().overall_fee = Some(amount);
    }
}
