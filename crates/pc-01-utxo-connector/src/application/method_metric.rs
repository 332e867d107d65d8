//! Per-call metric guard.

use std::sync::Arc;
use std::time::Instant;

use connector_telemetry::Severity;

use crate::ports::MetricsSink;

/// Method names reported to the metrics port.
pub mod methods {
    /// `account_address`
    pub const ACCOUNT_ADDRESS: &str = "AccountAddress";
    /// `create_address`
    pub const CREATE_ADDRESS: &str = "CreateAddress";
    /// `pending_transactions`
    pub const PENDING_TRANSACTIONS: &str = "PendingTransactions";
    /// `create_payment`
    pub const CREATE_PAYMENT: &str = "CreatePayment";
    /// `send_payment`
    pub const SEND_PAYMENT: &str = "SendPayment";
    /// `confirmed_balance`
    pub const CONFIRMED_BALANCE: &str = "ConfirmedBalance";
    /// `pending_balance`
    pub const PENDING_BALANCE: &str = "PendingBalance";
    /// `estimate_fee`
    pub const ESTIMATE_FEE: &str = "EstimateFee";
    /// `validate_address`
    pub const VALIDATE_ADDRESS: &str = "ValidateAddress";
    /// Start-up sequence.
    pub const START: &str = "Start";
    /// One sync cycle.
    pub const SYNC: &str = "Sync";
    /// Unspent cache refresh.
    pub const SYNC_UNSPENT: &str = "SyncUnspent";
    /// Payment totals report.
    pub const REPORT_METRICS: &str = "ReportMetrics";
    /// Reorganisation transaction.
    pub const REORGANISE_UNSPENT: &str = "ReorganiseUnspent";
}

/// Counts a request when created and reports its duration when dropped.
pub struct MethodMetric {
    sink: Arc<dyn MetricsSink>,
    method: &'static str,
    started: Instant,
}

impl MethodMetric {
    /// Start measuring `method`.
    pub fn new(sink: Arc<dyn MetricsSink>, method: &'static str) -> Self {
        sink.add_request(method);
        Self {
            sink,
            method,
            started: Instant::now(),
        }
    }

    /// Count a failure of this call.
    pub fn add_error(&self, severity: Severity) {
        self.sink.add_error(self.method, severity);
    }

    /// Method being measured.
    pub fn method(&self) -> &'static str {
        self.method
    }
}

impl Drop for MethodMetric {
    fn drop(&mut self) {
        self.sink
            .add_request_duration(self.method, self.started.elapsed().as_secs_f64());
    }
}
