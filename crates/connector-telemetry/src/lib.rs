//! # Connector Telemetry
//!
//! Observability for payment connectors.
//!
//! ## Components
//!
//! - **Logging**: a `tracing-subscriber` registry with an env filter and a
//!   human-readable or JSON formatter.
//! - **Metrics**: Prometheus counters and gauges labelled by daemon, asset
//!   and connector method.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use connector_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PC_SERVICE_NAME` | `payment-connector` | Service name in log records |
//! | `PC_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` wins when set) |
//! | `PC_JSON_LOGS` | `false` | Emit JSON log lines |
//! | `PC_CONSOLE_OUTPUT` | `true` | Write log lines to stdout |

#![warn(missing_docs)]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, Severity, CURRENT_FUNDS, ERRORS_TOTAL,
    LAST_BLOCK_NUMBER, OVERALL_FEE, OVERALL_RECEIVED, OVERALL_SENT, REQUESTS_TOTAL,
    REQUEST_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A metric could not be registered or encoded.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Log a connector event with the asset attached.
#[macro_export]
macro_rules! log_asset_event {
    ($level:ident, $asset:expr, $msg:literal $(, $($field:tt)*)?) => {
        tracing::$level!(
            asset = %$asset,
            $($($field)*,)?
            $msg
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "payment-connector");
    }

    #[test]
    fn test_log_asset_event_accepts_fields() {
        let funds = 42;
        log_asset_event!(info, "BTC", "funds reported", funds = %funds);
        log_asset_event!(warn, "LTC", "no fields");
    }
}
