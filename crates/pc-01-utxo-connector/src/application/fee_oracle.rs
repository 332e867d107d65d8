//! # Fee Rate Oracle
//!
//! Asks the daemon for a fee rate and falls back to the configured rate.
//!
//! BCH and DASH daemons only offer the legacy `estimatefee`; the others use
//! `estimatesmartfee` in conservative mode. Both answer in coins per
//! kilobyte and are normalised to sat/byte.

use connector_telemetry::Severity;
use shared_types::Asset;
use tracing::warn;

use super::method_metric::MethodMetric;
use crate::domain::{EstimateMode, FeeRate};
use crate::ports::ChainClient;

/// Daemon call used to estimate fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeQueryShape {
    /// `estimatefee(horizon)`.
    Legacy,
    /// `estimatesmartfee(horizon, CONSERVATIVE)`.
    Smart,
}

impl FeeQueryShape {
    /// Shape supported by the daemon of `asset`.
    pub fn for_asset(asset: Asset) -> Self {
        match asset {
            Asset::Bch | Asset::Dash => FeeQueryShape::Legacy,
            Asset::Btc | Asset::Ltc => FeeQueryShape::Smart,
        }
    }
}

/// Fee rate source of one connector.
#[derive(Clone, Debug)]
pub struct FeeOracle {
    shape: FeeQueryShape,
    fallback: FeeRate,
    horizon: u32,
    alert_on_fallback: bool,
}

impl FeeOracle {
    /// Oracle for `asset` on the canonical network `net`.
    ///
    /// Falling back to the configured rate is only alerted on mainnet;
    /// test networks often lack the data for an estimate.
    pub fn new(asset: Asset, net: &str, fee_per_byte: u64, horizon: u32) -> Self {
        Self {
            shape: FeeQueryShape::for_asset(asset),
            fallback: FeeRate::from_sat_per_byte(fee_per_byte),
            horizon,
            alert_on_fallback: net == "mainnet",
        }
    }

    /// Configured static rate.
    pub fn fallback(&self) -> FeeRate {
        self.fallback
    }

    /// Current fee rate, never below one sat/byte when it comes from the daemon.
    pub async fn fee_rate(&self, client: &dyn ChainClient, metric: &MethodMetric) -> FeeRate {
        match self.query(client).await {
            Ok(rate) => rate.at_least(FeeRate::FLOOR),
            Err(reason) => {
                warn!(
                    "[pc-01] Unable to estimate fee ({}), using fallback {}",
                    reason, self.fallback
                );
                if self.alert_on_fallback {
                    metric.add_error(Severity::High);
                }
                self.fallback
            }
        }
    }

    async fn query(&self, client: &dyn ChainClient) -> Result<FeeRate, String> {
        let coins_per_kb = match self.shape {
            FeeQueryShape::Legacy => client
                .estimate_fee(self.horizon)
                .await
                .map_err(|e| e.to_string())?,
            FeeQueryShape::Smart => {
                let estimate = client
                    .estimate_smart_fee(self.horizon, EstimateMode::Conservative)
                    .await
                    .map_err(|e| e.to_string())?;
                if !estimate.errors.is_empty() {
                    return Err(estimate.errors.join(", "));
                }
                estimate
                    .fee_rate
                    .ok_or_else(|| "estimator returned no rate".to_string())?
            }
        };

        FeeRate::from_coins_per_kb(coins_per_kb)
            .ok_or_else(|| format!("non-positive estimate {}", coins_per_kb))
    }
}
