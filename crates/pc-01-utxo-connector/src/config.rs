//! # Connector Configuration
//!
//! Configuration for one UTXO connector instance.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared_types::{Amount, Asset};

use crate::domain::{
    invariant_min_confirmations, BlockHash, ConnectorError, TxScanPolicy,
    DEFAULT_FEE_ESTIMATE_HORIZON, DEFAULT_FEE_PER_BYTE, DEFAULT_MIN_CONFIRMATIONS,
};

/// Default delay between sync cycles.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5;

/// Default delay between unspent cache refreshes.
pub const DEFAULT_UNSPENT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default delay between payment total reports.
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 30;

/// Connector configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Asset served.
    pub asset: Asset,

    /// Network the daemon must run on (mainnet, testnet, regtest or an alias).
    pub net: String,

    /// Name of the daemon, used as a metrics label.
    pub daemon_name: String,

    /// Confirmations before a payment is completed.
    pub min_confirmations: u32,

    /// Delay between sync cycles; zero selects the default.
    pub sync_interval_secs: u64,

    /// Delay between unspent cache refreshes.
    pub unspent_refresh_interval_secs: u64,

    /// Delay between payment total reports.
    pub report_interval_secs: u64,

    /// Fee rate used when the daemon can't estimate one (sat/byte).
    pub fee_per_byte: u64,

    /// Target value of outputs created by a reorganisation.
    pub optimal_utxo_value: Amount,

    /// Smallest output worth creating.
    pub dust_limit: Amount,

    /// Blocks the fee estimate targets.
    pub fee_estimate_horizon: u32,

    /// Start syncing from this block instead of the stored cursor.
    pub last_synced_block_hash: Option<String>,

    /// What to do with transactions that can't be read during a sync.
    pub tx_scan_policy: TxScanPolicy,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            asset: Asset::Btc,
            net: "mainnet".to_string(),
            daemon_name: "bitcoind".to_string(),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            unspent_refresh_interval_secs: DEFAULT_UNSPENT_REFRESH_INTERVAL_SECS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            fee_per_byte: DEFAULT_FEE_PER_BYTE,
            optimal_utxo_value: Amount::from_sat(10_000_000),
            dust_limit: Amount::from_sat(546),
            fee_estimate_horizon: DEFAULT_FEE_ESTIMATE_HORIZON,
            last_synced_block_hash: None,
            tx_scan_policy: TxScanPolicy::SkipAndLog,
        }
    }
}

impl ConnectorConfig {
    /// Create a config for testing (regtest, one confirmation, short timers).
    pub fn for_testing() -> Self {
        Self {
            net: "regtest".to_string(),
            daemon_name: "mock".to_string(),
            min_confirmations: 1,
            sync_interval_secs: 1,
            unspent_refresh_interval_secs: 1,
            report_interval_secs: 1,
            fee_per_byte: 10,
            optimal_utxo_value: Amount::from_sat(100_000),
            ..Self::default()
        }
    }

    /// Defaults overridden by `PC_*` environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PC_ASSET`: BTC, BCH, LTC or DASH
    /// - `PC_NET`: network name
    /// - `PC_DAEMON_NAME`: metrics label of the daemon
    /// - `PC_MIN_CONFIRMATIONS`, `PC_FEE_PER_BYTE`, `PC_FEE_ESTIMATE_HORIZON`
    /// - `PC_SYNC_INTERVAL_SECS`, `PC_UNSPENT_REFRESH_INTERVAL_SECS`,
    ///   `PC_REPORT_INTERVAL_SECS`
    /// - `PC_OPTIMAL_UTXO_VALUE`, `PC_DUST_LIMIT`: decimal coin values
    /// - `PC_LAST_SYNCED_BLOCK_HASH`: start-up cursor override
    /// - `PC_TX_SCAN_POLICY`: `skip_and_log` or `fail_block`
    pub fn from_env() -> Result<Self, ConnectorError> {
        let mut config = Self::default();

        if let Some(asset) = env_parsed::<Asset>("PC_ASSET")? {
            config.asset = asset;
        }
        if let Ok(net) = env::var("PC_NET") {
            config.net = net;
        }
        if let Ok(name) = env::var("PC_DAEMON_NAME") {
            config.daemon_name = name;
        }
        if let Some(v) = env_parsed("PC_MIN_CONFIRMATIONS")? {
            config.min_confirmations = v;
        }
        if let Some(v) = env_parsed("PC_FEE_PER_BYTE")? {
            config.fee_per_byte = v;
        }
        if let Some(v) = env_parsed("PC_FEE_ESTIMATE_HORIZON")? {
            config.fee_estimate_horizon = v;
        }
        if let Some(v) = env_parsed("PC_SYNC_INTERVAL_SECS")? {
            config.sync_interval_secs = v;
        }
        if let Some(v) = env_parsed("PC_UNSPENT_REFRESH_INTERVAL_SECS")? {
            config.unspent_refresh_interval_secs = v;
        }
        if let Some(v) = env_parsed("PC_REPORT_INTERVAL_SECS")? {
            config.report_interval_secs = v;
        }
        if let Ok(v) = env::var("PC_OPTIMAL_UTXO_VALUE") {
            config.optimal_utxo_value = parse_coins("PC_OPTIMAL_UTXO_VALUE", &v)?;
        }
        if let Ok(v) = env::var("PC_DUST_LIMIT") {
            config.dust_limit = parse_coins("PC_DUST_LIMIT", &v)?;
        }
        if let Ok(hash) = env::var("PC_LAST_SYNCED_BLOCK_HASH") {
            config.last_synced_block_hash = Some(hash);
        }
        if let Ok(policy) = env::var("PC_TX_SCAN_POLICY") {
            config.tx_scan_policy = match policy.as_str() {
                "skip_and_log" => TxScanPolicy::SkipAndLog,
                "fail_block" => TxScanPolicy::FailBlock,
                other => {
                    return Err(ConnectorError::Config(format!(
                        "PC_TX_SCAN_POLICY: unknown policy '{}'",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Replace zero sync interval by the default, then check every value.
    pub fn validate(&mut self) -> Result<(), ConnectorError> {
        if self.sync_interval_secs == 0 {
            self.sync_interval_secs = DEFAULT_SYNC_INTERVAL_SECS;
        }

        if self.net.is_empty() {
            return Err(ConnectorError::Config("network should be specified".into()));
        }
        invariant_min_confirmations(self.min_confirmations)?;
        if self.fee_per_byte == 0 {
            return Err(ConnectorError::Config("fee per byte should be positive".into()));
        }
        if self.fee_estimate_horizon == 0 {
            return Err(ConnectorError::Config(
                "fee estimate horizon should be positive".into(),
            ));
        }
        if self.dust_limit.is_negative() || self.optimal_utxo_value <= self.dust_limit {
            return Err(ConnectorError::Config(format!(
                "optimal utxo value {} should exceed dust limit {}",
                self.optimal_utxo_value, self.dust_limit
            )));
        }
        if self.unspent_refresh_interval_secs == 0 || self.report_interval_secs == 0 {
            return Err(ConnectorError::Config("intervals should be positive".into()));
        }
        self.start_block_hash()?;

        Ok(())
    }

    /// Parsed start-up cursor override.
    pub fn start_block_hash(&self) -> Result<Option<BlockHash>, ConnectorError> {
        self.last_synced_block_hash
            .as_deref()
            .map(BlockHash::from_str)
            .transpose()
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>, ConnectorError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ConnectorError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn parse_coins(name: &str, value: &str) -> Result<Amount, ConnectorError> {
    Amount::from_coins_str(value).map_err(|e| ConnectorError::Config(format!("{}: {}", name, e)))
}
