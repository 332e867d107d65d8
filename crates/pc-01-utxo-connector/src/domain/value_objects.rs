//! # Domain Value Objects
//!
//! Immutable value types for the UTXO connector.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::{Amount, SATOSHI_PER_COIN};

use super::errors::ConnectorError;

/// Wallet default account as the daemon names it.
pub const DEFAULT_ACCOUNT: &str = "";

/// Daemon wildcard that aggregates every account.
pub const ALL_ACCOUNTS: &str = "*";

/// Caller-facing alias of [`DEFAULT_ACCOUNT`].
pub const DEFAULT_ALIAS: &str = "default";

/// Caller-facing alias of [`ALL_ACCOUNTS`].
pub const ALL_ALIAS: &str = "all";

/// Map a caller alias to the daemon account name.
pub fn alias_to_account(alias: &str) -> &str {
    match alias {
        DEFAULT_ALIAS => DEFAULT_ACCOUNT,
        ALL_ALIAS => ALL_ACCOUNTS,
        other => other,
    }
}

/// Map a daemon account name to the caller alias.
pub fn account_to_alias(account: &str) -> &str {
    match account {
        DEFAULT_ACCOUNT => DEFAULT_ALIAS,
        ALL_ACCOUNTS => ALL_ALIAS,
        other => other,
    }
}

macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Wrap raw bytes (display order).
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Raw bytes (display order).
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Decode from a byte slice, e.g. a persisted cursor.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, ConnectorError> {
                let array: [u8; 32] = bytes.try_into().map_err(|_| {
                    ConnectorError::InvalidHash(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(array))
            }
        }

        impl FromStr for $name {
            type Err = ConnectorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|e| {
                    ConnectorError::InvalidHash(format!("{}: {}", s, e))
                })?;
                Self::from_slice(&bytes).map_err(|_| {
                    ConnectorError::InvalidHash(format!("{}: expected 64 hex characters", s))
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

hash_newtype!(
    /// Block hash as shown by the daemon.
    BlockHash
);

hash_newtype!(
    /// Transaction id as shown by the daemon.
    TxId
);

impl TxId {
    /// Id of a serialized transaction.
    ///
    /// Double SHA-256 of the transaction without witness data, byte
    /// reversed into display order. Segwit serializations are stripped
    /// first; bytes that do not parse as one are hashed as given.
    pub fn of_raw_tx(raw_tx: &[u8]) -> Self {
        match strip_witness(raw_tx) {
            Some(stripped) => Self::sha256d(&stripped),
            None => Self::sha256d(raw_tx),
        }
    }

    fn sha256d(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&second);
        bytes.reverse();
        Self(bytes)
    }
}

/// Re-serialize a segwit transaction as version, inputs, outputs and
/// locktime. `None` when `raw` carries no marker and flag, or is truncated.
fn strip_witness(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() < 10 || raw[4] != 0x00 || raw[5] != 0x01 {
        return None;
    }

    let mut cursor = RawCursor { raw, pos: 6 };
    let body_start = cursor.pos;

    let inputs = cursor.var_int()?;
    for _ in 0..inputs {
        // Previous outpoint, then script, then sequence.
        cursor.skip(36)?;
        let script = cursor.var_int()?;
        cursor.skip(script)?;
        cursor.skip(4)?;
    }
    let outputs = cursor.var_int()?;
    for _ in 0..outputs {
        cursor.skip(8)?;
        let script = cursor.var_int()?;
        cursor.skip(script)?;
    }
    let body_end = cursor.pos;

    for _ in 0..inputs {
        let items = cursor.var_int()?;
        for _ in 0..items {
            let len = cursor.var_int()?;
            cursor.skip(len)?;
        }
    }
    let locktime = cursor.take(4)?;
    if cursor.pos != raw.len() {
        return None;
    }

    let mut stripped = Vec::with_capacity(4 + (body_end - body_start) + 4);
    stripped.extend_from_slice(&raw[..4]);
    stripped.extend_from_slice(&raw[body_start..body_end]);
    stripped.extend_from_slice(locktime);
    Some(stripped)
}

struct RawCursor<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> RawCursor<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.raw.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn skip(&mut self, len: u64) -> Option<()> {
        self.take(usize::try_from(len).ok()?).map(|_| ())
    }

    fn var_int(&mut self) -> Option<u64> {
        let prefix = self.take(1)?[0];
        let value = match prefix {
            0xfd => u64::from(u16::from_le_bytes(self.take(2)?.try_into().ok()?)),
            0xfe => u64::from(u32::from_le_bytes(self.take(4)?.try_into().ok()?)),
            0xff => u64::from_le_bytes(self.take(8)?.try_into().ok()?),
            n => u64::from(n),
        };
        Some(value)
    }
}

/// Reference to one output of a transaction.
///
/// Ordering is by txid then index, which makes cache iteration deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction holding the output.
    pub tx_id: TxId,
    /// Output index.
    pub vout: u32,
}

impl OutPoint {
    /// Create a new outpoint.
    pub fn new(tx_id: TxId, vout: u32) -> Self {
        Self { tx_id, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.vout)
    }
}

/// Fee rate in satoshi-equivalent units per byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// Bytes in the kilobyte daemons quote fee rates for.
    pub const BYTES_PER_KILOBYTE: u32 = 1024;

    /// Smallest rate accepted from a daemon estimate.
    pub const FLOOR: FeeRate = FeeRate(Decimal::ONE);

    /// Create from a whole sat/byte value.
    pub fn from_sat_per_byte(sat: u64) -> Self {
        Self(Decimal::from(sat))
    }

    /// Convert a daemon estimate given in coins per kilobyte.
    ///
    /// Returns `None` for non-finite or non-positive estimates.
    pub fn from_coins_per_kb(coins_per_kb: f64) -> Option<Self> {
        let coins = Decimal::from_f64(coins_per_kb)?;
        if coins <= Decimal::ZERO {
            return None;
        }
        let sat_per_kb = coins.checked_mul(Decimal::from(SATOSHI_PER_COIN))?;
        Some(Self(sat_per_kb / Decimal::from(Self::BYTES_PER_KILOBYTE)))
    }

    /// Exact rate.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whole sat/byte used by coin selection (fraction truncated).
    pub fn sat_per_byte(&self) -> u64 {
        self.0.trunc().to_u64().unwrap_or(0)
    }

    /// Raise the rate to at least `floor`.
    pub fn at_least(self, floor: FeeRate) -> Self {
        self.max(floor)
    }

    /// Fee for a transaction of `size` bytes, rounded to whole units.
    pub fn fee_for_size(&self, size: u64) -> Amount {
        let fee = (self.0 * Decimal::from(size)).round();
        Amount::from_sat(fee.to_i64().unwrap_or(i64::MAX))
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat/byte", self.0.normalize())
    }
}

/// Mode argument of the smart fee estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateMode {
    /// Estimate that holds over a longer history.
    Conservative,
    /// Estimate reacting faster to recent blocks.
    Economical,
}

impl EstimateMode {
    /// RPC argument value.
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateMode::Conservative => "CONSERVATIVE",
            EstimateMode::Economical => "ECONOMICAL",
        }
    }
}

/// Category of a wallet transaction detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxCategory {
    /// Wallet sent funds.
    Send,
    /// Wallet received funds.
    Receive,
    /// Anything else (generate, immature, orphan, ...).
    Other(String),
}

impl From<&str> for TxCategory {
    fn from(s: &str) -> Self {
        match s {
            "send" => TxCategory::Send,
            "receive" => TxCategory::Receive,
            other => TxCategory::Other(other.to_string()),
        }
    }
}

/// State of the sync cursor relative to the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// The next block exists and has enough confirmations on top.
    Behind,
    /// The cursor block was orphaned by a reorganisation.
    ReorgDetected,
    /// Nothing to process until more blocks arrive.
    CaughtUp,
}

/// What to do when a transaction of a block cannot be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxScanPolicy {
    /// Log a warning, skip the transaction, keep processing the block.
    #[default]
    SkipAndLog,
    /// Abort the cycle without advancing the cursor.
    FailBlock,
}
