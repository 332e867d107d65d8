//! # Payment Entities
//!
//! The record a connector produces for every deposit, withdrawal and
//! internal transfer it observes or creates.
//!
//! ## Lifecycle
//!
//! ```text
//! Waiting ──broadcast ok──→ Pending ──confirmed──→ Completed
//!    └──────broadcast error──→ Failed
//! ```
//!
//! Incoming and internal payments enter the lifecycle directly at
//! `Pending` (seen below the confirmation threshold) or `Completed`.
//! Payments are never deleted.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::Amount;
use crate::errors::DetailCodecError;

/// Assets served by UTXO connectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    /// Bitcoin.
    Btc,
    /// Bitcoin Cash.
    Bch,
    /// Litecoin.
    Ltc,
    /// Dash.
    Dash,
}

impl Asset {
    /// Ticker symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Bch => "BCH",
            Asset::Ltc => "LTC",
            Asset::Dash => "DASH",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Asset::Btc),
            "BCH" => Ok(Asset::Bch),
            "LTC" => Ok(Asset::Ltc),
            "DASH" => Ok(Asset::Dash),
            other => Err(format!("unsupported asset '{}'", other)),
        }
    }
}

/// Transport through which a payment's value moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMedia {
    /// Directly on chain.
    Blockchain,
    /// Off-chain payment channel network.
    Lightning,
}

/// Processing stage of a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Created and signed, waiting to be broadcast.
    Waiting,
    /// Seen by the network but not yet confirmed enough times.
    Pending,
    /// Reached the confirmation threshold.
    Completed,
    /// Broadcast was attempted and failed.
    Failed,
}

impl PaymentStatus {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Re-saving the same status is always allowed (idempotent upserts).
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Waiting, Pending) | (Waiting, Failed) => true,
            (Pending, Completed) => true,
            _ => false,
        }
    }

    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// Direction of a payment relative to the wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentDirection {
    /// Funds received from someone else.
    Incoming,
    /// Funds sent to someone else.
    Outgoing,
    /// Funds moved by the wallet to itself.
    Internal,
}

impl PaymentDirection {
    /// Stable name used in identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentDirection::Incoming => "Incoming",
            PaymentDirection::Outgoing => "Outgoing",
            PaymentDirection::Internal => "Internal",
        }
    }
}

impl fmt::Display for PaymentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic payment identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaymentId(String);

impl PaymentId {
    /// Derive the identifier of a payment.
    ///
    /// Depends only on the media id (txid), the receipt and the direction,
    /// so replaying a block or a wallet detail yields the same id. The
    /// direction keeps the two legs of a wallet-to-itself transfer apart.
    pub fn derive(media_id: &str, receipt: &str, direction: PaymentDirection) -> Self {
        let mut hasher = Sha256::new();
        for part in [media_id, receipt, direction.as_str()] {
            hasher.update(b":");
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Wrap an identifier received from a caller.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed transaction built for an outgoing payment, not yet broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTxDetails {
    /// Serialized signed transaction.
    #[serde(with = "hex_bytes")]
    pub raw_tx: Vec<u8>,
    /// Transaction id of `raw_tx`.
    pub tx_id: String,
}

/// Confirmation progress of a transaction below the threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainPendingDetails {
    /// Confirmations so far.
    pub confirmations: i64,
    /// Confirmations still needed.
    pub confirmations_left: i64,
}

/// Storage tag of a [`PaymentDetail`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DetailKind {
    /// [`PaymentDetail::GeneratedTx`].
    GeneratedTx = 1,
    /// [`PaymentDetail::BlockchainPending`].
    BlockchainPending = 2,
}

impl TryFrom<u8> for DetailKind {
    type Error = DetailCodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(DetailKind::GeneratedTx),
            2 => Ok(DetailKind::BlockchainPending),
            other => Err(DetailCodecError::UnknownKind(other)),
        }
    }
}

/// Additional per-status information attached to a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDetail {
    /// Constructed outgoing transaction.
    GeneratedTx(GeneratedTxDetails),
    /// Sub-threshold incoming or internal transaction.
    BlockchainPending(BlockchainPendingDetails),
}

impl PaymentDetail {
    /// Tag of this variant.
    pub fn kind(&self) -> DetailKind {
        match self {
            PaymentDetail::GeneratedTx(_) => DetailKind::GeneratedTx,
            PaymentDetail::BlockchainPending(_) => DetailKind::BlockchainPending,
        }
    }

    /// Encode into a tag and a JSON payload of the inner struct.
    pub fn encode(&self) -> Result<(DetailKind, Vec<u8>), DetailCodecError> {
        let payload = match self {
            PaymentDetail::GeneratedTx(d) => serde_json::to_vec(d),
            PaymentDetail::BlockchainPending(d) => serde_json::to_vec(d),
        }
        .map_err(|e| DetailCodecError::Payload(e.to_string()))?;

        Ok((self.kind(), payload))
    }

    /// Decode a payload previously produced by [`PaymentDetail::encode`].
    pub fn decode(kind: DetailKind, payload: &[u8]) -> Result<Self, DetailCodecError> {
        let codec_err = |e: serde_json::Error| DetailCodecError::Payload(e.to_string());
        match kind {
            DetailKind::GeneratedTx => serde_json::from_slice(payload)
                .map(PaymentDetail::GeneratedTx)
                .map_err(codec_err),
            DetailKind::BlockchainPending => serde_json::from_slice(payload)
                .map(PaymentDetail::BlockchainPending)
                .map_err(codec_err),
        }
    }
}

/// A deposit, withdrawal or internal transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Deterministic identifier, see [`PaymentId::derive`].
    pub payment_id: PaymentId,
    /// Last update, unix milliseconds.
    pub updated_at: i64,
    /// Processing stage.
    pub status: PaymentStatus,
    /// Fixed at creation.
    pub direction: PaymentDirection,
    /// Address (or invoice) of the receiver.
    pub receipt: String,
    /// Asset moved by the payment.
    pub asset: Asset,
    /// Wallet account alias the payment belongs to.
    pub account: String,
    /// Transport used.
    pub media: PaymentMedia,
    /// Value the receiver gets.
    pub amount: Amount,
    /// Fee taken by the media.
    pub media_fee: Amount,
    /// Identifier inside the media (txid for on-chain payments).
    pub media_id: String,
    /// Status dependent extra information.
    pub detail: Option<PaymentDetail>,
}

impl Payment {
    /// Move to `status` and refresh the update timestamp.
    ///
    /// Direction is left untouched.
    pub fn set_status(&mut self, status: PaymentStatus) {
        self.status = status;
        self.updated_at = now_millis();
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
