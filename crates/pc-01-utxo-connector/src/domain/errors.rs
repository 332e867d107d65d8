//! # Domain Errors
//!
//! Error types for the UTXO connector and its ports.

use shared_types::{Amount, PaymentId};
use thiserror::Error;

/// Errors reported by a chain client (daemon RPC adapter).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainClientError {
    /// Transport or daemon side failure.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Requested object is unknown to the daemon (or not a wallet tx).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Daemon response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Errors reported by persistence adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No payment with this id.
    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    /// Storage engine failure.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored data could not be encoded or decoded.
    #[error("Storage codec error: {0}")]
    Codec(String),
}

/// Connector error types.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration rejected at construction.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Daemon call failed.
    #[error("Unable to {context}: {source}")]
    Chain {
        /// What was being attempted.
        context: String,
        /// Underlying daemon error.
        #[source]
        source: ChainClientError,
    },

    /// Persistence call failed.
    #[error("Unable to {context}: {source}")]
    Storage {
        /// What was being attempted.
        context: String,
        /// Underlying storage error.
        #[source]
        source: StorageError,
    },

    /// Coin selection ran out of unspent outputs.
    #[error("Not enough outputs to create transaction, need {needed} only have {available} available")]
    InsufficientFunds {
        /// Amount the selection needed.
        needed: Amount,
        /// Everything the cache held.
        available: Amount,
    },

    /// Address rejected by the network policy.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Amount could not be parsed or is not positive.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Block or transaction hash could not be decoded.
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Daemon serves another network than configured.
    #[error("Networks are different, desired: {desired}, actual: {actual}")]
    NetworkMismatch {
        /// Configured network.
        desired: String,
        /// Network reported by the daemon.
        actual: String,
    },

    /// No parameters are registered for this network.
    #[error("Network '{0}' is invalid or unsupported")]
    UnsupportedNetwork(String),

    /// Daemon could not sign every input.
    #[error("Unable to sign all generated transaction inputs")]
    SigningIncomplete,

    /// Payment does not carry a generated transaction.
    #[error("Unable to get details for payment({0})")]
    MissingTxDetails(PaymentId),

    /// Broadcasting a payment failed; the payment is now `Failed`.
    #[error("Unable to send payment({payment_id}): {source}")]
    Broadcast {
        /// Payment that failed.
        payment_id: PaymentId,
        /// Underlying daemon error.
        #[source]
        source: ChainClientError,
    },

    /// Oversized inputs could not be split.
    #[error("Unable to create reorganisation outputs: {0}")]
    ReorganisationFailed(String),

    /// Operation needs a started connector.
    #[error("Connector is not started")]
    NotStarted,

    /// `start` was called twice.
    #[error("Connector already started")]
    AlreadyStarted,
}

impl ConnectorError {
    /// Wrap a daemon error with what was being attempted.
    pub fn chain(context: impl Into<String>, source: ChainClientError) -> Self {
        Self::Chain {
            context: context.into(),
            source,
        }
    }

    /// Wrap a storage error with what was being attempted.
    pub fn storage(context: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }
}
