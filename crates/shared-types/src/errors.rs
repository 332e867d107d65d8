//! # Error Types
//!
//! Codec errors for the shared payment model.

use thiserror::Error;

/// Errors raised while parsing or converting amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    /// The input is not a decimal number.
    #[error("invalid amount '{0}'")]
    Invalid(String),

    /// The amount has more precision than the smallest unit allows.
    #[error("amount '{0}' has more than 8 decimal places")]
    TooPrecise(String),

    /// The amount does not fit into the satoshi range.
    #[error("amount '{0}' is out of range")]
    OutOfRange(String),

    /// A negative value was given where only positive amounts make sense.
    #[error("amount '{0}' must be positive")]
    NotPositive(String),
}

/// Errors raised by the payment detail codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailCodecError {
    /// The stored tag does not name a known detail kind.
    #[error("unknown detail kind tag {0}")]
    UnknownKind(u8),

    /// The payload could not be serialized or deserialized.
    #[error("detail payload codec failed: {0}")]
    Payload(String),
}
