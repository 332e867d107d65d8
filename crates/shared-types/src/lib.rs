//! # Shared Types Crate
//!
//! Payment data model shared by every connector crate.
//!
//! ## Design Principles
//!
//! - **Deterministic identity**: a `PaymentId` is derived from
//!   `(media id, receipt, direction)` only, so observing the same
//!   transaction twice always lands on the same record.
//! - **Fixed direction**: a payment's `PaymentDirection` is set when the
//!   record is created; later updates only touch status and timestamp.
//! - **Tagged details**: `PaymentDetail` is a sum type. Its tag travels next
//!   to the encoded payload so decoding never has to guess.

pub mod amount;
pub mod errors;
pub mod payment;

pub use amount::{Amount, SATOSHI_PER_COIN};
pub use errors::*;
pub use payment::*;
