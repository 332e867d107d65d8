//! # Algorithms Module
//!
//! Pure algorithms of the connector: weight estimation, coin selection,
//! output splitting and payment classification.

pub mod classify;
pub mod coin_select;
pub mod reorg_split;
pub mod weight;

pub use classify::{classify_detail, classify_unspent, pending_payment, received_payment};
pub use coin_select::{coin_select, legacy_payment_fee, select_inputs};
pub use reorg_split::create_reorganisation_outputs;
pub use weight::{var_int_size, TxWeightEstimator};
