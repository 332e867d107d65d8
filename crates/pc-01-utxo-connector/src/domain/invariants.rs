//! # Domain Invariants
//!
//! Rules that must always hold true for selections, splits and the
//! confirmation threshold.

use shared_types::Amount;

use super::entities::{CoinSelection, ReorganisationPlan, UnspentInput};
use super::errors::ConnectorError;

/// Default confirmations before a payment is completed.
pub const DEFAULT_MIN_CONFIRMATIONS: u32 = 6;

/// Default fallback fee rate (sat/byte).
pub const DEFAULT_FEE_PER_BYTE: u64 = 20;

/// Blocks the fee estimator targets.
pub const DEFAULT_FEE_ESTIMATE_HORIZON: u32 = 2;

/// Transaction size used by fee estimates for a payment amount.
pub const MEDIAN_TX_SIZE: u64 = 225;

/// Minimum outputs of a reorganisation transaction.
pub const MIN_REORGANISATION_OUTPUTS: usize = 2;

/// Invariant: the confirmation threshold is positive.
pub fn invariant_min_confirmations(min_confirmations: u32) -> Result<(), ConnectorError> {
    if min_confirmations == 0 {
        return Err(ConnectorError::Config(
            "min confirmations shouldn't be less or equal zero".to_string(),
        ));
    }
    Ok(())
}

/// Invariant: selected value = target + change + fee, change non-negative.
pub fn invariant_selection_balanced(selection: &CoinSelection, target: Amount) -> bool {
    !selection.change.is_negative()
        && selection.total_input() == target + selection.change + selection.fee
}

/// Invariant: split outputs plus fee consume the inputs exactly, every
/// output but the last is `optimal`, and at least two outputs exist.
pub fn invariant_split_balanced(
    plan: &ReorganisationPlan,
    inputs: &[UnspentInput],
    optimal: Amount,
) -> bool {
    let total_in: Amount = inputs.iter().map(|u| u.amount).sum();
    let total_out: Amount = plan.outputs.iter().sum();

    let Some((_, head)) = plan.outputs.split_last() else {
        return false;
    };

    plan.outputs.len() >= MIN_REORGANISATION_OUTPUTS
        && total_out + plan.fee == total_in
        && head.iter().all(|o| *o == optimal)
}
