//! # Coin Selection
//!
//! Greedy selection of unspent outputs under a size-based fee model.
//!
//! ## Algorithm
//!
//! 1. Take outputs in cache order until their sum covers the needed amount.
//! 2. Estimate the size of a transaction spending them with one payment
//!    output and one change output, all P2PKH.
//! 3. If the overshoot does not cover `size * rate`, raise the needed
//!    amount to `target + fee` and select again.
//!
//! The needed amount never decreases between rounds, so every retry either
//! selects more outputs or succeeds; the loop ends once the cache is
//! exhausted.

use shared_types::Amount;

use super::weight::TxWeightEstimator;
use crate::domain::{CoinSelection, ConnectorError, UnspentInput};

/// Take inputs in iteration order until their sum reaches `needed`.
///
/// Returns the selected sum and inputs, or `InsufficientFunds` carrying
/// the total of everything offered.
pub fn select_inputs<'a, I>(
    needed: Amount,
    unspent: I,
) -> Result<(Amount, Vec<UnspentInput>), ConnectorError>
where
    I: IntoIterator<Item = &'a UnspentInput>,
{
    let mut selected = Vec::new();
    let mut total = Amount::ZERO;

    for input in unspent {
        selected.push(input.clone());
        total += input.amount;
        if total >= needed {
            return Ok((total, selected));
        }
    }

    Err(ConnectorError::InsufficientFunds {
        needed,
        available: total,
    })
}

/// Fee of a legacy transaction with `inputs` inputs and two outputs.
pub fn legacy_payment_fee(inputs: usize, fee_rate_per_byte: u64) -> Amount {
    let mut estimator = TxWeightEstimator::new();
    for _ in 0..inputs {
        estimator.add_p2pkh_input();
    }
    // Payment and change.
    estimator.add_p2pkh_output().add_p2pkh_output();

    let fee = estimator.size().saturating_mul(fee_rate_per_byte);
    Amount::from_sat(i64::try_from(fee).unwrap_or(i64::MAX))
}

/// Select inputs paying `target` plus fee at `fee_rate_per_byte`.
pub fn coin_select<'a, I>(
    fee_rate_per_byte: u64,
    target: Amount,
    unspent: I,
) -> Result<CoinSelection, ConnectorError>
where
    I: IntoIterator<Item = &'a UnspentInput> + Clone,
{
    let mut needed = target;
    loop {
        let (total, selected) = select_inputs(needed, unspent.clone())?;

        let fee = legacy_payment_fee(selected.len(), fee_rate_per_byte);
        let overshoot = total - target;

        if overshoot < fee {
            needed = target + fee;
            continue;
        }

        return Ok(CoinSelection {
            selected,
            change: overshoot - fee,
            fee,
        });
    }
}
