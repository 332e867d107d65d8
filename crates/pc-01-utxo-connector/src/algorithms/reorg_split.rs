//! # Reorganisation Output Splitting
//!
//! Splits oversized inputs into outputs of the optimal UTXO value so later
//! coin selection has many similar outputs to choose from.

use shared_types::Amount;

use super::weight::TxWeightEstimator;
use crate::domain::{ConnectorError, ReorganisationPlan, UnspentInput, MIN_REORGANISATION_OUTPUTS};

/// Plan outputs for spending `inputs` into `optimal`-sized outputs.
///
/// Starts with as many whole optimal outputs as fit plus the remainder.
/// The fee is taken from the last output; if that drops it below `dust`
/// the output is removed and the fee recomputed for one output fewer.
/// Fails when fewer than two outputs would remain.
pub fn create_reorganisation_outputs(
    fee_rate_per_byte: u64,
    inputs: &[UnspentInput],
    optimal: Amount,
    dust: Amount,
) -> Result<ReorganisationPlan, ConnectorError> {
    if !optimal.is_positive() {
        return Err(ConnectorError::ReorganisationFailed(
            "optimal output value must be positive".to_string(),
        ));
    }

    let total: Amount = inputs.iter().map(|u| u.amount).sum();
    let whole = total.as_sat() / optimal.as_sat();
    let remainder = total.as_sat() % optimal.as_sat();

    let mut count = usize::try_from(whole).unwrap_or(0) + usize::from(remainder != 0);

    while count >= MIN_REORGANISATION_OUTPUTS {
        let fee = split_fee(inputs.len(), count, fee_rate_per_byte);
        let head = optimal.saturating_mul((count - 1) as u64);
        let last = total - head - fee;

        if last < dust {
            count -= 1;
            continue;
        }

        let mut outputs = vec![optimal; count - 1];
        outputs.push(last);
        return Ok(ReorganisationPlan { outputs, fee });
    }

    Err(ConnectorError::ReorganisationFailed(format!(
        "inputs of {} can't pay for at least {} outputs of {}",
        total, MIN_REORGANISATION_OUTPUTS, optimal
    )))
}

fn split_fee(inputs: usize, outputs: usize, fee_rate_per_byte: u64) -> Amount {
    let mut estimator = TxWeightEstimator::new();
    for _ in 0..inputs {
        estimator.add_p2pkh_input();
    }
    for _ in 0..outputs {
        estimator.add_p2pkh_output();
    }

    let fee = estimator.size().saturating_mul(fee_rate_per_byte);
    Amount::from_sat(i64::try_from(fee).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{invariant_split_balanced, TxId};
    use proptest::prelude::*;

    const OPTIMAL: Amount = Amount::from_sat(100_000);
    const DUST: Amount = Amount::from_sat(546);

    fn inputs(amounts: &[i64]) -> Vec<UnspentInput> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| UnspentInput {
                address: "addr".into(),
                account: String::new(),
                amount: Amount::from_sat(*amount),
                confirmations: 10,
                tx_id: TxId::from_bytes([i as u8; 32]),
                vout: 0,
            })
            .collect()
    }

    fn sats(outputs: &[Amount]) -> Vec<i64> {
        outputs.iter().map(|a| a.as_sat()).collect()
    }

    #[test]
    fn test_fee_taken_from_remainder() {
        let plan = create_reorganisation_outputs(10, &inputs(&[250_000]), OPTIMAL, DUST).unwrap();
        // 1 input, 3 outputs: 261 bytes
        assert_eq!(plan.fee, Amount::from_sat(2_610));
        assert_eq!(sats(&plan.outputs), vec![100_000, 100_000, 47_390]);
    }

    #[test]
    fn test_dust_remainder_is_dropped() {
        let plan = create_reorganisation_outputs(10, &inputs(&[201_000]), OPTIMAL, DUST).unwrap();
        // Remainder of 1000 can't pay 2610; two outputs cost 2270.
        assert_eq!(plan.fee, Amount::from_sat(2_270));
        assert_eq!(sats(&plan.outputs), vec![100_000, 98_730]);
    }

    #[test]
    fn test_exact_multiple() {
        let plan = create_reorganisation_outputs(10, &inputs(&[120_000, 80_000]), OPTIMAL, DUST)
            .unwrap();
        // 2 inputs, 2 outputs: 376 bytes
        assert_eq!(plan.fee, Amount::from_sat(3_760));
        assert_eq!(sats(&plan.outputs), vec![100_000, 96_240]);
    }

    #[test]
    fn test_fails_below_two_outputs() {
        let err = create_reorganisation_outputs(10, &inputs(&[100_500]), OPTIMAL, DUST).unwrap_err();
        assert!(matches!(err, ConnectorError::ReorganisationFailed(_)));

        assert!(create_reorganisation_outputs(10, &inputs(&[]), OPTIMAL, DUST).is_err());
    }

    #[test]
    fn test_rejects_zero_optimal() {
        assert!(create_reorganisation_outputs(1, &inputs(&[10]), Amount::ZERO, DUST).is_err());
    }

    proptest! {
        #[test]
        fn split_conserves_value(
            amounts in prop::collection::vec(1i64..2_000_000, 1..10),
            rate in 0u64..100,
        ) {
            let inputs = inputs(&amounts);
            if let Ok(plan) = create_reorganisation_outputs(rate, &inputs, OPTIMAL, DUST) {
                prop_assert!(invariant_split_balanced(&plan, &inputs, OPTIMAL));
                prop_assert!(*plan.outputs.last().unwrap() >= DUST);
            }
        }
    }
}
