//! # Payment Classification
//!
//! Maps wallet transaction details and unconfirmed outputs to payments.
//!
//! | Category | Account | Direction |
//! |----------|---------|-----------|
//! | receive  | default | Internal  |
//! | receive  | other   | Incoming  |
//! | send     | any     | Outgoing, only if created by this connector |

use shared_types::{
    now_millis, Amount, Asset, BlockchainPendingDetails, Payment, PaymentDetail,
    PaymentDirection, PaymentId, PaymentMedia, PaymentStatus,
};

use crate::domain::{account_to_alias, TxCategory, TxDetail, TxId, UnspentInput, DEFAULT_ACCOUNT};

/// Direction of a wallet detail, `None` for categories the connector ignores.
///
/// `Outgoing` is only a candidate: a send leg is a payment only when the
/// connector created it, otherwise it is wallet change.
pub fn classify_detail(detail: &TxDetail) -> Option<PaymentDirection> {
    match detail.category {
        TxCategory::Receive if detail.account == DEFAULT_ACCOUNT => {
            Some(PaymentDirection::Internal)
        }
        TxCategory::Receive => Some(PaymentDirection::Incoming),
        TxCategory::Send => Some(PaymentDirection::Outgoing),
        TxCategory::Other(_) => None,
    }
}

/// Direction of an unconfirmed wallet output.
pub fn classify_unspent(unspent: &UnspentInput) -> PaymentDirection {
    if unspent.account == DEFAULT_ACCOUNT {
        PaymentDirection::Internal
    } else {
        PaymentDirection::Incoming
    }
}

/// Completed payment for a received detail of a confirmed transaction.
///
/// Received legs carry no media fee.
pub fn received_payment(
    asset: Asset,
    tx_id: &TxId,
    detail: &TxDetail,
    direction: PaymentDirection,
) -> Payment {
    let media_id = tx_id.to_string();
    Payment {
        payment_id: PaymentId::derive(&media_id, &detail.address, direction),
        updated_at: now_millis(),
        status: PaymentStatus::Completed,
        direction,
        receipt: detail.address.clone(),
        asset,
        account: account_to_alias(&detail.account).to_string(),
        media: PaymentMedia::Blockchain,
        amount: detail.amount,
        media_fee: Amount::ZERO,
        media_id,
        detail: None,
    }
}

/// Pending payment for an output below the confirmation threshold.
pub fn pending_payment(asset: Asset, unspent: &UnspentInput, min_confirmations: u32) -> Payment {
    let direction = classify_unspent(unspent);
    let media_id = unspent.tx_id.to_string();
    Payment {
        payment_id: PaymentId::derive(&media_id, &unspent.address, direction),
        updated_at: now_millis(),
        status: PaymentStatus::Pending,
        direction,
        receipt: unspent.address.clone(),
        asset,
        account: account_to_alias(&unspent.account).to_string(),
        media: PaymentMedia::Blockchain,
        amount: unspent.amount,
        media_fee: Amount::ZERO,
        media_id,
        detail: Some(PaymentDetail::BlockchainPending(BlockchainPendingDetails {
            confirmations: unspent.confirmations,
            confirmations_left: i64::from(min_confirmations) - unspent.confirmations,
        })),
    }
}
