//! # Pending Tracker
//!
//! Payments still below the confirmation threshold, grouped by account
//! alias. Every refresh replaces the whole index.

use std::collections::HashMap;

use parking_lot::RwLock;
use shared_types::{Amount, Asset, Payment};
use tracing::debug;

use crate::algorithms::pending_payment;
use crate::domain::{ConnectorError, ALL_ALIAS};
use crate::ports::{ChainClient, PaymentStore};

/// In-memory index of pending payments.
pub struct PendingTracker {
    asset: Asset,
    min_confirmations: u32,
    index: RwLock<HashMap<String, Vec<Payment>>>,
}

impl PendingTracker {
    /// Tracker for outputs with fewer than `min_confirmations`.
    pub fn new(asset: Asset, min_confirmations: u32) -> Self {
        Self {
            asset,
            min_confirmations,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the index from the daemon and persist every entry.
    ///
    /// The index is only swapped after all payments were saved; on error
    /// the previous index stays in place.
    pub async fn refresh(
        &self,
        client: &dyn ChainClient,
        store: &dyn PaymentStore,
    ) -> Result<usize, ConnectorError> {
        let max_conf = self.min_confirmations.saturating_sub(1);
        let unspent = client
            .list_unspent_min_max(0, max_conf)
            .await
            .map_err(|e| ConnectorError::chain("list unconfirmed outputs", e))?;

        let mut index: HashMap<String, Vec<Payment>> = HashMap::new();
        for output in &unspent {
            let payment = pending_payment(self.asset, output, self.min_confirmations);
            store
                .save_payment(&payment)
                .await
                .map_err(|e| ConnectorError::storage("save pending payment", e))?;
            index.entry(payment.account.clone()).or_default().push(payment);
        }

        let count = unspent.len();
        *self.index.write() = index;
        debug!("[pc-01] Pending index rebuilt with {} payments", count);
        Ok(count)
    }

    /// Pending payments of `alias`, or of every account for `"all"`.
    pub fn pending(&self, alias: &str) -> Vec<Payment> {
        let index = self.index.read();
        if alias == ALL_ALIAS {
            index.values().flatten().cloned().collect()
        } else {
            index.get(alias).cloned().unwrap_or_default()
        }
    }

    /// Sum of [`Self::pending`].
    pub fn pending_balance(&self, alias: &str) -> Amount {
        let index = self.index.read();
        if alias == ALL_ALIAS {
            index.values().flatten().map(|p| p.amount).sum()
        } else {
            index
                .get(alias)
                .map(|payments| payments.iter().map(|p| p.amount).sum())
                .unwrap_or(Amount::ZERO)
        }
    }
}
