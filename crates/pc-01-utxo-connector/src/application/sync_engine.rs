//! # Block Sync Engine
//!
//! Walks the chain forward from a persisted cursor, turning wallet
//! transactions into payments.
//!
//! ## Cycle
//!
//! 1. Re-fetch the cursor block. Negative confirmations mean it was
//!    orphaned: follow `previous_hash` until a main chain block is found
//!    and adopt it as the cursor.
//! 2. While the cursor has at least `min_confirmations + 1`
//!    confirmations and a next block, fetch that block, save a payment
//!    for every relevant wallet detail and only then move the cursor.
//!
//! A failed RPC aborts the cycle with the cursor at the last fully
//! processed block. Payment ids are deterministic, so replaying a block
//! overwrites the same records.

use shared_types::{Asset, Payment, PaymentDirection, PaymentId, PaymentStatus};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::algorithms::{classify_detail, received_payment};
use crate::domain::{
    BlockHash, BlockSummary, ChainClientError, ConnectorError, StorageError, SyncReport,
    SyncState, TxDetail, TxId, TxScanPolicy, WalletTransaction,
};
use crate::ports::{ChainClient, PaymentStore, StateStorage};

/// Where `block` stands for a cursor requiring `min_confirmations`.
pub fn sync_state(block: &BlockSummary, min_confirmations: u32) -> SyncState {
    if block.is_orphaned() {
        SyncState::ReorgDetected
    } else if block.confirmations < i64::from(min_confirmations) + 1 || block.next_hash.is_none()
    {
        SyncState::CaughtUp
    } else {
        SyncState::Behind
    }
}

/// Follow parents of `orphan` until a block on the main chain.
pub async fn find_fork_block(
    client: &dyn ChainClient,
    orphan: BlockSummary,
) -> Result<BlockSummary, ConnectorError> {
    let mut block = orphan;
    while block.is_orphaned() {
        let previous = block.previous_hash.ok_or_else(|| {
            ConnectorError::InvalidHash(format!("orphan block {} has no parent", block.hash))
        })?;
        block = client
            .get_block_verbose(&previous)
            .await
            .map_err(|e| ConnectorError::chain("fetch parent of orphaned block", e))?;
    }
    Ok(block)
}

/// Reorg-aware block traversal.
pub struct SyncEngine {
    asset: Asset,
    min_confirmations: u32,
    policy: TxScanPolicy,
    cursor: Mutex<Option<BlockHash>>,
}

impl SyncEngine {
    /// Engine without a cursor; call [`Self::set_cursor`] before syncing.
    pub fn new(asset: Asset, min_confirmations: u32, policy: TxScanPolicy) -> Self {
        Self {
            asset,
            min_confirmations,
            policy,
            cursor: Mutex::new(None),
        }
    }

    /// Last fully processed block.
    pub async fn cursor(&self) -> Option<BlockHash> {
        *self.cursor.lock().await
    }

    /// Move the cursor without processing anything.
    pub async fn set_cursor(&self, hash: BlockHash) {
        *self.cursor.lock().await = Some(hash);
    }

    /// Run one sync cycle.
    ///
    /// Stops early, without error, once `shutdown` carries `true`.
    pub async fn sync_blocks(
        &self,
        client: &dyn ChainClient,
        payments: &dyn PaymentStore,
        state: &dyn StateStorage,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SyncReport, ConnectorError> {
        let mut cursor_hash = self.cursor.lock().await;
        let start = cursor_hash.ok_or(ConnectorError::NotStarted)?;

        let mut cursor = fetch_block(client, &start).await?;
        let mut fork_block = None;

        if sync_state(&cursor, self.min_confirmations) == SyncState::ReorgDetected {
            info!(block_hash = %cursor.hash, "[pc-01] Chain re-organisation found, handle it...");

            let fork = find_fork_block(client, cursor).await?;
            info!(
                block_hash = %fork.hash,
                height = fork.height,
                "[pc-01] Fork detected, using it as last synced block"
            );

            put_cursor(state, &fork.hash).await?;
            *cursor_hash = Some(fork.hash);
            fork_block = Some(fork.hash);
            cursor = fork;
        }

        let mut blocks_processed = 0;
        let mut payments_saved = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            if sync_state(&cursor, self.min_confirmations) != SyncState::Behind {
                if !cursor.is_orphaned()
                    && cursor.next_hash.is_none()
                    && cursor.confirmations >= i64::from(self.min_confirmations) + 1
                {
                    error!(
                        block_hash = %cursor.hash,
                        "[pc-01] Unable to continue processing block: next hash empty"
                    );
                }
                break;
            }

            let Some(next_hash) = cursor.next_hash else {
                break;
            };
            let block = fetch_block(client, &next_hash).await?;

            payments_saved += self.process_block(client, payments, &block).await?;

            put_cursor(state, &block.hash).await?;
            *cursor_hash = Some(block.hash);
            blocks_processed += 1;

            info!(
                block_hash = %block.hash,
                height = block.height,
                "[pc-01] Processed block"
            );
            cursor = block;
        }

        Ok(SyncReport {
            cursor: cursor.hash,
            height: cursor.height,
            blocks_processed,
            payments_saved,
            fork_block,
        })
    }

    /// Save payments for every wallet transaction of `block`.
    async fn process_block(
        &self,
        client: &dyn ChainClient,
        payments: &dyn PaymentStore,
        block: &BlockSummary,
    ) -> Result<usize, ConnectorError> {
        let mut saved = 0;

        for raw_tx_id in &block.tx {
            let Some(tx) = self.fetch_wallet_tx(client, block, raw_tx_id).await? else {
                continue;
            };

            for detail in &tx.details {
                if let Some(payment) = self.payment_for_detail(payments, &tx, detail).await? {
                    payments
                        .save_payment(&payment)
                        .await
                        .map_err(|e| ConnectorError::storage("save payment", e))?;
                    saved += 1;
                }
            }
        }

        Ok(saved)
    }

    /// Wallet transaction behind `raw_tx_id`, `None` when it is skipped.
    async fn fetch_wallet_tx(
        &self,
        client: &dyn ChainClient,
        block: &BlockSummary,
        raw_tx_id: &str,
    ) -> Result<Option<WalletTransaction>, ConnectorError> {
        let tx_id: TxId = match raw_tx_id.parse() {
            Ok(tx_id) => tx_id,
            Err(e) => return self.skip_or_fail(block, raw_tx_id, e).map(|_| None),
        };

        let tx = match client.get_transaction(&tx_id).await {
            Ok(tx) => tx,
            // Not a wallet transaction.
            Err(ChainClientError::NotFound(_)) => return Ok(None),
            Err(e) => {
                let e = ConnectorError::chain("fetch wallet transaction", e);
                return self.skip_or_fail(block, raw_tx_id, e).map(|_| None);
            }
        };

        if tx.details.is_empty() {
            let e = ConnectorError::InvalidHash(format!("transaction {} has no details", tx_id));
            return self.skip_or_fail(block, raw_tx_id, e).map(|_| None);
        }

        Ok(Some(tx))
    }

    fn skip_or_fail(
        &self,
        block: &BlockSummary,
        raw_tx_id: &str,
        err: ConnectorError,
    ) -> Result<(), ConnectorError> {
        match self.policy {
            TxScanPolicy::SkipAndLog => {
                warn!(
                    block_hash = %block.hash,
                    tx_id = raw_tx_id,
                    "[pc-01] Skipping transaction: {}", err
                );
                Ok(())
            }
            TxScanPolicy::FailBlock => Err(err),
        }
    }

    async fn payment_for_detail(
        &self,
        payments: &dyn PaymentStore,
        tx: &WalletTransaction,
        detail: &TxDetail,
    ) -> Result<Option<Payment>, ConnectorError> {
        match classify_detail(detail) {
            None => Ok(None),
            Some(PaymentDirection::Outgoing) => {
                let id = PaymentId::derive(
                    &tx.tx_id.to_string(),
                    &detail.address,
                    PaymentDirection::Outgoing,
                );
                match payments.payment_by_id(&id).await {
                    Ok(mut payment) => {
                        payment.amount = detail.amount.abs();
                        payment.media_fee = tx.fee.abs();
                        payment.set_status(PaymentStatus::Completed);
                        Ok(Some(payment))
                    }
                    // Not created by the connector: wallet change.
                    Err(StorageError::NotFound(_)) => Ok(None),
                    Err(e) => Err(ConnectorError::storage("look up outgoing payment", e)),
                }
            }
            Some(direction) => Ok(Some(received_payment(
                self.asset, &tx.tx_id, detail, direction,
            ))),
        }
    }
}

async fn fetch_block(
    client: &dyn ChainClient,
    hash: &BlockHash,
) -> Result<BlockSummary, ConnectorError> {
    client
        .get_block_verbose(hash)
        .await
        .map_err(|e| ConnectorError::chain(format!("fetch block {}", hash), e))
}

async fn put_cursor(state: &dyn StateStorage, hash: &BlockHash) -> Result<(), ConnectorError> {
    state
        .put_last_synced_hash(hash.as_bytes())
        .await
        .map_err(|e| ConnectorError::storage("put block hash in db", e))
}
