//! # Domain Entities
//!
//! Snapshots read from the daemon and results produced by the connector.

use serde::{Deserialize, Serialize};
use shared_types::Amount;

use super::value_objects::{BlockHash, OutPoint, TxCategory, TxId};

/// Unspent output owned by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentInput {
    /// Address the output pays to.
    pub address: String,
    /// Daemon account of the address.
    pub account: String,
    /// Output value.
    pub amount: Amount,
    /// Confirmations of the funding transaction.
    pub confirmations: i64,
    /// Funding transaction.
    pub tx_id: TxId,
    /// Output index in the funding transaction.
    pub vout: u32,
}

impl UnspentInput {
    /// Outpoint spent by this input.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_id, self.vout)
    }
}

/// Verbose block as returned by the daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Block hash.
    pub hash: BlockHash,
    /// Block height.
    pub height: u64,
    /// Confirmations; negative when the block left the main chain.
    pub confirmations: i64,
    /// Next block on the main chain, if any.
    pub next_hash: Option<BlockHash>,
    /// Parent block.
    pub previous_hash: Option<BlockHash>,
    /// Transaction ids, unparsed.
    pub tx: Vec<String>,
}

impl BlockSummary {
    /// Whether the daemon reports the block as orphaned.
    pub fn is_orphaned(&self) -> bool {
        self.confirmations < 0
    }
}

/// One entry of a wallet transaction, per touched address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetail {
    /// Daemon account of the address.
    pub account: String,
    /// Address involved.
    pub address: String,
    /// Signed value, negative for sends.
    pub amount: Amount,
    /// Send, receive or other.
    pub category: TxCategory,
    /// Output index.
    pub vout: u32,
}

/// Wallet view of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    /// Transaction id.
    pub tx_id: TxId,
    /// Net value for the wallet.
    pub amount: Amount,
    /// Fee paid, negative when the wallet paid it.
    pub fee: Amount,
    /// Confirmations.
    pub confirmations: i64,
    /// Per-address entries.
    pub details: Vec<TxDetail>,
}

/// Chain information reported by the daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Network name as the daemon spells it (main, test, regtest).
    pub chain: String,
}

/// Result of asking the daemon to sign a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Serialized transaction.
    pub raw_tx: Vec<u8>,
    /// Whether every input was signed.
    pub complete: bool,
}

/// Answer of the smart fee estimator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartFeeEstimate {
    /// Coins per kilobyte, if the daemon had enough data.
    pub fee_rate: Option<f64>,
    /// Estimator errors.
    pub errors: Vec<String>,
}

/// Output of coin selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinSelection {
    /// Inputs to spend.
    pub selected: Vec<UnspentInput>,
    /// Value returned to the wallet.
    pub change: Amount,
    /// Fee paid to miners.
    pub fee: Amount,
}

impl CoinSelection {
    /// Sum of the selected inputs.
    pub fn total_input(&self) -> Amount {
        self.selected.iter().map(|u| u.amount).sum()
    }
}

/// Unsigned transaction assembled for a payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CraftedTransaction {
    /// Serialized unsigned transaction.
    pub raw_tx: Vec<u8>,
    /// Spent outpoints.
    pub inputs: Vec<OutPoint>,
    /// Change value, zero when no change output was added.
    pub change: Amount,
    /// Fee paid.
    pub fee: Amount,
}

/// Outputs planned by the reorganisation splitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReorganisationPlan {
    /// Output values, all but the last equal the optimal value.
    pub outputs: Vec<Amount>,
    /// Fee paid.
    pub fee: Amount,
}

/// Broadcast reorganisation transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReorganisationOutcome {
    /// Transaction id.
    pub tx_id: TxId,
    /// Number of outputs created.
    pub outputs: usize,
    /// Fee paid.
    pub fee: Amount,
}

/// Summary of one block sync cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    /// Cursor after the cycle.
    pub cursor: BlockHash,
    /// Height of the cursor block.
    pub height: u64,
    /// Blocks fully processed.
    pub blocks_processed: u64,
    /// Payments written.
    pub payments_saved: usize,
    /// Fork block adopted, when a reorganisation was handled.
    pub fork_block: Option<BlockHash>,
}
