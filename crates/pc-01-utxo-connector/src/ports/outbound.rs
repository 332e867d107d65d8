//! # Outbound Ports
//!
//! Traits for external dependencies: the coin daemon, payment persistence,
//! sync state persistence, network policy and metrics.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use connector_telemetry::Severity;
use parking_lot::{Mutex, MutexGuard};
use shared_types::{Amount, Asset, Payment, PaymentDirection, PaymentId, PaymentMedia, PaymentStatus};

use crate::domain::{
    BlockHash, BlockSummary, ChainClientError, ChainInfo, ConnectorError, EstimateMode, OutPoint,
    SignedTransaction, SmartFeeEstimate, StorageError, TxId, UnspentInput, WalletTransaction,
};

/// Largest confirmation count accepted by the daemon's unspent listing.
pub const MAX_CONFIRMATIONS: u32 = i32::MAX as u32;

/// Coin daemon - outbound port.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network the daemon runs on.
    async fn get_blockchain_info(&self) -> Result<ChainInfo, ChainClientError>;

    /// Hash of the main chain tip.
    async fn get_best_block_hash(&self) -> Result<BlockHash, ChainClientError>;

    /// Block with its transaction ids.
    async fn get_block_verbose(&self, hash: &BlockHash) -> Result<BlockSummary, ChainClientError>;

    /// Unlocked wallet outputs with confirmations in `[min_conf, max_conf]`.
    async fn list_unspent_min_max(
        &self,
        min_conf: u32,
        max_conf: u32,
    ) -> Result<Vec<UnspentInput>, ChainClientError>;

    /// Lock (`unlock = false`) or unlock outputs. Unlocking with no
    /// outpoints releases every lock.
    async fn lock_unspent(&self, unlock: bool, outpoints: &[OutPoint])
        -> Result<(), ChainClientError>;

    /// New address of `account`.
    async fn get_new_address(&self, account: &str) -> Result<String, ChainClientError>;

    /// Addresses of `account`.
    async fn get_addresses_by_account(&self, account: &str)
        -> Result<Vec<String>, ChainClientError>;

    /// Balance of `account` (`"*"` for all) with at least `min_conf`.
    async fn get_balance(&self, account: &str, min_conf: u32) -> Result<Amount, ChainClientError>;

    /// Assemble an unsigned transaction.
    async fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &[(String, Amount)],
    ) -> Result<Vec<u8>, ChainClientError>;

    /// Sign with wallet keys.
    async fn sign_raw_transaction(&self, raw_tx: &[u8])
        -> Result<SignedTransaction, ChainClientError>;

    /// Broadcast a signed transaction.
    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<TxId, ChainClientError>;

    /// Wallet view of a transaction; `NotFound` if it doesn't touch the wallet.
    async fn get_transaction(&self, tx_id: &TxId) -> Result<WalletTransaction, ChainClientError>;

    /// Legacy estimator, coins per kilobyte (negative without data).
    async fn estimate_fee(&self, horizon: u32) -> Result<f64, ChainClientError>;

    /// Mode-qualified estimator.
    async fn estimate_smart_fee(
        &self,
        horizon: u32,
        mode: EstimateMode,
    ) -> Result<SmartFeeEstimate, ChainClientError>;
}

/// Filter for [`PaymentStore::list_payments`]; `None` matches anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    /// Asset to match.
    pub asset: Option<Asset>,
    /// Status to match.
    pub status: Option<PaymentStatus>,
    /// Direction to match.
    pub direction: Option<PaymentDirection>,
    /// Media to match.
    pub media: Option<PaymentMedia>,
}

impl PaymentFilter {
    /// Whether `payment` passes the filter.
    pub fn matches(&self, payment: &Payment) -> bool {
        self.asset.map_or(true, |a| a == payment.asset)
            && self.status.map_or(true, |s| s == payment.status)
            && self.direction.map_or(true, |d| d == payment.direction)
            && self.media.map_or(true, |m| m == payment.media)
    }
}

/// Payment persistence - outbound port.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert or overwrite by payment id.
    async fn save_payment(&self, payment: &Payment) -> Result<(), StorageError>;

    /// Payment by id, `StorageError::NotFound` if unknown.
    async fn payment_by_id(&self, id: &PaymentId) -> Result<Payment, StorageError>;

    /// Payments passing `filter`, most recently updated first.
    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StorageError>;
}

/// Sync state persistence - outbound port.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Persist the cursor.
    async fn put_last_synced_hash(&self, hash: &[u8]) -> Result<(), StorageError>;

    /// Persisted cursor, `None` before the first sync.
    async fn last_synced_hash(&self) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Address and parameter rules of one network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    /// Canonical network name (mainnet, testnet, regtest).
    pub name: String,
    /// Base58 version byte of pay-to-pubkey-hash addresses.
    pub pubkey_hash_addr_id: u8,
    /// Base58 version bytes of pay-to-script-hash addresses.
    pub script_hash_addr_ids: Vec<u8>,
    /// Human readable part of segwit addresses, if the asset has them.
    pub bech32_hrp: Option<String>,
}

/// Network policy - outbound port.
pub trait NetworkPolicy: Send + Sync {
    /// Parameters of `net`, `UnsupportedNetwork` if unknown.
    fn params(&self, net: &str) -> Result<NetworkParams, ConnectorError>;

    /// Check that `address` belongs to `net`.
    fn validate_address(&self, address: &str, net: &str) -> Result<(), ConnectorError>;
}

/// Metrics - outbound port.
///
/// Implementations carry the daemon and asset labels themselves.
pub trait MetricsSink: Send + Sync {
    /// A connector method was called.
    fn add_request(&self, method: &str);

    /// A connector method failed.
    fn add_error(&self, method: &str, severity: Severity);

    /// A connector method finished after `seconds`.
    fn add_request_duration(&self, method: &str, seconds: f64);

    /// Confirmed funds.
    fn current_funds(&self, funds: Amount);

    /// Height of the sync cursor.
    fn block_number(&self, height: u64);

    /// Sum of completed incoming payments.
    fn overall_received(&self, amount: Amount);

    /// Sum of completed outgoing payments.
    fn overall_sent(&self, amount: Amount);

    /// Sum of media fees.
    fn overall_fee(&self, amount: Amount);
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Scripted daemon state behind [`MockChainClient`].
#[derive(Debug)]
pub struct MockChainState {
    /// Reported network.
    pub chain: String,
    /// Known blocks.
    pub blocks: HashMap<BlockHash, BlockSummary>,
    /// Main chain tip.
    pub best_block: Option<BlockHash>,
    /// Wallet transactions.
    pub transactions: HashMap<TxId, WalletTransaction>,
    /// Wallet outputs.
    pub unspent: Vec<UnspentInput>,
    /// Addresses per daemon account.
    pub addresses: HashMap<String, Vec<String>>,
    /// Locked outputs.
    pub locked: BTreeSet<OutPoint>,
    /// Legacy estimator answer.
    pub fee_estimate: Result<f64, ChainClientError>,
    /// Smart estimator answer.
    pub smart_fee: Result<SmartFeeEstimate, ChainClientError>,
    /// Whether signing completes.
    pub sign_complete: bool,
    /// Broadcast failure to return.
    pub send_error: Option<ChainClientError>,
    /// Blocks whose lookup fails with an RPC error.
    pub failing_blocks: HashSet<BlockHash>,
    /// Transactions assembled by `create_raw_transaction`.
    pub created: Vec<(Vec<OutPoint>, Vec<(String, Amount)>)>,
    /// Broadcast transactions.
    pub broadcast: Vec<Vec<u8>>,
    /// Names of the methods called, in order.
    pub calls: Vec<&'static str>,
    next_address: u64,
}

impl Default for MockChainState {
    fn default() -> Self {
        Self {
            chain: "regtest".to_string(),
            blocks: HashMap::new(),
            best_block: None,
            transactions: HashMap::new(),
            unspent: Vec::new(),
            addresses: HashMap::new(),
            locked: BTreeSet::new(),
            fee_estimate: Ok(-1.0),
            smart_fee: Ok(SmartFeeEstimate {
                fee_rate: None,
                errors: vec!["Insufficient data or no feerate found".to_string()],
            }),
            sign_complete: true,
            send_error: None,
            failing_blocks: HashSet::new(),
            created: Vec::new(),
            broadcast: Vec::new(),
            calls: Vec::new(),
            next_address: 0,
        }
    }
}

/// In-memory daemon for tests.
#[derive(Debug, Default)]
pub struct MockChainClient {
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    /// Daemon on `regtest` with an empty wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Daemon reporting `chain` as its network.
    pub fn with_chain(chain: &str) -> Self {
        let mock = Self::default();
        mock.state().chain = chain.to_string();
        mock
    }

    /// Direct access to the scripted state.
    pub fn state(&self) -> MutexGuard<'_, MockChainState> {
        self.state.lock()
    }

    /// Add or replace a block.
    pub fn add_block(&self, block: BlockSummary) {
        self.state().blocks.insert(block.hash, block);
    }

    /// Add or replace a wallet transaction.
    pub fn add_transaction(&self, tx: WalletTransaction) {
        self.state().transactions.insert(tx.tx_id, tx);
    }

    /// Replace the wallet outputs.
    pub fn set_unspent(&self, unspent: Vec<UnspentInput>) {
        self.state().unspent = unspent;
    }

    /// Number of calls of `method` so far.
    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == method).count()
    }

    fn record(&self, method: &'static str) -> MutexGuard<'_, MockChainState> {
        let mut state = self.state.lock();
        state.calls.push(method);
        state
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_blockchain_info(&self) -> Result<ChainInfo, ChainClientError> {
        let state = self.record("get_blockchain_info");
        Ok(ChainInfo {
            chain: state.chain.clone(),
        })
    }

    async fn get_best_block_hash(&self) -> Result<BlockHash, ChainClientError> {
        self.record("get_best_block_hash")
            .best_block
            .ok_or_else(|| ChainClientError::Rpc("no blocks".to_string()))
    }

    async fn get_block_verbose(&self, hash: &BlockHash) -> Result<BlockSummary, ChainClientError> {
        let state = self.record("get_block_verbose");
        if state.failing_blocks.contains(hash) {
            return Err(ChainClientError::Rpc(format!("block {} unavailable", hash)));
        }
        state
            .blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| ChainClientError::NotFound(format!("block {}", hash)))
    }

    async fn list_unspent_min_max(
        &self,
        min_conf: u32,
        max_conf: u32,
    ) -> Result<Vec<UnspentInput>, ChainClientError> {
        let state = self.record("list_unspent_min_max");
        Ok(state
            .unspent
            .iter()
            .filter(|u| u.confirmations >= i64::from(min_conf))
            .filter(|u| u.confirmations <= i64::from(max_conf))
            .filter(|u| !state.locked.contains(&u.outpoint()))
            .cloned()
            .collect())
    }

    async fn lock_unspent(
        &self,
        unlock: bool,
        outpoints: &[OutPoint],
    ) -> Result<(), ChainClientError> {
        let mut state = self.record("lock_unspent");
        match (unlock, outpoints.is_empty()) {
            (true, true) => state.locked.clear(),
            (true, false) => {
                for outpoint in outpoints {
                    state.locked.remove(outpoint);
                }
            }
            (false, _) => state.locked.extend(outpoints.iter().copied()),
        }
        Ok(())
    }

    async fn get_new_address(&self, account: &str) -> Result<String, ChainClientError> {
        let mut state = self.record("get_new_address");
        state.next_address += 1;
        let address = format!("mock-address-{}", state.next_address);
        state
            .addresses
            .entry(account.to_string())
            .or_default()
            .push(address.clone());
        Ok(address)
    }

    async fn get_addresses_by_account(
        &self,
        account: &str,
    ) -> Result<Vec<String>, ChainClientError> {
        let state = self.record("get_addresses_by_account");
        Ok(state.addresses.get(account).cloned().unwrap_or_default())
    }

    async fn get_balance(&self, account: &str, min_conf: u32) -> Result<Amount, ChainClientError> {
        let state = self.record("get_balance");
        Ok(state
            .unspent
            .iter()
            .filter(|u| account == "*" || u.account == account)
            .filter(|u| u.confirmations >= i64::from(min_conf))
            .map(|u| u.amount)
            .sum())
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[OutPoint],
        outputs: &[(String, Amount)],
    ) -> Result<Vec<u8>, ChainClientError> {
        let mut state = self.record("create_raw_transaction");
        state.created.push((inputs.to_vec(), outputs.to_vec()));

        let mut raw = Vec::new();
        for input in inputs {
            raw.extend_from_slice(input.tx_id.as_bytes());
            raw.extend_from_slice(&input.vout.to_le_bytes());
        }
        for (address, amount) in outputs {
            raw.extend_from_slice(&amount.as_sat().to_le_bytes());
            raw.extend_from_slice(address.as_bytes());
        }
        Ok(raw)
    }

    async fn sign_raw_transaction(
        &self,
        raw_tx: &[u8],
    ) -> Result<SignedTransaction, ChainClientError> {
        let state = self.record("sign_raw_transaction");
        Ok(SignedTransaction {
            raw_tx: raw_tx.to_vec(),
            complete: state.sign_complete,
        })
    }

    async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<TxId, ChainClientError> {
        let mut state = self.record("send_raw_transaction");
        if let Some(err) = state.send_error.clone() {
            return Err(err);
        }
        state.broadcast.push(raw_tx.to_vec());
        Ok(TxId::of_raw_tx(raw_tx))
    }

    async fn get_transaction(&self, tx_id: &TxId) -> Result<WalletTransaction, ChainClientError> {
        let state = self.record("get_transaction");
        state
            .transactions
            .get(tx_id)
            .cloned()
            .ok_or_else(|| ChainClientError::NotFound(format!("transaction {}", tx_id)))
    }

    async fn estimate_fee(&self, _horizon: u32) -> Result<f64, ChainClientError> {
        self.record("estimate_fee").fee_estimate.clone()
    }

    async fn estimate_smart_fee(
        &self,
        _horizon: u32,
        _mode: EstimateMode,
    ) -> Result<SmartFeeEstimate, ChainClientError> {
        self.record("estimate_smart_fee").smart_fee.clone()
    }
}
