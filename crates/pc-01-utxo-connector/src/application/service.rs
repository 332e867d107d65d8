//! # UTXO Connector Service
//!
//! Wires the daemon, persistence, network and metrics ports into the
//! payment connector API and runs the background loops.
//!
//! ## Lifecycle
//!
//! `start` checks the daemon network, releases stale output locks,
//! restores the sync cursor and spawns three periodic tasks:
//!
//! - block sync, followed by pending refresh and funds report
//! - unspent cache refresh
//! - payment totals report
//!
//! `stop` signals every task through a watch channel and waits for them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connector_telemetry::{log_asset_event, Severity};
use parking_lot::Mutex;
use shared_types::{
    now_millis, Amount, GeneratedTxDetails, Payment, PaymentDetail, PaymentDirection, PaymentId,
    PaymentMedia, PaymentStatus,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::fee_oracle::FeeOracle;
use super::method_metric::{methods, MethodMetric};
use super::pending::PendingTracker;
use super::sync_engine::SyncEngine;
use super::tasks::spawn_periodic;
use super::unspent_cache::{load_unspent, UnspentCache};
use crate::adapters::canonical_network;
use crate::algorithms::{coin_select, create_reorganisation_outputs};
use crate::config::ConnectorConfig;
use crate::domain::{
    alias_to_account, BlockHash, ConnectorError, CraftedTransaction, FeeRate, OutPoint,
    ReorganisationOutcome, SyncReport, TxId, UnspentInput, ALL_ALIAS, DEFAULT_ACCOUNT,
    DEFAULT_ALIAS, MEDIAN_TX_SIZE,
};
use crate::ports::{
    ChainClient, MetricsSink, NetworkParams, NetworkPolicy, PaymentConnectorApi, PaymentFilter,
    PaymentStore, StateStorage,
};

/// Outbound ports of a connector.
#[derive(Clone)]
pub struct ConnectorPorts {
    /// Coin daemon.
    pub client: Arc<dyn ChainClient>,
    /// Payment persistence.
    pub payments: Arc<dyn PaymentStore>,
    /// Sync cursor persistence.
    pub state: Arc<dyn StateStorage>,
    /// Address and network rules.
    pub network: Arc<dyn NetworkPolicy>,
    /// Metrics reporting.
    pub metrics: Arc<dyn MetricsSink>,
}

/// Payment connector for one UTXO asset.
pub struct UtxoConnector {
    config: ConnectorConfig,
    params: NetworkParams,

    client: Arc<dyn ChainClient>,
    payments: Arc<dyn PaymentStore>,
    state: Arc<dyn StateStorage>,
    network: Arc<dyn NetworkPolicy>,
    metrics: Arc<dyn MetricsSink>,

    fee_oracle: FeeOracle,
    unspent: UnspentCache,
    pending: PendingTracker,
    sync: SyncEngine,

    started: AtomicBool,
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UtxoConnector {
    /// Validate `config` and resolve its network.
    pub fn new(mut config: ConnectorConfig, ports: ConnectorPorts) -> Result<Self, ConnectorError> {
        config.validate()?;
        let params = ports.network.params(&config.net)?;

        info!("[pc-01] Initializing UTXO Connector");
        info!("  Asset: {}", config.asset);
        info!("  Network: {}", params.name);
        info!("  Min Confirmations: {}", config.min_confirmations);
        info!("  Sync Interval: {}s", config.sync_interval_secs);

        let fee_oracle = FeeOracle::new(
            config.asset,
            &params.name,
            config.fee_per_byte,
            config.fee_estimate_horizon,
        );
        let pending = PendingTracker::new(config.asset, config.min_confirmations);
        let sync = SyncEngine::new(config.asset, config.min_confirmations, config.tx_scan_policy);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            params,
            client: ports.client,
            payments: ports.payments,
            state: ports.state,
            network: ports.network,
            metrics: ports.metrics,
            fee_oracle,
            unspent: UnspentCache::new(),
            pending,
            sync,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Parameters of the configured network.
    pub fn network_params(&self) -> &NetworkParams {
        &self.params
    }

    /// Last fully processed block.
    pub async fn cursor(&self) -> Option<BlockHash> {
        self.sync.cursor().await
    }

    /// Whether the background tasks are running.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Bootstrap against the daemon and spawn the background tasks.
    pub async fn start(self: &Arc<Self>) -> Result<(), ConnectorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("[pc-01] Connector already started");
            return Err(ConnectorError::AlreadyStarted);
        }

        info!("[pc-01] Starting UTXO connector");
        if let Err(e) = self.bootstrap().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut tasks = self.tasks.lock();

        let this = Arc::clone(self);
        tasks.push(spawn_periodic(
            "sync",
            Duration::from_secs(self.config.sync_interval_secs),
            self.shutdown_tx.subscribe(),
            move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(e) = this.sync_once().await {
                        error!("[pc-01] Unable to sync: {}", e);
                    }
                }
            },
        ));

        let this = Arc::clone(self);
        tasks.push(spawn_periodic(
            "unspent refresh",
            Duration::from_secs(self.config.unspent_refresh_interval_secs),
            self.shutdown_tx.subscribe(),
            move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(e) = this.refresh_unspent().await {
                        error!("[pc-01] Unable to refresh unspent outputs: {}", e);
                    }
                }
            },
        ));

        let this = Arc::clone(self);
        tasks.push(spawn_periodic(
            "metrics report",
            Duration::from_secs(self.config.report_interval_secs),
            self.shutdown_tx.subscribe(),
            move || {
                let this = Arc::clone(&this);
                async move {
                    if let Err(e) = this.report_metrics().await {
                        error!("[pc-01] Unable to report metrics: {}", e);
                    }
                }
            },
        ));

        info!("[pc-01] UTXO connector started");
        Ok(())
    }

    async fn bootstrap(&self) -> Result<(), ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::START);
        let client = &*self.client;

        let info = client.get_blockchain_info().await.map_err(|e| {
            metric.add_error(Severity::High);
            ConnectorError::chain("get blockchain info", e)
        })?;
        let actual = canonical_network(&info.chain);
        if actual != self.params.name {
            metric.add_error(Severity::High);
            return Err(ConnectorError::NetworkMismatch {
                desired: self.params.name.clone(),
                actual: info.chain,
            });
        }

        // Locks left by a previous run would hide outputs from selection.
        client.lock_unspent(true, &[]).await.map_err(|e| {
            metric.add_error(Severity::High);
            ConnectorError::chain("release locked outputs", e)
        })?;

        let cursor = self.initial_cursor().await.inspect_err(|_| {
            metric.add_error(Severity::High);
        })?;
        info!(block_hash = %cursor, "[pc-01] Last synced block");
        self.sync.set_cursor(cursor).await;

        let addresses = client
            .get_addresses_by_account(DEFAULT_ACCOUNT)
            .await
            .map_err(|e| {
                metric.add_error(Severity::High);
                ConnectorError::chain("get default account addresses", e)
            })?;
        if addresses.is_empty() {
            let address = client.get_new_address(DEFAULT_ACCOUNT).await.map_err(|e| {
                metric.add_error(Severity::High);
                ConnectorError::chain("create default address", e)
            })?;
            info!("[pc-01] Created default address {}", address);
        }

        Ok(())
    }

    /// Configured override, then the stored cursor, then the chain tip.
    async fn initial_cursor(&self) -> Result<BlockHash, ConnectorError> {
        if let Some(hash) = self.config.start_block_hash()? {
            return Ok(hash);
        }

        let stored = self
            .state
            .last_synced_hash()
            .await
            .map_err(|e| ConnectorError::storage("get last synced block hash", e))?;
        if let Some(bytes) = stored {
            return BlockHash::from_slice(&bytes);
        }

        let best = self
            .client
            .get_best_block_hash()
            .await
            .map_err(|e| ConnectorError::chain("get best block hash", e))?;
        self.state
            .put_last_synced_hash(best.as_bytes())
            .await
            .map_err(|e| ConnectorError::storage("put block hash in db", e))?;
        Ok(best)
    }

    /// Signal the background tasks and wait for them to finish.
    pub async fn stop(&self, reason: &str) -> Result<(), ConnectorError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ConnectorError::NotStarted);
        }
        if self.stopped.swap(true, Ordering::SeqCst) {
            warn!("[pc-01] Connector already stopped");
            return Ok(());
        }

        info!("[pc-01] Stopping UTXO connector: {}", reason);
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("[pc-01] Background task failed: {}", e);
            }
        }

        info!("[pc-01] UTXO connector stopped");
        Ok(())
    }

    /// Sync blocks, refresh pending payments and report funds.
    pub async fn sync_once(&self) -> Result<SyncReport, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::SYNC);
        let shutdown = self.shutdown_tx.subscribe();

        let report = self
            .sync
            .sync_blocks(&*self.client, &*self.payments, &*self.state, &shutdown)
            .await
            .inspect_err(|_| metric.add_error(Severity::Middle))?;

        self.pending
            .refresh(&*self.client, &*self.payments)
            .await
            .inspect_err(|_| metric.add_error(Severity::Middle))?;

        let funds = self
            .client
            .get_balance(alias_to_account(ALL_ALIAS), self.config.min_confirmations)
            .await
            .map_err(|e| {
                metric.add_error(Severity::Middle);
                ConnectorError::chain("get available funds", e)
            })?;

        log_asset_event!(
            info,
            self.config.asset,
            "[pc-01] Available funds on blockchain",
            funds = %funds
        );
        self.metrics.current_funds(funds);
        self.metrics.block_number(report.height);

        Ok(report)
    }

    /// Reload the unspent cache from the daemon.
    pub async fn refresh_unspent(&self) -> Result<usize, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::SYNC_UNSPENT);
        self.unspent
            .refresh(&*self.client, self.config.min_confirmations)
            .await
            .inspect_err(|_| metric.add_error(Severity::Middle))
    }

    /// Report totals of completed on-chain payments.
    pub async fn report_metrics(&self) -> Result<(), ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::REPORT_METRICS);

        let filter = PaymentFilter {
            asset: Some(self.config.asset),
            status: Some(PaymentStatus::Completed),
            media: Some(PaymentMedia::Blockchain),
            ..Default::default()
        };
        let payments = self.payments.list_payments(&filter).await.map_err(|e| {
            metric.add_error(Severity::Middle);
            ConnectorError::storage("list completed payments", e)
        })?;

        let mut received = Amount::ZERO;
        let mut sent = Amount::ZERO;
        let mut fee = Amount::ZERO;
        for payment in &payments {
            match payment.direction {
                PaymentDirection::Incoming => received += payment.amount,
                PaymentDirection::Outgoing => {
                    sent += payment.amount;
                    fee += payment.media_fee;
                }
                PaymentDirection::Internal => fee += payment.media_fee,
            }
        }

        self.metrics.overall_received(received);
        self.metrics.overall_sent(sent);
        self.metrics.overall_fee(fee);
        Ok(())
    }

    /// Select inputs, lock them at the daemon and build an unsigned
    /// transaction paying `amount` to `address`.
    ///
    /// Spent outputs are evicted from the cache right away.
    pub async fn craft_transaction(
        &self,
        address: &str,
        amount: Amount,
        fee_rate: FeeRate,
    ) -> Result<CraftedTransaction, ConnectorError> {
        let client = &*self.client;
        let mut cache = self.unspent.lock().await;
        if cache.is_empty() {
            load_unspent(&mut cache, client, self.config.min_confirmations).await?;
        }

        let selection = coin_select(fee_rate.sat_per_byte(), amount, cache.iter())?;
        let inputs: Vec<OutPoint> = selection.selected.iter().map(UnspentInput::outpoint).collect();

        client
            .lock_unspent(false, &inputs)
            .await
            .map_err(|e| ConnectorError::chain("lock selected outputs", e))?;

        let mut outputs = vec![(address.to_string(), amount)];
        let built = async {
            if selection.change.is_positive() {
                let change_address = client
                    .get_new_address(DEFAULT_ACCOUNT)
                    .await
                    .map_err(|e| ConnectorError::chain("create change address", e))?;
                outputs.push((change_address, selection.change));
            }
            client
                .create_raw_transaction(&inputs, &outputs)
                .await
                .map_err(|e| ConnectorError::chain("create raw transaction", e))
        }
        .await;

        let raw_tx = match built {
            Ok(raw_tx) => raw_tx,
            Err(e) => {
                self.release_inputs(&inputs).await;
                return Err(e);
            }
        };

        cache.evict(&inputs);

        Ok(CraftedTransaction {
            raw_tx,
            inputs,
            change: selection.change,
            fee: selection.fee,
        })
    }

    async fn release_inputs(&self, inputs: &[OutPoint]) {
        if let Err(e) = self.client.lock_unspent(true, inputs).await {
            error!("[pc-01] Unable to unlock {} outputs: {}", inputs.len(), e);
        }
    }

    /// Give back the inputs of a transaction that will never be sent:
    /// unlock them at the daemon and reload the cache so they can be
    /// selected again.
    async fn abandon_crafted(&self, crafted: &CraftedTransaction) {
        self.release_inputs(&crafted.inputs).await;

        let mut cache = self.unspent.lock().await;
        if let Err(e) =
            load_unspent(&mut cache, &*self.client, self.config.min_confirmations).await
        {
            warn!("[pc-01] Unable to reload unspent outputs: {}", e);
        }
    }

    /// Split cached outputs worth at least twice the optimal value into
    /// outputs of the optimal value, and broadcast the result.
    ///
    /// Returns `None` when no output is oversized.
    pub async fn reorganise_unspent(
        &self,
    ) -> Result<Option<ReorganisationOutcome>, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::REORGANISE_UNSPENT);
        let client = &*self.client;
        let optimal = self.config.optimal_utxo_value;

        let mut cache = self.unspent.lock().await;
        if cache.is_empty() {
            load_unspent(&mut cache, client, self.config.min_confirmations)
                .await
                .inspect_err(|_| metric.add_error(Severity::Middle))?;
        }

        let oversized: Vec<UnspentInput> = cache
            .iter()
            .filter(|u| u.amount >= optimal.saturating_mul(2))
            .cloned()
            .collect();
        if oversized.is_empty() {
            return Ok(None);
        }

        let fee_rate = self.fee_oracle.fee_rate(client, &metric).await;
        let plan = create_reorganisation_outputs(
            fee_rate.sat_per_byte(),
            &oversized,
            optimal,
            self.config.dust_limit,
        )
        .inspect_err(|_| metric.add_error(Severity::Middle))?;

        let inputs: Vec<OutPoint> = oversized.iter().map(UnspentInput::outpoint).collect();
        client.lock_unspent(false, &inputs).await.map_err(|e| {
            metric.add_error(Severity::High);
            ConnectorError::chain("lock reorganised outputs", e)
        })?;

        let broadcast = async {
            let mut outputs = Vec::with_capacity(plan.outputs.len());
            for amount in &plan.outputs {
                let address = client
                    .get_new_address(DEFAULT_ACCOUNT)
                    .await
                    .map_err(|e| ConnectorError::chain("create reorganisation address", e))?;
                outputs.push((address, *amount));
            }

            let raw_tx = client
                .create_raw_transaction(&inputs, &outputs)
                .await
                .map_err(|e| ConnectorError::chain("create reorganisation transaction", e))?;
            let signed = client
                .sign_raw_transaction(&raw_tx)
                .await
                .map_err(|e| ConnectorError::chain("sign reorganisation transaction", e))?;
            if !signed.complete {
                return Err(ConnectorError::SigningIncomplete);
            }
            client
                .send_raw_transaction(&signed.raw_tx)
                .await
                .map_err(|e| ConnectorError::chain("send reorganisation transaction", e))
        }
        .await;

        let tx_id = match broadcast {
            Ok(tx_id) => tx_id,
            Err(e) => {
                metric.add_error(Severity::High);
                self.release_inputs(&inputs).await;
                return Err(e);
            }
        };

        cache.evict(&inputs);
        info!(
            tx_id = %tx_id,
            inputs = inputs.len(),
            outputs = plan.outputs.len(),
            "[pc-01] Reorganised unspent outputs"
        );

        Ok(Some(ReorganisationOutcome {
            tx_id,
            outputs: plan.outputs.len(),
            fee: plan.fee,
        }))
    }

    fn parse_amount(amount: &str) -> Result<Amount, ConnectorError> {
        let parsed =
            Amount::from_coins_str(amount).map_err(|e| ConnectorError::InvalidAmount(e.to_string()))?;
        if !parsed.is_positive() {
            return Err(ConnectorError::InvalidAmount(format!(
                "amount {} should be positive",
                amount
            )));
        }
        Ok(parsed)
    }

    async fn save_failed(&self, payment: &mut Payment, metric: &MethodMetric) {
        payment.set_status(PaymentStatus::Failed);
        if let Err(e) = self.payments.save_payment(payment).await {
            error!(
                payment_id = %payment.payment_id,
                "[pc-01] Unable to save failed payment: {}", e
            );
            metric.add_error(Severity::High);
        }
    }
}

#[async_trait]
impl PaymentConnectorApi for UtxoConnector {
    async fn account_address(&self, account: &str) -> Result<String, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::ACCOUNT_ADDRESS);

        let addresses = self
            .client
            .get_addresses_by_account(alias_to_account(account))
            .await
            .map_err(|e| {
                metric.add_error(Severity::Middle);
                ConnectorError::chain("get account addresses", e)
            })?;

        Ok(addresses.into_iter().next().unwrap_or_default())
    }

    async fn create_address(&self, account: &str) -> Result<String, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::CREATE_ADDRESS);

        self.client
            .get_new_address(alias_to_account(account))
            .await
            .map_err(|e| {
                metric.add_error(Severity::High);
                ConnectorError::chain("create address", e)
            })
    }

    async fn pending_transactions(&self, account: &str) -> Result<Vec<Payment>, ConnectorError> {
        let _metric = MethodMetric::new(self.metrics.clone(), methods::PENDING_TRANSACTIONS);
        Ok(self.pending.pending(account))
    }

    async fn create_payment(
        &self,
        address: &str,
        amount: &str,
    ) -> Result<Payment, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::CREATE_PAYMENT);
        let client = &*self.client;

        self.network
            .validate_address(address, &self.params.name)
            .inspect_err(|_| metric.add_error(Severity::Low))?;
        let amount = Self::parse_amount(amount).inspect_err(|_| metric.add_error(Severity::Low))?;

        let fee_rate = self.fee_oracle.fee_rate(client, &metric).await;
        let crafted = self
            .craft_transaction(address, amount, fee_rate)
            .await
            .inspect_err(|_| metric.add_error(Severity::High))?;

        let signed = match client.sign_raw_transaction(&crafted.raw_tx).await {
            Ok(signed) if signed.complete => signed,
            Ok(_) => {
                metric.add_error(Severity::High);
                self.abandon_crafted(&crafted).await;
                return Err(ConnectorError::SigningIncomplete);
            }
            Err(e) => {
                metric.add_error(Severity::High);
                self.abandon_crafted(&crafted).await;
                return Err(ConnectorError::chain("sign generated transaction", e));
            }
        };

        let tx_id = TxId::of_raw_tx(&signed.raw_tx).to_string();
        let payment = Payment {
            payment_id: PaymentId::derive(&tx_id, address, PaymentDirection::Outgoing),
            updated_at: now_millis(),
            status: PaymentStatus::Waiting,
            direction: PaymentDirection::Outgoing,
            receipt: address.to_string(),
            asset: self.config.asset,
            account: DEFAULT_ALIAS.to_string(),
            media: PaymentMedia::Blockchain,
            amount,
            media_fee: crafted.fee,
            media_id: tx_id.clone(),
            detail: Some(PaymentDetail::GeneratedTx(GeneratedTxDetails {
                raw_tx: signed.raw_tx,
                tx_id,
            })),
        };

        if let Err(e) = self.payments.save_payment(&payment).await {
            metric.add_error(Severity::High);
            self.abandon_crafted(&crafted).await;
            return Err(ConnectorError::storage("save generated payment", e));
        }

        info!(
            payment_id = %payment.payment_id,
            fee = %payment.media_fee,
            "[pc-01] Created payment of {} to {}", payment.amount, payment.receipt
        );
        Ok(payment)
    }

    async fn send_payment(&self, payment_id: &PaymentId) -> Result<Payment, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::SEND_PAYMENT);

        let mut payment = self.payments.payment_by_id(payment_id).await.map_err(|e| {
            metric.add_error(Severity::High);
            ConnectorError::storage("get payment", e)
        })?;

        let raw_tx = match &payment.detail {
            Some(PaymentDetail::GeneratedTx(details)) => details.raw_tx.clone(),
            _ => {
                metric.add_error(Severity::High);
                return Err(ConnectorError::MissingTxDetails(payment_id.clone()));
            }
        };

        if let Err(source) = self.client.send_raw_transaction(&raw_tx).await {
            self.save_failed(&mut payment, &metric).await;
            metric.add_error(Severity::High);
            return Err(ConnectorError::Broadcast {
                payment_id: payment_id.clone(),
                source,
            });
        }

        payment.set_status(PaymentStatus::Pending);
        if let Err(e) = self.payments.save_payment(&payment).await {
            // Already broadcast; the next sync completes the record.
            error!(
                payment_id = %payment.payment_id,
                "[pc-01] Unable to save sent payment: {}", e
            );
            metric.add_error(Severity::High);
        }

        info!(payment_id = %payment.payment_id, "[pc-01] Payment sent");
        Ok(payment)
    }

    async fn confirmed_balance(&self, account: &str) -> Result<Amount, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::CONFIRMED_BALANCE);

        self.client
            .get_balance(alias_to_account(account), self.config.min_confirmations)
            .await
            .map_err(|e| {
                metric.add_error(Severity::Middle);
                ConnectorError::chain("get confirmed balance", e)
            })
    }

    async fn pending_balance(&self, account: &str) -> Result<Amount, ConnectorError> {
        let _metric = MethodMetric::new(self.metrics.clone(), methods::PENDING_BALANCE);
        Ok(self.pending.pending_balance(account))
    }

    async fn estimate_fee(&self, amount: &str) -> Result<Amount, ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::ESTIMATE_FEE);

        // The estimate is for a median sized transaction whatever the amount.
        Self::parse_amount(amount).inspect_err(|_| metric.add_error(Severity::Low))?;

        let fee_rate = self.fee_oracle.fee_rate(&*self.client, &metric).await;
        Ok(fee_rate.fee_for_size(MEDIAN_TX_SIZE))
    }

    fn validate_address(&self, address: &str) -> Result<(), ConnectorError> {
        let metric = MethodMetric::new(self.metrics.clone(), methods::VALIDATE_ADDRESS);
        self.network
            .validate_address(address, &self.params.name)
            .inspect_err(|_| metric.add_error(Severity::Low))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryPaymentStore, InMemoryStateStorage, NetworkRegistry, RecordingMetrics,
    };
    use crate::algorithms::legacy_payment_fee;
    use crate::domain::{BlockSummary, ChainClientError, SmartFeeEstimate};
    use crate::ports::MockChainClient;
    use shared_types::Asset;

    const SEGWIT: &str = "bcrt1qar0srrr7xfkvy5l643lydnw9re59gtzzxxk9p6";
    const P2PKH: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";

    struct Harness {
        client: Arc<MockChainClient>,
        payments: Arc<InMemoryPaymentStore>,
        state: Arc<InMemoryStateStorage>,
        metrics: Arc<RecordingMetrics>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                client: Arc::new(MockChainClient::new()),
                payments: Arc::new(InMemoryPaymentStore::new()),
                state: Arc::new(InMemoryStateStorage::new()),
                metrics: Arc::new(RecordingMetrics::new()),
            }
        }

        fn ports(&self) -> ConnectorPorts {
            ConnectorPorts {
                client: self.client.clone(),
                payments: self.payments.clone(),
                state: self.state.clone(),
                network: Arc::new(NetworkRegistry::for_asset(Asset::Btc)),
                metrics: self.metrics.clone(),
            }
        }

        fn connector(&self) -> Arc<UtxoConnector> {
            self.connector_with(ConnectorConfig::for_testing())
        }

        fn connector_with(&self, config: ConnectorConfig) -> Arc<UtxoConnector> {
            Arc::new(UtxoConnector::new(config, self.ports()).unwrap())
        }

        fn add_tip(&self, n: u8) -> BlockHash {
            let hash = BlockHash::from_bytes([n; 32]);
            self.client.add_block(BlockSummary {
                hash,
                height: u64::from(n),
                confirmations: 1,
                next_hash: None,
                previous_hash: None,
                tx: vec![],
            });
            self.client.state().best_block = Some(hash);
            hash
        }
    }

    fn unspent(seed: u8, amount: i64, confirmations: i64) -> UnspentInput {
        UnspentInput {
            address: format!("wallet-{}", seed),
            account: String::new(),
            amount: Amount::from_sat(amount),
            confirmations,
            tx_id: TxId::from_bytes([seed; 32]),
            vout: 0,
        }
    }

    fn completed(id: &str, direction: PaymentDirection, amount: i64, fee: i64) -> Payment {
        Payment {
            payment_id: PaymentId::new(id),
            updated_at: 1,
            status: PaymentStatus::Completed,
            direction,
            receipt: "addr".into(),
            asset: Asset::Btc,
            account: "default".into(),
            media: PaymentMedia::Blockchain,
            amount: Amount::from_sat(amount),
            media_fee: Amount::from_sat(fee),
            media_id: id.into(),
            detail: None,
        }
    }

    #[test]
    fn test_new_rejects_unknown_network() {
        let h = Harness::new();
        let config = ConnectorConfig {
            net: "signet".into(),
            ..ConnectorConfig::for_testing()
        };
        assert!(matches!(
            UtxoConnector::new(config, h.ports()),
            Err(ConnectorError::UnsupportedNetwork(_))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_network_mismatch() {
        let h = Harness::new();
        h.client.state().chain = "main".into();
        let connector = h.connector();

        let err = connector.start().await.unwrap_err();
        assert!(matches!(err, ConnectorError::NetworkMismatch { .. }));
        assert_eq!(h.metrics.errors_of(methods::START), vec![Severity::High]);
        assert!(!connector.is_running());
    }

    #[tokio::test]
    async fn test_start_bootstraps_from_chain_tip() {
        let h = Harness::new();
        let tip = h.add_tip(7);
        let stale = OutPoint::new(TxId::from_bytes([1; 32]), 0);
        h.client.state().locked.insert(stale);
        let connector = h.connector();

        connector.start().await.unwrap();

        assert_eq!(connector.cursor().await, Some(tip));
        assert_eq!(
            h.state.last_synced_hash().await.unwrap(),
            Some(tip.as_bytes().to_vec())
        );
        assert!(h.client.state().locked.is_empty());
        assert_eq!(h.client.state().addresses[DEFAULT_ACCOUNT].len(), 1);

        connector.stop("test").await.unwrap();
        assert!(!connector.is_running());
    }

    #[tokio::test]
    async fn test_start_prefers_stored_cursor_and_config_override() {
        let h = Harness::new();
        h.add_tip(9);
        let stored = BlockHash::from_bytes([3; 32]);
        h.state.put_last_synced_hash(stored.as_bytes()).await.unwrap();

        let connector = h.connector();
        connector.start().await.unwrap();
        assert_eq!(connector.cursor().await, Some(stored));
        connector.stop("test").await.unwrap();

        let configured = BlockHash::from_bytes([4; 32]);
        let connector = h.connector_with(ConnectorConfig {
            last_synced_block_hash: Some(configured.to_string()),
            ..ConnectorConfig::for_testing()
        });
        connector.start().await.unwrap();
        assert_eq!(connector.cursor().await, Some(configured));
        connector.stop("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_guards() {
        let h = Harness::new();
        h.add_tip(1);
        let connector = h.connector();

        assert!(matches!(
            connector.stop("early").await,
            Err(ConnectorError::NotStarted)
        ));

        connector.start().await.unwrap();
        assert!(matches!(
            connector.start().await,
            Err(ConnectorError::AlreadyStarted)
        ));

        connector.stop("first").await.unwrap();
        connector.stop("second").await.unwrap();
    }

    #[tokio::test]
    async fn test_background_tasks_sync_and_report() {
        let h = Harness::new();
        h.add_tip(5);
        h.client.set_unspent(vec![unspent(1, 300_000, 3)]);
        let connector = h.connector();

        connector.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        connector.stop("test").await.unwrap();

        let recorded = h.metrics.snapshot();
        assert_eq!(recorded.block_number, Some(5));
        assert_eq!(recorded.current_funds, Some(Amount::from_sat(300_000)));
        assert_eq!(recorded.overall_received, Some(Amount::ZERO));
        assert!(h.metrics.requests_of(methods::SYNC_UNSPENT) >= 1);
    }

    #[tokio::test]
    async fn test_create_and_send_payment() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 1_000_000, 5)]);
        let connector = h.connector();

        let payment = connector.create_payment(SEGWIT, "0.005").await.unwrap();

        let fee = legacy_payment_fee(1, 10);
        assert_eq!(payment.status, PaymentStatus::Waiting);
        assert_eq!(payment.direction, PaymentDirection::Outgoing);
        assert_eq!(payment.account, "default");
        assert_eq!(payment.amount, Amount::from_sat(500_000));
        assert_eq!(payment.media_fee, fee);
        let Some(PaymentDetail::GeneratedTx(details)) = &payment.detail else {
            panic!("expected generated tx details");
        };
        assert_eq!(details.tx_id, payment.media_id);
        assert_eq!(TxId::of_raw_tx(&details.raw_tx).to_string(), payment.media_id);

        {
            let state = h.client.state();
            let (inputs, outputs) = &state.created[0];
            assert_eq!(inputs, &vec![OutPoint::new(TxId::from_bytes([1; 32]), 0)]);
            assert_eq!(outputs[0], (SEGWIT.to_string(), Amount::from_sat(500_000)));
            assert_eq!(outputs[1].1, Amount::from_sat(1_000_000 - 500_000) - fee);
            assert!(state.locked.contains(&inputs[0]));
        }

        let sent = connector.send_payment(&payment.payment_id).await.unwrap();
        assert_eq!(sent.status, PaymentStatus::Pending);
        let stored = h.payments.payment_by_id(&payment.payment_id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(h.client.state().broadcast.len(), 1);
    }

    #[tokio::test]
    async fn test_create_payment_rejects_bad_input() {
        let h = Harness::new();
        let connector = h.connector();

        assert!(matches!(
            connector.create_payment("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "0.1").await,
            Err(ConnectorError::InvalidAddress(_))
        ));
        assert!(matches!(
            connector.create_payment(P2PKH, "abc").await,
            Err(ConnectorError::InvalidAmount(_))
        ));
        assert!(matches!(
            connector.create_payment(P2PKH, "0").await,
            Err(ConnectorError::InvalidAmount(_))
        ));
        assert_eq!(
            h.metrics.errors_of(methods::CREATE_PAYMENT),
            vec![Severity::Low; 3]
        );
    }

    #[tokio::test]
    async fn test_create_payment_insufficient_funds() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 10_000, 5)]);
        let connector = h.connector();

        let err = connector.create_payment(P2PKH, "1").await.unwrap_err();
        assert!(matches!(err, ConnectorError::InsufficientFunds { .. }));
        assert!(h.client.state().locked.is_empty());
        assert!(h.payments.is_empty());
    }

    #[tokio::test]
    async fn test_create_payment_incomplete_signature() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 1_000_000, 5)]);
        h.client.state().sign_complete = false;
        let connector = h.connector();

        let err = connector.create_payment(P2PKH, "0.001").await.unwrap_err();
        assert!(matches!(err, ConnectorError::SigningIncomplete));
        assert!(h.payments.is_empty());
    }

    #[tokio::test]
    async fn test_unsigned_payment_gives_inputs_back() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 1_000_000, 5)]);
        h.client.state().sign_complete = false;
        let connector = h.connector();

        assert!(connector.create_payment(P2PKH, "0.001").await.is_err());
        assert!(h.client.state().locked.is_empty());
        assert_eq!(connector.unspent.lock().await.len(), 1);

        h.client.state().sign_complete = true;
        let payment = connector.create_payment(P2PKH, "0.001").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Waiting);
        assert_eq!(h.client.state().locked.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_broadcast_marks_payment_failed() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 1_000_000, 5)]);
        let connector = h.connector();
        let payment = connector.create_payment(P2PKH, "0.001").await.unwrap();

        h.client.state().send_error = Some(ChainClientError::Rpc("rejected".into()));
        let err = connector.send_payment(&payment.payment_id).await.unwrap_err();

        assert!(matches!(err, ConnectorError::Broadcast { .. }));
        let stored = h.payments.payment_by_id(&payment.payment_id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(h.metrics.errors_of(methods::SEND_PAYMENT), vec![Severity::High]);
    }

    #[tokio::test]
    async fn test_send_payment_without_generated_tx() {
        let h = Harness::new();
        let connector = h.connector();
        let payment = completed("p1", PaymentDirection::Incoming, 1, 0);
        h.payments.save_payment(&payment).await.unwrap();

        assert!(matches!(
            connector.send_payment(&payment.payment_id).await,
            Err(ConnectorError::MissingTxDetails(_))
        ));
        assert!(matches!(
            connector.send_payment(&PaymentId::new("unknown")).await,
            Err(ConnectorError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_craft_spends_exact_amount_without_change() {
        let h = Harness::new();
        let fee = legacy_payment_fee(1, 10);
        h.client
            .set_unspent(vec![unspent(1, 100_000 + fee.as_sat(), 5)]);
        let connector = h.connector();

        let crafted = connector
            .craft_transaction(P2PKH, Amount::from_sat(100_000), FeeRate::from_sat_per_byte(10))
            .await
            .unwrap();

        assert_eq!(crafted.change, Amount::ZERO);
        assert_eq!(crafted.fee, fee);
        assert_eq!(h.client.state().created[0].1.len(), 1);
        assert_eq!(h.client.call_count("get_new_address"), 0);

        // Evicted locally and locked at the daemon, so a reload can't see it.
        assert!(matches!(
            connector
                .craft_transaction(P2PKH, Amount::from_sat(1_000), FeeRate::from_sat_per_byte(10))
                .await,
            Err(ConnectorError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_estimate_fee_uses_fallback_rate() {
        let h = Harness::new();
        let connector = h.connector();

        let fee = connector.estimate_fee("0.5").await.unwrap();
        assert_eq!(fee, Amount::from_sat(10 * 225));
        // No alert outside mainnet.
        assert!(h.metrics.errors_of(methods::ESTIMATE_FEE).is_empty());

        h.client.state().smart_fee = Ok(SmartFeeEstimate {
            fee_rate: Some(0.000_512),
            errors: vec![],
        });
        let fee = connector.estimate_fee("0.5").await.unwrap();
        assert_eq!(fee, FeeRate::from_coins_per_kb(0.000_512).unwrap().fee_for_size(225));
    }

    #[tokio::test]
    async fn test_accounts_and_balances() {
        let h = Harness::new();
        h.client.set_unspent(vec![
            unspent(1, 40_000, 0),
            UnspentInput {
                account: "alice".into(),
                ..unspent(2, 60_000, 4)
            },
        ]);
        let connector = h.connector();

        assert_eq!(connector.account_address("default").await.unwrap(), "");
        let created = connector.create_address("alice").await.unwrap();
        assert_eq!(connector.account_address("alice").await.unwrap(), created);

        assert_eq!(
            connector.confirmed_balance("all").await.unwrap(),
            Amount::from_sat(60_000)
        );
        assert_eq!(
            connector.confirmed_balance("default").await.unwrap(),
            Amount::ZERO
        );

        connector.pending.refresh(&*h.client, &*h.payments).await.unwrap();
        assert_eq!(
            connector.pending_balance("default").await.unwrap(),
            Amount::from_sat(40_000)
        );
        assert_eq!(connector.pending_transactions("all").await.unwrap().len(), 1);
        assert!(connector.pending_transactions("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_metrics_sums_completed_payments() {
        let h = Harness::new();
        let connector = h.connector();
        for payment in [
            completed("in", PaymentDirection::Incoming, 500, 0),
            completed("out", PaymentDirection::Outgoing, 200, 30),
            completed("self", PaymentDirection::Internal, 100, 7),
            Payment {
                status: PaymentStatus::Pending,
                ..completed("pending", PaymentDirection::Incoming, 1_000, 0)
            },
        ] {
            h.payments.save_payment(&payment).await.unwrap();
        }

        connector.report_metrics().await.unwrap();

        let recorded = h.metrics.snapshot();
        assert_eq!(recorded.overall_received, Some(Amount::from_sat(500)));
        assert_eq!(recorded.overall_sent, Some(Amount::from_sat(200)));
        assert_eq!(recorded.overall_fee, Some(Amount::from_sat(37)));
    }

    #[tokio::test]
    async fn test_reorganise_splits_oversized_outputs() {
        let h = Harness::new();
        h.client
            .set_unspent(vec![unspent(1, 250_000, 5), unspent(2, 150_000, 5)]);
        let connector = h.connector();

        let outcome = connector.reorganise_unspent().await.unwrap().unwrap();

        assert_eq!(outcome.outputs, 3);
        let state = h.client.state();
        let (inputs, outputs) = &state.created[0];
        assert_eq!(inputs, &vec![OutPoint::new(TxId::from_bytes([1; 32]), 0)]);
        assert_eq!(outputs[0].1, Amount::from_sat(100_000));
        assert_eq!(outputs[1].1, Amount::from_sat(100_000));
        assert_eq!(outputs[2].1, Amount::from_sat(50_000) - outcome.fee);
        assert_eq!(TxId::of_raw_tx(&state.broadcast[0]), outcome.tx_id);
    }

    #[tokio::test]
    async fn test_reorganise_without_oversized_outputs() {
        let h = Harness::new();
        h.client.set_unspent(vec![unspent(1, 150_000, 5)]);
        let connector = h.connector();

        assert_eq!(connector.reorganise_unspent().await.unwrap(), None);
        assert_eq!(h.client.call_count("create_raw_transaction"), 0);
    }

    #[tokio::test]
    async fn test_validate_address() {
        let h = Harness::new();
        let connector = h.connector();

        connector.validate_address(SEGWIT).unwrap();
        connector.validate_address(P2PKH).unwrap();
        assert!(connector.validate_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_err());
        assert_eq!(
            h.metrics.errors_of(methods::VALIDATE_ADDRESS),
            vec![Severity::Low]
        );
    }
}
