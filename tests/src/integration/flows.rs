//! # Integration Test Flows
//!
//! End-to-end behaviour of the UTXO connector against a scripted daemon.
//!
//! ## Flows Tested:
//!
//! 1. **Outgoing payment**: create, broadcast, confirm in a block, report totals
//! 2. **Chain reorganisation**: orphaned cursor, fork block, replacement branch
//! 3. **Pending to completed**: an unconfirmed deposit is completed in place
//! 4. **Concurrent payments**: two payments never spend the same output
//! 5. **Fee fallback**: alerting on mainnet only
//! 6. **Prometheus export**: method counters reach the registry

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use connector_telemetry::Severity;
    use pc_01_utxo_connector::application::methods;
    use pc_01_utxo_connector::domain::{TxCategory, TxDetail};
    use pc_01_utxo_connector::{
        BlockHash, BlockSummary, ConnectorConfig, ConnectorPorts, InMemoryPaymentStore,
        InMemoryStateStorage, MetricsSink, MockChainClient, NetworkRegistry, PaymentConnectorApi,
        PaymentFilter, PaymentStore, PrometheusMetrics, RecordingMetrics, StateStorage, TxId,
        UnspentInput, UtxoConnector, WalletTransaction,
    };
    use shared_types::{Amount, Asset, PaymentDirection, PaymentStatus};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const P2PKH: &str = "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn";
    const SEGWIT: &str = "bcrt1qar0srrr7xfkvy5l643lydnw9re59gtzzxxk9p6";

    /// Daemon, stores and metrics shared by the connectors of one test.
    struct Node {
        client: Arc<MockChainClient>,
        payments: Arc<InMemoryPaymentStore>,
        state: Arc<InMemoryStateStorage>,
        metrics: Arc<RecordingMetrics>,
    }

    impl Node {
        fn new() -> Self {
            Self {
                client: Arc::new(MockChainClient::new()),
                payments: Arc::new(InMemoryPaymentStore::new()),
                state: Arc::new(InMemoryStateStorage::new()),
                metrics: Arc::new(RecordingMetrics::new()),
            }
        }

        fn ports_with(&self, metrics: Arc<dyn MetricsSink>) -> ConnectorPorts {
            ConnectorPorts {
                client: self.client.clone(),
                payments: self.payments.clone(),
                state: self.state.clone(),
                network: Arc::new(NetworkRegistry::for_asset(Asset::Btc)),
                metrics,
            }
        }

        /// Connector whose background tasks only run once, right after start.
        fn connector(&self, cursor: Option<BlockHash>) -> Arc<UtxoConnector> {
            let config = ConnectorConfig {
                sync_interval_secs: 3600,
                unspent_refresh_interval_secs: 3600,
                report_interval_secs: 3600,
                last_synced_block_hash: cursor.map(|h| h.to_string()),
                ..ConnectorConfig::for_testing()
            };
            Arc::new(UtxoConnector::new(config, self.ports_with(self.metrics.clone())).unwrap())
        }

        async fn payments_of(&self, direction: PaymentDirection) -> Vec<shared_types::Payment> {
            self.payments
                .list_payments(&PaymentFilter {
                    direction: Some(direction),
                    ..Default::default()
                })
                .await
                .unwrap()
        }
    }

    fn hash(n: u8) -> BlockHash {
        BlockHash::from_bytes([n; 32])
    }

    fn block(
        n: u8,
        confirmations: i64,
        previous: Option<u8>,
        next: Option<u8>,
        txs: &[TxId],
    ) -> BlockSummary {
        BlockSummary {
            hash: hash(n),
            height: u64::from(n),
            confirmations,
            next_hash: next.map(hash),
            previous_hash: previous.map(hash),
            tx: txs.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn detail(category: &str, account: &str, address: &str, amount: i64) -> TxDetail {
        TxDetail {
            account: account.into(),
            address: address.into(),
            amount: Amount::from_sat(amount),
            category: TxCategory::from(category),
            vout: 0,
        }
    }

    fn wallet_output(seed: u8, account: &str, amount: i64, confirmations: i64) -> UnspentInput {
        UnspentInput {
            address: format!("wallet-{}", seed),
            account: account.into(),
            amount: Amount::from_sat(amount),
            confirmations,
            tx_id: TxId::from_bytes([seed; 32]),
            vout: 0,
        }
    }

    /// Let the first tick of every background task run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // =============================================================================
    // FLOW 1: OUTGOING PAYMENT
    // =============================================================================

    #[tokio::test]
    async fn test_outgoing_payment_is_completed_by_sync() {
        let node = Node::new();
        node.client.add_block(block(1, 10, Some(0), None, &[]));
        node.client
            .set_unspent(vec![wallet_output(7, "", 1_000_000, 5)]);

        let connector = node.connector(Some(hash(1)));
        connector.start().await.unwrap();
        settle().await;

        let payment = connector.create_payment(P2PKH, "0.004").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Waiting);
        let sent = connector.send_payment(&payment.payment_id).await.unwrap();
        assert_eq!(sent.status, PaymentStatus::Pending);

        // The daemon mines the transaction.
        let tx_id: TxId = payment.media_id.parse().unwrap();
        node.client.add_transaction(WalletTransaction {
            tx_id,
            amount: Amount::from_sat(-400_000),
            fee: -payment.media_fee,
            confirmations: 3,
            details: vec![
                detail("send", "", P2PKH, -400_000),
                detail("send", "", "mock-address-2", -595_000),
            ],
        });
        node.client.add_block(block(1, 10, Some(0), Some(2), &[]));
        node.client.add_block(block(2, 3, Some(1), None, &[tx_id]));

        let report = connector.sync_once().await.unwrap();
        assert_eq!(report.cursor, hash(2));
        assert_eq!(report.payments_saved, 1);

        let stored = node.payments.payment_by_id(&payment.payment_id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(stored.amount, Amount::from_sat(400_000));
        assert_eq!(node.payments_of(PaymentDirection::Outgoing).await.len(), 1);

        connector.report_metrics().await.unwrap();
        let recorded = node.metrics.snapshot();
        assert_eq!(recorded.overall_sent, Some(Amount::from_sat(400_000)));
        assert_eq!(recorded.overall_fee, Some(payment.media_fee));
        assert_eq!(recorded.block_number, Some(2));

        connector.stop("test finished").await.unwrap();
    }

    // =============================================================================
    // FLOW 2: CHAIN REORGANISATION
    // =============================================================================

    #[tokio::test]
    async fn test_fork_recovery_and_replay() {
        let node = Node::new();
        let deposit = TxId::from_bytes([0xd0; 32]);
        // B2 was orphaned, B3 replaced it on top of B1.
        node.client.add_block(block(1, 5, Some(0), Some(3), &[]));
        node.client.add_block(block(2, -1, Some(1), None, &[]));
        node.client.add_block(block(3, 4, Some(1), None, &[deposit]));
        node.client.add_transaction(WalletTransaction {
            tx_id: deposit,
            amount: Amount::from_sat(70_000),
            fee: Amount::ZERO,
            confirmations: 4,
            details: vec![detail("receive", "alice", SEGWIT, 70_000)],
        });

        let connector = node.connector(Some(hash(2)));
        connector.start().await.unwrap();
        settle().await;
        connector.stop("fork handled").await.unwrap();

        assert_eq!(connector.cursor().await, Some(hash(3)));
        assert_eq!(
            node.state.last_synced_hash().await.unwrap(),
            Some(hash(3).as_bytes().to_vec())
        );
        let incoming = node.payments_of(PaymentDirection::Incoming).await;
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].account, "alice");
        assert_eq!(incoming[0].status, PaymentStatus::Completed);

        // Replaying from the fork block rewrites the same record.
        let replay = node.connector(Some(hash(1)));
        replay.start().await.unwrap();
        settle().await;
        replay.stop("replay done").await.unwrap();

        let replayed = node.payments_of(PaymentDirection::Incoming).await;
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].payment_id, incoming[0].payment_id);
    }

    // =============================================================================
    // FLOW 3: PENDING TO COMPLETED
    // =============================================================================

    #[tokio::test]
    async fn test_pending_deposit_completes_in_place() {
        let node = Node::new();
        let deposit = wallet_output(9, "alice", 25_000, 0);
        node.client.add_block(block(1, 10, Some(0), None, &[]));
        node.client.set_unspent(vec![deposit.clone()]);

        let connector = node.connector(Some(hash(1)));
        connector.start().await.unwrap();
        settle().await;

        let pending = connector.pending_transactions("alice").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, PaymentStatus::Pending);
        assert_eq!(
            connector.pending_balance("all").await.unwrap(),
            Amount::from_sat(25_000)
        );

        // Two confirmations later the deposit is in a processed block.
        node.client.set_unspent(vec![UnspentInput {
            confirmations: 2,
            ..deposit.clone()
        }]);
        node.client.add_transaction(WalletTransaction {
            tx_id: deposit.tx_id,
            amount: deposit.amount,
            fee: Amount::ZERO,
            confirmations: 2,
            details: vec![detail("receive", "alice", &deposit.address, 25_000)],
        });
        node.client.add_block(block(1, 10, Some(0), Some(2), &[]));
        node.client.add_block(block(2, 2, Some(1), None, &[deposit.tx_id]));

        connector.sync_once().await.unwrap();
        connector.stop("test finished").await.unwrap();

        let stored = node.payments_of(PaymentDirection::Incoming).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payment_id, pending[0].payment_id);
        assert_eq!(stored[0].status, PaymentStatus::Completed);
        assert!(connector.pending_transactions("alice").await.unwrap().is_empty());
        assert_eq!(
            connector.confirmed_balance("alice").await.unwrap(),
            Amount::from_sat(25_000)
        );
    }

    // =============================================================================
    // FLOW 4: CONCURRENT PAYMENTS
    // =============================================================================

    #[tokio::test]
    async fn test_concurrent_payments_spend_distinct_outputs() {
        let node = Node::new();
        node.client.set_unspent(vec![
            wallet_output(1, "", 600_000, 5),
            wallet_output(2, "", 600_000, 5),
        ]);
        let connector = node.connector(None);

        let (first, second) = tokio::join!(
            connector.create_payment(P2PKH, "0.005"),
            connector.create_payment(SEGWIT, "0.005"),
        );
        first.unwrap();
        second.unwrap();

        let state = node.client.state();
        assert_eq!(state.created.len(), 2);
        assert_ne!(state.created[0].0, state.created[1].0);
        assert_eq!(state.locked.len(), 2);
        drop(state);

        // Nothing left to spend.
        assert!(connector.create_payment(P2PKH, "0.001").await.is_err());
    }

    // =============================================================================
    // FLOW 5: FEE FALLBACK
    // =============================================================================

    #[tokio::test]
    async fn test_fee_fallback_alerts_on_mainnet_only() {
        let regtest = Node::new();
        let connector = regtest.connector(None);
        assert_eq!(
            connector.estimate_fee("1").await.unwrap(),
            Amount::from_sat(10 * 225)
        );
        assert!(regtest.metrics.errors_of(methods::ESTIMATE_FEE).is_empty());

        let mainnet = Node {
            client: Arc::new(MockChainClient::with_chain("main")),
            ..Node::new()
        };
        let config = ConnectorConfig {
            net: "mainnet".into(),
            ..ConnectorConfig::for_testing()
        };
        let connector =
            UtxoConnector::new(config, mainnet.ports_with(mainnet.metrics.clone())).unwrap();
        assert_eq!(
            connector.estimate_fee("1").await.unwrap(),
            Amount::from_sat(10 * 225)
        );
        assert_eq!(
            mainnet.metrics.errors_of(methods::ESTIMATE_FEE),
            vec![Severity::High]
        );
    }

    // =============================================================================
    // FLOW 6: PROMETHEUS EXPORT
    // =============================================================================

    #[tokio::test]
    async fn test_prometheus_export() {
        connector_telemetry::register_metrics().ok();
        let node = Node::new();
        let sink = Arc::new(PrometheusMetrics::new("bitcoind-flows", Asset::Btc));
        let connector =
            UtxoConnector::new(ConnectorConfig::for_testing(), node.ports_with(sink)).unwrap();

        connector.validate_address("not-an-address").unwrap_err();

        let text = connector_telemetry::encode_metrics().unwrap();
        assert!(text.contains("pc_connector_requests_total"));
        assert!(text.contains("bitcoind-flows"));
        assert!(text.contains("ValidateAddress"));
    }
}
