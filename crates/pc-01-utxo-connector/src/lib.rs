//! # PC-01 UTXO Connector
//!
//! Payment connector for UTXO coins served by a bitcoind-style daemon
//! (BTC, BCH, LTC, DASH).
//!
//! **Connector ID:** 01  
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Turn wallet activity into payment records and build outgoing payments:
//! - Reorg-aware block sync from a persisted cursor
//! - Pending tracking of outputs below the confirmation threshold
//! - Greedy coin selection under a size-based fee model
//! - Fee estimation with a static fallback
//! - Splitting of oversized outputs into optimal-sized ones
//!
//! ## Guarantees
//!
//! | Property | How |
//! |----------|-----|
//! | No lost blocks | Cursor moves only after every payment of a block is saved |
//! | Idempotent replay | Payment ids derive from txid, address and direction |
//! | No double spend | Selected outputs are locked at the daemon and evicted locally |
//! | Correct network | Start-up compares the daemon chain with the configured one |
//!
//! ## Module Structure
//!
//! ```text
//! pc-01-utxo-connector/
//! ├── domain/          # Core types: hashes, outputs, blocks, errors
//! ├── algorithms/      # Weight estimation, coin selection, splitting, classification
//! ├── ports/           # API trait (inbound) + daemon/storage/metrics traits (outbound)
//! ├── application/     # UtxoConnector, sync engine, caches, fee oracle
//! ├── adapters/        # In-memory stores, network registry, metrics sinks
//! └── config.rs        # ConnectorConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    canonical_network, InMemoryPaymentStore, InMemoryStateStorage, NetworkRegistry, NoopMetrics,
    PrometheusMetrics, RecordedMetrics, RecordingMetrics,
};
pub use algorithms::{
    coin_select, create_reorganisation_outputs, legacy_payment_fee, select_inputs,
    TxWeightEstimator,
};
pub use application::{
    ConnectorPorts, FeeOracle, PendingTracker, SyncEngine, UnspentCache, UtxoConnector,
};
pub use config::ConnectorConfig;
pub use domain::{
    BlockHash, BlockSummary, ChainClientError, ConnectorError, CoinSelection, CraftedTransaction,
    FeeRate, OutPoint, ReorganisationOutcome, ReorganisationPlan, StorageError, SyncReport,
    SyncState, TxId, TxScanPolicy, UnspentInput, WalletTransaction,
};
pub use ports::{
    ChainClient, MetricsSink, MockChainClient, NetworkParams, NetworkPolicy, PaymentConnectorApi,
    PaymentFilter, PaymentStore, StateStorage,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
