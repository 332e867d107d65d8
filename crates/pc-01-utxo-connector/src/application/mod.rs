//! # Application Module
//!
//! The connector service and the stateful components it drives.

pub mod fee_oracle;
pub mod method_metric;
pub mod pending;
pub mod service;
pub mod sync_engine;
pub mod tasks;
pub mod unspent_cache;

pub use fee_oracle::{FeeOracle, FeeQueryShape};
pub use method_metric::{methods, MethodMetric};
pub use pending::PendingTracker;
pub use service::{ConnectorPorts, UtxoConnector};
pub use sync_engine::{find_fork_block, sync_state, SyncEngine};
pub use tasks::spawn_periodic;
pub use unspent_cache::{load_unspent, UnspentCache, UnspentSet};
