//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits: in-memory persistence, the network
//! parameter registry and metrics sinks.

mod memory_store;
mod metrics;
mod network;

pub use memory_store::{InMemoryPaymentStore, InMemoryStateStorage};
pub use metrics::{NoopMetrics, PrometheusMetrics, RecordedMetrics, RecordingMetrics};
pub use network::{canonical_network, NetworkRegistry};
