//! # Inbound Ports
//!
//! API trait defining what a UTXO connector offers its front end.

use async_trait::async_trait;
use shared_types::{Amount, Payment, PaymentId};

use crate::domain::ConnectorError;

/// Payment Connector API - inbound port.
///
/// Account arguments are aliases: `"default"` is the wallet default
/// account and `"all"` aggregates every account.
#[async_trait]
pub trait PaymentConnectorApi: Send + Sync {
    /// First address of the account, empty if it has none.
    async fn account_address(&self, account: &str) -> Result<String, ConnectorError>;

    /// Ask the daemon for a new address of the account.
    async fn create_address(&self, account: &str) -> Result<String, ConnectorError>;

    /// Payments of the account that are below the confirmation threshold.
    async fn pending_transactions(&self, account: &str) -> Result<Vec<Payment>, ConnectorError>;

    /// Build and sign an outgoing payment without broadcasting it.
    ///
    /// `amount` is a decimal coin value, e.g. `"0.015"`.
    async fn create_payment(&self, address: &str, amount: &str)
        -> Result<Payment, ConnectorError>;

    /// Broadcast a payment previously built by `create_payment`.
    async fn send_payment(&self, payment_id: &PaymentId) -> Result<Payment, ConnectorError>;

    /// Funds with at least the configured confirmations.
    async fn confirmed_balance(&self, account: &str) -> Result<Amount, ConnectorError>;

    /// Funds still waiting for confirmations.
    async fn pending_balance(&self, account: &str) -> Result<Amount, ConnectorError>;

    /// Fee expected for sending `amount` (decimal coins).
    async fn estimate_fee(&self, amount: &str) -> Result<Amount, ConnectorError>;

    /// Check an address against the connector's network.
    fn validate_address(&self, address: &str) -> Result<(), ConnectorError>;
}
