//! In-memory persistence adapters.
//!
//! Payment details are kept encoded with their tag next to them, the way
//! a database row would hold them, and decoded on every read.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{DetailKind, Payment, PaymentDetail, PaymentId};

use crate::domain::StorageError;
use crate::ports::{PaymentFilter, PaymentStore, StateStorage};

#[derive(Clone, Debug)]
struct PaymentRow {
    payment: Payment,
    detail: Option<(DetailKind, Vec<u8>)>,
}

impl PaymentRow {
    fn encode(payment: &Payment) -> Result<Self, StorageError> {
        let detail = payment
            .detail
            .as_ref()
            .map(PaymentDetail::encode)
            .transpose()
            .map_err(|e| StorageError::Codec(e.to_string()))?;

        Ok(Self {
            payment: Payment {
                detail: None,
                ..payment.clone()
            },
            detail,
        })
    }

    fn decode(&self) -> Result<Payment, StorageError> {
        let detail = self
            .detail
            .as_ref()
            .map(|(kind, payload)| PaymentDetail::decode(*kind, payload))
            .transpose()
            .map_err(|e| StorageError::Codec(e.to_string()))?;

        Ok(Payment {
            detail,
            ..self.payment.clone()
        })
    }
}

/// Payment store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    rows: RwLock<HashMap<PaymentId, PaymentRow>>,
}

impl InMemoryPaymentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn save_payment(&self, payment: &Payment) -> Result<(), StorageError> {
        let row = PaymentRow::encode(payment)?;
        self.rows.write().insert(payment.payment_id.clone(), row);
        Ok(())
    }

    async fn payment_by_id(&self, id: &PaymentId) -> Result<Payment, StorageError> {
        self.rows
            .read()
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.clone()))?
            .decode()
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StorageError> {
        let mut payments = self
            .rows
            .read()
            .values()
            .filter(|row| filter.matches(&row.payment))
            .map(PaymentRow::decode)
            .collect::<Result<Vec<_>, _>>()?;

        payments.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.payment_id.cmp(&b.payment_id))
        });
        Ok(payments)
    }
}

/// Sync cursor kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStorage {
    last_synced_hash: RwLock<Option<Vec<u8>>>,
}

impl InMemoryStateStorage {
    /// Storage without a cursor.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn put_last_synced_hash(&self, hash: &[u8]) -> Result<(), StorageError> {
        *self.last_synced_hash.write() = Some(hash.to_vec());
        Ok(())
    }

    async fn last_synced_hash(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.last_synced_hash.read().clone())
    }
}
