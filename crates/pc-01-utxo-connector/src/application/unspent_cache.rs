//! # Unspent Output Cache
//!
//! Local mirror of confirmed wallet outputs used by coin selection.
//!
//! One async mutex guards the whole set. Refreshing and the
//! select, lock-at-daemon, evict sequence both hold it, so a selection
//! always sees either the previous snapshot or the new one in full.

use std::collections::BTreeMap;

use shared_types::Amount;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::domain::{ConnectorError, OutPoint, UnspentInput};
use crate::ports::{ChainClient, MAX_CONFIRMATIONS};

/// Cached outputs keyed by outpoint. `None` until the first load.
#[derive(Debug, Default)]
pub struct UnspentSet {
    entries: Option<BTreeMap<OutPoint, UnspentInput>>,
}

impl UnspentSet {
    /// Whether a snapshot has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    /// Replace the contents with a fresh daemon listing.
    pub fn replace(&mut self, unspent: Vec<UnspentInput>) {
        self.entries = Some(unspent.into_iter().map(|u| (u.outpoint(), u)).collect());
    }

    /// Outputs in outpoint order.
    pub fn iter(&self) -> impl Iterator<Item = &UnspentInput> + Clone {
        self.entries.iter().flat_map(|entries| entries.values())
    }

    /// Drop spent outputs without waiting for the next refresh.
    pub fn evict<'a>(&mut self, outpoints: impl IntoIterator<Item = &'a OutPoint>) {
        if let Some(entries) = self.entries.as_mut() {
            for outpoint in outpoints {
                entries.remove(outpoint);
            }
        }
    }

    /// Number of cached outputs.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, BTreeMap::len)
    }

    /// Whether no outputs are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of cached outputs.
    pub fn total(&self) -> Amount {
        self.iter().map(|u| u.amount).sum()
    }
}

/// Mutex-guarded [`UnspentSet`].
#[derive(Debug, Default)]
pub struct UnspentCache {
    set: Mutex<UnspentSet>,
}

impl UnspentCache {
    /// Empty, unloaded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the selection lock.
    pub async fn lock(&self) -> MutexGuard<'_, UnspentSet> {
        self.set.lock().await
    }

    /// Reload from the daemon under the selection lock.
    pub async fn refresh(
        &self,
        client: &dyn ChainClient,
        min_confirmations: u32,
    ) -> Result<usize, ConnectorError> {
        let mut set = self.lock().await;
        load_unspent(&mut set, client, min_confirmations).await
    }

    /// Copy of the cached outputs.
    pub async fn snapshot(&self) -> Vec<UnspentInput> {
        self.lock().await.iter().cloned().collect()
    }
}

/// Fill `set` with outputs having at least `min_confirmations`.
///
/// The caller holds the selection lock.
pub async fn load_unspent(
    set: &mut UnspentSet,
    client: &dyn ChainClient,
    min_confirmations: u32,
) -> Result<usize, ConnectorError> {
    let unspent = client
        .list_unspent_min_max(min_confirmations, MAX_CONFIRMATIONS)
        .await
        .map_err(|e| ConnectorError::chain("list unspent", e))?;

    set.replace(unspent);
    debug!("[pc-01] Unspent cache refreshed with {} outputs", set.len());
    Ok(set.len())
}
