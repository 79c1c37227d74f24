//! Gas coin pool bookkeeping.
//!
//! Every coin is in exactly one place: `available`, checked out to one in-flight
//! transaction, or a refill source. A checked-out coin only returns to
//! `available` with the version and balance reported by its transaction's effects.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use sui_ptb_types::{ObjectId, ObjectRef};
use tracing::{debug, warn};

/// A pooled gas coin and its last known balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledCoin {
    pub object_ref: ObjectRef,
    pub balance: u64,
}

impl PooledCoin {
    pub fn object_id(&self) -> ObjectId {
        self.object_ref.object_id
    }
}

/// Snapshot of the pool, for observability and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub available: usize,
    pub checked_out: usize,
    /// Coins waiting to fund the next refill.
    pub source_coins: usize,
    pub pending_transactions: usize,
    /// Gas budget reserved against the address balance by in-flight transactions.
    pub reserved_balance: u128,
    /// Refill transactions executed so far.
    pub refills: usize,
}

/// Refill sources with their latest reference, if known. `None` means the
/// version must be fetched before use.
pub(crate) type SourceCoins = Vec<(ObjectId, Option<ObjectRef>)>;

#[derive(Debug, Default)]
pub(crate) struct CoinPool {
    available: VecDeque<PooledCoin>,
    checked_out: HashSet<ObjectId>,
    /// `None` until the first refill: all owned SUI coins fund it.
    sources: Option<SourceCoins>,
    refills: usize,
}

impl CoinPool {
    pub(crate) fn new(source_coins: Option<Vec<ObjectId>>) -> Self {
        Self {
            sources: source_coins.map(|ids| ids.into_iter().map(|id| (id, None)).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn available_len(&self) -> usize {
        self.available.len()
    }

    pub(crate) fn available(&self) -> Vec<PooledCoin> {
        self.available.iter().cloned().collect()
    }

    pub(crate) fn checkout(&mut self) -> Option<PooledCoin> {
        let coin = self.available.pop_front()?;
        self.checked_out.insert(coin.object_id());
        Some(coin)
    }

    fn release(&mut self, coin: PooledCoin) {
        self.checked_out.remove(&coin.object_id());
        self.available.push_back(coin);
    }

    fn retire(&mut self, id: ObjectId, latest: Option<ObjectRef>) {
        self.checked_out.remove(&id);
        self.add_source(id, latest);
    }

    fn forget(&mut self, id: &ObjectId) {
        self.checked_out.remove(id);
    }

    pub(crate) fn add_source(&mut self, id: ObjectId, latest: Option<ObjectRef>) {
        let sources = self.sources.get_or_insert_with(Vec::new);
        match sources.iter_mut().find(|(source, _)| *source == id) {
            Some(entry) => entry.1 = latest,
            None => sources.push((id, latest)),
        }
    }

    /// Put back sources a failed refill took, keeping any entry recorded since.
    pub(crate) fn restore_sources(
        &mut self,
        entries: impl IntoIterator<Item = (ObjectId, Option<ObjectRef>)>,
    ) {
        let sources = self.sources.get_or_insert_with(Vec::new);
        for (id, latest) in entries {
            if !sources.iter().any(|(source, _)| *source == id) {
                sources.push((id, latest));
            }
        }
    }

    /// Hand the sources to a refill, leaving an empty (but configured) list.
    pub(crate) fn take_sources(&mut self) -> Option<SourceCoins> {
        self.sources.replace(Vec::new())
    }

    pub(crate) fn add_coins(&mut self, coins: impl IntoIterator<Item = PooledCoin>) {
        self.available.extend(coins);
    }

    pub(crate) fn record_refill(&mut self) {
        self.refills += 1;
    }

    /// Ids the pool is tracking as gas coins (available or checked out).
    pub(crate) fn pool_ids(&self) -> HashSet<ObjectId> {
        self.available
            .iter()
            .map(PooledCoin::object_id)
            .chain(self.checked_out.iter().copied())
            .collect()
    }

    /// Forget available coins' versions: they become refill sources that are
    /// re-fetched before use. Checked-out coins are settled by their transactions.
    pub(crate) fn reset(&mut self) {
        let drained: Vec<PooledCoin> = self.available.drain(..).collect();
        for coin in drained {
            self.add_source(coin.object_id(), None);
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.len(),
            checked_out: self.checked_out.len(),
            source_coins: self.sources.as_ref().map_or(0, Vec::len),
            refills: self.refills,
            ..PoolStats::default()
        }
    }
}

/// A coin checked out to one transaction.
///
/// Must be settled with [`release`](Self::release), [`retire`](Self::retire) or
/// [`forget`](Self::forget). Dropping it unsettled retires the coin with an
/// unknown version, since the transaction's outcome is unknown.
pub(crate) struct CheckedOutCoin<'a> {
    pool: &'a Mutex<CoinPool>,
    coin: Option<PooledCoin>,
}

impl<'a> CheckedOutCoin<'a> {
    pub(crate) fn checkout(pool: &'a Mutex<CoinPool>) -> Option<Self> {
        let coin = pool.lock().checkout()?;
        debug!(coin = %coin.object_id(), balance = coin.balance, "checked out gas coin");
        Some(Self {
            pool,
            coin: Some(coin),
        })
    }

    pub(crate) fn object_ref(&self) -> Option<&ObjectRef> {
        self.coin.as_ref().map(|c| &c.object_ref)
    }

    pub(crate) fn balance(&self) -> u64 {
        self.coin.as_ref().map_or(0, |c| c.balance)
    }

    /// Return the coin to the pool with its post-transaction state.
    pub(crate) fn release(mut self, updated: PooledCoin) {
        if self.coin.take().is_some() {
            debug!(coin = %updated.object_id(), balance = updated.balance, "released gas coin");
            self.pool.lock().release(updated);
        }
    }

    /// Take the coin out of rotation; it funds the next refill.
    pub(crate) fn retire(mut self, latest: Option<ObjectRef>) {
        if let Some(coin) = self.coin.take() {
            debug!(coin = %coin.object_id(), known = latest.is_some(), "retired gas coin");
            self.pool.lock().retire(coin.object_id(), latest);
        }
    }

    /// Stop tracking the coin entirely.
    pub(crate) fn forget(mut self) {
        if let Some(coin) = self.coin.take() {
            debug!(coin = %coin.object_id(), "dropped gas coin");
            self.pool.lock().forget(&coin.object_id());
        }
    }
}

impl Drop for CheckedOutCoin<'_> {
    fn drop(&mut self) {
        if let Some(coin) = self.coin.take() {
            warn!(coin = %coin.object_id(), "gas coin abandoned by its transaction, retiring");
            self.pool.lock().retire(coin.object_id(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;

    fn coin(n: &str, balance: u64) -> PooledCoin {
        PooledCoin {
            object_ref: ObjectRef::new(AccountAddress::from_hex_literal(n).unwrap(), 1, "d"),
            balance,
        }
    }

    #[test]
    fn test_checkout_release_and_retire() {
        let pool = Mutex::new(CoinPool::new(None));
        pool.lock().add_coins([coin("0x1", 10), coin("0x2", 10)]);

        let a = CheckedOutCoin::checkout(&pool).unwrap();
        let b = CheckedOutCoin::checkout(&pool).unwrap();
        assert!(CheckedOutCoin::checkout(&pool).is_none());
        assert_ne!(a.object_ref(), b.object_ref());
        assert_eq!(pool.lock().stats().checked_out, 2);

        let mut updated = coin("0x1", 7);
        updated.object_ref.version = 2;
        a.release(updated.clone());
        b.retire(None);

        let stats = pool.lock().stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.source_coins, 1);
        assert_eq!(pool.lock().available(), vec![updated]);
    }

    #[test]
    fn test_abandoned_coin_is_retired() {
        let pool = Mutex::new(CoinPool::new(None));
        pool.lock().add_coins([coin("0x1", 10)]);
        drop(CheckedOutCoin::checkout(&pool).unwrap());
        let stats = pool.lock().stats();
        assert_eq!(stats.available, 0);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.source_coins, 1);
    }

    #[test]
    fn test_reset_keeps_checked_out_coins() {
        let pool = Mutex::new(CoinPool::new(Some(vec![])));
        pool.lock().add_coins([coin("0x1", 10), coin("0x2", 10)]);
        let held = CheckedOutCoin::checkout(&pool).unwrap();
        pool.lock().reset();
        assert_eq!(pool.lock().stats().available, 0);
        assert_eq!(pool.lock().stats().checked_out, 1);
        assert_eq!(pool.lock().pool_ids().len(), 1);
        held.forget();
        let sources = pool.lock().take_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].1, None);
    }
}
