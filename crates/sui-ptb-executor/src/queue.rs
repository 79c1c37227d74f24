//! Ordering primitives for submissions.
//!
//! [`SerialQueue`] runs one task at a time in arrival order. [`ObjectLocks`]
//! gives each owned object its own FIFO queue, so transactions consuming the
//! same object run one after another while unrelated ones proceed in parallel.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use sui_ptb_types::ObjectId;
use tokio::sync::OwnedMutexGuard;

/// Runs tasks one at a time, in the order they were queued.
#[derive(Debug, Default)]
pub struct SerialQueue {
    lock: tokio::sync::Mutex<()>,
}

impl SerialQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _turn = self.lock.lock().await;
        task.await
    }
}

/// Per-object FIFO locks.
#[derive(Debug, Default)]
pub struct ObjectLocks {
    locks: Mutex<HashMap<ObjectId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive use of a set of objects; released on drop.
#[must_use = "the objects are released as soon as the guard is dropped"]
pub struct ObjectGuard<'a> {
    owner: &'a ObjectLocks,
    ids: Vec<ObjectId>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every object in `ids` is free, then hold them all.
    ///
    /// Objects are locked in id order, so two callers with overlapping sets
    /// cannot deadlock.
    pub async fn acquire(&self, ids: &[ObjectId]) -> ObjectGuard<'_> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut guard = ObjectGuard {
            owner: self,
            ids: Vec::with_capacity(ids.len()),
            guards: Vec::with_capacity(ids.len()),
        };
        for id in ids {
            let lock = Arc::clone(self.locks.lock().entry(id).or_default());
            guard.ids.push(id);
            guard.guards.push(lock.lock_owned().await);
        }
        guard
    }

    /// Objects currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ObjectGuard<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        let mut locks = self.owner.locks.lock();
        for id in &self.ids {
            if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(s: &str) -> ObjectId {
        AccountAddress::from_hex_literal(s).unwrap()
    }

    #[tokio::test]
    async fn test_serial_queue_runs_one_at_a_time() {
        let queue = Arc::new(SerialQueue::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let (queue, active, peak) = (queue.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                queue
                    .run(async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlapping_sets_are_exclusive() {
        let locks = Arc::new(ObjectLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let sets = [vec![id("0x1"), id("0x2")], vec![id("0x2"), id("0x1")], vec![id("0x2")]];
        let mut handles = Vec::new();
        for set in sets {
            let (locks, active, peak) = (locks.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                let _held = locks.acquire(&set).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_wait() {
        let locks = ObjectLocks::new();
        let first = locks.acquire(&[id("0x1")]).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&[id("0x2")]))
            .await
            .expect("disjoint object should be free");
        assert_eq!(locks.len(), 2);
        drop(first);
        drop(second);
        assert!(locks.is_empty());
    }
}
