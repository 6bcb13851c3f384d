//! Per-entity read/update locks.
//!
//! Locks are keyed by repository relative path. Holders must release them
//! before any remote call; the guards are owned so they can be kept across
//! `.await` points inside one attribute read-modify-write section.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Prune idle entries once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

pub type ReadGuard = OwnedRwLockReadGuard<()>;
pub type UpdateGuard = OwnedRwLockWriteGuard<()>;

#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<RwLock<()>> {
        let key = normalize_key(key);
        let mut table = self.inner.lock();
        if table.len() >= PRUNE_THRESHOLD {
            // Only the table itself holds idle locks
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Shared lock; any number of readers may hold it at once.
    pub async fn read(&self, key: &str) -> ReadGuard {
        self.entry(key).read_owned().await
    }

    /// Exclusive lock.
    pub async fn update(&self, key: &str) -> UpdateGuard {
        self.entry(key).write_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}

fn normalize_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_readers_share() {
        let locks = ResourceLocks::new();
        let _a = locks.read("/a/b.jar").await;
        let _b = locks.read("a/b.jar").await;
    }

    #[tokio::test]
    async fn test_update_excludes_readers() {
        let locks = ResourceLocks::new();
        let guard = locks.update("a/b.jar").await;

        let contender = locks.clone();
        let reader = tokio::spawn(async move {
            let _read = contender.read("/a/b.jar").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());
        drop(guard);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = ResourceLocks::new();
        let _a = locks.update("a").await;
        let _b = locks.update("b").await;
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = ResourceLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.read(&format!("k{}", i)).await);
        }
        let _held = locks.read("held").await;
        assert!(locks.tracked() < PRUNE_THRESHOLD);
    }
}
