//! Per-object lock table.
//!
//! Keyed mutual exclusion guaranteeing at most one in-flight reconciliation
//! per object. Entries are created on first use, reference-counted, and
//! removed as soon as they are uncontended, so the table stays proportional
//! to in-flight work rather than namespace size.
//!
//! Two acquisition modes:
//!
//! - [`LockTable::lock`]: blocking; used by reconciliation. Waits until any
//!   concurrent reconciliation of the same object finishes.
//! - [`LockTable::try_lock`]: best-effort; used by the foreground mutation
//!   path. When a reconciliation holds the lock this returns `None` and the
//!   mutation proceeds unlocked - the next scheduled reconciliation pass
//!   observes current state and repairs any race. Client-visible latency
//!   never stalls behind background work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use strata_core::ObjectKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

type Registry = Arc<Mutex<HashMap<ObjectKey, Entry>>>;

/// Reference-counted per-object exclusive locks.
#[derive(Clone, Default)]
pub struct LockTable {
    entries: Registry,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, for tests.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock table poisoned").len()
    }

    /// True if no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocking acquisition: waits for any concurrent holder of `key`.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex is poisoned.
    pub async fn lock(&self, key: &ObjectKey) -> LockGuard {
        let lock = {
            let mut entries = self.entries.lock().expect("lock table poisoned");
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(AsyncMutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            entry.lock.clone()
        };
        let permit = lock.lock_owned().await;
        LockGuard {
            _permit: permit,
            entries: self.entries.clone(),
            key: key.clone(),
        }
    }

    /// Best-effort acquisition: returns `None` instead of waiting when the
    /// key is held.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex is poisoned.
    #[must_use]
    pub fn try_lock(&self, key: &ObjectKey) -> Option<LockGuard> {
        let mut entries = self.entries.lock().expect("lock table poisoned");
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            lock: Arc::new(AsyncMutex::new(())),
            refs: 0,
        });
        match entry.lock.clone().try_lock_owned() {
            Ok(permit) => {
                entry.refs += 1;
                drop(entries);
                Some(LockGuard {
                    _permit: permit,
                    entries: self.entries.clone(),
                    key: key.clone(),
                })
            }
            // A held mutex implies a counted holder, so the entry stays
            // alive until that holder's guard drops.
            Err(_) => None,
        }
    }
}

/// Held exclusive lock on one object. Releasing the guard releases the
/// lock and drops the table entry once uncontended.
pub struct LockGuard {
    // Field order matters: the permit must release before the refcount
    // drops, or a concurrent `lock` could observe a removed entry while
    // still queued on its mutex.
    _permit: OwnedMutexGuard<()>,
    entries: Registry,
    key: ObjectKey,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().expect("lock table poisoned");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("c", name)
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_per_key() {
        let table = LockTable::new();
        let counter = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = table.lock(&key("a")).await;
                let inside = counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0, "two holders inside the critical section");
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(table.is_empty(), "entries must be removed when uncontended");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let table = LockTable::new();
        let _a = table.lock(&key("a")).await;
        let _b = table.lock(&key("b")).await;
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_try_lock_yields_while_held() {
        let table = LockTable::new();
        let guard = table.lock(&key("a")).await;

        assert!(table.try_lock(&key("a")).is_none());

        drop(guard);
        let retry = table.try_lock(&key("a"));
        assert!(retry.is_some());
        drop(retry);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_lock_waits_for_holder() {
        let table = LockTable::new();
        let guard = table.lock(&key("a")).await;

        let table2 = table.clone();
        let waiter = tokio::spawn(async move {
            let _guard = table2.lock(&key("a")).await;
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished(), "waiter must block while lock held");

        drop(guard);
        waiter.await.unwrap();
        assert!(table.is_empty());
    }
}
