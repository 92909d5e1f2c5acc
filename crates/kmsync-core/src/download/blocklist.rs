//! Content-key lock table and content-ID block list.
//!
//! The lock table lazily creates one mutex per key; concurrent acquires of
//! the same key serialize, distinct keys proceed in parallel. Both
//! structures are intra-process only (spec.md does not require cross-process
//! coordination here, unlike the ManagedRoot lock in `lock.rs`).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

#[derive(Default)]
pub struct ContentKeyLockTable {
    locks: Mutex<std::collections::HashMap<String, Arc<Mutex<()>>>>,
}

impl ContentKeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex for `key`, blocking until any other holder of the
    /// same key releases it. Distinct keys never block each other.
    pub fn acquire(&self, key: &str) -> LockHandleOwned {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        LockHandleOwned { mutex: entry }
    }
}

/// An owned variant of the lock handle, since the table's internal map entry
/// may be dropped and recreated between acquisitions — the `Arc` keeps the
/// specific mutex instance alive for exactly as long as this handle lives.
pub struct LockHandleOwned {
    mutex: Arc<Mutex<()>>,
}

impl LockHandleOwned {
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }
}

/// Process-wide set of blocked content ids.
#[derive(Default)]
pub struct BlockList {
    blocked: RwLock<HashSet<String>>,
    reasons: RwLock<std::collections::HashMap<String, String>>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, id: &str, reason: &str) {
        self.blocked.write().insert(id.to_string());
        self.reasons
            .write()
            .insert(id.to_string(), reason.to_string());
    }

    pub fn is_blocked(&self, id: &str) -> bool {
        self.blocked.read().contains(id)
    }

    pub fn reason(&self, id: &str) -> Option<String> {
        self.reasons.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let table = ContentKeyLockTable::new();
        let a = table.acquire("key-a");
        let b = table.acquire("key-b");
        let _ga = a.lock();
        let _gb = b.lock();
    }

    #[test]
    fn same_key_serializes_concurrent_acquires() {
        let table = Arc::new(ContentKeyLockTable::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let counter = counter.clone();
                let max_concurrent = max_concurrent.clone();
                thread::spawn(move || {
                    let handle = table.acquire("shared");
                    let _guard = handle.lock();
                    let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent.fetch_max(current, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(5));
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn block_then_is_blocked_returns_true() {
        let list = BlockList::new();
        assert!(!list.is_blocked("abc"));
        list.block("abc", "integrity check failed");
        assert!(list.is_blocked("abc"));
        assert_eq!(list.reason("abc").unwrap(), "integrity check failed");
    }
}
