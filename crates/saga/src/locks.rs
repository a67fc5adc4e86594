//! Per-CAF exclusive locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use common::CafRefNo;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async mutexes keyed by CAF reference number.
///
/// Every state change on one CAF runs while holding its guard. An entry is
/// removed when its last guard is dropped and nobody is waiting on it.
#[derive(Clone, Default)]
pub struct CafLocks {
    locks: Arc<Mutex<LockTable>>,
}

type LockTable = HashMap<CafRefNo, Arc<AsyncMutex<()>>>;

/// Held while a CAF is being changed.
pub struct CafGuard {
    guard: Option<OwnedMutexGuard<()>>,
    caf_ref_no: CafRefNo,
    locks: Arc<Mutex<LockTable>>,
}

impl Drop for CafGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = table(&self.locks);
        // Waiters hold their own clone of the mutex.
        if locks
            .get(&self.caf_ref_no)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.caf_ref_no);
        }
    }
}

fn table(locks: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CafLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, caf_ref_no: &CafRefNo) -> CafGuard {
        let mutex = table(&self.locks)
            .entry(caf_ref_no.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        CafGuard {
            guard: Some(mutex.lock_owned().await),
            caf_ref_no: caf_ref_no.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
