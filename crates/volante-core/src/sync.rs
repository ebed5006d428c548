use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Hands out one async mutex per id so that concurrent work on different
/// records proceeds in parallel while work on the same record is serialized.
/// Used for ride transitions (per ride id) and balance mutations (per
/// wallet owner); the guard must be held across the whole read-modify-write.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

/// Exclusive access to one id. Operations that require the caller to
/// already hold a record's lock take this guard and read the id from it,
/// so they cannot be invoked against a record the caller has not locked.
pub struct LockGuard {
    id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: Uuid) -> LockGuard {
        let slot = {
            let mut locks = self.locks.lock().await;
            // An entry only the map still references is idle: no guard is
            // held and nobody is waiting. Dropping those keeps the registry
            // from growing with every id ever locked.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        LockGuard {
            id,
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of ids currently tracked (held or awaited).
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
