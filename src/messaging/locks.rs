//! Per-message write serialization.
//!
//! Read-modify-write operations on one message (edit, delete, reaction
//! toggle, status change) take the lock for that message's uuid. Different
//! uuids never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A lock table keyed by message uuid
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// The guard releases the key on drop. Slots are dropped once no holder
    /// or waiter references them.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.retain(|_, weak| weak.strong_count() > 0);
            match slots.get(key).and_then(Weak::upgrade) {
                Some(slot) => slot,
                None => {
                    let slot = Arc::new(AsyncMutex::new(()));
                    slots.insert(key.to_string(), Arc::downgrade(&slot));
                    slot
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// No live slots
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
