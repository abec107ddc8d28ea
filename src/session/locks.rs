//! Per-identity mutual exclusion.
//!
//! Load-modify-save of one profile is serialized; different identities never
//! contend. Entries are pruned when the last holder or waiter lets go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::profile::UserId;

type LockTable = Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>;

#[derive(Default, Clone)]
pub struct IdentityLocks {
    table: LockTable,
}

/// Held for the duration of one event; dropping it releases the identity.
pub struct IdentityGuard {
    id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `id` is free and take it.
    pub async fn lock(&self, id: UserId) -> IdentityGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(table.entry(id).or_default())
        };
        let guard = slot.lock_owned().await;
        IdentityGuard {
            id,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Identities currently locked or awaited.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // Only the table still references the slot: nobody holds or awaits it.
        if table
            .get(&self.id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            table.remove(&self.id);
        }
    }
}
