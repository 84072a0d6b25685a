use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use coverwise_core::domain::session::SessionId;

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Registry of per-session async locks. One writer per session id at a time;
/// different sessions never contend. A session's slot is dropped once no turn
/// holds or waits on it.
#[derive(Clone, Default)]
pub struct SessionLocks {
    slots: Slots,
}

/// Held for the duration of one turn; dropping it admits the next turn.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    slots: Slots,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = lock_slots(&self.slots);
        // Waiters clone the slot under the map lock, so a count of one means
        // only the map still refers to it.
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
    }
}

impl SessionLocks {
    pub async fn lock(&self, id: &SessionId) -> SessionGuard {
        let slot = self.slot(id);
        let guard = slot.lock_owned().await;
        SessionGuard { guard: Some(guard), key: id.0.clone(), slots: self.slots.clone() }
    }

    pub fn tracked_sessions(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    fn slot(&self, id: &SessionId) -> Arc<AsyncMutex<()>> {
        lock_slots(&self.slots).entry(id.0.clone()).or_default().clone()
    }
}

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    match slots.lock() {
        Ok(slots) => slots,
        Err(poisoned) => poisoned.into_inner(),
    }
}
