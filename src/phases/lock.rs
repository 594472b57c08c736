//! In-process mutual exclusion per ramp id

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Set of ramp ids currently being processed by this process
#[derive(Clone, Default)]
pub struct RampLocks {
    held: Arc<DashMap<Uuid, ()>>,
}

/// Held while a processor run owns the ramp; released on drop
pub struct RampLockGuard {
    held: Arc<DashMap<Uuid, ()>>,
    id: Uuid,
}

impl RampLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id` unless a run already holds it
    pub fn try_lock(&self, id: Uuid) -> Option<RampLockGuard> {
        use dashmap::mapref::entry::Entry;

        match self.held.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(RampLockGuard {
                    held: self.held.clone(),
                    id,
                })
            }
        }
    }

    pub fn is_locked(&self, id: Uuid) -> bool {
        self.held.contains_key(&id)
    }
}

impl Drop for RampLockGuard {
    fn drop(&mut self) {
        self.held.remove(&self.id);
    }
}
