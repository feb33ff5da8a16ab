//! One ingestion run per mailbox at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::debug;

/// Tracks which mailbox owners currently have an ingestion run in flight.
#[derive(Debug, Clone, Default)]
pub struct IngestLocks {
    active: Arc<Mutex<HashSet<i64>>>,
}

impl IngestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `owner_id` as running. Returns `None` if a run is already in
    /// progress for that mailbox. The mark is cleared when the guard drops.
    pub fn try_acquire(&self, owner_id: i64) -> Option<RunGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(owner_id) {
            return None;
        }
        debug!("Ingestion lock taken for owner {}", owner_id);
        Some(RunGuard {
            owner_id,
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_running(&self, owner_id: i64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&owner_id)
    }
}

#[derive(Debug)]
pub struct RunGuard {
    owner_id: i64,
    active: Arc<Mutex<HashSet<i64>>>,
}

impl RunGuard {
    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.owner_id);
        debug!("Ingestion lock released for owner {}", self.owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected_until_drop() {
        let locks = IngestLocks::new();

        let guard = locks.try_acquire(4).unwrap();
        assert_eq!(guard.owner_id(), 4);
        assert!(locks.is_running(4));
        assert!(locks.try_acquire(4).is_none());

        // other mailboxes are independent
        let other = locks.try_acquire(5);
        assert!(other.is_some());

        drop(guard);
        assert!(!locks.is_running(4));
        assert!(locks.try_acquire(4).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = IngestLocks::new();
        let clone = locks.clone();
        let _guard = locks.try_acquire(1).unwrap();
        assert!(clone.try_acquire(1).is_none());
    }
}
