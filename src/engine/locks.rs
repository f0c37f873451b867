use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per user, kept apart from the data it serializes access to.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the user's lock without waiting. `None` while another request
    /// from the same user still holds it. The guard releases on drop.
    pub fn try_acquire(&self, user_id: u64) -> Option<OwnedMutexGuard<()>> {
        let lock = self.locks.entry(user_id).or_default().clone();
        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let locks = UserLocks::new();
        let guard = locks.try_acquire(1).unwrap();
        assert!(locks.try_acquire(1).is_none());
        assert!(locks.try_acquire(2).is_some());

        drop(guard);
        assert!(locks.try_acquire(1).is_some());
    }
}
