//! Backend health table.
//!
//! # States
//! - Healthy (`true`): backend receives traffic
//! - Unhealthy (`false`): backend skipped by selection
//!
//! Every backend starts unhealthy until its first probe completes.
//!
//! # Design Decisions
//! - One mutex guards the whole table; no torn reads across backends
//! - Selection runs under the same lock as writes (`snapshot_and_pick`)
//! - A poisoned lock still yields the table; flags are plain booleans

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared per-backend health flags, indexed like the backend pool.
#[derive(Debug)]
pub struct HealthState {
    flags: Mutex<Vec<bool>>,
}

impl HealthState {
    /// Create a table of `len` backends, all unhealthy.
    pub fn new(len: usize) -> Self {
        Self {
            flags: Mutex::new(vec![false; len]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the flag for `index`, returning the previous value.
    ///
    /// # Panics
    /// If `index` is outside the pool. Indices come from the pool itself.
    pub fn set_healthy(&self, index: usize, healthy: bool) -> bool {
        let mut flags = self.lock();
        std::mem::replace(&mut flags[index], healthy)
    }

    /// Current flag for `index`.
    pub fn is_healthy(&self, index: usize) -> bool {
        self.lock()[index]
    }

    /// Run `pick` against the table while holding the lock.
    ///
    /// Writers are blocked until `pick` returns, so the decision is made
    /// against a table that cannot change underneath it.
    pub fn snapshot_and_pick<F, R>(&self, pick: F) -> R
    where
        F: FnOnce(&[bool]) -> R,
    {
        let flags = self.lock();
        pick(&flags)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> Vec<bool> {
        self.lock().clone()
    }

    /// Number of backends tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
