//! Per-user single-flight marks.

use aibot_core::UserId;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// The set of users with a drain in progress.
///
/// The lock is only held for the insert or remove itself, never across an
/// await point.
#[derive(Debug, Default)]
pub struct BusySet {
    users: Mutex<HashSet<UserId>>,
}

impl BusySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user_id` busy unless it already is.
    ///
    /// The mark is released when the returned guard drops, including when
    /// the owning future is cancelled or unwinds.
    #[must_use]
    pub fn try_acquire(&self, user_id: &UserId) -> Option<BusyGuard<'_>> {
        let inserted = self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.clone());
        inserted.then(|| BusyGuard {
            set: self,
            user_id: user_id.clone(),
        })
    }

    /// Whether `user_id` is currently marked busy.
    #[must_use]
    pub fn is_busy(&self, user_id: &UserId) -> bool {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id)
    }

    /// Number of users currently marked busy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no user is marked busy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds one user's busy mark.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    set: &'a BusySet,
    user_id: UserId,
}

impl BusyGuard<'_> {
    /// The user this guard holds busy.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.set
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}
