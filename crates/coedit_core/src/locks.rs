//! Range-exclusive, self-expiring edit locks.

use crate::error::EngineError;
use crate::models::{new_id, RangeLock, TextRange, UserId};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

/// Tracks live range locks keyed by lock id.
///
/// Expired locks are purged lazily by whichever query meets them first; the
/// host may also drive [`RangeLockManager::expire`] from a timer.
#[derive(Debug, Default)]
pub struct RangeLockManager {
    locks: IndexMap<String, RangeLock>,
}

impl RangeLockManager {
    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.locks.len();
        self.locks.retain(|lock_id, lock| {
            let keep = !lock.is_expired(now);
            if !keep {
                tracing::debug!(lock_id = %lock_id, user = %lock.user_id, "range lock expired");
            }
            keep
        });
        before - self.locks.len()
    }

    fn conflicting(&self, user: &UserId, range: &TextRange) -> Option<&RangeLock> {
        self.locks
            .values()
            .find(|lock| &lock.user_id != user && lock.range().overlaps(range))
    }

    /// Acquire a lock over `[index, index + length)` for `user`.
    ///
    /// # Returns
    /// The new lock, expiring at `now + duration`.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] for an empty range or non-positive
    /// duration, and [`EngineError::LockConflict`] when an unexpired lock held
    /// by another user overlaps the range.
    pub fn acquire(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        duration: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<RangeLock, EngineError> {
        if length == 0 {
            return Err(EngineError::validation("lock length must be positive"));
        }
        if duration <= chrono::Duration::zero() {
            return Err(EngineError::validation("lock duration must be positive"));
        }
        let expires_at = now
            .checked_add_signed(duration)
            .ok_or_else(|| EngineError::validation("lock duration is too large"))?;
        self.purge(now);
        let range = TextRange::new(index, length);
        if let Some(held) = self.conflicting(user, &range) {
            return Err(EngineError::LockConflict(format!(
                "range {} overlaps lock '{}' held by '{}'",
                range, held.lock_id, held.user_id
            )));
        }
        let lock = RangeLock {
            lock_id: new_id("lock"),
            user_id: user.clone(),
            index,
            length,
            acquired_at: now,
            expires_at,
        };
        tracing::debug!(lock_id = %lock.lock_id, user = %user, range = %range, "range lock acquired");
        self.locks.insert(lock.lock_id.clone(), lock.clone());
        Ok(lock)
    }

    /// Release a lock early. Only its owner may do so.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] for unknown or already-expired locks
    /// and [`EngineError::PermissionDenied`] when `user` is not the owner.
    pub fn release(
        &mut self,
        lock_id: &str,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<RangeLock, EngineError> {
        self.purge(now);
        let Some(lock) = self.locks.get(lock_id) else {
            return Err(EngineError::not_found("lock", lock_id));
        };
        if &lock.user_id != user {
            return Err(EngineError::PermissionDenied(format!(
                "'{}' does not own lock '{}'",
                user, lock_id
            )));
        }
        let released = self.locks.shift_remove(lock_id);
        tracing::debug!(lock_id = %lock_id, user = %user, "range lock released");
        released.ok_or_else(|| EngineError::not_found("lock", lock_id))
    }

    /// Check that `user` may touch every range in `ranges`.
    ///
    /// # Errors
    /// Returns [`EngineError::LockConflict`] naming the first foreign lock hit.
    pub fn check(
        &mut self,
        user: &UserId,
        ranges: &[TextRange],
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.purge(now);
        for range in ranges {
            if let Some(held) = self.conflicting(user, range) {
                return Err(EngineError::LockConflict(format!(
                    "range {} is locked by '{}' (lock '{}')",
                    range, held.user_id, held.lock_id
                )));
            }
        }
        Ok(())
    }

    /// Live locks in acquisition order.
    pub fn active(&mut self, now: DateTime<Utc>) -> Vec<RangeLock> {
        self.purge(now);
        self.locks.values().cloned().collect()
    }

    pub fn get(&mut self, lock_id: &str, now: DateTime<Utc>) -> Option<RangeLock> {
        self.purge(now);
        self.locks.get(lock_id).cloned()
    }

    /// Earliest pending expiry, for scheduling a timer.
    pub fn next_expiry(&self) -> Option<(String, DateTime<Utc>)> {
        self.locks
            .values()
            .min_by_key(|lock| lock.expires_at)
            .map(|lock| (lock.lock_id.clone(), lock.expires_at))
    }

    /// Timer callback for one lock.
    ///
    /// Re-checks that the lock still exists and has actually expired, since an
    /// explicit release may have raced the timer.
    ///
    /// # Returns
    /// `true` when the lock was removed by this call.
    pub fn expire(&mut self, lock_id: &str, now: DateTime<Utc>) -> bool {
        let due = self
            .locks
            .get(lock_id)
            .map(|lock| lock.is_expired(now))
            .unwrap_or(false);
        if due {
            self.locks.shift_remove(lock_id);
            tracing::debug!(lock_id = %lock_id, "range lock expired by timer");
        }
        due
    }

    /// Drop every expired lock. Returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.purge(now)
    }
}
