//! Range lock model.

use super::{TextRange, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-bounded exclusive claim on a buffer range by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeLock {
    pub lock_id: String,
    pub user_id: UserId,
    pub index: usize,
    pub length: usize,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RangeLock {
    pub fn range(&self) -> TextRange {
        TextRange::new(self.index, self.length)
    }

    /// A lock is live strictly before `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
