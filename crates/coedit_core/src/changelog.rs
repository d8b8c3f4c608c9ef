//! Version counter and bounded, append-only change log.

use crate::models::change::{ChangeDraft, ChangeRecord};
use crate::models::UserId;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Handle returned by [`ChangeLog::subscribe`].
pub type SubscriptionId = u64;

type Subscriber = Box<dyn FnMut(&ChangeRecord) + Send>;

/// Monotonic ordering primitive for every externally visible mutation.
///
/// The version starts at 0 and increases by exactly one per appended record.
/// Only the newest `capacity` records are retained.
pub struct ChangeLog {
    records: VecDeque<ChangeRecord>,
    capacity: usize,
    version: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: SubscriptionId,
}

impl ChangeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            version: 0,
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Current document version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Version of the oldest retained record, if any.
    pub fn oldest_version(&self) -> Option<u64> {
        self.records.front().map(|record| record.version)
    }

    /// Advance the version, stamp the draft with it and store the record.
    ///
    /// Evicts the oldest record past capacity, then notifies subscribers in
    /// registration order. A panicking subscriber is logged and skipped; later
    /// subscribers still receive the record.
    pub(crate) fn append(
        &mut self,
        draft: ChangeDraft,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> ChangeRecord {
        self.version += 1;
        let record = draft.into_record(self.version, user_id, timestamp);
        self.records.push_back(record.clone());
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
        self.notify(&record);
        record
    }

    fn notify(&mut self, record: &ChangeRecord) {
        for (id, subscriber) in self.subscribers.iter_mut() {
            let delivered = catch_unwind(AssertUnwindSafe(|| subscriber(record)));
            if delivered.is_err() {
                tracing::warn!(
                    subscription = *id,
                    version = record.version,
                    "change subscriber panicked; continuing delivery"
                );
            }
        }
    }

    /// All retained records with `version > since`, ascending.
    pub fn changes_since(&self, since: u64) -> Vec<ChangeRecord> {
        self.records
            .iter()
            .filter(|record| record.version > since)
            .cloned()
            .collect()
    }

    /// The most recent `limit` records, ascending.
    pub fn history(&self, limit: usize) -> Vec<ChangeRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    /// Register a callback invoked synchronously for every appended record.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeRecord) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` for unknown ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }
}
