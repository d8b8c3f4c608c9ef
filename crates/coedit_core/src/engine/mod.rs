//! The document engine façade.
//!
//! [`Document`] owns the text buffer and every piece of collaboration state
//! (change log, locks, transaction, suggestions, corrections, annotations,
//! presence). All calls run to completion synchronously; callers serialize
//! access (the control bus host owns the document on a single task).

mod annotations;
mod corrections;
mod presence;
mod suggestions;

#[cfg(test)]
mod tests;

pub use corrections::CorrectionOutcome;
pub use suggestions::AcceptedSuggestion;

use crate::buffer::{Attributes, BatchOp, RopeBuffer, TextBuffer};
use crate::changelog::{ChangeLog, SubscriptionId};
use crate::config::Config;
use crate::constants::EXTERNAL_USER_ID;
use crate::error::EngineError;
use crate::locks::RangeLockManager;
use crate::models::change::ChangeDraft;
use crate::models::{
    Annotation, ChangeKind, ChangePayload, ChangeRecord, Correction, Cursor, Edit,
    PresenceEntry, RangeLock, Suggestion, UserId,
};
use crate::transaction::{
    Transaction, TransactionCoordinator, TransactionState, TransactionSummary,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Handle returned by [`Document::observe`].
pub type ObserverId = u64;

type Observer = Box<dyn FnMut(&DocumentEvent) + Send>;

/// Live notification fanned out to event streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum DocumentEvent {
    Change(ChangeRecord),
    Cursor(Cursor),
    Suggestion(Suggestion),
}

/// What a mutation primitive did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MutationOutcome {
    /// Applied to the buffer and logged.
    Applied { record: ChangeRecord },
    /// Held by the caller's open transaction until commit.
    Buffered { position: usize },
}

impl MutationOutcome {
    pub fn record(&self) -> Option<&ChangeRecord> {
        match self {
            Self::Applied { record } => Some(record),
            Self::Buffered { .. } => None,
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, Self::Buffered { .. })
    }
}

/// Full collaboration state, sent to new event streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub version: u64,
    pub text: String,
    pub length: usize,
    pub locks: Vec<RangeLock>,
    pub cursors: Vec<Cursor>,
    pub presence: Vec<PresenceEntry>,
    pub pending_suggestions: Vec<Suggestion>,
    pub annotations: Vec<Annotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

/// In-memory shared document.
pub struct Document<B: TextBuffer = RopeBuffer> {
    buffer: B,
    config: Config,
    log: ChangeLog,
    locks: RangeLockManager,
    transactions: TransactionCoordinator,
    suggestions: IndexMap<String, Suggestion>,
    corrections: IndexMap<String, Correction>,
    annotations: IndexMap<String, Annotation>,
    presence: IndexMap<UserId, PresenceEntry>,
    cursors: IndexMap<UserId, Cursor>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: ObserverId,
}

impl Document<RopeBuffer> {
    /// Create a rope-backed document with default configuration.
    pub fn new(text: &str) -> Self {
        Self::with_buffer(RopeBuffer::new(text), Config::default())
    }
}

fn ensure_user(user: &UserId) -> Result<(), EngineError> {
    if user.as_str().trim().is_empty() {
        return Err(EngineError::validation("userId must not be empty"));
    }
    Ok(())
}

impl<B: TextBuffer> Document<B> {
    /// Wrap an existing buffer.
    pub fn with_buffer(buffer: B, config: Config) -> Self {
        Self {
            buffer,
            log: ChangeLog::new(config.change_log_capacity),
            config,
            locks: RangeLockManager::default(),
            transactions: TransactionCoordinator::default(),
            suggestions: IndexMap::new(),
            corrections: IndexMap::new(),
            annotations: IndexMap::new(),
            presence: IndexMap::new(),
            cursors: IndexMap::new(),
            observers: Vec::new(),
            next_observer: 1,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn version(&self) -> u64 {
        self.log.version()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn text(&self) -> String {
        self.buffer.full_text()
    }

    /// Text of `[index, index + length)`, clamped to the buffer.
    pub fn text_range(&self, index: usize, length: usize) -> String {
        self.buffer.text(index, length)
    }

    pub fn changes_since(&self, version: u64) -> Vec<ChangeRecord> {
        self.log.changes_since(version)
    }

    /// Most recent `limit` records, ascending by version.
    pub fn history(&self, limit: usize) -> Vec<ChangeRecord> {
        self.log.history(limit)
    }

    /// Register a change-log callback. See [`ChangeLog::subscribe`].
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ChangeRecord) + Send + 'static,
    {
        self.log.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.log.unsubscribe(id)
    }

    /// Register a callback for change, cursor and suggestion events.
    pub fn observe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&DocumentEvent) + Send + 'static,
    {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    fn emit(&mut self, event: DocumentEvent) {
        for (id, observer) in self.observers.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                tracing::warn!(observer = *id, "document observer panicked; continuing delivery");
            }
        }
    }

    fn append(&mut self, draft: ChangeDraft, user: UserId, now: DateTime<Utc>) -> ChangeRecord {
        let record = self.log.append(draft, user, now);
        self.emit(DocumentEvent::Change(record.clone()));
        record
    }

    /// Full state view for late joiners.
    pub fn snapshot(&mut self) -> DocumentSnapshot {
        let now = Utc::now();
        DocumentSnapshot {
            version: self.version(),
            text: self.text(),
            length: self.len(),
            locks: self.locks.active(now),
            cursors: self.cursors.values().cloned().collect(),
            presence: self.presence.values().cloned().collect(),
            pending_suggestions: self
                .suggestions
                .values()
                .filter(|suggestion| suggestion.is_pending())
                .cloned()
                .collect(),
            annotations: self.annotations.values().cloned().collect(),
            transaction: self.transactions.current().cloned(),
        }
    }

    // ---- mutation primitives ----

    pub fn insert(
        &mut self,
        user: &UserId,
        index: usize,
        text: &str,
        attrs: Option<Attributes>,
    ) -> Result<MutationOutcome, EngineError> {
        self.apply_edit(
            user,
            Edit::Insert {
                index,
                text: text.to_string(),
                attrs,
            },
        )
    }

    pub fn delete(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
    ) -> Result<MutationOutcome, EngineError> {
        self.apply_edit(user, Edit::Delete { index, length })
    }

    pub fn replace(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        text: &str,
        attrs: Option<Attributes>,
    ) -> Result<MutationOutcome, EngineError> {
        self.apply_edit(
            user,
            Edit::Replace {
                index,
                length,
                text: text.to_string(),
                attrs,
            },
        )
    }

    pub fn apply_batch(
        &mut self,
        user: &UserId,
        ops: Vec<BatchOp>,
    ) -> Result<MutationOutcome, EngineError> {
        self.apply_edit(user, Edit::Batch { ops })
    }

    /// Gate one edit through validation and lock checks, then apply or buffer it.
    ///
    /// Outside a transaction the edit reaches the buffer and advances the
    /// version by one. Inside the caller's own transaction it is buffered with
    /// no visible effect. Nothing is mutated when any check fails.
    ///
    /// # Errors
    /// - [`EngineError::Validation`] for bad user ids or ranges.
    /// - [`EngineError::LockConflict`] when a foreign lock overlaps the edit or
    ///   another user's transaction is open.
    pub fn apply_edit(
        &mut self,
        user: &UserId,
        edit: Edit,
    ) -> Result<MutationOutcome, EngineError> {
        ensure_user(user)?;
        let now = Utc::now();

        if let Some(open) = self.transactions.current() {
            if &open.user_id != user {
                return Err(EngineError::LockConflict(format!(
                    "document is reserved by an open transaction held by '{}'",
                    open.user_id
                )));
            }
            let next_len = edit.validate(open.projected_len)?;
            self.locks.check(user, &edit.footprints(), now)?;
            let position = self
                .transactions
                .buffer(edit, next_len)
                .ok_or_else(|| EngineError::InvalidState("no transaction is open".to_string()))?;
            tracing::debug!(user = %user, position, "edit buffered in transaction");
            return Ok(MutationOutcome::Buffered { position });
        }

        edit.validate(self.buffer.len())?;
        self.locks.check(user, &edit.footprints(), now)?;
        let draft = edit.apply(&mut self.buffer);
        let record = self.append(draft, user.clone(), now);
        Ok(MutationOutcome::Applied { record })
    }

    /// Log an edit the buffer received from outside the engine (e.g. direct
    /// keystrokes). The buffer already holds the change, so it is not touched
    /// and no lock or transaction checks apply.
    pub fn record_external_change(
        &mut self,
        user: Option<&UserId>,
        kind: ChangeKind,
        index: usize,
        length: usize,
        text: Option<String>,
    ) -> ChangeRecord {
        let user = user
            .cloned()
            .unwrap_or_else(|| UserId::from(EXTERNAL_USER_ID));
        let draft = ChangeDraft {
            kind,
            index,
            length,
            text,
            removed_text: None,
            payload: None,
            external: true,
        };
        self.append(draft, user, Utc::now())
    }

    // ---- transactions ----

    /// Open the document-wide transaction for `user`.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] when a transaction is already open.
    pub fn begin_transaction(&mut self, user: &UserId) -> Result<Transaction, EngineError> {
        ensure_user(user)?;
        let version = self.version();
        let len = self.buffer.len();
        self.transactions
            .begin(user, version, len, Utc::now())
            .cloned()
    }

    /// Replay the buffered edits and log them as one record.
    ///
    /// Every buffered edit is re-validated against the current buffer and
    /// locks before the first one is applied; on failure the transaction stays
    /// open and nothing changes. An empty transaction closes without a version
    /// change.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] with no open transaction,
    /// [`EngineError::PermissionDenied`] for a non-owner, or the first
    /// validation/lock failure among the buffered edits.
    pub fn commit_transaction(&mut self, user: &UserId) -> Result<TransactionSummary, EngineError> {
        let now = Utc::now();
        let ops = self.transactions.ensure_owner(user)?.buffered_ops.clone();

        let mut len = self.buffer.len();
        for edit in &ops {
            len = edit.validate(len)?;
            self.locks.check(user, &edit.footprints(), now)?;
        }

        let record = if ops.is_empty() {
            None
        } else {
            let span = self
                .transactions
                .current()
                .map(Transaction::span)
                .unwrap_or_default();
            for edit in &ops {
                edit.apply(&mut self.buffer);
            }
            let draft = ChangeDraft {
                kind: ChangeKind::Batch,
                index: span.index,
                length: span.length,
                text: None,
                removed_text: None,
                payload: Some(ChangePayload::Transaction(ops)),
                external: false,
            };
            Some(self.append(draft, user.clone(), now))
        };

        self.transactions
            .finish(TransactionState::Committed, record)
            .ok_or_else(|| EngineError::InvalidState("no transaction is open".to_string()))
    }

    /// Discard the buffered edits. The buffer and version are untouched.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] with no open transaction,
    /// [`EngineError::PermissionDenied`] for a non-owner.
    pub fn rollback_transaction(
        &mut self,
        user: &UserId,
    ) -> Result<TransactionSummary, EngineError> {
        self.transactions.ensure_owner(user)?;
        self.transactions
            .finish(TransactionState::RolledBack, None)
            .ok_or_else(|| EngineError::InvalidState("no transaction is open".to_string()))
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transactions.current()
    }

    /// Refuse bookkeeping that would outlive a rollback: the caller's edits are
    /// only buffered while it holds the open transaction.
    fn ensure_not_in_transaction(&self, user: &UserId, action: &str) -> Result<(), EngineError> {
        if self.transactions.owner() == Some(user) {
            return Err(EngineError::InvalidState(format!(
                "cannot {} while '{}' holds an open transaction",
                action, user
            )));
        }
        Ok(())
    }

    // ---- range locks ----

    /// Lock `[index, index + length)` for `user`, defaulting the duration from
    /// [`Config::default_lock_duration_ms`].
    pub fn lock_range(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        duration: Option<chrono::Duration>,
    ) -> Result<RangeLock, EngineError> {
        ensure_user(user)?;
        let duration = duration.unwrap_or_else(|| self.config.default_lock_duration());
        self.locks.acquire(user, index, length, duration, Utc::now())
    }

    pub fn unlock_range(&mut self, lock_id: &str, user: &UserId) -> Result<RangeLock, EngineError> {
        self.locks.release(lock_id, user, Utc::now())
    }

    pub fn locks(&mut self) -> Vec<RangeLock> {
        self.locks.active(Utc::now())
    }

    pub fn lock(&mut self, lock_id: &str) -> Option<RangeLock> {
        self.locks.get(lock_id, Utc::now())
    }

    /// Earliest lock deadline, for the host's expiry timer.
    pub fn next_lock_expiry(&self) -> Option<(String, DateTime<Utc>)> {
        self.locks.next_expiry()
    }

    /// Timer callback; see [`RangeLockManager::expire`].
    pub fn expire_lock(&mut self, lock_id: &str, now: DateTime<Utc>) -> bool {
        self.locks.expire(lock_id, now)
    }

    pub fn purge_expired_locks(&mut self, now: DateTime<Utc>) -> usize {
        self.locks.purge_expired(now)
    }
}
