//! Document-wide transaction state machine.
//!
//! `closed -> open (begin) -> {committed, rolled back} -> closed`. While open,
//! the owner's edits are buffered here instead of reaching the text buffer.

use crate::error::EngineError;
use crate::models::change::{span_of, Edit};
use crate::models::{ChangeRecord, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// An open (or just-finished) transaction and its buffered edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub user_id: UserId,
    pub start_version: u64,
    pub started_at: DateTime<Utc>,
    pub buffered_ops: Vec<Edit>,
    pub state: TransactionState,
    /// Document length once every buffered op is applied.
    pub projected_len: usize,
}

/// Result of closing a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub user_id: UserId,
    pub start_version: u64,
    pub op_count: usize,
    pub state: TransactionState,
    /// The single record a non-empty commit appended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<ChangeRecord>,
}

/// Holds at most one open transaction per document.
#[derive(Debug, Default)]
pub struct TransactionCoordinator {
    open: Option<Transaction>,
}

impl TransactionCoordinator {
    pub fn current(&self) -> Option<&Transaction> {
        self.open.as_ref()
    }

    pub fn owner(&self) -> Option<&UserId> {
        self.open.as_ref().map(|txn| &txn.user_id)
    }

    /// Open a transaction for `user`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidState`] when any transaction is already open.
    pub fn begin(
        &mut self,
        user: &UserId,
        start_version: u64,
        document_len: usize,
        now: DateTime<Utc>,
    ) -> Result<&Transaction, EngineError> {
        if let Some(open) = &self.open {
            return Err(EngineError::InvalidState(format!(
                "a transaction is already open (held by '{}')",
                open.user_id
            )));
        }
        tracing::debug!(user = %user, start_version, "transaction opened");
        Ok(self.open.insert(Transaction {
            user_id: user.clone(),
            start_version,
            started_at: now,
            buffered_ops: Vec::new(),
            state: TransactionState::Open,
            projected_len: document_len,
        }))
    }

    /// Confirm `user` owns the open transaction.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] with no open transaction,
    /// [`EngineError::PermissionDenied`] for a non-owner.
    pub fn ensure_owner(&self, user: &UserId) -> Result<&Transaction, EngineError> {
        let Some(open) = &self.open else {
            return Err(EngineError::InvalidState(
                "no transaction is open".to_string(),
            ));
        };
        if &open.user_id != user {
            return Err(EngineError::PermissionDenied(format!(
                "transaction is owned by '{}', not '{}'",
                open.user_id, user
            )));
        }
        Ok(open)
    }

    /// Append a validated edit to the open transaction.
    ///
    /// # Returns
    /// Zero-based position of the edit within the transaction.
    pub(crate) fn buffer(&mut self, edit: Edit, projected_len: usize) -> Option<usize> {
        let open = self.open.as_mut()?;
        open.buffered_ops.push(edit);
        open.projected_len = projected_len;
        Some(open.buffered_ops.len() - 1)
    }

    /// Close the open transaction with a terminal state.
    pub(crate) fn finish(
        &mut self,
        state: TransactionState,
        record: Option<ChangeRecord>,
    ) -> Option<TransactionSummary> {
        let mut txn = self.open.take()?;
        txn.state = state;
        tracing::debug!(
            user = %txn.user_id,
            ops = txn.buffered_ops.len(),
            state = ?state,
            "transaction closed"
        );
        Some(TransactionSummary {
            user_id: txn.user_id,
            start_version: txn.start_version,
            op_count: txn.buffered_ops.len(),
            state,
            record,
        })
    }
}

impl Transaction {
    /// Smallest range covering every buffered edit, in replay coordinates.
    pub fn span(&self) -> crate::models::TextRange {
        let ranges: Vec<_> = self
            .buffered_ops
            .iter()
            .flat_map(|edit| edit.footprints())
            .collect();
        span_of(&ranges)
    }
}
