//! Proposal/review workflow for non-authoritative edits.

use super::{ensure_user, Document, DocumentEvent, MutationOutcome};
use crate::buffer::TextBuffer;
use crate::error::EngineError;
use crate::models::{new_id, Metadata, Suggestion, SuggestionStatus, TextRange, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Outcome of accepting a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedSuggestion {
    pub suggestion: Suggestion,
    pub outcome: MutationOutcome,
}

impl<B: TextBuffer> Document<B> {
    /// Propose replacing `[index, index + length)` with `new_text`.
    ///
    /// Captures the current text of the range as `old_text`; the buffer is not
    /// touched.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for an out-of-bounds range or a proposal
    /// that would change nothing.
    pub fn suggest(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        new_text: &str,
        metadata: Metadata,
    ) -> Result<Suggestion, EngineError> {
        ensure_user(user)?;
        let range = TextRange::new(index, length);
        if range.end() > self.buffer.len() {
            return Err(EngineError::validation(format!(
                "suggestion range {} is out of bounds for document length {}",
                range,
                self.buffer.len()
            )));
        }
        if length == 0 && new_text.is_empty() {
            return Err(EngineError::validation("suggestion has no effect"));
        }
        let suggestion = Suggestion {
            suggestion_id: new_id("sugg"),
            user_id: user.clone(),
            index,
            length,
            old_text: self.buffer.text(index, length),
            new_text: new_text.to_string(),
            status: SuggestionStatus::Pending,
            metadata,
            created_at: Utc::now(),
            decided_by: None,
            decided_at: None,
            reason: None,
        };
        self.suggestions
            .insert(suggestion.suggestion_id.clone(), suggestion.clone());
        self.emit(DocumentEvent::Suggestion(suggestion.clone()));
        Ok(suggestion)
    }

    fn pending_suggestion(&self, suggestion_id: &str) -> Result<&Suggestion, EngineError> {
        let suggestion = self
            .suggestions
            .get(suggestion_id)
            .ok_or_else(|| EngineError::not_found("suggestion", suggestion_id))?;
        if !suggestion.is_pending() {
            return Err(EngineError::InvalidState(format!(
                "suggestion '{}' is already {:?}",
                suggestion_id, suggestion.status
            )));
        }
        Ok(suggestion)
    }

    /// Apply a pending suggestion as a replace by `acting_user`.
    ///
    /// The stored range is used as-is; intervening edits are not re-mapped.
    /// With [`crate::Config::strict_suggestion_accept`] the accept fails when
    /// the range no longer holds `old_text`. A failed replace leaves the
    /// suggestion pending.
    ///
    /// # Errors
    /// [`EngineError::NotFound`], [`EngineError::InvalidState`] for a
    /// non-pending or stale suggestion or when `acting_user` holds the open
    /// transaction, or any error of the replace itself.
    pub fn accept_suggestion(
        &mut self,
        suggestion_id: &str,
        acting_user: &UserId,
    ) -> Result<AcceptedSuggestion, EngineError> {
        ensure_user(acting_user)?;
        self.ensure_not_in_transaction(acting_user, "accept a suggestion")?;
        let pending = self.pending_suggestion(suggestion_id)?;
        let (index, length, new_text, old_text) = (
            pending.index,
            pending.length,
            pending.new_text.clone(),
            pending.old_text.clone(),
        );
        if self.config.strict_suggestion_accept
            && self.buffer.text(index, length) != old_text
        {
            return Err(EngineError::InvalidState(format!(
                "suggestion '{}' no longer matches the document",
                suggestion_id
            )));
        }

        let outcome = self.replace(acting_user, index, length, &new_text, None)?;
        let suggestion = self.decide(
            suggestion_id,
            acting_user,
            SuggestionStatus::Accepted,
            None,
        )?;
        Ok(AcceptedSuggestion {
            suggestion,
            outcome,
        })
    }

    /// Reject a pending suggestion without touching the buffer.
    ///
    /// # Errors
    /// [`EngineError::NotFound`] or [`EngineError::InvalidState`] for a
    /// non-pending suggestion.
    pub fn reject_suggestion(
        &mut self,
        suggestion_id: &str,
        acting_user: &UserId,
        reason: Option<String>,
    ) -> Result<Suggestion, EngineError> {
        ensure_user(acting_user)?;
        self.pending_suggestion(suggestion_id)?;
        self.decide(
            suggestion_id,
            acting_user,
            SuggestionStatus::Rejected,
            reason,
        )
    }

    fn decide(
        &mut self,
        suggestion_id: &str,
        acting_user: &UserId,
        status: SuggestionStatus,
        reason: Option<String>,
    ) -> Result<Suggestion, EngineError> {
        let suggestion = self
            .suggestions
            .get_mut(suggestion_id)
            .ok_or_else(|| EngineError::not_found("suggestion", suggestion_id))?;
        suggestion.status = status;
        suggestion.decided_by = Some(acting_user.clone());
        suggestion.decided_at = Some(Utc::now());
        suggestion.reason = reason;
        let decided = suggestion.clone();
        self.emit(DocumentEvent::Suggestion(decided.clone()));
        Ok(decided)
    }

    pub fn suggestion(&self, suggestion_id: &str) -> Option<&Suggestion> {
        self.suggestions.get(suggestion_id)
    }

    /// Suggestions in creation order, optionally filtered by status.
    pub fn suggestions(&self, status: Option<SuggestionStatus>) -> Vec<Suggestion> {
        self.suggestions
            .values()
            .filter(|suggestion| status.map_or(true, |wanted| suggestion.status == wanted))
            .cloned()
            .collect()
    }

    /// Remove suggestions matching `status` (all when `None`).
    ///
    /// # Returns
    /// Number of suggestions removed.
    pub fn clear_suggestions(&mut self, status: Option<SuggestionStatus>) -> usize {
        let before = self.suggestions.len();
        self.suggestions
            .retain(|_, suggestion| status.map_or(false, |wanted| suggestion.status != wanted));
        before - self.suggestions.len()
    }
}
