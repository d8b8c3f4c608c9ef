//! Quick corrections: edits applied immediately but kept reversible.

use super::{ensure_user, Document, MutationOutcome};
use crate::buffer::TextBuffer;
use crate::error::EngineError;
use crate::models::{new_id, Correction, Metadata, TextRange, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A correction together with the mutation that applied, reverted or
/// switched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOutcome {
    pub correction: Correction,
    pub outcome: MutationOutcome,
}

impl<B: TextBuffer> Document<B> {
    /// Replace `original` at `[index, index + length)` with `correction` and
    /// remember the swap so it can be reverted or switched to an alternate.
    ///
    /// The range must currently hold `original`. Corrections are refused while
    /// `user` holds the open transaction, since the record would survive a
    /// rollback of the buffered replace.
    ///
    /// # Errors
    /// [`EngineError::Validation`] when the range does not hold `original`,
    /// [`EngineError::InvalidState`] inside the caller's transaction, plus any
    /// error of the replace itself.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_correction(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
        original: &str,
        correction: &str,
        alternates: Vec<String>,
        metadata: Metadata,
    ) -> Result<CorrectionOutcome, EngineError> {
        ensure_user(user)?;
        self.ensure_not_in_transaction(user, "apply a correction")?;
        let range = TextRange::new(index, length);
        if range.end() <= self.buffer.len() {
            let current = self.buffer.text(index, length);
            if current != original {
                return Err(EngineError::validation(format!(
                    "correction expected '{}' at {} but found '{}'",
                    original, range, current
                )));
            }
        }

        let outcome = self.replace(user, index, length, correction, None)?;
        let entry = Correction {
            correction_id: new_id("corr"),
            user_id: user.clone(),
            index,
            length: correction.chars().count(),
            original_text: original.to_string(),
            applied_text: correction.to_string(),
            alternates,
            metadata,
            created_at: Utc::now(),
            reverted: false,
            alternate_selected: None,
        };
        self.corrections
            .insert(entry.correction_id.clone(), entry.clone());
        while self.corrections.len() > self.config.correction_capacity {
            if let Some((evicted, _)) = self.corrections.shift_remove_index(0) {
                tracing::debug!(correction = %evicted, "correction evicted");
            }
        }
        Ok(CorrectionOutcome {
            correction: entry,
            outcome,
        })
    }

    fn live_correction(&self, correction_id: &str) -> Result<&Correction, EngineError> {
        let correction = self
            .corrections
            .get(correction_id)
            .ok_or_else(|| EngineError::not_found("correction", correction_id))?;
        if correction.reverted {
            return Err(EngineError::InvalidState(format!(
                "correction '{}' was already reverted",
                correction_id
            )));
        }
        Ok(correction)
    }

    /// Put the original text back and mark the correction reverted.
    ///
    /// # Errors
    /// [`EngineError::NotFound`], [`EngineError::InvalidState`] when already
    /// reverted, or any error of the replace.
    pub fn revert_correction(
        &mut self,
        correction_id: &str,
        user: &UserId,
    ) -> Result<CorrectionOutcome, EngineError> {
        ensure_user(user)?;
        self.ensure_not_in_transaction(user, "revert a correction")?;
        let live = self.live_correction(correction_id)?;
        let (index, length, original) = (live.index, live.length, live.original_text.clone());

        let outcome = self.replace(user, index, length, &original, None)?;
        let correction = self
            .corrections
            .get_mut(correction_id)
            .ok_or_else(|| EngineError::not_found("correction", correction_id))?;
        correction.reverted = true;
        correction.length = original.chars().count();
        Ok(CorrectionOutcome {
            correction: correction.clone(),
            outcome,
        })
    }

    /// Swap the applied text for `alternates[alternate]`.
    ///
    /// # Errors
    /// [`EngineError::NotFound`], [`EngineError::InvalidState`] for a reverted
    /// correction, [`EngineError::Validation`] for an unknown alternate, or any
    /// error of the replace.
    pub fn switch_to_alternate(
        &mut self,
        correction_id: &str,
        alternate: usize,
        user: &UserId,
    ) -> Result<CorrectionOutcome, EngineError> {
        ensure_user(user)?;
        self.ensure_not_in_transaction(user, "switch a correction")?;
        let live = self.live_correction(correction_id)?;
        let replacement = live.alternates.get(alternate).cloned().ok_or_else(|| {
            EngineError::validation(format!(
                "correction '{}' has {} alternates; index {} is out of range",
                correction_id,
                live.alternates.len(),
                alternate
            ))
        })?;
        let (index, length) = (live.index, live.length);

        let outcome = self.replace(user, index, length, &replacement, None)?;
        let correction = self
            .corrections
            .get_mut(correction_id)
            .ok_or_else(|| EngineError::not_found("correction", correction_id))?;
        correction.length = replacement.chars().count();
        correction.applied_text = replacement;
        correction.alternate_selected = Some(alternate);
        Ok(CorrectionOutcome {
            correction: correction.clone(),
            outcome,
        })
    }

    pub fn correction(&self, correction_id: &str) -> Option<&Correction> {
        self.corrections.get(correction_id)
    }

    /// Retained corrections, oldest first.
    pub fn corrections(&self) -> Vec<Correction> {
        self.corrections.values().cloned().collect()
    }

    /// Newest live correction whose applied range contains `position`.
    pub fn correction_at(&self, position: usize) -> Option<&Correction> {
        self.corrections
            .values()
            .rev()
            .find(|correction| !correction.reverted && correction.range().contains(position))
    }
}
