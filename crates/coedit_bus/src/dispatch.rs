//! Execute typed commands against a [`Document`].

use crate::protocol::Command;
use coedit_core::config::millis;
use coedit_core::constants::DEFAULT_HISTORY_LIMIT;
use coedit_core::{Document, EngineError, TextBuffer};
use serde::Serialize;
use serde_json::{json, Value};

fn encode<T: Serialize>(value: T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|err| EngineError::InvalidState(format!("failed to encode result: {}", err)))
}

/// Run one document command and encode its result.
///
/// Stream registration belongs to the host and is rejected here.
///
/// # Errors
/// Whatever the engine operation returns.
pub fn dispatch<B: TextBuffer>(
    document: &mut Document<B>,
    command: Command,
) -> Result<Value, EngineError> {
    match command {
        Command::GetVersion {} => Ok(json!({ "version": document.version() })),
        Command::GetText { index, length } => {
            let text = match (index, length) {
                (None, None) => document.text(),
                (index, length) => {
                    let index = index.unwrap_or(0);
                    let length = length.unwrap_or_else(|| document.len().saturating_sub(index));
                    document.text_range(index, length)
                }
            };
            Ok(json!({ "text": text, "version": document.version() }))
        }
        Command::GetHistory { limit } => {
            encode(document.history(limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
        }
        Command::ChangesSince { version } => encode(document.changes_since(version)),
        Command::Snapshot {} => encode(document.snapshot()),

        Command::Insert {
            user_id,
            index,
            text,
            attrs,
        } => encode(document.insert(&user_id, index, &text, attrs)?),
        Command::Delete {
            user_id,
            index,
            length,
        } => encode(document.delete(&user_id, index, length)?),
        Command::Replace {
            user_id,
            index,
            length,
            text,
            attrs,
        } => encode(document.replace(&user_id, index, length, &text, attrs)?),
        Command::ApplyBatch { user_id, ops } => encode(document.apply_batch(&user_id, ops)?),

        Command::LockRange {
            user_id,
            index,
            length,
            duration_ms,
        } => encode(document.lock_range(&user_id, index, length, duration_ms.map(millis))?),
        Command::UnlockRange { user_id, lock_id } => {
            encode(document.unlock_range(&lock_id, &user_id)?)
        }
        Command::ListLocks {} => encode(document.locks()),

        Command::BeginTransaction { user_id } => encode(document.begin_transaction(&user_id)?),
        Command::CommitTransaction { user_id } => encode(document.commit_transaction(&user_id)?),
        Command::RollbackTransaction { user_id } => {
            encode(document.rollback_transaction(&user_id)?)
        }

        Command::Suggest {
            user_id,
            index,
            length,
            new_text,
            metadata,
        } => encode(document.suggest(&user_id, index, length, &new_text, metadata)?),
        Command::AcceptSuggestion {
            user_id,
            suggestion_id,
        } => encode(document.accept_suggestion(&suggestion_id, &user_id)?),
        Command::RejectSuggestion {
            user_id,
            suggestion_id,
            reason,
        } => encode(document.reject_suggestion(&suggestion_id, &user_id, reason)?),
        Command::ListSuggestions { status } => encode(document.suggestions(status)),
        Command::ClearSuggestions { status } => {
            Ok(json!({ "removed": document.clear_suggestions(status) }))
        }

        Command::ApplyCorrection {
            user_id,
            index,
            length,
            original,
            correction,
            alternates,
            metadata,
        } => encode(document.apply_correction(
            &user_id,
            index,
            length,
            &original,
            &correction,
            alternates,
            metadata,
        )?),
        Command::RevertCorrection {
            user_id,
            correction_id,
        } => encode(document.revert_correction(&correction_id, &user_id)?),
        Command::SwitchCorrection {
            user_id,
            correction_id,
            alternate_index,
        } => encode(document.switch_to_alternate(&correction_id, alternate_index, &user_id)?),
        Command::CorrectionAt { index } => encode(document.correction_at(index)),

        Command::Annotate {
            user_id,
            index,
            length,
            text,
            kind,
        } => encode(document.annotate(&user_id, index, length, &text, &kind)?),
        Command::ListAnnotations { kind } => encode(document.annotations(kind.as_deref())),
        Command::DeleteAnnotation { annotation_id } => {
            encode(document.delete_annotation(&annotation_id)?)
        }

        Command::AnnouncePresence {
            user_id,
            display_name,
            agent_kind,
        } => encode(document.announce_presence(&user_id, &display_name, agent_kind)?),
        Command::Leave { user_id } => encode(document.leave(&user_id)),
        Command::ActiveUsers { threshold_ms } => {
            encode(document.active_users(threshold_ms.map(millis)))
        }
        Command::SetCursor { user_id, index } => encode(document.set_cursor(&user_id, index)?),
        Command::SetSelection {
            user_id,
            index,
            length,
        } => encode(document.set_selection(&user_id, index, length)?),
        Command::GetCursors {} => encode(document.cursors()),

        Command::RegisterStream { .. } | Command::UnregisterStream { .. } => Err(
            EngineError::InvalidState("event streams are managed by the bus host".to_string()),
        ),
    }
}
