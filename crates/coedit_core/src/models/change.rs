//! Change records and the edits that produce them.

use super::{TextRange, UserId};
use crate::buffer::{Attributes, BatchOp, TextBuffer};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shape of a logged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
    Batch,
}

/// Structured body of a batch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ops", rename_all = "kebab-case")]
pub enum ChangePayload {
    /// Ops of a single `apply-batch` call.
    Delta(Vec<BatchOp>),
    /// Edits replayed by a committed transaction, in original order.
    Transaction(Vec<Edit>),
}

/// Immutable, append-only entry of the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Document version right after this record was appended.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub kind: ChangeKind,
    pub index: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ChangePayload>,
    /// Edit reported by the buffer rather than issued through the engine.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// Unversioned record body produced by applying an edit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChangeDraft {
    pub kind: ChangeKind,
    pub index: usize,
    pub length: usize,
    pub text: Option<String>,
    pub removed_text: Option<String>,
    pub payload: Option<ChangePayload>,
    pub external: bool,
}

impl ChangeDraft {
    pub(crate) fn into_record(
        self,
        version: u64,
        user_id: UserId,
        timestamp: DateTime<Utc>,
    ) -> ChangeRecord {
        ChangeRecord {
            version,
            timestamp,
            user_id,
            kind: self.kind,
            index: self.index,
            length: self.length,
            text: self.text,
            removed_text: self.removed_text,
            payload: self.payload,
            external: self.external,
        }
    }
}

/// One mutation-primitive call with its arguments.
///
/// Transactions buffer these verbatim and replay them on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Edit {
    Insert {
        index: usize,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    Delete {
        index: usize,
        length: usize,
    },
    Replace {
        index: usize,
        length: usize,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    Batch {
        ops: Vec<BatchOp>,
    },
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn out_of_bounds(range: TextRange, len: usize) -> EngineError {
    EngineError::validation(format!(
        "range {} is out of bounds for document length {}",
        range, len
    ))
}

impl Edit {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Delete { .. } => ChangeKind::Delete,
            Self::Replace { .. } => ChangeKind::Replace,
            Self::Batch { .. } => ChangeKind::Batch,
        }
    }

    /// Check the edit against a document of `len` chars.
    ///
    /// # Returns
    /// The document length after the edit would be applied.
    ///
    /// # Errors
    /// Returns [`EngineError::Validation`] for out-of-bounds ranges and no-op
    /// edits.
    pub fn validate(&self, len: usize) -> Result<usize, EngineError> {
        match self {
            Self::Insert { index, text, .. } => {
                if text.is_empty() {
                    return Err(EngineError::validation("insert text must not be empty"));
                }
                if *index > len {
                    return Err(out_of_bounds(TextRange::new(*index, 0), len));
                }
                Ok(len + char_len(text))
            }
            Self::Delete { index, length } => {
                let range = TextRange::new(*index, *length);
                if *length == 0 {
                    return Err(EngineError::validation("delete length must be positive"));
                }
                if range.end() > len {
                    return Err(out_of_bounds(range, len));
                }
                Ok(len - length)
            }
            Self::Replace {
                index,
                length,
                text,
                ..
            } => {
                let range = TextRange::new(*index, *length);
                if *length == 0 && text.is_empty() {
                    return Err(EngineError::validation("replace has no effect"));
                }
                if range.end() > len {
                    return Err(out_of_bounds(range, len));
                }
                Ok(len - length + char_len(text))
            }
            Self::Batch { ops } => validate_batch(ops, len),
        }
    }

    /// Ranges this edit touches, for lock checks.
    ///
    /// An insert occupies the single position it lands on, so inserting at the
    /// start of or inside a locked range conflicts while appending right after
    /// it does not.
    pub fn footprints(&self) -> Vec<TextRange> {
        match self {
            Self::Insert { index, .. } => vec![TextRange::new(*index, 1)],
            Self::Delete { index, length } => vec![TextRange::new(*index, *length)],
            Self::Replace { index, length, .. } => vec![TextRange::new(*index, (*length).max(1))],
            Self::Batch { ops } => batch_footprints(ops),
        }
    }

    /// Smallest range covering every footprint.
    pub fn span(&self) -> TextRange {
        span_of(&self.footprints())
    }

    /// Apply to `buffer`. Callers must have run [`Edit::validate`] first.
    pub(crate) fn apply<B: TextBuffer + ?Sized>(&self, buffer: &mut B) -> ChangeDraft {
        match self {
            Self::Insert { index, text, attrs } => {
                buffer.insert_text(*index, text, attrs.as_ref());
                ChangeDraft {
                    kind: ChangeKind::Insert,
                    index: *index,
                    length: char_len(text),
                    text: Some(text.clone()),
                    removed_text: None,
                    payload: None,
                    external: false,
                }
            }
            Self::Delete { index, length } => {
                let removed = buffer.text(*index, *length);
                buffer.delete_text(*index, *length);
                ChangeDraft {
                    kind: ChangeKind::Delete,
                    index: *index,
                    length: *length,
                    text: None,
                    removed_text: Some(removed),
                    payload: None,
                    external: false,
                }
            }
            Self::Replace {
                index,
                length,
                text,
                attrs,
            } => {
                let removed = buffer.text(*index, *length);
                if *length > 0 {
                    buffer.delete_text(*index, *length);
                }
                if !text.is_empty() {
                    buffer.insert_text(*index, text, attrs.as_ref());
                }
                ChangeDraft {
                    kind: ChangeKind::Replace,
                    index: *index,
                    length: *length,
                    text: Some(text.clone()),
                    removed_text: Some(removed),
                    payload: None,
                    external: false,
                }
            }
            Self::Batch { ops } => {
                let span = self.span();
                buffer.apply_batch(ops);
                ChangeDraft {
                    kind: ChangeKind::Batch,
                    index: span.index,
                    length: span.length,
                    text: None,
                    removed_text: None,
                    payload: Some(ChangePayload::Delta(ops.clone())),
                    external: false,
                }
            }
        }
    }
}

pub(crate) fn span_of(ranges: &[TextRange]) -> TextRange {
    let start = ranges.iter().map(|range| range.index).min().unwrap_or(0);
    let end = ranges.iter().map(TextRange::end).max().unwrap_or(start);
    TextRange::new(start, end.saturating_sub(start))
}

fn validate_batch(ops: &[BatchOp], len: usize) -> Result<usize, EngineError> {
    if ops.is_empty() {
        return Err(EngineError::validation("batch must contain at least one op"));
    }
    let mut position = 0usize;
    let mut inserted = 0usize;
    let mut deleted = 0usize;
    for op in ops {
        match op {
            BatchOp::Retain { count } => {
                position = position.saturating_add(*count);
                if position > len {
                    return Err(EngineError::validation(format!(
                        "batch retains past end of document (position {}, length {})",
                        position, len
                    )));
                }
            }
            BatchOp::Insert { text, .. } => {
                if text.is_empty() {
                    return Err(EngineError::validation("batch insert text must not be empty"));
                }
                inserted += char_len(text);
            }
            BatchOp::Delete { count } => {
                let range = TextRange::new(position, *count);
                if *count == 0 {
                    return Err(EngineError::validation("batch delete count must be positive"));
                }
                if range.end() > len {
                    return Err(out_of_bounds(range, len));
                }
                position = range.end();
                deleted += count;
            }
        }
    }
    if inserted == 0 && deleted == 0 {
        return Err(EngineError::validation("batch has no effect"));
    }
    Ok(len + inserted - deleted)
}

fn batch_footprints(ops: &[BatchOp]) -> Vec<TextRange> {
    let mut position = 0usize;
    let mut ranges = Vec::new();
    for op in ops {
        match op {
            BatchOp::Retain { count } => position = position.saturating_add(*count),
            BatchOp::Insert { .. } => ranges.push(TextRange::new(position, 1)),
            BatchOp::Delete { count } => {
                ranges.push(TextRange::new(position, *count));
                position = position.saturating_add(*count);
            }
        }
    }
    ranges
}
