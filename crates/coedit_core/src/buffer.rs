//! Text buffer seam and the rope-backed default buffer.
//!
//! The engine never stores glyphs itself; it drives a [`TextBuffer`] after
//! validating every edit. Positions are char (Unicode scalar) offsets.

use ropey::Rope;
use serde::{Deserialize, Serialize};

/// Formatting attributes carried alongside inserted text.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// One step of a delta-style batch edit.
///
/// Ops walk the document from position 0: `Retain` skips, `Insert` adds text
/// at the current position, `Delete` removes text at the current position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum BatchOp {
    Retain {
        count: usize,
    },
    Insert {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    Delete {
        count: usize,
    },
}

/// External ordered text store mutated by the engine.
///
/// Implementations may assume the engine has already bounds-checked every
/// call; out-of-range arguments are clamped rather than reported.
pub trait TextBuffer: Send {
    /// Content length in chars.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text of `[index, index + length)`.
    fn text(&self, index: usize, length: usize) -> String;

    /// Whole buffer content.
    fn full_text(&self) -> String {
        self.text(0, self.len())
    }

    fn insert_text(&mut self, index: usize, text: &str, attrs: Option<&Attributes>);

    fn delete_text(&mut self, index: usize, length: usize);

    /// Apply a delta batch in one pass.
    fn apply_batch(&mut self, ops: &[BatchOp]) {
        let mut position = 0usize;
        for op in ops {
            match op {
                BatchOp::Retain { count } => position = position.saturating_add(*count),
                BatchOp::Insert { text, attrs } => {
                    self.insert_text(position, text, attrs.as_ref());
                    position = position.saturating_add(text.chars().count());
                }
                BatchOp::Delete { count } => self.delete_text(position, *count),
            }
        }
    }
}

/// Rope-backed in-memory buffer.
///
/// Attributes are accepted but not stored; rich formatting belongs to the
/// editor widget that owns a real buffer.
#[derive(Debug, Clone, Default)]
pub struct RopeBuffer {
    rope: Rope,
    revision: u64,
}

impl RopeBuffer {
    /// Create a new buffer from UTF-8 text.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            revision: 0,
        }
    }

    /// Number of mutations applied since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn clamp(&self, index: usize, length: usize) -> (usize, usize) {
        let len = self.rope.len_chars();
        let start = index.min(len);
        let end = index.saturating_add(length).min(len);
        (start, end)
    }
}

impl TextBuffer for RopeBuffer {
    fn len(&self) -> usize {
        self.rope.len_chars()
    }

    fn text(&self, index: usize, length: usize) -> String {
        let (start, end) = self.clamp(index, length);
        if start >= end {
            return String::new();
        }
        self.rope.slice(start..end).to_string()
    }

    fn insert_text(&mut self, index: usize, text: &str, _attrs: Option<&Attributes>) {
        if text.is_empty() {
            return;
        }
        let start = index.min(self.rope.len_chars());
        self.rope.insert(start, text);
        self.revision = self.revision.wrapping_add(1);
    }

    fn delete_text(&mut self, index: usize, length: usize) {
        let (start, end) = self.clamp(index, length);
        if start >= end {
            return;
        }
        self.rope.remove(start..end);
        self.revision = self.revision.wrapping_add(1);
    }
}
