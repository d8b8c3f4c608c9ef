//! Data models shared by the document engine and the control bus.

/// Range-scoped comments.
pub mod annotation;
/// Change records and buffered edits.
pub mod change;
/// Applied, revertible quick corrections.
pub mod correction;
/// Range locks.
pub mod lock;
/// Presence entries and cursors.
pub mod presence;
/// Proposal/review suggestions.
pub mod suggestion;

pub use annotation::Annotation;
pub use change::{ChangeKind, ChangePayload, ChangeRecord, Edit};
pub use correction::Correction;
pub use lock::RangeLock;
pub use presence::{AgentKind, Cursor, PresenceEntry};
pub use suggestion::{Suggestion, SuggestionStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Free-form caller metadata attached to suggestions and corrections.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Stable id of an actor (human editor or agent) acting on a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Construct a user id from a caller-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return this user id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Half-open interval `[index, index + length)` over buffer char positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub index: usize,
    pub length: usize,
}

impl TextRange {
    pub fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }

    /// Exclusive end position.
    pub fn end(&self) -> usize {
        self.index.saturating_add(self.length)
    }

    /// Half-open interval intersection. Empty ranges never overlap anything.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.length > 0 && other.length > 0 && self.index < other.end() && other.index < self.end()
    }

    /// Whether `position` falls inside the range.
    pub fn contains(&self, position: usize) -> bool {
        position >= self.index && position < self.end()
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.index, self.end())
    }
}

/// Generate a fresh session-scoped id such as `lock-3f2c...`.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
