//! Range-scoped annotations.

use super::{TextRange, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment or note attached to a buffer range.
///
/// The range is recorded at creation time and is not shifted by later edits,
/// so it drifts when text before or inside it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub annotation_id: String,
    pub user_id: UserId,
    pub index: usize,
    pub length: usize,
    pub text: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    pub fn range(&self) -> TextRange {
        TextRange::new(self.index, self.length)
    }
}
