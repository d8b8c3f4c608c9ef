//! Quick corrections that are applied immediately but stay revertible.

use super::{Metadata, TextRange, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An already-applied edit plus what is needed to undo or swap it.
///
/// `index`/`length` always describe the text currently applied
/// (`applied_text`), not the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub correction_id: String,
    pub user_id: UserId,
    pub index: usize,
    pub length: usize,
    pub original_text: String,
    pub applied_text: String,
    pub alternates: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub reverted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_selected: Option<usize>,
}

impl Correction {
    pub fn range(&self) -> TextRange {
        TextRange::new(self.index, self.length)
    }
}
