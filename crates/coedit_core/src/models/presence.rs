//! Presence entries and cursor positions.

use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of actor a participant is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    #[default]
    Human,
    Llm,
}

/// Ephemeral identity/liveness entry for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub agent_kind: AgentKind,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    /// Live when `now - last_seen < threshold`.
    pub fn is_active(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) < threshold
    }
}

/// Last known caret (and optional selection length) of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub user_id: UserId,
    pub index: usize,
    pub length: usize,
    pub timestamp: DateTime<Utc>,
}
