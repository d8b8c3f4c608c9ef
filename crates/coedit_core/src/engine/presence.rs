use super::{ensure_user, Document, DocumentEvent};
use crate::buffer::TextBuffer;
use crate::error::EngineError;
use crate::models::{AgentKind, Cursor, PresenceEntry, TextRange, UserId};
use chrono::{DateTime, Utc};

impl<B: TextBuffer> Document<B> {
    /// Upsert `user` in the presence table. A repeat announcement keeps the
    /// original `joined_at` and refreshes `last_seen`.
    pub fn announce_presence(
        &mut self,
        user: &UserId,
        display_name: &str,
        agent_kind: AgentKind,
    ) -> Result<PresenceEntry, EngineError> {
        self.announce_presence_at(user, display_name, agent_kind, Utc::now())
    }

    pub fn announce_presence_at(
        &mut self,
        user: &UserId,
        display_name: &str,
        agent_kind: AgentKind,
        now: DateTime<Utc>,
    ) -> Result<PresenceEntry, EngineError> {
        ensure_user(user)?;
        let display_name = if display_name.trim().is_empty() {
            user.as_str().to_string()
        } else {
            display_name.to_string()
        };
        let entry = self
            .presence
            .entry(user.clone())
            .and_modify(|entry| {
                entry.display_name = display_name.clone();
                entry.agent_kind = agent_kind;
                entry.last_seen = now;
            })
            .or_insert_with(|| PresenceEntry {
                user_id: user.clone(),
                display_name: display_name.clone(),
                agent_kind,
                joined_at: now,
                last_seen: now,
            });
        Ok(entry.clone())
    }

    /// Drop `user` from presence and forget their cursor.
    pub fn leave(&mut self, user: &UserId) -> Option<PresenceEntry> {
        self.cursors.shift_remove(user);
        self.presence.shift_remove(user)
    }

    /// Users seen within `threshold` (the configured window when `None`).
    pub fn active_users(&self, threshold: Option<chrono::Duration>) -> Vec<PresenceEntry> {
        self.active_users_at(Utc::now(), threshold)
    }

    pub fn active_users_at(
        &self,
        now: DateTime<Utc>,
        threshold: Option<chrono::Duration>,
    ) -> Vec<PresenceEntry> {
        let threshold = threshold.unwrap_or_else(|| self.config.presence_threshold());
        self.presence
            .values()
            .filter(|entry| entry.is_active(now, threshold))
            .cloned()
            .collect()
    }

    /// Every presence entry, live or stale.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        self.presence.values().cloned().collect()
    }

    /// Move `user`'s caret to `index`, clearing any selection.
    pub fn set_cursor(&mut self, user: &UserId, index: usize) -> Result<Cursor, EngineError> {
        self.set_selection(user, index, 0)
    }

    /// Record `user`'s selection; the cursor sits at its start.
    ///
    /// # Errors
    /// [`EngineError::Validation`] when the selection leaves the document.
    pub fn set_selection(
        &mut self,
        user: &UserId,
        index: usize,
        length: usize,
    ) -> Result<Cursor, EngineError> {
        ensure_user(user)?;
        let range = TextRange::new(index, length);
        if range.end() > self.buffer.len() {
            return Err(EngineError::validation(format!(
                "cursor {} is out of bounds for document length {}",
                range,
                self.buffer.len()
            )));
        }
        let now = Utc::now();
        let cursor = Cursor {
            user_id: user.clone(),
            index,
            length,
            timestamp: now,
        };
        self.cursors.insert(user.clone(), cursor.clone());
        if let Some(entry) = self.presence.get_mut(user) {
            entry.last_seen = now;
        }
        self.emit(DocumentEvent::Cursor(cursor.clone()));
        Ok(cursor)
    }

    pub fn cursor(&self, user: &UserId) -> Option<&Cursor> {
        self.cursors.get(user)
    }

    pub fn cursors(&self) -> Vec<Cursor> {
        self.cursors.values().cloned().collect()
    }
}
