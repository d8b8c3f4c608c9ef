//! Wire envelopes and the typed command set.

use chrono::{DateTime, Utc};
use coedit_core::{
    AgentKind, Attributes, BatchOp, DocumentEvent, EngineError, ErrorKind, Metadata,
    SuggestionStatus, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Caller-assigned, monotonically increasing correlation id.
pub type RequestId = u64;

/// `{ requestId, command, params }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub request_id: RequestId,
    pub command: String,
    #[serde(default)]
    pub params: Value,
}

impl RequestEnvelope {
    /// Build an envelope from a typed command.
    pub fn from_command(request_id: RequestId, command: &Command) -> Result<Self, serde_json::Error> {
        let mut tagged = serde_json::to_value(command)?;
        let name = tagged
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let params = tagged
            .get_mut("params")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self {
            request_id,
            command: name,
            params,
        })
    }
}

/// `{ requestId, success, result?, error?, errorKind? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: RequestId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ResponseEnvelope {
    pub fn success(request_id: RequestId, result: Value) -> Self {
        Self {
            request_id,
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(request_id: RequestId, err: &EngineError) -> Self {
        Self {
            request_id,
            success: false,
            result: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    pub fn from_result(request_id: RequestId, result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(value) => Self::success(request_id, value),
            Err(err) => Self::failure(request_id, &err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    InitialState,
    Change,
    Cursor,
    Suggestion,
}

/// `{ streamId, eventKind, payload, timestamp }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub stream_id: String,
    pub event_kind: EventKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Anything the host writes back to a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostMessage {
    Response(ResponseEnvelope),
    Event(EventEnvelope),
}

/// Which live events a stream receives. The initial snapshot is always sent.
///
/// Empty `event_kinds` means every kind. `users`, when set, keeps only events
/// caused by those users; `exclude_users` drops events caused by them (e.g. a
/// driver's own edits).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFilter {
    #[serde(default)]
    pub event_kinds: Vec<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_users: Vec<UserId>,
}

impl StreamFilter {
    pub fn matches(&self, kind: EventKind, user: &UserId) -> bool {
        if kind == EventKind::InitialState {
            return true;
        }
        if !self.event_kinds.is_empty() && !self.event_kinds.contains(&kind) {
            return false;
        }
        if let Some(users) = &self.users {
            if !users.contains(user) {
                return false;
            }
        }
        !self.exclude_users.contains(user)
    }
}

/// Kind, originating user and payload of a document event.
pub(crate) fn describe_event(event: &DocumentEvent) -> Result<(EventKind, &UserId, Value), serde_json::Error> {
    Ok(match event {
        DocumentEvent::Change(record) => (EventKind::Change, &record.user_id, serde_json::to_value(record)?),
        DocumentEvent::Cursor(cursor) => (EventKind::Cursor, &cursor.user_id, serde_json::to_value(cursor)?),
        DocumentEvent::Suggestion(suggestion) => (
            EventKind::Suggestion,
            suggestion.decided_by.as_ref().unwrap_or(&suggestion.user_id),
            serde_json::to_value(suggestion)?,
        ),
    })
}

/// Every command the host understands.
///
/// On the wire the variant name is the kebab-case `command` string and the
/// fields are the camelCase `params` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "params",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    GetVersion {},
    GetText {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<usize>,
    },
    GetHistory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    ChangesSince {
        #[serde(default)]
        version: u64,
    },
    Snapshot {},

    Insert {
        user_id: UserId,
        index: usize,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    Delete {
        user_id: UserId,
        index: usize,
        length: usize,
    },
    Replace {
        user_id: UserId,
        index: usize,
        length: usize,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attrs: Option<Attributes>,
    },
    ApplyBatch {
        user_id: UserId,
        ops: Vec<BatchOp>,
    },

    LockRange {
        user_id: UserId,
        index: usize,
        length: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    UnlockRange {
        user_id: UserId,
        lock_id: String,
    },
    ListLocks {},

    BeginTransaction {
        user_id: UserId,
    },
    CommitTransaction {
        user_id: UserId,
    },
    RollbackTransaction {
        user_id: UserId,
    },

    Suggest {
        user_id: UserId,
        index: usize,
        length: usize,
        new_text: String,
        #[serde(default)]
        metadata: Metadata,
    },
    AcceptSuggestion {
        user_id: UserId,
        suggestion_id: String,
    },
    RejectSuggestion {
        user_id: UserId,
        suggestion_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ListSuggestions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SuggestionStatus>,
    },
    ClearSuggestions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SuggestionStatus>,
    },

    ApplyCorrection {
        user_id: UserId,
        index: usize,
        length: usize,
        original: String,
        correction: String,
        #[serde(default)]
        alternates: Vec<String>,
        #[serde(default)]
        metadata: Metadata,
    },
    RevertCorrection {
        user_id: UserId,
        correction_id: String,
    },
    SwitchCorrection {
        user_id: UserId,
        correction_id: String,
        alternate_index: usize,
    },
    CorrectionAt {
        index: usize,
    },

    Annotate {
        user_id: UserId,
        index: usize,
        length: usize,
        text: String,
        kind: String,
    },
    ListAnnotations {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    DeleteAnnotation {
        annotation_id: String,
    },

    AnnouncePresence {
        user_id: UserId,
        #[serde(default)]
        display_name: String,
        #[serde(default)]
        agent_kind: AgentKind,
    },
    Leave {
        user_id: UserId,
    },
    ActiveUsers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold_ms: Option<u64>,
    },
    SetCursor {
        user_id: UserId,
        index: usize,
    },
    SetSelection {
        user_id: UserId,
        index: usize,
        length: usize,
    },
    GetCursors {},

    RegisterStream {
        stream_id: String,
        #[serde(default)]
        filter: StreamFilter,
    },
    UnregisterStream {
        stream_id: String,
    },
}

impl Command {
    /// Parse the `command`/`params` pair of a request.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for unknown commands or malformed params.
    pub fn from_request(request: &RequestEnvelope) -> Result<Self, EngineError> {
        let params = match &request.params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(json!({ "command": request.command, "params": params })).map_err(
            |err| EngineError::Validation(format!("invalid '{}' request: {}", request.command, err)),
        )
    }
}
