//! Transport-level errors for the control bus.

use coedit_core::{EngineError, ErrorKind};
use thiserror::Error;

/// Failure of a control bus call as seen by the calling side.
#[derive(Debug, Error)]
pub enum BusError {
    /// No response arrived within the client's deadline.
    #[error("Request {request_id} timed out")]
    Timeout { request_id: u64 },

    /// The host or the client driver went away before answering.
    #[error("Control bus channel closed")]
    ChannelClosed,

    /// The host executed the command and reported a failure.
    #[error("{kind}: {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

impl BusError {
    /// Taxonomy kind closest to this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ChannelClosed => ErrorKind::InvalidState,
            Self::Remote { kind, .. } => *kind,
            Self::Encode(_) | Self::Decode(_) => ErrorKind::Validation,
        }
    }
}

impl From<BusError> for EngineError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Remote { kind, message } => {
                let prefix = EngineError::from_kind(kind, String::new()).to_string();
                let detail = message.strip_prefix(prefix.as_str()).unwrap_or(&message);
                EngineError::from_kind(kind, detail)
            }
            other => EngineError::from_kind(other.kind(), other.to_string()),
        }
    }
}
