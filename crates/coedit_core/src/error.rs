//! Engine error taxonomy shared by every document operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure of a single engine call.
///
/// Every variant is a synchronous failure of the triggering call; no partial
/// mutation is left behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The targeted range is held by another user's lock (or transaction).
    #[error("Range locked: {0}")]
    LockConflict(String),

    /// The caller does not own the lock or transaction it tried to act on.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Unknown suggestion, correction, annotation or lock id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is illegal in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A bus request went unanswered within its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Missing or malformed parameter.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Stable wire name for an [`EngineError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    LockConflict,
    PermissionDenied,
    NotFound,
    InvalidState,
    Timeout,
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LockConflict => "lock-conflict",
            Self::PermissionDenied => "permission-denied",
            Self::NotFound => "not-found",
            Self::InvalidState => "invalid-state",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
        };
        f.write_str(name)
    }
}

impl EngineError {
    /// Return the taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockConflict(_) => ErrorKind::LockConflict,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Rebuild an error from its wire kind and message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::LockConflict => Self::LockConflict(message),
            ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::InvalidState => Self::InvalidState(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Validation => Self::Validation(message),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{what} '{id}'"))
    }
}
