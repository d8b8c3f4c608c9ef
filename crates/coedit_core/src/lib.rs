//! Concurrent document-mutation engine (buffer seam, change log, locks,
//! transactions, review workflows, presence).

/// Text buffer trait, delta ops and the rope-backed default buffer.
pub mod buffer;
/// Bounded, versioned change log with subscribers.
pub mod changelog;
/// Configuration loading and defaults.
pub mod config;
pub mod constants;
/// The [`Document`] façade tying every component together.
pub mod engine;
/// Environment mutation helpers shared by tests.
pub mod env;
/// Engine error taxonomy.
pub mod error;
/// Owner-scoped, time-bounded range locks.
pub mod locks;
/// Records and wire models.
pub mod models;
/// Document-wide deferred-apply transactions.
pub mod transaction;

pub use buffer::{Attributes, BatchOp, RopeBuffer, TextBuffer};
pub use changelog::{ChangeLog, SubscriptionId};
pub use config::Config;
pub use engine::{
    AcceptedSuggestion, CorrectionOutcome, Document, DocumentEvent, DocumentSnapshot,
    MutationOutcome, ObserverId,
};
pub use error::{EngineError, ErrorKind};
pub use models::{
    AgentKind, Annotation, ChangeKind, ChangePayload, ChangeRecord, Correction, Cursor, Edit,
    Metadata, PresenceEntry, RangeLock, Suggestion, SuggestionStatus, TextRange, UserId,
};
pub use transaction::{Transaction, TransactionState, TransactionSummary};
