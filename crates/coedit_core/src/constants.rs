//! Shared constants used across coedit crates.

/// Maximum number of change records retained by the change log.
pub const DEFAULT_CHANGE_LOG_CAPACITY: usize = 1_000;

/// Maximum number of quick corrections retained before the oldest is evicted.
pub const DEFAULT_CORRECTION_CAPACITY: usize = 100;

/// Default range-lock lifetime in milliseconds.
pub const DEFAULT_LOCK_DURATION_MS: u64 = 30_000;

/// Default liveness window for presence entries in milliseconds.
pub const DEFAULT_PRESENCE_THRESHOLD_MS: u64 = 30_000;

/// Default Control Bus request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default number of records returned by history queries without a limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// User id recorded for edits that arrive from outside the engine without an author.
pub const EXTERNAL_USER_ID: &str = "external";
