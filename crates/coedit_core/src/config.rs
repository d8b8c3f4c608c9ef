//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_CHANGE_LOG_CAPACITY, DEFAULT_CORRECTION_CAPACITY, DEFAULT_LOCK_DURATION_MS,
    DEFAULT_PRESENCE_THRESHOLD_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Runtime configuration for a coedit document and its control bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub change_log_capacity: usize,
    pub correction_capacity: usize,
    pub default_lock_duration_ms: u64,
    pub presence_threshold_ms: u64,
    pub request_timeout_ms: u64,
    /// Fail suggestion accepts when the buffer no longer holds the captured text.
    pub strict_suggestion_accept: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            change_log_capacity: DEFAULT_CHANGE_LOG_CAPACITY,
            correction_capacity: DEFAULT_CORRECTION_CAPACITY,
            default_lock_duration_ms: DEFAULT_LOCK_DURATION_MS,
            presence_threshold_ms: DEFAULT_PRESENCE_THRESHOLD_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            strict_suggestion_accept: false,
        }
    }
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid {}='{}'; using default", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing
    /// or unparsable.
    pub fn from_env() -> Self {
        let capacity_floor = |value: usize| value.max(1);
        Self {
            change_log_capacity: capacity_floor(env_number(
                "COEDIT_CHANGE_LOG_CAPACITY",
                DEFAULT_CHANGE_LOG_CAPACITY,
            )),
            correction_capacity: capacity_floor(env_number(
                "COEDIT_CORRECTION_CAPACITY",
                DEFAULT_CORRECTION_CAPACITY,
            )),
            default_lock_duration_ms: env_number(
                "COEDIT_DEFAULT_LOCK_MS",
                DEFAULT_LOCK_DURATION_MS,
            ),
            presence_threshold_ms: env_number(
                "COEDIT_PRESENCE_THRESHOLD_MS",
                DEFAULT_PRESENCE_THRESHOLD_MS,
            ),
            request_timeout_ms: env_number("COEDIT_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
            strict_suggestion_accept: env_flag_enabled("COEDIT_STRICT_SUGGESTIONS"),
        }
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Default lock lifetime as a [`chrono::Duration`].
    pub fn default_lock_duration(&self) -> chrono::Duration {
        millis(self.default_lock_duration_ms)
    }

    /// Presence liveness window as a [`chrono::Duration`].
    pub fn presence_threshold(&self) -> chrono::Duration {
        millis(self.presence_threshold_ms)
    }
}

/// Milliseconds as a [`chrono::Duration`], saturating.
pub fn millis(value: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
