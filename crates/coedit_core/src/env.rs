//! Scoped environment overrides for configuration tests.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Process-wide mutex serializing environment mutation.
pub fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

#[allow(unused_unsafe)]
fn write_var(key: &str, value: Option<&str>) {
    // SAFETY: every write happens while `env_lock` is held by an EnvGuard.
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

/// Holds [`env_lock`] and a set of overrides; restores the previous values on
/// drop, in reverse order.
pub struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Apply `overrides`; `None` removes the variable.
    pub fn apply(overrides: &[(&str, Option<&str>)]) -> Self {
        let lock = env_lock().lock().unwrap_or_else(PoisonError::into_inner);
        let saved = overrides
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                write_var(key, *value);
                (key.to_string(), previous)
            })
            .collect();
        Self { saved, _lock: lock }
    }

    pub fn set(key: &str, value: &str) -> Self {
        Self::apply(&[(key, Some(value))])
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, previous) in self.saved.iter().rev() {
            write_var(key, previous.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EnvGuard;

    #[test]
    fn guard_restores_previous_values_in_reverse_order() {
        let key = "COEDIT_TEST_ENV_GUARD";
        let other = "COEDIT_TEST_ENV_GUARD_OTHER";
        {
            let _swap = EnvGuard::apply(&[(key, Some("first")), (other, Some("x")), (key, Some("second"))]);
            assert_eq!(std::env::var(key).ok().as_deref(), Some("second"));
            assert_eq!(std::env::var(other).ok().as_deref(), Some("x"));
        }
        assert!(std::env::var(key).is_err());
        assert!(std::env::var(other).is_err());
    }
}
