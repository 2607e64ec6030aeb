//! Engine configuration loaded from environment variables.

use chrono::Duration;

use crate::error::CoreError;

/// Default edit-session window in minutes: successive saves by the same
/// editor inside it amend one revision.
pub const DEFAULT_EDIT_SESSION_MINS: i64 = 30;

/// Default section lock timeout in minutes.
pub const DEFAULT_LOCK_TIMEOUT_MINS: i64 = 30;

/// Minimum accepted value for either duration, in minutes.
pub const MIN_DURATION_MINS: i64 = 1;

/// Maximum accepted value for either duration, in minutes (4 hours).
pub const MAX_DURATION_MINS: i64 = 240;

/// Timing policy for revisions and locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WikiConfig {
    pub edit_session_window: Duration,
    pub lock_timeout: Duration,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            edit_session_window: Duration::minutes(DEFAULT_EDIT_SESSION_MINS),
            lock_timeout: Duration::minutes(DEFAULT_LOCK_TIMEOUT_MINS),
        }
    }
}

impl WikiConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `EDIT_SESSION_WINDOW_MINS` | `30`    |
    /// | `LOCK_TIMEOUT_MINS`        | `30`    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let session = minutes_var(&lookup, "EDIT_SESSION_WINDOW_MINS", DEFAULT_EDIT_SESSION_MINS)?;
        let lock = minutes_var(&lookup, "LOCK_TIMEOUT_MINS", DEFAULT_LOCK_TIMEOUT_MINS)?;
        Ok(Self {
            edit_session_window: Duration::minutes(session),
            lock_timeout: Duration::minutes(lock),
        })
    }
}

fn minutes_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, CoreError> {
    let minutes = match lookup(key) {
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            CoreError::Validation(format!("{key} must be a whole number of minutes, got '{raw}'"))
        })?,
        None => default,
    };
    validate_minutes(key, minutes)?;
    Ok(minutes)
}

/// Validate a configured duration in minutes.
pub fn validate_minutes(name: &str, minutes: i64) -> Result<(), CoreError> {
    if minutes < MIN_DURATION_MINS {
        return Err(CoreError::Validation(format!(
            "{name} must be at least {MIN_DURATION_MINS} minute(s), got {minutes}"
        )));
    }
    if minutes > MAX_DURATION_MINS {
        return Err(CoreError::Validation(format!(
            "{name} must be at most {MAX_DURATION_MINS} minutes, got {minutes}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
