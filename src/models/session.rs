//! Session model
//!
//! A login session is a time-bounded credential owned by one user. Validity is
//! derived from the wall clock on every check and never stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Default session lifetime in days
pub const DEFAULT_EXPIRATION_DAYS: i64 = 30;

/// Data blob assigned to freshly created sessions
pub const EMPTY_SESSION_DATA: &str = "{}";

/// Furthest an expiration may lie from the current time, in days
pub const MAX_EXPIRATION_DAYS: i64 = 36_500;

/// Session entity for user authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Cleared by deactivation, never set again
    pub is_active: bool,
    /// Caller-owned state, stored verbatim
    pub data: String,
}

/// Convert a day count to a duration, if it lies within `MAX_EXPIRATION_DAYS`
pub fn lifetime_days(days: i64) -> Option<Duration> {
    if (-MAX_EXPIRATION_DAYS..=MAX_EXPIRATION_DAYS).contains(&days) {
        Some(Duration::days(days))
    } else {
        None
    }
}

fn clamped_days(days: i64) -> Duration {
    Duration::days(days.clamp(-MAX_EXPIRATION_DAYS, MAX_EXPIRATION_DAYS))
}

fn saturating_add(at: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

impl Session {
    /// Create a new active session expiring `expiration_days` from now.
    ///
    /// Zero or negative day counts produce a session that is already expired.
    /// Normal login paths always pass a positive count. Counts beyond
    /// `MAX_EXPIRATION_DAYS` are clamped to it.
    pub fn new(user_id: i64, expiration_days: i64) -> Self {
        Self::with_lifetime(user_id, clamped_days(expiration_days))
    }

    /// Create a new active session with an arbitrary lifetime.
    ///
    /// An expiration outside the representable range saturates.
    pub fn with_lifetime(user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            expires_at: saturating_add(now, lifetime),
            is_active: true,
            data: EMPTY_SESSION_DATA.to_string(),
        }
    }

    /// Check if the session is active and not yet expired
    pub fn is_valid(&self) -> bool {
        self.is_active && Utc::now() < self.expires_at
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Push the expiration forward by `days`, counted from the current
    /// expiration rather than from now. Negative values shorten the window.
    ///
    /// Day counts beyond `MAX_EXPIRATION_DAYS` are clamped and the result
    /// saturates; use [`Session::try_extend`] to reject them instead.
    pub fn extend(&mut self, days: i64) {
        self.expires_at = saturating_add(self.expires_at, clamped_days(days));
    }

    /// Checked [`Session::extend`].
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the new expiration would lie more than
    ///   `MAX_EXPIRATION_DAYS` days from now. The session is left unchanged.
    pub fn try_extend(&mut self, days: i64) -> Result<(), SessionError> {
        let out_of_range = || {
            SessionError::InvalidArgument(format!(
                "Cannot extend session by {} days: expiration must stay within {} days of now",
                days, MAX_EXPIRATION_DAYS
            ))
        };

        let delta = lifetime_days(days).ok_or_else(out_of_range)?;
        let expires_at = self
            .expires_at
            .checked_add_signed(delta)
            .ok_or_else(out_of_range)?;

        let horizon = clamped_days(MAX_EXPIRATION_DAYS);
        let now = Utc::now();
        if expires_at > saturating_add(now, horizon) || expires_at < saturating_add(now, -horizon) {
            return Err(out_of_range());
        }

        self.expires_at = expires_at;
        Ok(())
    }

    /// Mark the session inactive. Idempotent.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Replace the data blob.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `data` is `None`. An empty string is accepted.
    pub fn update_data(&mut self, data: Option<String>) -> Result<(), SessionError> {
        let data = data.ok_or_else(|| {
            SessionError::InvalidArgument("Session data cannot be null".to_string())
        })?;
        self.data = data;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn reactivate(&mut self) {
        self.is_active = true;
    }
}
