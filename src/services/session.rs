//! Session service
//!
//! Lifecycle operations the authentication layer calls on login, on every
//! authenticated request and on logout:
//! - `start_session` / `start_session_for_days` create and persist a session
//! - `check_session` re-fetches a session and evaluates its validity
//! - `end_session` and `end_all_sessions_for_user` invalidate sessions
//!
//! Nothing here caches sessions. The cleanup scheduler may delete a session
//! at any moment, so callers re-fetch through `check_session` on every use.

use crate::config::{ConfigError, SessionConfig};
use crate::db::repositories::SessionRepository;
use crate::error::SessionError;
use crate::models::{Session, DEFAULT_EXPIRATION_DAYS, MAX_EXPIRATION_DAYS};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;

/// Session lifetimes applied by `start_session`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Lifetime when the user asked to be remembered
    pub remember_me: Duration,
    /// Lifetime otherwise
    pub standard: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            remember_me: Duration::days(DEFAULT_EXPIRATION_DAYS),
            standard: Duration::hours(8),
        }
    }
}

impl SessionPolicy {
    /// Build the policy from the `session` configuration section.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if either lifetime is not positive or exceeds
    ///   `MAX_EXPIRATION_DAYS`
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            remember_me: Duration::days(config.lifetime_days),
            standard: Duration::hours(config.short_lifetime_hours),
        })
    }
}

/// How `end_all_sessions_for_user` invalidates sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSessionsMode {
    /// Log out everywhere; rows are kept as history
    Deactivate,
    /// Permanently erase rows (account closure, data-removal requests)
    Erase,
}

/// Session service for creating, validating and invalidating sessions
pub struct SessionService {
    session_repo: Arc<dyn SessionRepository>,
    policy: SessionPolicy,
}

impl SessionService {
    /// Create a new session service with the default policy
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_policy(session_repo, SessionPolicy::default())
    }

    /// Create a new session service with custom lifetimes
    pub fn with_policy(session_repo: Arc<dyn SessionRepository>, policy: SessionPolicy) -> Self {
        Self {
            session_repo,
            policy,
        }
    }

    /// The lifetimes this service hands out
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Start a session after a successful login.
    ///
    /// `remember_me` selects the long lifetime, otherwise the short one.
    ///
    /// # Errors
    ///
    /// - `StoreFailure` if the session could not be persisted
    pub async fn start_session(
        &self,
        user_id: i64,
        remember_me: bool,
    ) -> Result<Session, SessionError> {
        let lifetime = if remember_me {
            self.policy.remember_me
        } else {
            self.policy.standard
        };

        self.persist(Session::with_lifetime(user_id, lifetime)).await
    }

    /// Start a session lasting `days` days, e.g. on employee registration.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `days` is not in `1..=MAX_EXPIRATION_DAYS`
    /// - `StoreFailure` if the session could not be persisted
    pub async fn start_session_for_days(
        &self,
        user_id: i64,
        days: i64,
    ) -> Result<Session, SessionError> {
        if !(1..=MAX_EXPIRATION_DAYS).contains(&days) {
            return Err(SessionError::InvalidArgument(format!(
                "Session lifetime must be between 1 and {} days, got {}",
                MAX_EXPIRATION_DAYS, days
            )));
        }

        self.persist(Session::new(user_id, days)).await
    }

    /// Look up a session and return it only if it is currently valid.
    ///
    /// Missing, deactivated and expired sessions all yield `None`.
    pub async fn check_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let session = self
            .session_repo
            .get_by_id(id)
            .await
            .context("Failed to get session")?;

        Ok(session.filter(Session::is_valid))
    }

    /// Most recent valid session of a user, if any
    pub async fn active_session_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<Session>, SessionError> {
        let session = self
            .session_repo
            .get_active_by_user_id(user_id)
            .await
            .context("Failed to get active session")?;

        Ok(session)
    }

    /// Push a valid session's expiration forward by `days`.
    ///
    /// Returns `None` if the session is missing or no longer valid; expired
    /// sessions are not revived.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the new expiration would lie more than
    ///   `MAX_EXPIRATION_DAYS` days from now
    pub async fn extend_session(
        &self,
        id: &str,
        days: i64,
    ) -> Result<Option<Session>, SessionError> {
        let Some(mut session) = self.check_session(id).await? else {
            return Ok(None);
        };

        session.try_extend(days)?;
        self.write_back(session).await
    }

    /// Replace the data blob of a valid session.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `data` is `None`, whether or not the session exists
    pub async fn update_session_data(
        &self,
        id: &str,
        data: Option<String>,
    ) -> Result<Option<Session>, SessionError> {
        let Some(data) = data else {
            return Err(SessionError::InvalidArgument(
                "Session data cannot be null".to_string(),
            ));
        };

        let Some(mut session) = self.check_session(id).await? else {
            return Ok(None);
        };

        session.update_data(Some(data))?;
        self.write_back(session).await
    }

    /// End a single session (logout). Unknown IDs are ignored.
    pub async fn end_session(&self, id: &str) -> Result<(), SessionError> {
        let deleted = self
            .session_repo
            .delete(id)
            .await
            .context("Failed to delete session")?;

        if deleted {
            tracing::debug!("Session ended");
        }

        Ok(())
    }

    /// End every session of a user.
    ///
    /// Returns the number of sessions affected.
    pub async fn end_all_sessions_for_user(
        &self,
        user_id: i64,
        mode: EndSessionsMode,
    ) -> Result<u64, SessionError> {
        let count = match mode {
            EndSessionsMode::Deactivate => self
                .session_repo
                .deactivate_all_by_user_id(user_id)
                .await
                .context("Failed to deactivate sessions")?,
            EndSessionsMode::Erase => self
                .session_repo
                .delete_all_by_user_id(user_id)
                .await
                .context("Failed to erase sessions")?,
        };

        tracing::info!(
            "Ended {} session(s) for user {} ({:?})",
            count,
            user_id,
            mode
        );

        Ok(count)
    }

    /// Delete all expired sessions right away.
    ///
    /// The cleanup scheduler does this periodically; this is the manual trigger.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, SessionError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    async fn persist(&self, session: Session) -> Result<Session, SessionError> {
        let created = self
            .session_repo
            .add(&session)
            .await
            .context("Failed to create session")?;
        self.session_repo
            .save_changes()
            .await
            .context("Failed to commit session")?;

        tracing::debug!(
            "Session started for user {} (expires {})",
            created.user_id,
            created.expires_at
        );

        Ok(created)
    }

    async fn write_back(&self, session: Session) -> Result<Option<Session>, SessionError> {
        let updated = self
            .session_repo
            .update(&session)
            .await
            .context("Failed to update session")?;
        if !updated {
            // Swept or deleted between the read and the write
            return Ok(None);
        }
        self.session_repo
            .save_changes()
            .await
            .context("Failed to commit session")?;

        Ok(Some(session))
    }
}
