//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the session store contract
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Every method is a single statement, so each call is atomic on its own and
//! safe to run concurrently with the cleanup sweep.

use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session store contract
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session
    async fn add(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Most recently created session of a user that is active and unexpired
    async fn get_active_by_user_id(&self, user_id: i64) -> Result<Option<Session>>;

    /// Check whether a session row exists, valid or not
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Write back the mutable fields of a session.
    /// `is_active` can only be cleared here, never set again.
    /// Returns `false` if the session no longer exists.
    async fn update(&self, session: &Session) -> Result<bool>;

    /// Delete a session. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Mark every session of a user inactive, keeping the rows
    async fn deactivate_all_by_user_id(&self, user_id: i64) -> Result<u64>;

    /// Permanently remove every session of a user
    async fn delete_all_by_user_id(&self, user_id: i64) -> Result<u64>;

    /// Delete every session whose expiration is at or before now
    async fn delete_expired(&self) -> Result<u64>;

    /// Number of stored sessions, including expired and inactive ones
    async fn count(&self) -> Result<u64>;

    /// Flush pending writes. Stores that commit per statement have nothing to do.
    async fn save_changes(&self) -> Result<()> {
        Ok(())
    }
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

enum Backend<'a> {
    Sqlite(&'a SqlitePool),
    Mysql(&'a MySqlPool),
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    fn backend(&self) -> Result<Backend<'_>> {
        if let Some(pool) = self.pool.as_sqlite() {
            return Ok(Backend::Sqlite(pool));
        }
        if let Some(pool) = self.pool.as_mysql() {
            return Ok(Backend::Mysql(pool));
        }
        anyhow::bail!("Unsupported database pool for sessions")
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn add(&self, session: &Session) -> Result<Session> {
        match self.backend()? {
            Backend::Sqlite(pool) => add_session_sqlite(pool, session).await,
            Backend::Mysql(pool) => add_session_mysql(pool, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.backend()? {
            Backend::Sqlite(pool) => get_session_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_session_by_id_mysql(pool, id).await,
        }
    }

    async fn get_active_by_user_id(&self, user_id: i64) -> Result<Option<Session>> {
        match self.backend()? {
            Backend::Sqlite(pool) => get_active_session_sqlite(pool, user_id).await,
            Backend::Mysql(pool) => get_active_session_mysql(pool, user_id).await,
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count: i64 = match self.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE id = ?")
                    .bind(id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE id = ?")
                    .bind(id)
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to check session existence")?;

        Ok(count > 0)
    }

    async fn update(&self, session: &Session) -> Result<bool> {
        // A stale copy must not reactivate a row deactivated since it was read
        let sql = "UPDATE sessions SET expires_at = ?, is_active = (is_active AND ?), data = ? WHERE id = ?";
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(session.expires_at)
                .bind(session.is_active)
                .bind(&session.data)
                .bind(&session.id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(session.expires_at)
                .bind(session.is_active)
                .bind(&session.data)
                .bind(&session.id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update session")?;

        Ok(affected > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete session")?;

        Ok(affected > 0)
    }

    async fn deactivate_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        let sql = "UPDATE sessions SET is_active = ? WHERE user_id = ? AND is_active = ?";
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(false)
                .bind(user_id)
                .bind(true)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(false)
                .bind(user_id)
                .bind(true)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to deactivate sessions by user")?;

        Ok(affected)
    }

    async fn delete_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete sessions by user")?;

        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let affected = match self.backend()? {
            Backend::Sqlite(pool) => sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete expired sessions")?;

        Ok(affected)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = match self.backend()? {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions")
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to count sessions")?;

        Ok(count.max(0) as u64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn add_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, created_at, expires_at, is_active, data)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.created_at)
    .bind(session.expires_at)
    .bind(session.is_active)
    .bind(&session.data)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, created_at, expires_at, is_active, data
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    row.map(|row| row_to_session_sqlite(&row)).transpose()
}

async fn get_active_session_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, created_at, expires_at, is_active, data
        FROM sessions
        WHERE user_id = ? AND is_active = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(true)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .context("Failed to get active session by user")?;

    row.map(|row| row_to_session_sqlite(&row)).transpose()
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        data: row.try_get("data")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn add_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, created_at, expires_at, is_active, data)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.created_at)
    .bind(session.expires_at)
    .bind(session.is_active)
    .bind(&session.data)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, created_at, expires_at, is_active, data
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    row.map(|row| row_to_session_mysql(&row)).transpose()
}

async fn get_active_session_mysql(pool: &MySqlPool, user_id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, created_at, expires_at, is_active, data
        FROM sessions
        WHERE user_id = ? AND is_active = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(true)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .context("Failed to get active session by user")?;

    row.map(|row| row_to_session_mysql(&row)).transpose()
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        data: row.try_get("data")?,
    })
}
