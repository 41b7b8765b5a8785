//! Instrumented session store for tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{InMemorySessionRepository, SessionRepository};
use crate::models::Session;

/// Wraps an [`InMemorySessionRepository`], counting sweeps and optionally
/// failing every call.
#[derive(Clone, Default)]
pub struct InstrumentedRepository {
    inner: InMemorySessionRepository,
    failing: Arc<AtomicBool>,
    sweeps: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InstrumentedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let repo = Self::default();
        repo.set_failing(true);
        repo
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `delete_expired` calls, failed ones included
    pub fn sweep_calls(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(anyhow!("database is unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionRepository for InstrumentedRepository {
    async fn add(&self, session: &Session) -> Result<Session> {
        self.check()?;
        self.inner.add(session).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        self.check()?;
        self.inner.get_by_id(id).await
    }

    async fn get_active_by_user_id(&self, user_id: i64) -> Result<Option<Session>> {
        self.check()?;
        self.inner.get_active_by_user_id(user_id).await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(id).await
    }

    async fn update(&self, session: &Session) -> Result<bool> {
        self.check()?;
        self.inner.update(session).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn deactivate_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        self.check()?;
        self.inner.deactivate_all_by_user_id(user_id).await
    }

    async fn delete_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        self.check()?;
        self.inner.delete_all_by_user_id(user_id).await
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.delete_expired().await
    }

    async fn count(&self) -> Result<u64> {
        self.check()?;
        self.inner.count().await
    }

    async fn save_changes(&self) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.check()
    }
}
