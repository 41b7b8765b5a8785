//! In-memory session storage.
//!
//! Suitable for tests and single-process deployments. Sessions are lost when
//! the process exits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::session::SessionRepository;
use crate::models::Session;

/// Session store backed by a `HashMap` behind a `RwLock`, keyed by session ID.
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionRepository {
    /// Creates an empty in-memory session repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .read()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .write()
            .map_err(|_| anyhow!("Session store lock poisoned"))
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn add(&self, session: &Session) -> Result<Session> {
        let mut sessions = self.write()?;
        if sessions.contains_key(&session.id) {
            return Err(anyhow!("Session {} already exists", session.id));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn get_active_by_user_id(&self, user_id: i64) -> Result<Option<Session>> {
        let now = Utc::now();
        Ok(self
            .read()?
            .values()
            .filter(|s| s.user_id == user_id && s.is_active && now < s.expires_at)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(id))
    }

    async fn update(&self, session: &Session) -> Result<bool> {
        let mut sessions = self.write()?;
        match sessions.get_mut(&session.id) {
            Some(stored) => {
                stored.expires_at = session.expires_at;
                // Deactivation is one-way
                stored.is_active = stored.is_active && session.is_active;
                stored.data = session.data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    async fn deactivate_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        let mut count = 0;
        for session in self.write()?.values_mut() {
            if session.user_id == user_id && session.is_active {
                session.deactivate();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_all_by_user_id(&self, user_id: i64) -> Result<u64> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_rejects_duplicate_id() {
        let repo = InMemorySessionRepository::new();
        let session = Session::new(1, 7);

        repo.add(&session).await.unwrap();
        assert!(repo.add(&session).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let repo = InMemorySessionRepository::new();
        let other = repo.clone();

        let session = Session::new(1, 7);
        repo.add(&session).await.unwrap();

        assert!(other.exists(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_inactive_unexpired() {
        let repo = InMemorySessionRepository::new();

        let expired = Session::new(1, -2);
        let mut inactive = Session::new(1, 2);
        inactive.deactivate();
        repo.add(&expired).await.unwrap();
        repo.add(&inactive).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(!repo.exists(&expired.id).await.unwrap());
        assert!(repo.exists(&inactive.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_from_stale_copy_keeps_session_inactive() {
        let repo = InMemorySessionRepository::new();
        let session = Session::new(1, 7);
        repo.add(&session).await.unwrap();

        let mut stale = repo.get_by_id(&session.id).await.unwrap().unwrap();
        repo.deactivate_all_by_user_id(1).await.unwrap();

        stale.update_data(Some(r#"{"found":1}"#.to_string())).unwrap();
        assert!(repo.update(&stale).await.unwrap());

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert!(!found.is_active);
        assert_eq!(found.data, r#"{"found":1}"#);
    }

    #[tokio::test]
    async fn test_soft_and_hard_user_removal_differ() {
        let repo = InMemorySessionRepository::new();
        let a = Session::new(5, 7);
        let b = Session::new(5, 7);
        repo.add(&a).await.unwrap();
        repo.add(&b).await.unwrap();

        assert_eq!(repo.deactivate_all_by_user_id(5).await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert!(repo.get_active_by_user_id(5).await.unwrap().is_none());

        assert_eq!(repo.delete_all_by_user_id(5).await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
