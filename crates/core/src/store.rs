//! Dialog State Store Port
//!
//! Durable, keyed-by-session storage of the full `SessionState`. The engine
//! performs load, mutate, save with no optimistic locking; the caller is
//! responsible for serializing turns within one session. Any key-value or
//! document store satisfies this trait; the API service provides a Postgres
//! implementation, and `MemoryStore` backs tests.

use crate::state::SessionState;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the state for a session, or `None` on first contact.
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Persists the state for a session, replacing any previous version.
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()>;

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.load(session_id).await?.is_some())
    }
}

/// An in-memory `SessionStore` for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.read().await.contains_key(session_id))
    }
}
