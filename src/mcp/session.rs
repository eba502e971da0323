//! In-memory MCP session store
//!
//! Sessions are minted by `initialize`, confirmed by `notifications/initialized` and
//! looked up on every later request. The map lock is only held to insert or clone a
//! handle; state transitions take the per-session lock, so unrelated sessions never
//! contend with each other.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: SessionState::Created,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh session in the `Created` state and returns a snapshot of it.
    pub async fn create_session(&self) -> Session {
        let mut sessions = self.sessions.write().await;

        let mut id = new_session_id();
        while sessions.contains_key(&id) {
            id = new_session_id();
        }

        let session = Session::new(id.clone());
        sessions.insert(id, Arc::new(Mutex::new(session.clone())));
        debug!(session_id = %session.id, total = sessions.len(), "session created");
        session
    }

    /// Moves a session to `Ready`. Activating a ready session is a no-op.
    pub async fn activate(&self, session_id: &str) -> Result<Session, SessionError> {
        let handle = self
            .handle(session_id)
            .await
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;

        let mut session = handle.lock().await;
        if session.state == SessionState::Created {
            session.state = SessionState::Ready;
            info!(session_id = %session.id, "session ready");
        }
        session.touch();
        Ok(session.clone())
    }

    /// Returns a snapshot of the session and records the access.
    pub async fn lookup(&self, session_id: &str) -> Option<Session> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.touch();
        Some(session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn handle(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}
