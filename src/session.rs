//! Process-wide store of per-conversation history.
//!
//! Sessions are created lazily on first reference by id, never expire, and
//! are destroyed only by an explicit clear. One coarse mutex over the whole
//! map is the locking discipline; callers share the store behind an `Arc`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// One completed task/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Capture time, epoch milliseconds.
    pub ts: i64,
    pub task: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    pub id: String,
    pub history: Vec<TurnRecord>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh opaque session id for callers that did not supply one.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Returns a snapshot of the session, creating it if absent.
    pub async fn get_or_create(&self, id: &str) -> Session {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Session {
                id: id.to_string(),
                history: Vec::new(),
            })
            .clone()
    }

    pub async fn append(&self, id: &str, task: &str, response: &str) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(id.to_string()).or_insert_with(|| Session {
            id: id.to_string(),
            history: Vec::new(),
        });
        session.history.push(TurnRecord {
            ts: chrono::Utc::now().timestamp_millis(),
            task: task.to_string(),
            response: response.to_string(),
        });
        tracing::debug!(session = %id, turns = session.history.len(), "session turn appended");
    }

    /// History snapshot; empty for an unknown id.
    pub async fn read(&self, id: &str) -> Vec<TurnRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Drop the most recent turn. A no-op on an empty or missing session;
    /// returns the remaining history.
    pub async fn undo(&self, id: &str) -> Vec<TurnRecord> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.history.pop();
                session.history.clone()
            }
            None => Vec::new(),
        }
    }

    /// Destroy the session. Deleting an absent id is not an error.
    pub async fn clear(&self, id: &str) {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(id).is_some() {
            tracing::info!(session = %id, "session cleared");
        }
    }
}
