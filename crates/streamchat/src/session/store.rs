use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use streamchat_protocol::Turn;
use tokio::sync::RwLock;
use tracing::debug;

use super::SessionStore;

type History = Arc<RwLock<Vec<Turn>>>;

/// Process-lifetime session store. Sessions are created on first append and
/// never evicted.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, History>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all sessions with at least one committed turn.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn history(&self, session_id: &str) -> Option<History> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Vec<Turn> {
        match self.history(session_id) {
            Some(history) => history.read().await.clone(),
            None => Vec::new(),
        }
    }

    async fn append(&self, session_id: &str, user: &str, assistant: &str) {
        // Clone the Arc out so the shard lock is not held across the await.
        let history = self
            .sessions
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone();

        let mut turns = history.write().await;
        turns.push(Turn::user(user));
        turns.push(Turn::assistant(assistant));
        debug!(session_id, turns = turns.len(), "session turn committed");
    }
}
