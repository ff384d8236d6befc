//! Conversation history keyed by session id.

mod store;

use async_trait::async_trait;
use streamchat_protocol::Turn;

pub use store::InMemorySessionStore;

/// Keyed, append-only conversation history.
///
/// `get` on an unseen id returns an empty history. `append` records one
/// committed turn: the user message followed by the assistant answer, both
/// visible to readers of the same session at once or not at all.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Vec<Turn>;

    async fn append(&self, session_id: &str, user: &str, assistant: &str);
}
