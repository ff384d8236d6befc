//! Conversation history and request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed entry of a session's history. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// When the entry was committed.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Inbound request for one chat turn.
///
/// Accepted both as a query string (`?query=..&session_id=..`) and as a JSON
/// body. Older clients send `sessionID` or `sessionId`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "sessionID", alias = "sessionId")]
    pub session_id: String,
}

impl ChatStreamRequest {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_session_aliases() {
        let req: ChatStreamRequest =
            serde_json::from_str(r#"{"query":"hi","sessionID":"s1"}"#).unwrap();
        assert_eq!(req.session_id, "s1");

        let req: ChatStreamRequest =
            serde_json::from_str(r#"{"query":"hi","sessionId":"s2"}"#).unwrap();
        assert_eq!(req.session_id, "s2");

        let req: ChatStreamRequest =
            serde_json::from_str(r#"{"query":"hi","session_id":"s3"}"#).unwrap();
        assert_eq!(req.session_id, "s3");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = Turn::assistant("ok");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
