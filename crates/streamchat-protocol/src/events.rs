//! Client-visible streaming events.

use serde::{Deserialize, Serialize};

/// One unit of the client-facing event stream.
///
/// `thinking` marks tool-derived or intermediate material that clients render
/// apart from the answer. `done` marks the terminal frame of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub content: String,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default)]
    pub done: bool,
}

impl StreamEvent {
    /// Primary answer content.
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            thinking: false,
            done: false,
        }
    }

    /// Intermediate or tool-derived content.
    pub fn thinking(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            thinking: true,
            done: false,
        }
    }

    /// Terminal frame. Always carries empty content.
    pub fn done() -> Self {
        Self {
            content: String::new(),
            thinking: false,
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }
}

/// Structured body returned when a turn fails before its stream opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_frame_shape() {
        let json = serde_json::to_string(&StreamEvent::done()).unwrap();
        assert_eq!(json, r#"{"content":"","thinking":false,"done":true}"#);
    }

    #[test]
    fn test_thinking_flag() {
        let event = StreamEvent::thinking("searching");
        assert!(event.thinking);
        assert!(!event.done);
        assert!(!StreamEvent::answer("hi").thinking);
    }

    #[test]
    fn test_missing_flags_default_to_false() {
        let event: StreamEvent = serde_json::from_str(r#"{"content":"x"}"#).unwrap();
        assert_eq!(event, StreamEvent::answer("x"));
    }
}
