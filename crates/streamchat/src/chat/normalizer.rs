//! Raw engine events to client stream events.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use streamchat_protocol::StreamEvent;
use tracing::{debug, warn};

use crate::engine::{Message, ModelOutput, NodeKind, RawEvent, ToolResponse};

/// Outcome of one structured decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Decoded(T),
    Raw(String),
}

impl<T: DeserializeOwned> Decoded<T> {
    pub fn parse(payload: &str) -> Self {
        match serde_json::from_str(payload) {
            Ok(value) => Decoded::Decoded(value),
            Err(_) => Decoded::Raw(payload.to_string()),
        }
    }
}

/// Result record of a search-style tool, as found in a `ToolsNode` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub displayed_link: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub snippet_highlighted_words: Vec<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub title: String,
}

impl SearchResult {
    fn render(&self) -> String {
        format!(
            "Date: {}\nDisplayedLink: {}\nLink: {}\nPosition: {}\nSnippet: {}\nSnippetHighlightedWords: [{}]\nThumbnail: {}\nTitle: {}\n\n",
            self.date,
            self.displayed_link,
            self.link,
            self.position,
            self.snippet,
            self.snippet_highlighted_words.join(" "),
            self.thumbnail,
            self.title,
        )
    }
}

/// Client events for one raw event, plus the text it adds to the answer.
#[derive(Debug, Default, PartialEq)]
pub struct Normalized {
    pub events: Vec<StreamEvent>,
    pub answer: Option<String>,
}

/// Classify and decode one engine event. Never fails: payloads that do not
/// decode are dropped (`ToolsNode`) or replayed character by character.
pub fn normalize(event: &RawEvent) -> Normalized {
    match event.node {
        NodeKind::Tools => Normalized {
            events: normalize_tools(&event.payload),
            answer: None,
        },
        NodeKind::Model => match Decoded::<ModelOutput>::parse(&event.payload) {
            Decoded::Decoded(output) => {
                let text = output.message.content;
                Normalized {
                    events: non_empty(&text, true),
                    answer: Some(text),
                }
            }
            Decoded::Raw(raw) => {
                debug!(node = %event.node, "undecodable payload, replaying raw");
                Normalized {
                    events: per_char(&format!("\n{raw}\n\n\n"), true),
                    answer: None,
                }
            }
        },
        NodeKind::Graph => match Decoded::<Message>::parse(&event.payload) {
            Decoded::Decoded(message) => Normalized {
                events: non_empty(&message.content, false),
                answer: Some(message.content),
            },
            Decoded::Raw(raw) => {
                debug!(node = %event.node, "undecodable payload, replaying raw");
                Normalized {
                    events: per_char(&format!("\n{raw}\n"), false),
                    answer: None,
                }
            }
        },
    }
}

fn normalize_tools(payload: &str) -> Vec<StreamEvent> {
    let responses = match Decoded::<Vec<ToolResponse>>::parse(payload) {
        Decoded::Decoded(responses) => responses,
        Decoded::Raw(_) => {
            warn!("dropping ToolsNode event: payload is not a tool response list");
            return Vec::new();
        }
    };
    let Some(first) = responses.first() else {
        warn!("dropping ToolsNode event: empty tool response list");
        return Vec::new();
    };

    match Decoded::<Vec<SearchResult>>::parse(&first.content) {
        Decoded::Decoded(results) => results
            .iter()
            .map(|r| StreamEvent::thinking(r.render()))
            .collect(),
        Decoded::Raw(_) => {
            debug!(tool = %first.tool_name, "tool result is not a search result list");
            Vec::new()
        }
    }
}

/// Tool-call-only and usage-only chunks carry no text; the client never sees them.
fn non_empty(text: &str, thinking: bool) -> Vec<StreamEvent> {
    match (text.is_empty(), thinking) {
        (true, _) => Vec::new(),
        (false, true) => vec![StreamEvent::thinking(text)],
        (false, false) => vec![StreamEvent::answer(text)],
    }
}

fn per_char(text: &str, thinking: bool) -> Vec<StreamEvent> {
    text.chars()
        .map(|c| StreamEvent {
            content: c.to_string(),
            thinking,
            done: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TokenUsage;
    use serde_json::json;
    use streamchat_protocol::Role;

    fn model_event(content: &str) -> RawEvent {
        RawEvent::encode(
            NodeKind::Model,
            &ModelOutput {
                message: Message::assistant(content),
                token_usage: Some(TokenUsage::default()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_model_event_is_one_thinking_event() {
        let out = normalize(&model_event("step 1"));
        assert_eq!(out.events, vec![StreamEvent::thinking("step 1")]);
        assert_eq!(out.answer.as_deref(), Some("step 1"));
    }

    #[test]
    fn test_graph_event_is_answer_content() {
        let event = RawEvent::encode(NodeKind::Graph, &Message::assistant("final")).unwrap();
        let out = normalize(&event);
        assert_eq!(out.events, vec![StreamEvent::answer("final")]);
        assert_eq!(out.answer.as_deref(), Some("final"));
    }

    #[test]
    fn test_empty_content_emits_nothing_but_keeps_answer_delta() {
        let out = normalize(&model_event(""));
        assert!(out.events.is_empty());
        assert_eq!(out.answer.as_deref(), Some(""));

        let event = RawEvent::encode(NodeKind::Graph, &Message::assistant("")).unwrap();
        assert!(normalize(&event).events.is_empty());
    }

    #[test]
    fn test_model_fallback_replays_each_char() {
        let raw = "{not json";
        let out = normalize(&RawEvent::new(NodeKind::Model, raw));

        assert_eq!(out.events.len(), raw.chars().count() + 4);
        assert!(out.events.iter().all(|e| e.thinking && !e.done));
        let replay: String = out.events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(replay, format!("\n{raw}\n\n\n"));
        assert!(out.answer.is_none());
    }

    #[test]
    fn test_graph_fallback_replays_each_char() {
        let raw = "héllo";
        let out = normalize(&RawEvent::new(NodeKind::Graph, raw));

        assert_eq!(out.events.len(), raw.chars().count() + 2);
        assert!(out.events.iter().all(|e| !e.thinking && !e.done));
        assert_eq!(out.events[2].content, "é");
        assert!(out.answer.is_none());
    }

    #[test]
    fn test_tools_event_renders_each_result() {
        let results = json!([
            {"date": "2024-01-01", "displayed_link": "ex.com", "link": "https://ex.com",
             "position": 1, "snippet": "s1", "snippet_highlighted_words": ["a", "b"],
             "title": "T1"},
            {"position": 2, "title": "T2"}
        ]);
        let payload = json!([{
            "role": "tool",
            "content": results.to_string(),
            "tool_call_id": "c1",
            "tool_name": "web_search_tool"
        }]);
        let out = normalize(&RawEvent::new(NodeKind::Tools, payload.to_string()));

        assert_eq!(out.events.len(), 2);
        assert!(out.events.iter().all(|e| e.thinking && !e.done));
        assert_eq!(
            out.events[0].content,
            "Date: 2024-01-01\nDisplayedLink: ex.com\nLink: https://ex.com\nPosition: 1\nSnippet: s1\nSnippetHighlightedWords: [a b]\nThumbnail: \nTitle: T1\n\n"
        );
        assert!(out.answer.is_none());
    }

    #[test]
    fn test_unparseable_tools_payloads_are_dropped() {
        let garbage = normalize(&RawEvent::new(NodeKind::Tools, "not json at all"));
        assert_eq!(garbage, Normalized::default());

        let empty = normalize(&RawEvent::new(NodeKind::Tools, "[]"));
        assert!(empty.events.is_empty());

        let inner = json!([{
            "role": Role::Tool,
            "content": "PDF generation successfully to resource/pdf/a.pdf",
            "tool_call_id": "c1",
            "tool_name": "pdf_generation_tool"
        }]);
        let out = normalize(&RawEvent::new(NodeKind::Tools, inner.to_string()));
        assert!(out.events.is_empty());
    }
}
