use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::{EngineError, Message, TokenUsage, ToolCall};
use crate::tools::ToolInfo;

/// Streaming model output, one chunk at a time.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, EngineError>> + Send>>;

/// Incremental piece of a tool call, keyed by `index` within the message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageChunk {
    pub content: String,
    pub tool_calls: Vec<ToolCallDelta>,
    pub usage: Option<TokenUsage>,
}

impl MessageChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// True when the chunk carries neither text nor tool calls.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.tool_calls.is_empty()
    }

    /// The chunk as a standalone assistant message.
    pub fn to_message(&self) -> Message {
        let mut message = Message::assistant(self.content.clone());
        message.tool_calls = self
            .tool_calls
            .iter()
            .map(|d| ToolCall {
                id: d.id.clone().unwrap_or_default(),
                name: d.name.clone().unwrap_or_default(),
                arguments: d.arguments.clone(),
            })
            .collect();
        message
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent upstream.
    fn name(&self) -> &str;

    /// Open a completion stream. Errors here mean nothing was received.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolInfo],
    ) -> Result<ChunkStream, EngineError>;
}

/// Folds streamed chunks back into one assistant message.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    content: String,
    calls: BTreeMap<usize, ToolCall>,
    usage: Option<TokenUsage>,
}

impl ChunkAssembler {
    pub fn push(&mut self, chunk: &MessageChunk) {
        self.content.push_str(&chunk.content);
        for delta in &chunk.tool_calls {
            let call = self.calls.entry(delta.index).or_insert_with(|| ToolCall {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
            if let Some(id) = &delta.id
                && !id.is_empty()
            {
                call.id.clone_from(id);
            }
            if let Some(name) = &delta.name
                && !name.is_empty()
            {
                call.name.clone_from(name);
            }
            call.arguments.push_str(&delta.arguments);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// Finished assistant message. Calls missing an id get `call_<index>`.
    pub fn finish(self) -> Message {
        let mut message = Message::assistant(self.content);
        message.tool_calls = self
            .calls
            .into_iter()
            .map(|(index, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{index}");
                }
                call
            })
            .collect();
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn test_assembler_merges_deltas_by_index() {
        let mut asm = ChunkAssembler::default();
        asm.push(&MessageChunk {
            content: "Let me ".to_string(),
            tool_calls: vec![delta(0, Some("a"), Some("web_search_tool"), "{\"q\":")],
            usage: None,
        });
        asm.push(&MessageChunk {
            content: "search".to_string(),
            tool_calls: vec![
                delta(0, None, None, "\"rust\"}"),
                delta(1, None, Some("photo_search_tool"), "{}"),
            ],
            usage: Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 4,
                total_tokens: 7,
            }),
        });

        assert_eq!(asm.usage().map(|u| u.total_tokens), Some(7));
        let message = asm.finish();
        assert_eq!(message.content, "Let me search");
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].id, "a");
        assert_eq!(message.tool_calls[0].arguments, "{\"q\":\"rust\"}");
        assert_eq!(message.tool_calls[1].id, "call_1");
        assert_eq!(message.tool_calls[1].name, "photo_search_tool");
    }

    #[test]
    fn test_chunk_emptiness() {
        assert!(MessageChunk::default().is_empty());
        assert!(!MessageChunk::text("x").is_empty());
        let call = MessageChunk {
            tool_calls: vec![delta(0, None, None, "")],
            ..MessageChunk::default()
        };
        assert!(call.has_tool_calls());
        assert!(!call.is_empty());
    }
}
