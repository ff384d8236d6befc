//! Reasoning engine seam.
//!
//! An engine run turns model input into one ordered channel of [`RawEvent`]s,
//! each tagged with the node that produced it. The payload stays an opaque
//! string here; decoding it is the normalizer's job.

mod lookahead;
mod model;
mod openai;
mod react;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use streamchat_protocol::{Role, Turn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tools::ToolRegistry;

pub use lookahead::{Decision, Peeked, peek_first_segment};
pub use model::{ChatModel, ChunkAssembler, ChunkStream, MessageChunk, ToolCallDelta};
pub use openai::OpenAiChatModel;
pub use react::ReactEngine;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The run could not be set up; nothing has been streamed yet.
    #[error("engine failed to start: {0}")]
    Start(String),

    #[error("model error: {0}")]
    Model(String),

    /// Fault after events were already delivered.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("run cancelled")]
    Cancelled,
}

/// Receiving half of an engine run.
pub type EventReceiver = mpsc::Receiver<Result<RawEvent, EngineError>>;

/// Producing node of a [`RawEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Tool execution results.
    Tools,
    /// Intermediate model output inside the reasoning loop.
    Model,
    /// Final answer assembled by the graph root.
    Graph,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Tools => "ToolsNode",
            NodeKind::Model => "ModelNode",
            NodeKind::Graph => "GraphRoot",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub node: NodeKind,
    pub payload: String,
}

impl RawEvent {
    pub fn new(node: NodeKind, payload: impl Into<String>) -> Self {
        Self {
            node,
            payload: payload.into(),
        }
    }

    /// Serialize `payload` as JSON under the given node tag.
    pub fn encode<T: Serialize>(node: NodeKind, payload: &T) -> Result<Self, EngineError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| EngineError::Stream(format!("failed to encode {node} payload: {e}")))?;
        Ok(Self { node, payload })
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

/// One model input or output message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn tool(response: &ToolResponse) -> Self {
        Self {
            tool_call_id: Some(response.tool_call_id.clone()),
            tool_name: Some(response.tool_name.clone()),
            ..Self::with_role(Role::Tool, response.content.clone())
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self::with_role(turn.role, turn.content.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// `ModelNode` payload: one streamed model chunk plus usage when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub message: Message,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
}

/// One element of a `ToolsNode` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub role: Role,
    pub content: String,
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Drives a model (and its tools) for one turn.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Start a run. Setup failures return [`EngineError::Start`] before any
    /// event is produced. The run stops when `cancel` fires or the receiver
    /// is dropped.
    async fn run(
        &self,
        input: Vec<Message>,
        tools: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Result<EventReceiver, EngineError>;
}
