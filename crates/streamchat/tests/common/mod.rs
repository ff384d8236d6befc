//! Test utilities and common setup.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use futures::StreamExt;
use serde_json::Value;
use streamchat::api::{AppState, create_router};
use streamchat::chat::ChatService;
use streamchat::engine::{
    ChatModel, ChunkStream, EngineError, EventReceiver, Message, MessageChunk, ModelOutput,
    NodeKind, RawEvent, ReasoningEngine, ToolCallDelta,
};
use streamchat::protocol::StreamEvent;
use streamchat::session::{InMemorySessionStore, SessionStore};
use streamchat::tools::{ParamType, ParameterInfo, Tool, ToolInfo, ToolRegistry, ToolResult};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Engine that replays a fixed event script, or refuses to start.
pub struct ScriptedEngine {
    script: Vec<Result<RawEvent, EngineError>>,
    fail_start: bool,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Result<RawEvent, EngineError>>) -> Self {
        Self {
            script,
            fail_start: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            script: Vec::new(),
            fail_start: true,
        }
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn run(
        &self,
        _input: Vec<Message>,
        _tools: Arc<ToolRegistry>,
        _cancel: CancellationToken,
    ) -> Result<EventReceiver, EngineError> {
        if self.fail_start {
            return Err(EngineError::Start("model rejected credentials".to_string()));
        }
        let (tx, rx) = mpsc::channel(self.script.len().max(1));
        for item in self.script.clone() {
            let _ = tx.send(item).await;
        }
        Ok(rx)
    }
}

/// Engine that sends `first`, waits for the gate, then sends `rest`. The
/// cancellation token of the run is published for the test to observe.
pub struct GatedEngine {
    first: RawEvent,
    rest: RawEvent,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl GatedEngine {
    pub fn new(first: RawEvent, rest: RawEvent) -> (Self, oneshot::Sender<()>) {
        let (open, gate) = oneshot::channel();
        let engine = Self {
            first,
            rest,
            gate: Mutex::new(Some(gate)),
            cancel: Arc::new(Mutex::new(None)),
        };
        (engine, open)
    }
}

#[async_trait]
impl ReasoningEngine for GatedEngine {
    async fn run(
        &self,
        _input: Vec<Message>,
        _tools: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Result<EventReceiver, EngineError> {
        *self.cancel.lock().unwrap() = Some(cancel);
        let gate = self.gate.lock().unwrap().take();
        let (first, rest) = (self.first.clone(), self.rest.clone());
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = tx.send(Ok(first)).await;
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            let _ = tx.send(Ok(rest)).await;
        });
        Ok(rx)
    }
}

/// Chat model that answers each call with the next scripted chunk list.
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Vec<MessageChunk>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Vec<MessageChunk>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolInfo],
    ) -> Result<ChunkStream, EngineError> {
        match self.steps.lock().unwrap().pop_front() {
            Some(chunks) => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
            None => Err(EngineError::Model("script exhausted".to_string())),
        }
    }
}

/// Tool that upper-cases its `text` argument.
pub struct Upper;

#[async_trait]
impl Tool for Upper {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "upper",
            "Uppercase text",
            vec![ParameterInfo::required("text", ParamType::String, "text to shout")],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
    }
}

/// Tool whose invocation panics.
pub struct Explodes;

#[async_trait]
impl Tool for Explodes {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new("explodes", "Panics when called", vec![])
    }

    async fn invoke(&self, _args: Value) -> ToolResult<String> {
        panic!("tool blew up")
    }
}

pub fn tool_call_chunk(id: &str, name: &str, arguments: &str) -> MessageChunk {
    MessageChunk {
        tool_calls: vec![ToolCallDelta {
            index: 0,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: arguments.to_string(),
        }],
        ..MessageChunk::default()
    }
}

pub fn graph(content: &str) -> RawEvent {
    RawEvent::encode(NodeKind::Graph, &Message::assistant(content)).unwrap()
}

pub fn model(content: &str) -> RawEvent {
    let output = ModelOutput {
        message: Message::assistant(content),
        token_usage: None,
    };
    RawEvent::encode(NodeKind::Model, &output).unwrap()
}

pub fn test_app(engine: impl ReasoningEngine + 'static) -> (Router, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let chat = ChatService::new(store.clone(), Arc::new(engine));
    (create_router(AppState::new(chat)), store)
}

pub fn test_app_with_service(chat: ChatService) -> Router {
    create_router(AppState::new(chat))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Decode every `data:` frame of an SSE body.
pub fn parse_frames(body: &str) -> Vec<StreamEvent> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

pub async fn history(store: &InMemorySessionStore, session_id: &str) -> Vec<(String, String)> {
    store
        .get(session_id)
        .await
        .into_iter()
        .map(|turn| (turn.role.to_string(), turn.content))
        .collect()
}
