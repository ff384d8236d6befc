//! Reason-and-act loop over a streaming [`ChatModel`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use streamchat_protocol::Role;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ChatModel, ChunkAssembler, ChunkStream, Decision, EngineError, EventReceiver, Message,
    ModelOutput, NodeKind, RawEvent, ReasoningEngine, ToolCall, ToolResponse, peek_first_segment,
};
use crate::tools::{ToolInfo, ToolRegistry};

pub const DEFAULT_MAX_STEPS: usize = 12;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 32;

/// Alternates model steps and tool calls until the model answers directly.
///
/// Every step opens a model stream and peeks its first segment. A tool call
/// there routes the step through the tool branch (`ModelNode` events, then
/// one `ToolsNode` event with all results); anything else is the final
/// answer and is streamed as `GraphRoot` events.
pub struct ReactEngine {
    model: Arc<dyn ChatModel>,
    max_steps: usize,
    tool_timeout: Duration,
}

impl ReactEngine {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_steps: DEFAULT_MAX_STEPS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }
}

#[async_trait]
impl ReasoningEngine for ReactEngine {
    async fn run(
        &self,
        input: Vec<Message>,
        tools: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Result<EventReceiver, EngineError> {
        tools.check().map_err(EngineError::Start)?;
        if self.model.name().trim().is_empty() {
            return Err(EngineError::Start("model name is empty".to_string()));
        }
        if self.max_steps == 0 {
            return Err(EngineError::Start("max_steps must be at least 1".to_string()));
        }

        let descriptions = tools.describe_all();
        let first = self
            .model
            .stream(&input, &descriptions)
            .await
            .map_err(|e| EngineError::Start(e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let run = Run {
            model: Arc::clone(&self.model),
            tools,
            descriptions,
            max_steps: self.max_steps,
            tool_timeout: self.tool_timeout,
            tx,
        };

        let tx = run.tx.clone();
        tokio::spawn(async move {
            let mut driver = tokio::spawn(run.drive(input, first));
            tokio::select! {
                _ = cancel.cancelled() => {
                    driver.abort();
                    debug!("engine run cancelled");
                }
                joined = &mut driver => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        warn!("engine run panicked");
                        let _ = tx
                            .send(Err(EngineError::Stream("engine run panicked".to_string())))
                            .await;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// State of one spawned run. Dropping it (on cancel) drops any in-flight
/// model stream and tool futures.
struct Run {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    descriptions: Vec<ToolInfo>,
    max_steps: usize,
    tool_timeout: Duration,
    tx: mpsc::Sender<Result<RawEvent, EngineError>>,
}

impl Run {
    /// False once the consumer is gone.
    async fn emit(&self, event: Result<RawEvent, EngineError>) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn fail(&self, err: EngineError) {
        warn!("engine run failed: {err}");
        let _ = self.tx.send(Err(err)).await;
    }

    async fn drive(self, mut messages: Vec<Message>, first: ChunkStream) {
        let mut pending = Some(first);

        for step in 0..self.max_steps {
            let stream = match pending.take() {
                Some(stream) => stream,
                None => match self.model.stream(&messages, &self.descriptions).await {
                    Ok(stream) => stream,
                    Err(e) => return self.fail(e).await,
                },
            };

            let peeked = match peek_first_segment(stream).await {
                Ok(peeked) => peeked,
                Err(e) => return self.fail(e).await,
            };
            debug!(step, decision = ?peeked.decision, "model step");

            match peeked.decision {
                Decision::Direct => return self.stream_answer(peeked.into_stream()).await,
                Decision::ToolCalls => {
                    let Some(assistant) = self.stream_reasoning(peeked.into_stream()).await else {
                        return;
                    };
                    let responses = self.call_tools(&assistant.tool_calls).await;
                    let event = RawEvent::encode(NodeKind::Tools, &responses);
                    if !self.emit(event).await {
                        return;
                    }
                    messages.push(assistant);
                    messages.extend(responses.iter().map(Message::tool));
                }
            }
        }

        self.fail(EngineError::Stream(format!(
            "no final answer after {} steps",
            self.max_steps
        )))
        .await;
    }

    async fn stream_answer(&self, mut chunks: ChunkStream) {
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return self.fail(e).await,
            };
            if chunk.has_tool_calls() {
                warn!(
                    calls = chunk.tool_calls.len(),
                    "ignoring tool calls after answer text"
                );
            }
            if chunk.content.is_empty() {
                continue;
            }
            let event = RawEvent::encode(NodeKind::Graph, &Message::assistant(chunk.content));
            if !self.emit(event).await {
                return;
            }
        }
    }

    /// Forward a tool-calling step chunk by chunk and return the assembled
    /// assistant message. `None` stops the run.
    async fn stream_reasoning(&self, mut chunks: ChunkStream) -> Option<Message> {
        let mut assembler = ChunkAssembler::default();
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.fail(e).await;
                    return None;
                }
            };
            assembler.push(&chunk);
            if chunk.is_empty() && chunk.usage.is_none() {
                continue;
            }
            let output = ModelOutput {
                message: chunk.to_message(),
                token_usage: chunk.usage,
            };
            if !self.emit(RawEvent::encode(NodeKind::Model, &output)).await {
                return None;
            }
        }
        Some(assembler.finish())
    }

    /// Run all requested calls concurrently. Failures become the response
    /// text so the model can react to them.
    async fn call_tools(&self, calls: &[ToolCall]) -> Vec<ToolResponse> {
        let invocations = calls.iter().map(|call| async move {
            let content = match self
                .tools
                .invoke(&call.name, &call.arguments, self.tool_timeout)
                .await
            {
                Ok(text) => text,
                Err(e) => format!("error: {e}"),
            };
            ToolResponse {
                role: Role::Tool,
                content,
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            }
        });
        let responses = futures::future::join_all(invocations).await;
        info!(calls = responses.len(), "tool calls completed");
        responses
    }
}
