//! OpenAI-compatible `/chat/completions` streaming adapter.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, retry::Never};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{
    ChatModel, ChunkStream, EngineError, Message, MessageChunk, TokenUsage, ToolCallDelta,
};
use crate::tools::ToolInfo;

pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    open_timeout: Duration,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        // Only the connect phase is bounded on the client; a streamed body may
        // legitimately run for minutes.
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            temperature: None,
            open_timeout: timeout,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[Message], tools: &[ToolInfo]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(wire_tool).collect());
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn wire_message(message: &Message) -> Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        value["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    value
}

fn wire_tool(info: &ToolInfo) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": info.name,
            "description": info.description,
            "parameters": info.json_schema(),
        },
    })
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn parse_chunk(data: &str) -> Result<MessageChunk, EngineError> {
    let wire: CompletionChunk = serde_json::from_str(data)
        .map_err(|e| EngineError::Stream(format!("invalid completion chunk: {e}")))?;

    let mut chunk = MessageChunk {
        usage: wire.usage,
        ..MessageChunk::default()
    };
    if let Some(choice) = wire.choices.into_iter().next() {
        chunk.content = choice.delta.content.unwrap_or_default();
        chunk.tool_calls = choice
            .delta
            .tool_calls
            .into_iter()
            .map(|call| {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }
            })
            .collect();
    }
    Ok(chunk)
}

async fn describe_open_error(err: reqwest_eventsource::Error) -> String {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            format!("upstream returned {status}: {body}")
        }
        other => other.to_string(),
    }
}

/// Remaining events of an opened [`EventSource`] as chunks.
fn chunk_stream(es: EventSource) -> ChunkStream {
    futures::stream::unfold(Some(es), |state| async move {
        let mut es = state?;
        loop {
            match es.next().await {
                None => return None,
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => {
                    let data = message.data.trim();
                    if data == "[DONE]" {
                        es.close();
                        return None;
                    }
                    if data.is_empty() {
                        continue;
                    }
                    return match parse_chunk(data) {
                        Ok(chunk) => Some((Ok(chunk), Some(es))),
                        Err(e) => {
                            es.close();
                            Some((Err(e), None))
                        }
                    };
                }
                Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                Some(Err(e)) => {
                    warn!("completion stream failed: {e}");
                    es.close();
                    return Some((Err(EngineError::Stream(e.to_string())), None));
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolInfo],
    ) -> Result<ChunkStream, EngineError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(messages, tools));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let mut es = EventSource::new(request).map_err(|e| EngineError::Model(e.to_string()))?;
        es.set_retry_policy(Box::new(Never));

        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "opening completion stream"
        );
        match tokio::time::timeout(self.open_timeout, es.next()).await {
            Err(_) => {
                es.close();
                Err(EngineError::Model(format!(
                    "timed out after {}s opening completion stream",
                    self.open_timeout.as_secs()
                )))
            }
            Ok(None) => Err(EngineError::Model(
                "completion stream closed before opening".to_string(),
            )),
            Ok(Some(Err(e))) => {
                es.close();
                Err(EngineError::Model(describe_open_error(e).await))
            }
            Ok(Some(Ok(Event::Open))) => Ok(chunk_stream(es)),
            Ok(Some(Ok(Event::Message(message)))) => {
                let first = match message.data.trim() {
                    "" | "[DONE]" => None,
                    data => Some(parse_chunk(data)),
                };
                Ok(futures::stream::iter(first).chain(chunk_stream(es)).boxed())
            }
        }
    }
}
