//! Turn orchestration: validation, prompt assembly and engine start.

use std::sync::Arc;

use streamchat_protocol::ChatStreamRequest;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::multiplexer::{EventSink, TurnContext, TurnOutcome, run_turn};
use super::prompt::PromptTemplate;
use crate::engine::{EngineError, EventReceiver, ReasoningEngine};
use crate::rag::{DEFAULT_PASSAGE_CHAR_LIMIT, NoRetrieval, RetrievalProvider, context_block};
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    EngineStart(#[from] EngineError),
}

/// Which flavour of turn to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Retrieval-augmented answer, no tools.
    Chat,
    /// Tool-enabled reasoning loop.
    Agent,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Chat => "chat",
            ChatMode::Agent => "agent",
        }
    }
}

/// A turn whose engine run has started but whose events are not consumed yet.
pub struct PreparedTurn {
    pub session_id: String,
    pub query: String,
    pub mode: ChatMode,
    events: EventReceiver,
    cancel: CancellationToken,
}

impl PreparedTurn {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct ChatService {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn ReasoningEngine>,
    retrieval: Arc<dyn RetrievalProvider>,
    tools: Arc<ToolRegistry>,
    no_tools: Arc<ToolRegistry>,
    chat_prompt: PromptTemplate,
    agent_prompt: PromptTemplate,
    passage_char_limit: usize,
}

impl ChatService {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<dyn ReasoningEngine>) -> Self {
        Self {
            store,
            engine,
            retrieval: Arc::new(NoRetrieval),
            tools: Arc::new(ToolRegistry::new()),
            no_tools: Arc::new(ToolRegistry::new()),
            chat_prompt: PromptTemplate::chat_default(),
            agent_prompt: PromptTemplate::agent_default(),
            passage_char_limit: DEFAULT_PASSAGE_CHAR_LIMIT,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalProvider>) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_prompts(mut self, chat: PromptTemplate, agent: PromptTemplate) -> Self {
        self.chat_prompt = chat;
        self.agent_prompt = agent;
        self
    }

    pub fn with_passage_char_limit(mut self, limit: usize) -> Self {
        self.passage_char_limit = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Validate the request, assemble model input and start the engine.
    ///
    /// Any error here happens before a single event exists.
    pub async fn start_turn(
        &self,
        mode: ChatMode,
        request: ChatStreamRequest,
    ) -> Result<PreparedTurn, ChatError> {
        if request.query.trim().is_empty() {
            return Err(ChatError::InvalidRequest("query is required".to_string()));
        }
        let session_id = request.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(ChatError::InvalidRequest("session_id is required".to_string()));
        }

        let history = self.store.get(&session_id).await;
        let (messages, tools) = match mode {
            ChatMode::Chat => {
                let example = self.retrieval_block(&request.query).await;
                let messages = self.chat_prompt.build(&example, &history, &request.query);
                (messages, Arc::clone(&self.no_tools))
            }
            ChatMode::Agent => {
                let messages = self.agent_prompt.build("", &history, &request.query);
                (messages, Arc::clone(&self.tools))
            }
        };

        let cancel = CancellationToken::new();
        let events = self
            .engine
            .run(messages, tools, cancel.clone())
            .await
            .inspect_err(|e| {
                warn!(
                    session_id = %session_id,
                    mode = mode.as_str(),
                    error = %e,
                    "engine start failed"
                )
            })?;

        info!(
            session_id = %session_id,
            mode = mode.as_str(),
            history = history.len(),
            "turn started"
        );
        Ok(PreparedTurn {
            session_id,
            query: request.query,
            mode,
            events,
            cancel,
        })
    }

    /// Stream a prepared turn into `sink` and commit it.
    pub async fn stream_turn(&self, turn: PreparedTurn, sink: &mut dyn EventSink) -> TurnOutcome {
        let ctx = TurnContext {
            session_id: &turn.session_id,
            query: &turn.query,
            store: self.store.as_ref(),
            cancel: turn.cancel,
        };
        run_turn(ctx, turn.events, sink).await
    }

    /// Retrieval failures degrade to "no context".
    async fn retrieval_block(&self, query: &str) -> String {
        let passages = match self.retrieval.retrieve(query).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!("retrieval failed, continuing without context: {e:#}");
                Vec::new()
            }
        };
        context_block(query, &passages, self.passage_char_limit)
    }
}
