//! Shared application state.

use std::sync::Arc;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::engine::{OpenAiChatModel, ReactEngine};
use crate::session::InMemorySessionStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat: Arc::new(chat),
            cors_origins: Arc::new(Vec::new()),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }

    /// Wire the in-memory store, the OpenAI-compatible model and the tool
    /// registry from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let model = OpenAiChatModel::new(
            &config.model.base_url,
            config.model.api_key.clone(),
            &config.model.name,
            config.model.timeout(),
        )
        .with_temperature(config.model.temperature);

        let engine = ReactEngine::new(Arc::new(model))
            .with_max_steps(config.model.max_steps)
            .with_tool_timeout(config.tools.timeout());

        let chat = ChatService::new(Arc::new(InMemorySessionStore::new()), Arc::new(engine))
            .with_tools(config.tools.build_registry())
            .with_retrieval(config.retrieval.build_provider())
            .with_prompts(config.prompt.chat(), config.prompt.agent())
            .with_passage_char_limit(config.retrieval.passage_char_limit);

        Self::new(chat).with_cors_origins(config.server.cors_origins.clone())
    }
}
