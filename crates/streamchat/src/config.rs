//! Layered application configuration.
//!
//! Defaults, then an optional TOML file, then `STREAMCHAT__SECTION__KEY`
//! environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chat::{
    DEFAULT_AGENT_ROLE, DEFAULT_AGENT_TEMPLATE, DEFAULT_CHAT_ROLE, DEFAULT_CHAT_TEMPLATE,
    PromptTemplate,
};
use crate::rag::{DEFAULT_PASSAGE_CHAR_LIMIT, HttpRetriever, NoRetrieval, RetrievalProvider};
use crate::tools::{
    FileOperationTool, PdfGenerationTool, PhotoSearchTool, ResourceDownloadTool,
    TerminalOperationTool, ToolRegistry, WebSearchTool,
};

pub const APP_NAME: &str = "streamchat";

/// Prefix of environment overrides, e.g. `STREAMCHAT__MODEL__API_KEY`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub prompt: PromptConfig,
    pub tools: ToolsConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Build the effective configuration from defaults, `file` (when it
    /// exists) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(Environment::with_prefix(env_prefix().as_str()).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub name: String,
    /// Seconds allowed for connecting and receiving the first stream event.
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    /// Upper bound on model calls per agent turn.
    pub max_steps: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            name: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            temperature: None,
            max_steps: 12,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub chat_role: String,
    pub chat_template: String,
    pub agent_role: String,
    pub agent_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            chat_role: DEFAULT_CHAT_ROLE.to_string(),
            chat_template: DEFAULT_CHAT_TEMPLATE.to_string(),
            agent_role: DEFAULT_AGENT_ROLE.to_string(),
            agent_template: DEFAULT_AGENT_TEMPLATE.to_string(),
        }
    }
}

impl PromptConfig {
    pub fn chat(&self) -> PromptTemplate {
        PromptTemplate::new(&self.chat_role, &self.chat_template)
    }

    pub fn agent(&self) -> PromptTemplate {
        PromptTemplate::new(&self.agent_role, &self.agent_template)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Root for tool output (`download/`, `pdf/`) and the file/terminal
    /// confinement root.
    pub workspace_root: String,
    /// Per-invocation budget in seconds.
    pub timeout_secs: u64,
    pub search_api_url: String,
    pub search_api_key: Option<String>,
    pub pexels_api_url: String,
    pub pexels_api_key: Option<String>,
    pub pdf_renderer: String,
    pub enable_file_tool: bool,
    pub enable_terminal_tool: bool,
    /// Commands containing any of these (case-insensitive) are refused.
    pub dangerous_commands: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: "./resource".to_string(),
            timeout_secs: 30,
            search_api_url: crate::tools::DEFAULT_SEARCH_URL.to_string(),
            search_api_key: None,
            pexels_api_url: crate::tools::DEFAULT_PEXELS_URL.to_string(),
            pexels_api_key: None,
            pdf_renderer: crate::tools::DEFAULT_PDF_RENDERER.to_string(),
            enable_file_tool: false,
            enable_terminal_tool: false,
            dangerous_commands: crate::tools::DEFAULT_DANGEROUS_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.workspace_root)
    }

    /// Tools offered to agent turns. File and terminal tools only when enabled.
    pub fn build_registry(&self) -> ToolRegistry {
        let root = self.root();
        let timeout = self.timeout();

        let mut registry = ToolRegistry::new()
            .with_tool(PdfGenerationTool::new(&root, &self.pdf_renderer, timeout))
            .with_tool(WebSearchTool::new(
                &self.search_api_url,
                self.search_api_key.clone(),
                timeout,
            ))
            .with_tool(ResourceDownloadTool::new(&root, timeout))
            .with_tool(PhotoSearchTool::new(
                &self.pexels_api_url,
                self.pexels_api_key.clone(),
                timeout,
            ));

        if self.enable_file_tool {
            registry = registry.with_tool(FileOperationTool::new(&root));
        }
        if self.enable_terminal_tool {
            registry = registry.with_tool(TerminalOperationTool::new(
                &root,
                self.dangerous_commands.clone(),
                timeout,
            ));
        }

        info!(tools = ?registry.names(), "tool registry built");
        registry
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub score_threshold: f64,
    pub top_k: usize,
    pub passage_char_limit: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            score_threshold: 0.97,
            top_k: 2,
            passage_char_limit: DEFAULT_PASSAGE_CHAR_LIMIT,
            timeout_secs: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn build_provider(&self) -> Arc<dyn RetrievalProvider> {
        match (&self.endpoint, self.enabled) {
            (Some(endpoint), true) if !endpoint.trim().is_empty() => Arc::new(HttpRetriever::new(
                endpoint,
                self.top_k,
                self.score_threshold,
                Duration::from_secs(self.timeout_secs),
            )),
            _ => Arc::new(NoRetrieval),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}
