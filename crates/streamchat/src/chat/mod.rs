//! One chat turn end to end: normalize engine events, stream them, commit.

mod multiplexer;
mod normalizer;
mod prompt;
mod service;

pub use multiplexer::{EventSink, TransportError, TurnContext, TurnOutcome, TurnState, run_turn};
pub use normalizer::{Decoded, Normalized, SearchResult, normalize};
pub use prompt::{
    DEFAULT_AGENT_ROLE, DEFAULT_AGENT_TEMPLATE, DEFAULT_CHAT_ROLE, DEFAULT_CHAT_TEMPLATE,
    PromptTemplate,
};
pub use service::{ChatError, ChatMode, ChatService, PreparedTurn};
