//! Model input assembly for a turn.

use streamchat_protocol::Turn;

use crate::engine::Message;

pub const DEFAULT_CHAT_ROLE: &str = "expert in the field of relationships with many years of experience";

pub const DEFAULT_CHAT_TEMPLATE: &str = "you are an {role}.
You have in-depth research on the psychology of love and are good at analyzing emotional dynamics,
providing practical love advice, and helping people build and maintain healthy relationships.
Provide users with professional love guidance to help them solve love problems, improve love skills, and promote the healthy development of emotional relationships.
{example}
Answer based on the following content.
If you need more information, you can use the search tool, but you can only use it once.
";

pub const DEFAULT_AGENT_ROLE: &str =
    "Artificial intelligence interaction experts and intelligent agent consultants";

pub const DEFAULT_AGENT_TEMPLATE: &str = "you are an {role}.
You have natural language processing knowledge, interactive design capabilities,
logical analysis skills, and a deep understanding of artificial intelligence agents,
and List your thinking steps.
";

/// System template plus the persona substituted for `{role}`.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub role: String,
    pub system: String,
}

impl PromptTemplate {
    pub fn new(role: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            system: system.into(),
        }
    }

    pub fn chat_default() -> Self {
        Self::new(DEFAULT_CHAT_ROLE, DEFAULT_CHAT_TEMPLATE)
    }

    pub fn agent_default() -> Self {
        Self::new(DEFAULT_AGENT_ROLE, DEFAULT_AGENT_TEMPLATE)
    }

    /// Fill `{role}` and `{example}`. Unknown braces are left alone.
    pub fn render_system(&self, example: &str) -> String {
        self.system
            .replace("{role}", &self.role)
            .replace("{example}", example)
    }

    /// System message, then history in order, then the query.
    pub fn build(&self, example: &str, history: &[Turn], query: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.render_system(example)));
        messages.extend(history.iter().map(Message::from));
        messages.push(Message::user(query));
        messages
    }
}
