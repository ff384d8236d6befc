//! Retrieval seam and the relevance gate applied on top of it.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpRetriever;

/// Queries with fewer characters than this never get retrieved context.
pub const MIN_RELEVANT_QUERY_CHARS: usize = 10;

pub const DEFAULT_PASSAGE_CHAR_LIMIT: usize = 1000;

const CONTEXT_HEADER: &str = "- Answer based on the following content:";

/// One retrieved passage with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

impl Passage {
    pub fn new(content: impl Into<String>, score: f64) -> Self {
        Self {
            content: content.into(),
            score,
        }
    }
}

/// Source of passages for a query, already filtered by a similarity threshold.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<Passage>>;
}

/// Retrieval disabled: always returns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetrieval;

#[async_trait]
impl RetrievalProvider for NoRetrieval {
    async fn retrieve(&self, _query: &str) -> anyhow::Result<Vec<Passage>> {
        Ok(Vec::new())
    }
}

/// Coarse relevance gate: short queries never match, otherwise at least one
/// passage must contain the query case-insensitively.
pub fn is_relevant(query: &str, passages: &[Passage]) -> bool {
    if query.trim().chars().count() < MIN_RELEVANT_QUERY_CHARS {
        return false;
    }

    let needle = query.to_lowercase();
    passages
        .iter()
        .any(|p| p.content.to_lowercase().contains(&needle))
}

/// Render the retrieval block injected into the system prompt.
///
/// Always starts with the header line; passages are appended only when
/// [`is_relevant`] holds, each cut to `char_limit` characters.
pub fn context_block(query: &str, passages: &[Passage], char_limit: usize) -> String {
    let mut block = CONTEXT_HEADER.to_string();
    if passages.is_empty() || !is_relevant(query, passages) {
        return block;
    }

    for (i, passage) in passages.iter().enumerate() {
        let content = truncate_chars(&passage.content, char_limit);
        block.push_str(&format!("\n example {}:\n{}\n", i + 1, content));
    }
    block
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
