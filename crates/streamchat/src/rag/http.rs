use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Passage, RetrievalProvider};

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    top_k: usize,
    score_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    passages: Vec<Passage>,
}

/// Retrieval over a JSON HTTP endpoint.
///
/// POSTs `{query, top_k, score_threshold}` and expects `{passages: [{content,
/// score}]}`. Passages under the threshold are dropped here as well, in case
/// the service ignores it.
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
    top_k: usize,
    score_threshold: f64,
}

impl HttpRetriever {
    pub fn new(
        endpoint: impl Into<String>,
        top_k: usize,
        score_threshold: f64,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            top_k,
            score_threshold,
        }
    }

    fn select(&self, mut passages: Vec<Passage>) -> Vec<Passage> {
        passages.retain(|p| p.score >= self.score_threshold);
        passages.truncate(self.top_k);
        passages
    }
}

#[async_trait]
impl RetrievalProvider for HttpRetriever {
    async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<Passage>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RetrieveRequest {
                query,
                top_k: self.top_k,
                score_threshold: self.score_threshold,
            })
            .send()
            .await
            .with_context(|| format!("retrieval request to {}", self.endpoint))?
            .error_for_status()
            .context("retrieval service returned an error status")?;

        let body: RetrieveResponse = response
            .json()
            .await
            .context("parsing retrieval response")?;

        let passages = self.select(body.passages);
        debug!(count = passages.len(), "retrieved passages");
        Ok(passages)
    }
}
