//! Web search through the searchapi.io HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::{ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str};

pub const DEFAULT_SEARCH_URL: &str = "https://www.searchapi.io/api/v1/search";

/// Number of organic results handed back to the model.
const MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// Keep at most [`MAX_RESULTS`] entries of `organic_results`, re-encoded as a
/// JSON array.
fn top_organic_results(body: &Value) -> ToolResult<String> {
    let results: Vec<Value> = body
        .get("organic_results")
        .and_then(Value::as_array)
        .map(|items| items.iter().take(MAX_RESULTS).cloned().collect())
        .unwrap_or_default();
    serde_json::to_string(&results)
        .map_err(|e| ToolError::failed(format!("failed to encode search results: {e}")))
}

#[async_trait]
impl Tool for WebSearchTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "web_search_tool",
            "Search for information from Search Engine",
            vec![
                ParameterInfo::required("q", ParamType::String, "search query keyword"),
                ParameterInfo::required("engine", ParamType::String, "search engine name")
                    .with_enum(&["baidu", "google"]),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let q = required_str(&args, "q")?;
        let engine = required_str(&args, "engine")?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("search API key".to_string()))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("engine", engine), ("q", q), ("api_key", api_key)])
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(format!(
                "search API returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("failed to parse search response: {e}")))?;

        let results = top_organic_results(&body)?;
        info!(query = %q, engine = %engine, "web search completed");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_organic_results_truncates() {
        let items: Vec<Value> = (1..=8)
            .map(|i| json!({"position": i, "title": format!("r{i}")}))
            .collect();
        let out = top_organic_results(&json!({ "organic_results": items })).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[4]["position"], 5);
    }

    #[test]
    fn test_top_organic_results_missing_field() {
        assert_eq!(top_organic_results(&json!({})).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let tool = WebSearchTool::new(DEFAULT_SEARCH_URL, None, Duration::from_secs(1));
        let err = tool
            .invoke(json!({"q": "rust", "engine": "google"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
