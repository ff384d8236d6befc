//! Photo search through the Pexels API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str};

pub const DEFAULT_PEXELS_URL: &str = "https://api.pexels.com/v1/search";

const DEFAULT_PER_PAGE: i64 = 5;
const MAX_PER_PAGE: i64 = 80;

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    id: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    photographer: String,
    #[serde(default)]
    alt: String,
    #[serde(default)]
    src: PexelsSource,
}

#[derive(Debug, Default, Deserialize)]
struct PexelsSource {
    #[serde(default)]
    medium: String,
}

/// Simplified photo record handed back to the model.
#[derive(Debug, Serialize)]
struct PhotoResult {
    id: u64,
    alt: String,
    medium_url: String,
    photographer: String,
    width: u32,
    height: u32,
}

impl From<PexelsPhoto> for PhotoResult {
    fn from(photo: PexelsPhoto) -> Self {
        Self {
            id: photo.id,
            alt: photo.alt,
            medium_url: photo.src.medium,
            photographer: photo.photographer,
            width: photo.width,
            height: photo.height,
        }
    }
}

pub struct PhotoSearchTool {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PhotoSearchTool {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("streamchat-photo-search/1.0")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

fn clamp_per_page(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if n > 0 => n.min(MAX_PER_PAGE),
        _ => DEFAULT_PER_PAGE,
    }
}

fn format_results(query: &str, results: &[PhotoResult]) -> String {
    if results.is_empty() {
        return format!("No photos found for query: {query}");
    }

    let mut lines = vec![format!(
        "Found {} photos for query '{query}':",
        results.len()
    )];
    for (i, photo) in results.iter().enumerate() {
        lines.push(format!(
            "{}. {}\n   - Medium URL: {}\n   - Photographer: {}\n   - Size: {}x{}",
            i + 1,
            photo.alt,
            photo.medium_url,
            photo.photographer,
            photo.width,
            photo.height
        ));
    }

    let summary = lines.join("\n");
    match serde_json::to_string(results) {
        Ok(json) => format!("{summary}\n\nJSON Data:\n{json}"),
        Err(_) => summary,
    }
}

#[async_trait]
impl Tool for PhotoSearchTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "photo_search_tool",
            "Search for high-quality photos and return medium-sized image URLs",
            vec![
                ParameterInfo::required(
                    "query",
                    ParamType::String,
                    "Search query for photos (e.g., 'nature', 'city', 'people')",
                ),
                ParameterInfo::optional(
                    "per_page",
                    ParamType::Integer,
                    "Number of photos to return (1-80, default: 5)",
                ),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let query = required_str(&args, "query")?;
        let per_page = clamp_per_page(args.get("per_page").and_then(Value::as_i64));
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured("Pexels API key".to_string()))?;

        let response = self
            .client
            .get(&self.base_url)
            .header("Authorization", api_key)
            .query(&[("query", query.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("failed to send request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::failed(format!(
                "API request failed with status {status}: {body}"
            )));
        }

        let parsed: PexelsResponse = response
            .json()
            .await
            .map_err(|e| ToolError::failed(format!("failed to parse response: {e}")))?;

        let results: Vec<PhotoResult> = parsed.photos.into_iter().map(Into::into).collect();
        info!(query = %query, results = results.len(), "photo search completed");
        Ok(format_results(query, &results))
    }
}
