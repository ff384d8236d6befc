//! Resource downloader writing into `<root>/download`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::paths::{next_free_path, sanitize_filename};
use super::{ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str, str_arg};

pub struct ResourceDownloadTool {
    client: Client,
    dir: PathBuf,
}

impl ResourceDownloadTool {
    pub fn new(resource_root: impl AsRef<Path>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            dir: resource_root.as_ref().join("download"),
        }
    }

    async fn fetch_to(&self, url: Url, target: &Path) -> ToolResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::failed(format!("download request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("download failed with status {status}")));
        }

        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| ToolError::failed(format!("failed to create file: {e}")))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ToolError::failed(format!("download interrupted: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ToolError::failed(format!("failed to write file: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ToolError::failed(format!("failed to write file: {e}")))?;
        Ok(written)
    }
}

/// Parse the URL and reject anything but http(s).
fn parse_http_url(raw: &str) -> ToolResult<Url> {
    let url = Url::parse(raw).map_err(|e| ToolError::invalid(format!("invalid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::invalid(format!(
            "unsupported URL scheme '{other}', only http and https are allowed"
        ))),
    }
}

/// Pick the on-disk file name: explicit name, then the last URL path segment,
/// then a timestamped fallback. A missing extension is guessed from the URL.
fn choose_filename(url: &Url, requested: Option<&str>) -> String {
    let from_url = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let name = requested
        .and_then(sanitize_filename)
        .or_else(|| from_url.as_deref().and_then(sanitize_filename))
        .unwrap_or_else(|| format!("download_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

    if Path::new(&name).extension().is_some() {
        return name;
    }
    let ext = from_url
        .as_deref()
        .and_then(|s| mime_guess::from_path(s).first())
        .and_then(|mime| mime_guess::get_mime_extensions(&mime).and_then(|exts| exts.first()))
        .copied();
    match ext {
        Some(ext) => format!("{name}.{ext}"),
        None => name,
    }
}

#[async_trait]
impl Tool for ResourceDownloadTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "resource_download_tool",
            "Download a resource from an http or https URL into the local download directory",
            vec![
                ParameterInfo::required("url", ParamType::String, "URL of the resource to download"),
                ParameterInfo::optional(
                    "filename",
                    ParamType::String,
                    "File name to save as (derived from the URL when omitted)",
                ),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let url = parse_http_url(required_str(&args, "url")?)?;
        let filename = choose_filename(&url, str_arg(&args, "filename"));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ToolError::failed(format!("failed to create download directory: {e}")))?;
        let target = next_free_path(&self.dir, &filename).await;

        match self.fetch_to(url.clone(), &target).await {
            Ok(bytes) => {
                info!(url = %url, path = %target.display(), bytes, "resource downloaded");
                Ok(format!(
                    "Downloaded {url} to {} ({bytes} bytes)",
                    target.display()
                ))
            }
            Err(err) => {
                if let Err(e) = tokio::fs::remove_file(&target).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %target.display(), "failed to remove partial download: {e}");
                }
                Err(err)
            }
        }
    }
}
