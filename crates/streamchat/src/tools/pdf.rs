//! PDF generation by printing generated HTML with a headless browser.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::paths::{next_free_path, sanitize_filename};
use super::{ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str, str_arg};

pub const DEFAULT_PDF_RENDERER: &str = "chromium";

pub struct PdfGenerationTool {
    dir: PathBuf,
    renderer: String,
    timeout: Duration,
}

impl PdfGenerationTool {
    pub fn new(
        resource_root: impl AsRef<Path>,
        renderer: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            dir: resource_root.as_ref().join("pdf"),
            renderer: renderer.into(),
            timeout,
        }
    }

    async fn render(&self, html_path: &Path, output: &Path) -> ToolResult<()> {
        let child = Command::new(&self.renderer)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", html_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::NotConfigured(format!("PDF renderer '{}' ({e})", self.renderer))
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))?
            .map_err(|e| ToolError::failed(format!("PDF renderer failed: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ToolError::failed(format!(
                "PDF renderer exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn looks_like_html(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains("<html")
        || lower.contains("<!doctype")
        || ["<h1>", "<h2>", "<p>", "<div>"]
            .iter()
            .any(|tag| content.contains(tag))
}

/// Plain text is converted line by line: blank lines become `<br>`, the rest
/// escaped paragraphs. Content that already carries markup is used as is.
fn body_html(content: &str) -> String {
    if looks_like_html(content) {
        return content.to_string();
    }
    content
        .split('\n')
        .map(str::trim)
        .map(|line| {
            if line.is_empty() {
                "<br>".to_string()
            } else {
                format!("<p>{}</p>", escape_html(line))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
struct DocumentMeta<'a> {
    title: &'a str,
    author: Option<&'a str>,
    subject: Option<&'a str>,
}

fn build_html(meta: &DocumentMeta<'_>, content: &str) -> String {
    let mut byline = Vec::new();
    if let Some(author) = meta.author {
        byline.push(format!("Author: {}", escape_html(author)));
    }
    if let Some(subject) = meta.subject {
        byline.push(format!("Subject: {}", escape_html(subject)));
    }
    let mut meta_info = byline.join(" | ");
    if !meta_info.is_empty() {
        meta_info.push_str("<br>");
    }
    meta_info.push_str(&format!(
        "Generated: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    let title = escape_html(meta.title);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="UTF-8">
  <title>{title}</title>
  <style>
    body {{ font-family: sans-serif; margin: 40px; line-height: 1.6; }}
    .title {{ font-size: 24px; font-weight: bold; text-align: center; }}
    .meta-info {{ color: #666; font-size: 12px; text-align: center; border-bottom: 1px solid #ccc; padding-bottom: 8px; }}
    .footer {{ color: #999; font-size: 10px; text-align: center; margin-top: 40px; font-style: italic; }}
  </style>
</head>
<body>
  <div class="title">{title}</div>
  <div class="meta-info">{meta_info}</div>
  <div class="content">
{body}
  </div>
  <div class="footer">Generated by streamchat</div>
</body>
</html>
"#,
        body = body_html(content),
    )
}

fn pdf_filename(requested: &str) -> String {
    let base = sanitize_filename(requested)
        .unwrap_or_else(|| format!("document_{}", chrono::Utc::now().timestamp()));
    if base.to_ascii_lowercase().ends_with(".pdf") {
        base
    } else {
        format!("{base}.pdf")
    }
}

#[async_trait]
impl Tool for PdfGenerationTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "pdf_generation_tool",
            "Generate PDF files from HTML content and save to the pdf resource directory",
            vec![
                ParameterInfo::required(
                    "filename",
                    ParamType::String,
                    "The filename for the generated PDF (without .pdf extension)",
                ),
                ParameterInfo::required(
                    "content",
                    ParamType::String,
                    "The HTML content to be included in the PDF. Plain text is wrapped in HTML tags.",
                ),
                ParameterInfo::optional("title", ParamType::String, "PDF document title"),
                ParameterInfo::optional("author", ParamType::String, "PDF document author"),
                ParameterInfo::optional("subject", ParamType::String, "PDF document subject"),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let filename = pdf_filename(required_str(&args, "filename")?);
        let content = required_str(&args, "content")?;
        let meta = DocumentMeta {
            title: str_arg(&args, "title").unwrap_or_default(),
            author: str_arg(&args, "author"),
            subject: str_arg(&args, "subject"),
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ToolError::failed(format!("failed to create PDF directory: {e}")))?;
        let output = next_free_path(&self.dir, &filename).await;

        let staging = tempfile::Builder::new()
            .prefix("streamchat-pdf-")
            .suffix(".html")
            .tempfile()
            .map_err(|e| ToolError::failed(format!("failed to create temp file: {e}")))?;
        tokio::fs::write(staging.path(), build_html(&meta, content))
            .await
            .map_err(|e| ToolError::failed(format!("failed to write HTML: {e}")))?;
        debug!(html = %staging.path().display(), "rendering PDF");

        if let Err(err) = self.render(staging.path(), &output).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(err);
        }

        let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(ToolError::failed("generated PDF is empty"));
        }

        info!(path = %output.display(), size, "PDF generated");
        Ok(format!("PDF generation successfully to {}", output.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_html_escapes_plain_text() {
        let body = body_html("first & line\n\n  second <script>  ");
        assert_eq!(
            body,
            "<p>first &amp; line</p>\n<br>\n<p>second &lt;script&gt;</p>"
        );
    }

    #[test]
    fn test_body_html_keeps_markup() {
        let html = "<h1>Report</h1><p>body</p>";
        assert_eq!(body_html(html), html);
    }

    #[test]
    fn test_build_html_meta() {
        let meta = DocumentMeta {
            title: "A <b>",
            author: Some("Ann"),
            subject: None,
        };
        let html = build_html(&meta, "text");
        assert!(html.contains("<title>A &lt;b&gt;</title>"));
        assert!(html.contains("Author: Ann<br>Generated: "));
        assert!(!html.contains("Subject:"));
    }

    #[test]
    fn test_pdf_filename() {
        assert_eq!(pdf_filename("notes"), "notes.pdf");
        assert_eq!(pdf_filename("Notes.PDF"), "Notes.PDF");
        assert_eq!(pdf_filename("Weekly/Report"), "Weekly_Report.pdf");
        assert!(pdf_filename("...").starts_with("document_"));
    }

    #[tokio::test]
    async fn test_missing_renderer_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PdfGenerationTool::new(
            dir.path(),
            "streamchat-no-such-renderer",
            Duration::from_secs(5),
        );
        let err = tool
            .invoke(json!({"filename": "t", "content": "c"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
        assert!(!dir.path().join("pdf").join("t.pdf").exists());
    }
}
