//! Read, write, create and delete files under the workspace root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{
    ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str, resolve_confined,
};

pub struct FileOperationTool {
    root: PathBuf,
}

impl FileOperationTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read(&self, path: &Path, rel_path: &str) -> ToolResult<String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ToolError::failed(format!("file does not exist: {rel_path}")))?;
        if meta.is_dir() {
            return Err(ToolError::failed(format!(
                "path is a directory, not a file: {rel_path}"
            )));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ToolError::failed(format!("failed to read {rel_path}: {e}")))?;
        if content.is_empty() {
            return Ok("File is empty".to_string());
        }
        info!(path = %rel_path, bytes = content.len(), "read file");
        Ok(format!("File content of {rel_path}:\n{content}"))
    }

    async fn write(&self, path: &Path, rel_path: &str, content: &str) -> ToolResult<String> {
        ensure_parent(path).await?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ToolError::failed(format!("failed to write file {rel_path}: {e}")))?;
        info!(path = %rel_path, bytes = content.len(), "wrote file");
        Ok(format!(
            "Successfully wrote {} bytes to file: {rel_path}",
            content.len()
        ))
    }

    async fn create(&self, path: &Path, rel_path: &str, content: &str) -> ToolResult<String> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ToolError::failed(format!("file already exists: {rel_path}")));
        }
        ensure_parent(path).await?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ToolError::failed(format!("failed to create file {rel_path}: {e}")))?;
        info!(path = %rel_path, bytes = content.len(), "created file");
        Ok(format!(
            "Successfully created file: {rel_path} with {} bytes",
            content.len()
        ))
    }

    async fn delete(&self, path: &Path, rel_path: &str) -> ToolResult<String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ToolError::failed(format!("file does not exist: {rel_path}")))?;
        if meta.is_dir() {
            return Err(ToolError::failed(format!(
                "cannot delete directories, only files are supported: {rel_path}"
            )));
        }
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ToolError::failed(format!("failed to delete file {rel_path}: {e}")))?;
        info!(path = %rel_path, "deleted file");
        Ok(format!("Successfully deleted file: {rel_path}"))
    }
}

async fn ensure_parent(path: &Path) -> ToolResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ToolError::failed(format!(
                "failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl Tool for FileOperationTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "file_operation_tool",
            "Perform basic file operations (read, write, create, delete) on files in the workspace directory and its subdirectories",
            vec![
                ParameterInfo::required("operation", ParamType::String, "File operation to perform")
                    .with_enum(&["read", "write", "create", "delete"]),
                ParameterInfo::required(
                    "file_path",
                    ParamType::String,
                    "File name or relative path within the workspace (e.g., 'file.txt', 'pdf/doc.pdf')",
                ),
                ParameterInfo::optional(
                    "content",
                    ParamType::String,
                    "Content to write (for write/create operations)",
                ),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let operation = required_str(&args, "operation")?.to_lowercase();
        let file_path = required_str(&args, "file_path")?;
        let content = args.get("content").and_then(Value::as_str).unwrap_or("");

        let path = resolve_confined(&self.root, file_path)?;
        if path == self.root {
            return Err(ToolError::invalid("file_path must name a file"));
        }

        match operation.as_str() {
            "read" => self.read(&path, file_path).await,
            "write" => self.write(&path, file_path, content).await,
            "create" => self.create(&path, file_path, content).await,
            "delete" => self.delete(&path, file_path).await,
            other => Err(ToolError::invalid(format!("unsupported operation: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_read_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileOperationTool::new(dir.path());

        let out = tool
            .invoke(json!({"operation": "create", "file_path": "notes/a.txt", "content": "hello"}))
            .await
            .unwrap();
        assert!(out.contains("Successfully created"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/a.txt")).unwrap(),
            "hello"
        );

        let out = tool
            .invoke(json!({"operation": "read", "file_path": "notes/a.txt"}))
            .await
            .unwrap();
        assert!(out.ends_with("hello"));

        tool.invoke(json!({"operation": "delete", "file_path": "notes/a.txt"}))
            .await
            .unwrap();
        assert!(!dir.path().join("notes/a.txt").exists());
    }

    #[tokio::test]
    async fn test_write_overwrites_and_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let tool = FileOperationTool::new(dir.path());

        let out = tool
            .invoke(json!({"operation": "write", "file_path": "a.txt", "content": "fresh"}))
            .await
            .unwrap();
        assert_eq!(out, "Successfully wrote 5 bytes to file: a.txt");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "fresh");

        let err = tool
            .invoke(json!({"operation": "delete", "file_path": "nested"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist: nested"));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let tool = FileOperationTool::new(dir.path());

        let err = tool
            .invoke(json!({"operation": "create", "file_path": "a.txt", "content": "new"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_traversal_fails_without_touching_disk() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let tool = FileOperationTool::new(&root);

        for op in ["write", "create", "delete"] {
            let err = tool
                .invoke(json!({"operation": op, "file_path": "../escape.txt", "content": "x"}))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::PathEscape(_)), "{op}: {err}");
        }
        assert!(!parent.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileOperationTool::new(dir.path());
        let err = tool
            .invoke(json!({"operation": "read", "file_path": "missing.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
