//! Tool contract and built-in tool providers.
//!
//! A tool is a capability with two operations: [`Tool::describe`] returns its
//! name, description and parameter schema, and [`Tool::invoke`] performs the
//! side effect. Arguments are validated against the tool's own schema by the
//! [`ToolRegistry`] before `invoke` is called, so tool bodies only deal with
//! well-typed input.

mod download;
mod file_ops;
mod paths;
mod pdf;
mod photo_search;
mod registry;
mod terminal;
mod web_search;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub use download::ResourceDownloadTool;
pub use file_ops::FileOperationTool;
pub use paths::{next_free_path, resolve_confined, sanitize_filename};
pub use pdf::{DEFAULT_PDF_RENDERER, PdfGenerationTool};
pub use photo_search::{DEFAULT_PEXELS_URL, PhotoSearchTool};
pub use registry::ToolRegistry;
pub use terminal::{DEFAULT_DANGEROUS_COMMANDS, TerminalOperationTool};
pub use web_search::{DEFAULT_SEARCH_URL, WebSearchTool};

/// Errors a tool invocation can report back to the reasoning engine.
///
/// None of these abort a turn: the engine turns them into a failed tool
/// result and keeps going.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("path escapes the workspace root: {0}")]
    PathEscape(String),

    #[error("dangerous command blocked: {0}")]
    DangerousCommand(String),

    #[error("tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("tool not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::PathEscape(_) => "PATH_ESCAPE",
            Self::DangerousCommand(_) => "DANGEROUS_COMMAND",
            Self::Timeout(_) => "TIMEOUT",
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::Failed(_) => "FAILED",
        }
    }
}

/// Result type for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "enum")]
    pub enum_values: Vec<String>,
}

impl ParameterInfo {
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            enum_values: Vec::new(),
        }
    }

    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Capability description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterInfo>,
}

impl ToolInfo {
    pub fn new(name: &str, description: &str, parameters: Vec<ParameterInfo>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// JSON schema of the parameter object, as model providers expect it.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.kind.as_str(),
                "description": param.description,
            });
            if !param.enum_values.is_empty() {
                prop["enum"] = json!(param.enum_values);
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check `args` against this schema.
    ///
    /// Required parameters must be present, non-null and (for strings)
    /// non-empty. Present parameters must have the declared type and, for
    /// enums, one of the declared values.
    pub fn validate(&self, args: &Value) -> ToolResult<()> {
        let Some(object) = args.as_object() else {
            return Err(ToolError::invalid("arguments must be a JSON object"));
        };

        for param in &self.parameters {
            let value = object.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if param.required {
                    return Err(ToolError::invalid(format!(
                        "missing required parameter `{}`",
                        param.name
                    )));
                }
                continue;
            };

            if !param.kind.accepts(value) {
                return Err(ToolError::invalid(format!(
                    "parameter `{}` must be of type {}",
                    param.name,
                    param.kind.as_str()
                )));
            }

            if let Some(text) = value.as_str() {
                if param.required && text.trim().is_empty() {
                    return Err(ToolError::invalid(format!(
                        "parameter `{}` cannot be empty",
                        param.name
                    )));
                }
                if !param.enum_values.is_empty() && !param.enum_values.iter().any(|v| v == text)
                {
                    return Err(ToolError::invalid(format!(
                        "parameter `{}` must be one of: {}",
                        param.name,
                        param.enum_values.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A capability the reasoning engine can call.
///
/// Implementations hold no mutable state between calls. Anything they touch
/// (files, subprocesses, sockets) is scoped to one invocation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Pure description of the tool.
    fn describe(&self) -> ToolInfo;

    /// Run the tool with already-validated arguments.
    async fn invoke(&self, args: Value) -> ToolResult<String>;
}

/// Read a string argument, treating blank strings as absent.
pub(crate) fn str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, name: &str) -> ToolResult<&'a str> {
    str_arg(args, name)
        .ok_or_else(|| ToolError::invalid(format!("missing required parameter `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_info() -> ToolInfo {
        ToolInfo::new(
            "search",
            "test",
            vec![
                ParameterInfo::required("q", ParamType::String, "query"),
                ParameterInfo::required("engine", ParamType::String, "engine")
                    .with_enum(&["baidu", "google"]),
                ParameterInfo::optional("limit", ParamType::Integer, "limit"),
            ],
        )
    }

    #[test]
    fn test_validate_accepts_well_formed_arguments() {
        let info = search_info();
        assert!(
            info.validate(&json!({"q": "rust", "engine": "google", "limit": 3}))
                .is_ok()
        );
        assert!(info.validate(&json!({"q": "rust", "engine": "baidu"})).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = search_info().validate(&json!({"engine": "google"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
        assert!(err.to_string().contains("`q`"));
    }

    #[test]
    fn test_validate_rejects_blank_required_string() {
        let err = search_info()
            .validate(&json!({"q": "  ", "engine": "google"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_rejects_wrong_type_and_enum() {
        let info = search_info();
        assert!(matches!(
            info.validate(&json!({"q": 5, "engine": "google"})),
            Err(ToolError::InvalidArgument(_))
        ));
        assert!(matches!(
            info.validate(&json!({"q": "x", "engine": "bing"})),
            Err(ToolError::InvalidArgument(_))
        ));
        assert!(matches!(
            info.validate(&json!({"q": "x", "engine": "google", "limit": "3"})),
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_object() {
        assert!(matches!(
            search_info().validate(&json!(["q"])),
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_json_schema_lists_required_and_enum() {
        let schema = search_info().json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["q", "engine"]));
        assert_eq!(schema["properties"]["engine"]["enum"], json!(["baidu", "google"]));
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
    }
}
