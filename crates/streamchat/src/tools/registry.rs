//! Fixed set of tools offered to the reasoning engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::{Tool, ToolError, ToolInfo, ToolResult};

/// Tools registered at startup, in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn push(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.describe().name).collect()
    }

    pub fn describe_all(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| t.describe()).collect()
    }

    /// Check that the set can be offered to a model: every tool has a name
    /// and no two tools share one.
    pub fn check(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for info in self.describe_all() {
            if info.name.trim().is_empty() {
                return Err("tool with empty name".to_string());
            }
            if !seen.insert(info.name.clone()) {
                return Err(format!("duplicate tool name: {}", info.name));
            }
        }
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.describe().name == name)
    }

    /// Decode, validate and run one tool call under `timeout`.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &str,
        timeout: Duration,
    ) -> ToolResult<String> {
        let tool = self
            .find(name)
            .ok_or_else(|| ToolError::invalid(format!("unknown tool: {name}")))?;

        let args: Value = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| ToolError::invalid(format!("failed to parse arguments: {e}")))?
        };

        tool.describe().validate(&args)?;

        debug!(tool = %name, "invoking tool");
        match tokio::time::timeout(timeout, tool.invoke(args)).await {
            Ok(result) => {
                if let Err(ref err) = result {
                    warn!(tool = %name, code = err.code(), error = %err, "tool call failed");
                }
                result
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = timeout.as_secs(), "tool call timed out");
                Err(ToolError::Timeout(timeout))
            }
        }
    }
}
