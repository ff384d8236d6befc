//! Shell command execution confined to the workspace root.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{info, warn};

use super::{
    ParamType, ParameterInfo, Tool, ToolError, ToolInfo, ToolResult, required_str, resolve_confined,
    str_arg,
};

/// Commands refused unless the configuration overrides the list.
pub const DEFAULT_DANGEROUS_COMMANDS: &[&str] = &[
    "rm -rf", "sudo rm", "format", "del /f", "rmdir /s", "shutdown", "reboot", "halt",
    "poweroff", "dd if=", "mkfs", "fdisk",
];

pub struct TerminalOperationTool {
    root: PathBuf,
    denylist: Vec<String>,
    timeout: Duration,
}

impl TerminalOperationTool {
    pub fn new(root: impl Into<PathBuf>, denylist: Vec<String>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            denylist: denylist.into_iter().map(|d| d.to_lowercase()).collect(),
            timeout,
        }
    }

    fn blocked_pattern(&self, command: &str) -> Option<&str> {
        let lowered = command.to_lowercase();
        self.denylist
            .iter()
            .find(|pattern| !pattern.is_empty() && lowered.contains(pattern.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl Tool for TerminalOperationTool {
    fn describe(&self) -> ToolInfo {
        ToolInfo::new(
            "terminal_operation_tool",
            "Execute terminal/shell commands and return the output",
            vec![
                ParameterInfo::required(
                    "command",
                    ParamType::String,
                    "The command to execute in terminal",
                ),
                ParameterInfo::optional(
                    "directory",
                    ParamType::String,
                    "Working directory relative to the workspace (optional, defaults to the workspace root)",
                ),
            ],
        )
    }

    async fn invoke(&self, args: Value) -> ToolResult<String> {
        let command = required_str(&args, "command")?;

        if let Some(pattern) = self.blocked_pattern(command) {
            warn!(command = %command, pattern = %pattern, "dangerous command blocked");
            return Err(ToolError::DangerousCommand(command.to_string()));
        }

        let directory = resolve_confined(&self.root, str_arg(&args, "directory").unwrap_or(""))?;

        info!(command = %command, directory = %directory.display(), "executing command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::failed(format!("failed to start command: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| ToolError::failed(format!("failed to run command: {e}")))?
            }
            Err(_) => return Err(ToolError::Timeout(self.timeout)),
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            text.push_str(&format!("\n[exit status: {code}]"));
        }

        Ok(text)
    }
}
