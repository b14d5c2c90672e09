//! Shell tool: exposes the [`ShellExecutor`] through the tool registry.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use shellpilot_core::error::ToolError;
use shellpilot_core::shell::{DEFAULT_TIMEOUT_SECS, ShellCommandSpec};
use shellpilot_core::tool::{Tool, ToolStatus};
use tracing::debug;

use crate::executor::ShellExecutor;

#[derive(Debug, Deserialize)]
struct ShellArgs {
    commands: Vec<CommandArg>,
}

/// One batch item as the caller sent it; absent fields take tool defaults.
#[derive(Debug, Deserialize)]
struct CommandArg {
    label: String,
    #[serde(alias = "command")]
    cmd: String,
    #[serde(default, alias = "timeoutSeconds")]
    timeout_seconds: Option<u64>,
    #[serde(default, alias = "continueOnFailure")]
    continue_on_failure: bool,
}

/// Runs a batch of labelled shell commands.
pub struct ShellTool {
    executor: ShellExecutor,
    default_timeout_secs: u64,
}

impl ShellTool {
    pub fn new(executor: ShellExecutor) -> Self {
        Self {
            executor,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Timeout for commands that do not set `timeout_seconds`.
    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    fn batch(&self, commands: Vec<CommandArg>) -> Vec<ShellCommandSpec> {
        commands
            .into_iter()
            .map(|c| {
                ShellCommandSpec::new(c.label, c.cmd)
                    .with_timeout(c.timeout_seconds.unwrap_or(self.default_timeout_secs))
                    .continue_on_failure(c.continue_on_failure)
            })
            .collect()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run shell commands in order and return each command's exit code, stdout and stderr. \
         A failing command stops the batch unless continue_on_failure is set."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "commands": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "label": { "type": "string", "description": "Short name for the command" },
                            "cmd": { "type": "string", "description": "The command line" },
                            "timeout_seconds": { "type": "integer" },
                            "continue_on_failure": { "type": "boolean" }
                        },
                        "required": ["label", "cmd"]
                    }
                }
            },
            "required": ["commands"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolStatus, ToolError> {
        let args: ShellArgs =
            serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.commands.is_empty() {
            return Err(ToolError::InvalidArguments("commands must not be empty".into()));
        }

        let specs = self.batch(args.commands);
        debug!(count = specs.len(), "Running shell batch");
        let results = self.executor.run(&specs).await;

        let success = results.len() == specs.len() && results.iter().all(|r| r.success);
        let message = results
            .iter()
            .map(|r| r.summary())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ToolStatus { message, success })
    }
}
