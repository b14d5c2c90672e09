//! Shell batch value types shared by the executor, the shell tool and the agent.

use serde::{Deserialize, Serialize};

/// Exit code reported when a command could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Exit code reported when a command was killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Per-command timeout when neither the caller nor config sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One command in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommandSpec {
    pub label: String,
    #[serde(alias = "command")]
    pub cmd: String,
    #[serde(default = "default_timeout_seconds", alias = "timeoutSeconds")]
    pub timeout_seconds: u64,
    #[serde(default, alias = "continueOnFailure")]
    pub continue_on_failure: bool,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ShellCommandSpec {
    pub fn new(label: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            cmd: cmd.into(),
            timeout_seconds: default_timeout_seconds(),
            continue_on_failure: false,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn continue_on_failure(mut self, yes: bool) -> Self {
        self.continue_on_failure = yes;
        self
    }
}

/// The outcome of one attempted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellResult {
    pub label: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl ShellResult {
    /// Text suitable for a context entry or tool message.
    pub fn summary(&self) -> String {
        let mut out = format!("[{}] exit {}", self.label, self.exit_code);
        if !self.stdout.is_empty() {
            out.push('\n');
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.is_empty() {
            out.push_str("\n[stderr]: ");
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// Ordered results of a batch, one per command attempted.
pub type BatchResult = Vec<ShellResult>;
