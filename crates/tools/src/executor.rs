//! Shell executor: runs command batches strictly in order.

use shellpilot_config::ShellConfig;
use shellpilot_core::shell::{
    BatchResult, SPAWN_FAILURE_EXIT_CODE, ShellCommandSpec, ShellResult, TIMEOUT_EXIT_CODE,
};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STDOUT_LINES: usize = 1000;

/// Runs shell commands as `<shell> -c <cmd>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    max_stdout_lines: usize,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            max_stdout_lines: DEFAULT_MAX_STDOUT_LINES,
        }
    }

    pub fn from_config(config: &ShellConfig) -> Self {
        Self::new(config.shell.clone()).with_max_stdout_lines(config.max_stdout_lines)
    }

    pub fn with_max_stdout_lines(mut self, lines: usize) -> Self {
        self.max_stdout_lines = lines.max(1);
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Run `commands` one after another.
    ///
    /// Stops after the first failure unless that command allows continuation;
    /// the returned list then holds only the commands actually attempted.
    pub async fn run(&self, commands: &[ShellCommandSpec]) -> BatchResult {
        let mut results = Vec::with_capacity(commands.len());
        for spec in commands {
            let result = self.run_one(spec).await;
            let stop = !result.success && !spec.continue_on_failure;
            results.push(result);
            if stop {
                info!(label = %spec.label, "Stopping batch after failed command");
                break;
            }
        }
        results
    }

    /// Run a single command, bounded by its timeout plus one second.
    pub async fn run_one(&self, spec: &ShellCommandSpec) -> ShellResult {
        debug!(label = %spec.label, command = %spec.cmd, shell = %self.shell, "Executing shell command");

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(&spec.cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(label = %spec.label, error = %e, "Failed to start command");
                return failure(spec, SPAWN_FAILURE_EXIT_CODE, e.to_string());
            }
        };

        let limit = Duration::from_secs(spec.timeout_seconds.saturating_add(1));
        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = exit_code(&output.status);
                let success = exit_code == 0;
                if !success {
                    warn!(label = %spec.label, exit_code, "Command failed");
                }
                ShellResult {
                    label: spec.label.clone(),
                    exit_code,
                    stdout: cap_lines(&String::from_utf8_lossy(&output.stdout), self.max_stdout_lines),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    success,
                }
            }
            Ok(Err(e)) => {
                warn!(label = %spec.label, error = %e, "Failed to collect command output");
                failure(spec, SPAWN_FAILURE_EXIT_CODE, e.to_string())
            }
            // the child was dropped with the future, which kills it
            Err(_) => {
                warn!(label = %spec.label, timeout_secs = spec.timeout_seconds, "Command timed out");
                failure(
                    spec,
                    TIMEOUT_EXIT_CODE,
                    format!("Command timed out after {}s", spec.timeout_seconds),
                )
            }
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::from_config(&ShellConfig::default())
    }
}

fn failure(spec: &ShellCommandSpec, exit_code: i32, stderr: String) -> ShellResult {
    ShellResult {
        label: spec.label.clone(),
        exit_code,
        stdout: String::new(),
        stderr,
        success: false,
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

/// Keep the first `max` lines, appending a marker when more were produced.
pub fn cap_lines(text: &str, max: usize) -> String {
    let total = text.lines().count();
    if total <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for line in text.lines().take(max) {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("... output truncated after {max} lines\n"));
    out
}
