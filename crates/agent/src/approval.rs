//! Approval policy for model-proposed commands.

use async_trait::async_trait;
use shellpilot_config::{ApprovalMode, SessionConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::Mutex;
use tracing::debug;

/// Decides which commands need an operator's yes before running.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    mode: ApprovalMode,
    dangerous_tokens: Vec<String>,
}

impl ApprovalPolicy {
    pub fn new(mode: ApprovalMode, dangerous_tokens: Vec<String>) -> Self {
        Self {
            mode,
            dangerous_tokens,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.approval, config.dangerous_tokens.clone())
    }

    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// True when the command text contains any dangerous token.
    pub fn is_dangerous(&self, command: &str) -> bool {
        self.dangerous_tokens
            .iter()
            .any(|token| !token.is_empty() && command.contains(token.as_str()))
    }

    pub fn requires_approval(&self, command: &str) -> bool {
        let required = match self.mode {
            ApprovalMode::FullAuto => false,
            ApprovalMode::ApproveAll => true,
            ApprovalMode::ApproveDestructive => self.is_dangerous(command),
        };
        debug!(command, required, "Checked command approval");
        required
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Only `yes`, ignoring case and surrounding whitespace, approves.
pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Asks the operator to confirm a command.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn confirm(&self, command: &str) -> bool;
}

/// Prompts on stderr and reads the answer from a shared line reader.
///
/// The reader is shared so the REPL's own input loop and the approval
/// prompt consume the same stdin buffer.
pub struct LineApprover<R> {
    input: Arc<Mutex<Lines<R>>>,
}

impl<R> LineApprover<R> {
    pub fn new(input: Arc<Mutex<Lines<R>>>) -> Self {
        Self { input }
    }
}

#[async_trait]
impl<R> Approver for LineApprover<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn confirm(&self, command: &str) -> bool {
        eprint!("Approve command `{command}`? (yes/no): ");
        match self.input.lock().await.next_line().await {
            Ok(Some(answer)) => is_affirmative(&answer),
            // EOF or a read error counts as a no
            _ => false,
        }
    }
}

/// Answers from a fixed script and records what it was asked.
#[derive(Default)]
pub struct ScriptedApprover {
    answers: std::sync::Mutex<VecDeque<String>>,
    asked: std::sync::Mutex<Vec<String>>,
}

impl ScriptedApprover {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Commands the approver was asked about, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn confirm(&self, command: &str) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(command.to_string());
        }
        let answer = self.answers.lock().ok().and_then(|mut a| a.pop_front());
        answer.is_some_and(|a| is_affirmative(&a))
    }
}
