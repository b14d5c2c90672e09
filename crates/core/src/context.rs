//! Context entries: the units of conversational and tool history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What produced a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    UserMessage,
    AiResponse,
    Command,
    CommandOutput,
    Tool,
    SystemNote,
    ProgressiveSummary,
    Tokens,
}

impl EntryKind {
    /// The prefix each entry is rendered with inside a prompt.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::UserMessage => "[User]: ",
            Self::AiResponse => "[AI]: ",
            Self::Command => "[Command]: ",
            Self::CommandOutput => "[Output]: ",
            Self::Tool => "[Tool]: ",
            Self::SystemNote => "[System]: ",
            Self::ProgressiveSummary => "[Summary]: ",
            Self::Tokens => "[Tokens]: ",
        }
    }
}

/// One append-only unit of context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl ContextEntry {
    pub fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(EntryKind::UserMessage, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(EntryKind::AiResponse, text)
    }

    pub fn command(text: impl Into<String>) -> Self {
        Self::new(EntryKind::Command, text)
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(EntryKind::CommandOutput, text)
    }

    pub fn note(text: impl Into<String>) -> Self {
        Self::new(EntryKind::SystemNote, text)
    }

    /// Render with the entry's own prefix.
    pub fn render(&self) -> String {
        format!("{}{}", self.kind.prefix(), self.text)
    }
}

impl fmt::Display for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_uses_kind_prefix() {
        assert_eq!(ContextEntry::user("hi").render(), "[User]: hi");
        assert_eq!(ContextEntry::ai("ok").render(), "[AI]: ok");
        assert_eq!(ContextEntry::command("ls").render(), "[Command]: ls");
        assert_eq!(ContextEntry::output("a.txt").render(), "[Output]: a.txt");
        assert_eq!(ContextEntry::note("x").render(), "[System]: x");
    }

    #[test]
    fn display_matches_render() {
        let entry = ContextEntry::new(EntryKind::Tool, "shell ok");
        assert_eq!(entry.to_string(), entry.render());
    }
}
