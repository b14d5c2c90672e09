//! Token counting.
//!
//! The default counter uses a character heuristic of ~4 characters per
//! token, which tracks BPE tokenizers closely enough for budgeting. A real
//! tokenizer can be plugged in behind [`TokenCounter`].

/// Counts tokens in text. `None` means the text could not be tokenized.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Option<usize>;
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// The default counter, backed by [`estimate_tokens`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> Option<usize> {
        Some(estimate_tokens(text))
    }
}
