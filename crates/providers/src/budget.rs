//! Output-token budgeting.

use shellpilot_core::token::TokenCounter;

/// Headroom reserved between the prompt and the output limit.
const BUDGET_MARGIN: usize = 20;

/// Smallest budget ever requested.
pub const MIN_BUDGET: u32 = 16;

/// What the gateway knows about a model's output limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub output_limit: u32,
    /// Whether the responses API accepts `max_output_tokens` for this model.
    pub supports_max_output_tokens: bool,
}

const KNOWN_MODELS: &[(&str, ModelInfo)] = &[
    ("gpt-4.1", ModelInfo::new(32768, true)),
    ("gpt-4.1-mini", ModelInfo::new(32768, true)),
    ("gpt-4.1-nano", ModelInfo::new(32768, true)),
    ("gpt-4o", ModelInfo::new(4096, false)),
    ("gpt-4o-audio", ModelInfo::new(16384, false)),
    ("gpt-4o-mini", ModelInfo::new(16384, false)),
    ("o3-mini", ModelInfo::new(100_000, true)),
    ("o4-mini", ModelInfo::new(100_000, true)),
    ("codex-mini-latest", ModelInfo::new(100_000, true)),
    ("deepseek/deepseek-r1-0528:free", ModelInfo::new(128_000, true)),
];

impl ModelInfo {
    pub const fn new(output_limit: u32, supports_max_output_tokens: bool) -> Self {
        Self {
            output_limit,
            supports_max_output_tokens,
        }
    }

    /// Look a model up, falling back to `default_limit` without
    /// `max_output_tokens` support.
    pub fn lookup(model: &str, default_limit: u32) -> Self {
        KNOWN_MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, info)| *info)
            .unwrap_or(Self::new(default_limit, false))
    }
}

/// Compute the output-token budget for a prompt.
///
/// Returns `max(1, limit - prompt - 20)` clamped to `[16, limit]`, or 0 when
/// the prompt cannot be tokenized. Callers must reject 0.
pub fn token_budget(counter: &dyn TokenCounter, prompt: &str, info: ModelInfo) -> u32 {
    let Some(prompt_tokens) = counter.count(prompt) else {
        return 0;
    };
    let limit = info.output_limit as usize;
    let raw = limit.saturating_sub(prompt_tokens + BUDGET_MARGIN).max(1);
    let clamped = raw.max(MIN_BUDGET as usize).min(limit);
    u32::try_from(clamped).unwrap_or(info.output_limit)
}
