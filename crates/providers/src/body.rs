//! Request body construction, one layout per request kind.

use crate::budget::{ModelInfo, token_budget};
use serde_json::{Value, json};
use shellpilot_core::call::{CallDescriptor, RequestKind};
use shellpilot_core::error::ProviderError;
use shellpilot_core::token::TokenCounter;

fn metadata() -> Value {
    json!({ "timestamp": chrono::Utc::now().to_rfc3339() })
}

fn budget_for(call: &CallDescriptor, counter: &dyn TokenCounter, info: ModelInfo) -> Result<u32, ProviderError> {
    let prompt = format!("{}{}", call.instructions(), call.content());
    match token_budget(counter, &prompt, info) {
        0 => Err(ProviderError::TokenBudget {
            model: call.model().to_string(),
        }),
        n => Ok(n),
    }
}

/// Build the JSON body for `call`.
pub fn build_request_body(
    call: &CallDescriptor,
    counter: &dyn TokenCounter,
    info: ModelInfo,
) -> Result<Value, ProviderError> {
    let messages = json!([
        { "role": "system", "content": call.instructions() },
        { "role": "user", "content": call.content() },
    ]);

    let body = match call.request_kind() {
        RequestKind::Completion => json!({
            "model": call.model(),
            "messages": messages,
            "max_tokens": budget_for(call, counter, info)?,
            "stream": call.streaming(),
        }),
        RequestKind::Latest => json!({
            "model": call.model(),
            "messages": messages,
            "stream": call.streaming(),
        }),
        RequestKind::Responses => {
            let budget = budget_for(call, counter, info)?;
            let mut body = json!({
                "model": call.model(),
                "instructions": call.instructions(),
                "input": [{ "role": "user", "content": call.content() }],
                "stream": call.streaming(),
                "metadata": metadata(),
            });
            if let Some(prev) = call.previous_response_id() {
                body["previous_response_id"] = json!(prev);
            }
            let budget_key = if info.supports_max_output_tokens {
                "max_output_tokens"
            } else {
                "max_tokens"
            };
            body[budget_key] = json!(budget);
            body
        }
        RequestKind::Moderation => json!({
            "model": call.model(),
            "input": call.content(),
            "metadata": metadata(),
        }),
    };
    Ok(body)
}
