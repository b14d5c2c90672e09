//! Wire schemas, one per known response shape.
//!
//! Every field is optional; a shape only insists on the fields that
//! discriminate it.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesPayload {
    pub id: Option<String>,
    pub object: Option<String>,
    pub created_at: Option<i64>,
    pub status: Option<String>,
    pub error: Option<Value>,
    pub incomplete_details: Option<IncompleteDetails>,
    pub instructions: Option<Value>,
    pub max_output_tokens: Option<i64>,
    pub model: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub previous_response_id: Option<String>,
    pub reasoning: Option<Reasoning>,
    pub temperature: Option<f64>,
    pub text: Option<TextConfig>,
    pub top_p: Option<f64>,
    pub truncation: Option<String>,
    pub usage: Option<ResponsesUsage>,
    pub user: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub tools: Vec<Map<String, Value>>,
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncompleteDetails {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Reasoning {
    pub effort: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextConfig {
    pub format: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// One entry of a responses `output` array.
#[derive(Debug, Default, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub call_id: Option<String>,
    pub action: Option<ShellAction>,
    pub content: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShellAction {
    pub command: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionPayload {
    pub id: Option<String>,
    pub object: Option<String>,
    pub created: Option<i64>,
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<CompletionUsage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Choice {
    pub index: Option<i64>,
    pub finish_reason: Option<String>,
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoiceMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationPayload {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<i64>,
    #[serde(default)]
    pub results: Vec<ModerationResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModerationResult {
    pub flagged: Option<bool>,
    pub categories: Option<Map<String, Value>>,
    pub category_scores: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelListPayload {
    pub object: Option<String>,
    #[serde(default)]
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelEntry {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelPayload {
    pub id: Option<String>,
    pub object: Option<String>,
    pub created: Option<i64>,
    pub owned_by: Option<String>,
}

/// Local chat servers (`/api/chat`).
#[derive(Debug, Default, Deserialize)]
pub struct LocalChatPayload {
    pub model: Option<String>,
    pub created_at: Option<String>,
    pub message: Option<ChoiceMessage>,
    pub done: Option<bool>,
}
