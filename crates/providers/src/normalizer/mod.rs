//! Response normalization.
//!
//! A raw backend payload is classified into exactly one [`ResponseShape`] by
//! trying each known schema in a fixed order, then flattened into a
//! [`NormalizedResponse`]. Normalization is pure: no I/O, no shared state.

pub mod shapes;
pub mod tools;

use serde::de::DeserializeOwned;
use serde_json::Value;
use shellpilot_core::error::NormalizeError;
use shellpilot_core::response::{MODERATION_CATEGORIES, NormalizedResponse, keys};
use tracing::trace;

use shapes::*;
use tools::{collect_commands, extract_tool_choice, extract_tools, scalar_text};

/// Every response shape the normalizer understands.
#[derive(Debug)]
pub enum ResponseShape {
    Responses(ResponsesPayload),
    Moderation(ModerationPayload),
    ModelList(ModelListPayload),
    /// OpenRouter generation (`gen-` ids). `object` is mandatory here.
    OpenRouter(CompletionPayload),
    Completion(CompletionPayload),
    Model(ModelPayload),
    Unrecognized {
        id: Option<String>,
        object: Option<String>,
        model: Option<String>,
    },
}

fn parse<T: DeserializeOwned>(shape: &'static str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            trace!(shape, error = %e, "Payload does not fit shape");
            None
        }
    }
}

impl ResponseShape {
    /// Classify a payload. The first shape whose discriminators match and
    /// whose schema parses wins.
    pub fn detect(value: &Value) -> Result<Self, NormalizeError> {
        let obj = value.as_object().ok_or(NormalizeError::NotAnObject)?;
        let object = obj.get("object").and_then(Value::as_str);
        let id = obj.get("id").and_then(Value::as_str);
        let has_array = |key: &str| obj.get(key).is_some_and(Value::is_array);

        if object == Some("response") && has_array("output") {
            if let Some(p) = parse("responses", value) {
                return Ok(Self::Responses(p));
            }
        }

        if has_array("results") {
            let has_categories = obj
                .get("results")
                .and_then(Value::as_array)
                .is_some_and(|r| r.iter().any(|e| e.get("categories").is_some_and(Value::is_object)));
            if id.is_some_and(|i| i.contains("modr")) || has_categories {
                if let Some(p) = parse("moderation", value) {
                    return Ok(Self::Moderation(p));
                }
            }
        }

        if object == Some("list") && has_array("data") {
            if let Some(p) = parse("model_list", value) {
                return Ok(Self::ModelList(p));
            }
        }

        if id.is_some_and(|i| i.starts_with("gen-")) && has_array("choices") {
            if object.is_none() {
                return Err(NormalizeError::MissingField {
                    shape: "openrouter",
                    field: "object",
                });
            }
            if let Some(p) = parse("openrouter", value) {
                return Ok(Self::OpenRouter(p));
            }
        }

        if has_array("choices") {
            if let Some(p) = parse("completion", value) {
                return Ok(Self::Completion(p));
            }
        }

        if object == Some("model") {
            if let Some(p) = parse("model", value) {
                return Ok(Self::Model(p));
            }
        }

        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);
        Ok(Self::Unrecognized {
            id: text("id"),
            object: text("object"),
            model: text("model"),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Responses(_) => "responses",
            Self::Moderation(_) => "moderation",
            Self::ModelList(_) => "model_list",
            Self::OpenRouter(_) => "openrouter",
            Self::Completion(_) => "completion",
            Self::Model(_) => "model",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Flatten into an attribute bag.
    pub fn into_normalized(self) -> NormalizedResponse {
        let mut bag = NormalizedResponse::new();
        bag.insert(keys::SHAPE, self.name());
        match self {
            Self::Responses(p) => responses(p, &mut bag),
            Self::Moderation(p) => moderation(p, &mut bag),
            Self::ModelList(p) => {
                bag.insert_opt(keys::OBJECT, p.object);
                let models: Vec<String> = p.data.into_iter().filter_map(|m| m.id).collect();
                bag.insert(keys::MODELS, models);
            }
            Self::OpenRouter(p) | Self::Completion(p) => completion(p, &mut bag),
            Self::Model(p) => {
                bag.insert_opt(keys::ID, p.id);
                bag.insert_opt(keys::OBJECT, p.object);
                bag.insert_opt(keys::CREATED, p.created);
                bag.insert_opt(keys::OWNED_BY, p.owned_by);
            }
            Self::Unrecognized { id, object, model } => {
                bag.insert_opt(keys::ID, id);
                bag.insert_opt(keys::OBJECT, object);
                bag.insert_opt(keys::MODEL, model);
            }
        }
        bag
    }
}

/// Normalize a decoded payload.
pub fn normalize(value: &Value) -> Result<NormalizedResponse, NormalizeError> {
    let mut bag = ResponseShape::detect(value)?.into_normalized();
    if let Some(map) = value.as_object() {
        bag.insert(keys::RESPONSE_MAP, map.clone());
    }
    Ok(bag)
}

/// Normalize a raw response body.
pub fn normalize_str(body: &str) -> Result<NormalizedResponse, NormalizeError> {
    let value: Value = serde_json::from_str(body).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
    normalize(&value)
}

/// Normalize a local chat server reply (`{model, message:{role, content}}`),
/// whose content is usually a fenced JSON directive.
pub fn normalize_local_chat(value: &Value) -> Result<NormalizedResponse, NormalizeError> {
    if !value.is_object() {
        return Err(NormalizeError::NotAnObject);
    }
    let payload: LocalChatPayload =
        serde_json::from_value(value.clone()).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
    let mut bag = NormalizedResponse::new();
    bag.insert(keys::SHAPE, "local_chat");
    bag.insert_opt(keys::MODEL, payload.model);
    bag.insert_opt(keys::CREATED_AT, payload.created_at);
    if let Some(message) = payload.message {
        bag.insert_opt(keys::ROLE, message.role);
        if let Some(content) = message.content {
            if let Some(directive) = embedded_directive(&content) {
                bag.merge_missing(directive);
            }
            bag.insert(keys::CONTENT, content);
        }
    }
    if payload.done == Some(true) {
        bag.insert(keys::STATUS, "completed");
    }
    Ok(bag)
}

/// Strip a Markdown code fence (```` ```json ... ``` ````) from model output.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse message content as a responses-style directive, if it is one.
///
/// A directive is a JSON object carrying an `output` list or
/// `metadata.local_shell_command_sequence_finished`.
pub fn embedded_directive(content: &str) -> Option<NormalizedResponse> {
    let value: Value = serde_json::from_str(strip_json_fence(content)).ok()?;
    let obj = value.as_object()?;
    let has_output = obj.get("output").is_some_and(Value::is_array);
    let has_finished = obj
        .get("metadata")
        .and_then(|m| m.get("local_shell_command_sequence_finished"))
        .is_some();
    if !has_output && !has_finished {
        return None;
    }
    let payload: ResponsesPayload = parse("directive", &value)?;
    let mut bag = NormalizedResponse::new();
    responses(payload, &mut bag);
    Some(bag)
}

fn finished_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_text(content: &Value) -> Option<String> {
    content.as_array()?.iter().find_map(|block| {
        block
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(String::from)
    })
}

fn responses(p: ResponsesPayload, bag: &mut NormalizedResponse) {
    bag.insert_opt(keys::ID, p.id);
    bag.insert_opt(keys::OBJECT, p.object);
    bag.insert_opt(keys::CREATED_AT, p.created_at);
    bag.insert_opt(keys::STATUS, p.status);
    bag.insert_opt(keys::ERROR, p.error.filter(|e| !e.is_null()).map(|e| scalar_text(&e)));
    bag.insert_opt(keys::REASON, p.incomplete_details.and_then(|d| d.reason));
    bag.insert_opt(
        keys::INSTRUCTIONS,
        p.instructions.filter(|i| !i.is_null()).map(|i| scalar_text(&i)),
    );
    bag.insert_opt(keys::MAX_OUTPUT_TOKENS, p.max_output_tokens);
    bag.insert_opt(keys::MODEL, p.model);
    bag.insert_opt(keys::PARALLEL_TOOL_CALLS, p.parallel_tool_calls);
    bag.insert_opt(keys::PREVIOUS_RESPONSE_ID, p.previous_response_id);
    if let Some(reasoning) = p.reasoning {
        bag.insert_opt(keys::EFFORT, reasoning.effort);
        bag.insert_opt(keys::SUMMARY, reasoning.summary);
    }
    bag.insert_opt(keys::TEMPERATURE, p.temperature);
    bag.insert_opt(keys::TEXT_FORMAT, p.text.and_then(|t| t.format));
    bag.insert_opt(keys::TOP_P, p.top_p);
    bag.insert_opt(keys::TRUNCATION, p.truncation);
    if let Some(usage) = p.usage {
        bag.insert_opt(keys::PROMPT_TOKENS, usage.input_tokens);
        bag.insert_opt(keys::COMPLETION_TOKENS, usage.output_tokens);
        bag.insert_opt(keys::TOTAL_TOKENS, usage.total_tokens);
    }
    bag.insert_opt(keys::USER, p.user);
    if let Some(metadata) = p.metadata {
        bag.insert_opt(
            keys::LOCALSHELLTOOL_FINISHED,
            metadata
                .get("local_shell_command_sequence_finished")
                .and_then(finished_flag),
        );
        bag.insert(keys::METADATA, metadata);
    }

    let mut commands = Vec::new();
    for item in &p.output {
        let kind = item.kind.as_deref();
        if matches!(kind, Some("tool_call" | "local_shell_call")) {
            bag.insert_opt(keys::LOCALSHELLTOOL_CALL_ID, item.call_id.clone());
            if let Some(command) = item.action.as_ref().and_then(|a| a.command.as_ref()) {
                commands.extend(collect_commands(command));
            }
        }
        if kind == Some("message") || item.content.as_ref().is_some_and(Value::is_array) {
            bag.insert_opt(keys::OUTPUT_CONTENT, item.content.as_ref().and_then(first_text));
        }
    }
    if !commands.is_empty() {
        bag.insert(keys::LOCALSHELLTOOL_COMMANDS, commands);
    }

    if !p.tools.is_empty() {
        extract_tools(&p.tools, bag);
        bag.insert(keys::TOOLS, p.tools);
    }
    if let Some(choice) = p.tool_choice {
        extract_tool_choice(&choice, bag);
    }
}

fn completion(p: CompletionPayload, bag: &mut NormalizedResponse) {
    bag.insert_opt(keys::ID, p.id);
    bag.insert_opt(keys::OBJECT, p.object);
    bag.insert_opt(keys::CREATED, p.created);
    bag.insert_opt(keys::MODEL, p.model);
    if let Some(choice) = p.choices.into_iter().next() {
        bag.insert_opt(keys::FINISH_REASON, choice.finish_reason);
        bag.insert_opt(keys::INDEX, choice.index);
        if let Some(message) = choice.message {
            bag.insert_opt(keys::ROLE, message.role);
            if let Some(content) = message.content {
                if let Some(directive) = embedded_directive(&content) {
                    bag.merge_missing(directive);
                }
                bag.insert(keys::CONTENT, content);
            }
        }
    }
    if let Some(usage) = p.usage {
        bag.insert_opt(keys::PROMPT_TOKENS, usage.prompt_tokens);
        bag.insert_opt(keys::COMPLETION_TOKENS, usage.completion_tokens);
        bag.insert_opt(keys::TOTAL_TOKENS, usage.total_tokens);
    }
}

fn moderation(p: ModerationPayload, bag: &mut NormalizedResponse) {
    bag.insert_opt(keys::ID, p.id);
    bag.insert_opt(keys::MODEL, p.model);
    bag.insert_opt(keys::CREATED, p.created);
    let Some(result) = p.results.into_iter().next() else {
        return;
    };
    bag.insert_opt(keys::FLAGGED, result.flagged);
    for name in MODERATION_CATEGORIES {
        if let Some(flag) = result.categories.as_ref().and_then(|c| c.get(*name)).and_then(Value::as_bool) {
            bag.insert(format!("{}{name}", keys::MODERATION_CATEGORY_PREFIX), flag);
        }
        if let Some(score) = result
            .category_scores
            .as_ref()
            .and_then(|c| c.get(*name))
            .and_then(Value::as_f64)
        {
            bag.insert(format!("{}{name}", keys::MODERATION_SCORE_PREFIX), score);
        }
    }
}
