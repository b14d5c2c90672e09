//! The normalized response: a typed, insert-once attribute bag.
//!
//! Every backend payload, whatever its shape, is reduced to one of these.
//! Keys are namespaced strings (`localshelltool_commands`,
//! `moderation_score:violence`, ...) and each value carries its type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::trace;

/// Well-known attribute keys.
pub mod keys {
    pub const RESPONSE_MAP: &str = "response_map";
    pub const SHAPE: &str = "shape";
    pub const ID: &str = "id";
    pub const OBJECT: &str = "object";
    pub const CREATED: &str = "created";
    pub const CREATED_AT: &str = "created_at";
    pub const STATUS: &str = "status";
    pub const ERROR: &str = "error";
    pub const REASON: &str = "reason";
    pub const INSTRUCTIONS: &str = "instructions";
    pub const MAX_OUTPUT_TOKENS: &str = "max_output_tokens";
    pub const MODEL: &str = "model";
    pub const OWNED_BY: &str = "owned_by";
    pub const MODELS: &str = "models";
    pub const PARALLEL_TOOL_CALLS: &str = "parallel_tool_calls";
    pub const PREVIOUS_RESPONSE_ID: &str = "previous_response_id";
    pub const EFFORT: &str = "effort";
    pub const SUMMARY: &str = "summary";
    pub const TEMPERATURE: &str = "temperature";
    pub const TEXT_FORMAT: &str = "text_format";
    pub const TOP_P: &str = "top_p";
    pub const TRUNCATION: &str = "truncation";
    pub const USER: &str = "user";
    pub const METADATA: &str = "metadata";
    pub const TOOLS: &str = "tools";

    pub const CONTENT: &str = "content";
    pub const OUTPUT_CONTENT: &str = "output_content";
    pub const ROLE: &str = "role";
    pub const FINISH_REASON: &str = "finish_reason";
    pub const INDEX: &str = "index";

    pub const PROMPT_TOKENS: &str = "prompt_tokens";
    pub const COMPLETION_TOKENS: &str = "completion_tokens";
    pub const TOTAL_TOKENS: &str = "total_tokens";

    pub const FLAGGED: &str = "flagged";
    pub const MODERATION_CATEGORY_PREFIX: &str = "moderation_category:";
    pub const MODERATION_SCORE_PREFIX: &str = "moderation_score:";

    pub const TOOLCHOICE_MODE: &str = "toolchoice_mode";
    pub const TOOLCHOICE_TOOL: &str = "toolchoice_tool";
    pub const TOOLCHOICE_INDEX: &str = "toolchoice_index";
    pub const TOOLCHOICE_ARGUMENTS: &str = "toolchoice_arguments";

    pub const FILESEARCHTOOL_TYPE: &str = "filesearchtool_type";
    pub const FILESEARCHTOOL_VECTOR_STORE_IDS: &str = "filesearchtool_vector_store_ids";
    pub const FILESEARCHTOOL_FILTERS: &str = "filesearchtool_filters";
    pub const FILESEARCHTOOL_FILTER_COMPARISON: &str = "filesearchtool_filter_comparison";
    pub const FILESEARCHTOOL_FILTER_COMPOUND: &str = "filesearchtool_filter_compound";
    pub const FILESEARCHTOOL_FILTER_COMPOUND_LIST: &str = "filesearchtool_filter_compound_list";
    pub const FILESEARCHTOOL_MAX_NUM_RESULTS: &str = "filesearchtool_max_num_results";
    pub const FILESEARCHTOOL_RANKING_OPTIONS: &str = "filesearchtool_ranking_options";

    pub const WEBSEARCHTOOL_TYPE: &str = "websearchtool_type";
    pub const WEBSEARCHTOOL_CONTEXT_SIZE: &str = "websearchtool_context_size";
    pub const WEBSEARCHTOOL_LOCATION_TYPE: &str = "websearchtool_location_type";
    pub const WEBSEARCHTOOL_LOCATION_CITY: &str = "websearchtool_location_city";
    pub const WEBSEARCHTOOL_LOCATION_COUNTRY: &str = "websearchtool_location_country";
    pub const WEBSEARCHTOOL_LOCATION_REGION: &str = "websearchtool_location_region";
    pub const WEBSEARCHTOOL_LOCATION_TIMEZONE: &str = "websearchtool_location_timezone";

    pub const COMPUTERTOOL_TYPE: &str = "computertool_type";
    pub const COMPUTERTOOL_DISPLAY_HEIGHT: &str = "computertool_display_height";
    pub const COMPUTERTOOL_DISPLAY_WIDTH: &str = "computertool_display_width";
    pub const COMPUTERTOOL_ENVIRONMENT: &str = "computertool_environment";

    pub const MCPTOOL_TYPE: &str = "mcptool_type";
    pub const MCPTOOL_SERVER_LABEL: &str = "mcptool_server_label";
    pub const MCPTOOL_SERVER_URL: &str = "mcptool_server_url";
    pub const MCPTOOL_ALLOWED_TOOLS: &str = "mcptool_allowed_tools";
    pub const MCPTOOL_ALLOWED_TOOLS_FILTER: &str = "mcptool_allowed_tools_filter";
    pub const MCPTOOL_HEADERS: &str = "mcptool_headers";
    pub const MCPTOOL_REQUIRE_APPROVAL_MODE: &str = "mcptool_require_approval_mode";
    pub const MCPTOOL_REQUIRE_APPROVAL_ALWAYS: &str = "mcptool_require_approval_always";
    pub const MCPTOOL_REQUIRE_APPROVAL_NEVER: &str = "mcptool_require_approval_never";

    pub const CODEINTERPRETERTOOL_TYPE: &str = "codeinterpretertool_type";
    pub const CODEINTERPRETERTOOL_CONTAINER_ID: &str = "codeinterpretertool_container_id";
    pub const CODEINTERPRETERTOOL_CONTAINER_MAP: &str = "codeinterpretertool_container_map";

    pub const LOCALSHELLTOOL_TYPE: &str = "localshelltool_type";
    pub const LOCALSHELLTOOL_CALL_ID: &str = "localshelltool_call_id";
    pub const LOCALSHELLTOOL_COMMANDS: &str = "localshelltool_commands";
    pub const LOCALSHELLTOOL_FINISHED: &str = "localshelltool_finished";
}

/// Moderation categories extracted from a moderation result.
pub const MODERATION_CATEGORIES: &[&str] = &[
    "sexual",
    "sexual/minors",
    "harassment",
    "harassment/threatening",
    "hate",
    "hate/threatening",
    "illicit",
    "illicit/violent",
    "self-harm",
    "self-harm/intent",
    "self-harm/instructions",
    "violence",
    "violence/graphic",
];

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Double(f64),
    List(Vec<String>),
    MapList(Vec<Map<String, Value>>),
    Map(Map<String, Value>),
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<Map<String, Value>>> for AttrValue {
    fn from(v: Vec<Map<String, Value>>) -> Self {
        Self::MapList(v)
    }
}

impl From<Map<String, Value>> for AttrValue {
    fn from(v: Map<String, Value>) -> Self {
        Self::Map(v)
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// The normalized form of any backend response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    attrs: BTreeMap<String, AttrValue>,
}

impl NormalizedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a key. Returns `false` (and leaves the bag untouched) when the
    /// key already holds a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> bool {
        let key = key.into();
        if self.attrs.contains_key(&key) {
            trace!(key = %key, "Attribute already populated, ignoring");
            return false;
        }
        self.attrs.insert(key, value.into());
        true
    }

    /// Populate a key only when a value is present.
    pub fn insert_opt<V: Into<AttrValue>>(&mut self, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attrs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(AttrValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.attrs.get(key) {
            Some(AttrValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.attrs.get(key) {
            Some(AttrValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.attrs.get(key) {
            Some(AttrValue::Double(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.attrs.get(key) {
            Some(AttrValue::List(l)) => Some(l),
            _ => None,
        }
    }

    pub fn get_map(&self, key: &str) -> Option<&Map<String, Value>> {
        match self.attrs.get(key) {
            Some(AttrValue::Map(m)) => Some(m),
            _ => None,
        }
    }

    pub fn get_map_list(&self, key: &str) -> Option<&[Map<String, Value>]> {
        match self.attrs.get(key) {
            Some(AttrValue::MapList(l)) => Some(l),
            _ => None,
        }
    }

    // --- Typed views ---

    /// Displayable text: the responses-style output text, falling back to the
    /// completion message content.
    pub fn output_text(&self) -> Option<&str> {
        self.get_str(keys::OUTPUT_CONTENT)
            .or_else(|| self.get_str(keys::CONTENT))
    }

    pub fn response_id(&self) -> Option<&str> {
        self.get_str(keys::ID)
    }

    /// Shell commands carried by an embedded tool directive.
    pub fn shell_commands(&self) -> &[String] {
        self.get_list(keys::LOCALSHELLTOOL_COMMANDS).unwrap_or(&[])
    }

    pub fn shell_call_id(&self) -> Option<&str> {
        self.get_str(keys::LOCALSHELLTOOL_CALL_ID)
    }

    /// True when the model declared its command sequence finished.
    pub fn is_finished(&self) -> bool {
        self.get_bool(keys::LOCALSHELLTOOL_FINISHED).unwrap_or(false)
    }

    pub fn usage(&self) -> Usage {
        Usage {
            prompt_tokens: self.get_i64(keys::PROMPT_TOKENS),
            completion_tokens: self.get_i64(keys::COMPLETION_TOKENS),
            total_tokens: self.get_i64(keys::TOTAL_TOKENS),
        }
    }

    pub fn flagged(&self) -> Option<bool> {
        self.get_bool(keys::FLAGGED)
    }

    pub fn category(&self, name: &str) -> Option<bool> {
        self.get_bool(&format!("{}{name}", keys::MODERATION_CATEGORY_PREFIX))
    }

    pub fn category_score(&self, name: &str) -> Option<f64> {
        self.get_f64(&format!("{}{name}", keys::MODERATION_SCORE_PREFIX))
    }

    /// Copy every attribute from `other` whose key is not yet populated.
    pub fn merge_missing(&mut self, other: NormalizedResponse) {
        for (k, v) in other.attrs {
            self.attrs.entry(k).or_insert(v);
        }
    }
}
