//! Tool declarations, tool choice, and shell directives inside a responses payload.

use serde_json::{Map, Value};
use shellpilot_core::response::{NormalizedResponse, keys};

fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(String::from)
}

fn int_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

fn map_field(map: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    map.get(key).and_then(Value::as_object).cloned()
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}

/// Render a JSON scalar without quotes.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn an `action.command` value into shell commands.
///
/// An argv-style list (no element contains a space) is one command; a list
/// of full command lines stays a list.
pub fn collect_commands(command: &Value) -> Vec<String> {
    match command {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(scalar_text).collect();
            if parts.is_empty() {
                Vec::new()
            } else if parts.iter().any(|p| p.contains(' ')) {
                parts
            } else {
                vec![parts.join(" ")]
            }
        }
        other => vec![other.to_string()],
    }
}

/// Dispatch each declared tool by type. Unknown types are skipped.
pub fn extract_tools(tools: &[Map<String, Value>], bag: &mut NormalizedResponse) {
    for tool in tools {
        let Some(kind) = tool.get("type").and_then(Value::as_str) else {
            continue;
        };
        match kind {
            "file_search" => file_search(tool, bag),
            "web_search_preview" | "web_search_preview_2025_03_11" => web_search(tool, bag),
            "computer_use_preview" => {
                bag.insert(keys::COMPUTERTOOL_TYPE, kind);
                bag.insert_opt(keys::COMPUTERTOOL_DISPLAY_HEIGHT, int_field(tool, "display_height"));
                bag.insert_opt(keys::COMPUTERTOOL_DISPLAY_WIDTH, int_field(tool, "display_width"));
                bag.insert_opt(keys::COMPUTERTOOL_ENVIRONMENT, str_field(tool, "environment"));
            }
            "mcp" => mcp(tool, bag),
            "code_interpreter" => {
                bag.insert(keys::CODEINTERPRETERTOOL_TYPE, kind);
                match tool.get("container") {
                    Some(Value::String(id)) => {
                        bag.insert(keys::CODEINTERPRETERTOOL_CONTAINER_ID, id.as_str());
                    }
                    Some(Value::Object(map)) => {
                        bag.insert(keys::CODEINTERPRETERTOOL_CONTAINER_MAP, map.clone());
                    }
                    _ => {}
                }
            }
            "local_shell" => {
                bag.insert(keys::LOCALSHELLTOOL_TYPE, kind);
            }
            other => tracing::trace!(tool_type = %other, "Skipping unknown tool type"),
        }
    }
}

fn file_search(tool: &Map<String, Value>, bag: &mut NormalizedResponse) {
    bag.insert(keys::FILESEARCHTOOL_TYPE, "file_search");
    bag.insert_opt(
        keys::FILESEARCHTOOL_VECTOR_STORE_IDS,
        tool.get("vector_store_ids").and_then(string_list),
    );
    if let Some(filters) = map_field(tool, "filters") {
        let filter_type = filters.get("type").and_then(Value::as_str).map(String::from);
        if filters.contains_key("key") && filter_type.is_some() && filters.contains_key("value") {
            bag.insert(keys::FILESEARCHTOOL_FILTER_COMPARISON, filters.clone());
        }
        if let Some(compound @ ("and" | "or")) = filter_type.as_deref() {
            bag.insert(keys::FILESEARCHTOOL_FILTER_COMPOUND, compound);
            let nested: Vec<Map<String, Value>> = filters
                .get("filters")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
                .unwrap_or_default();
            bag.insert(keys::FILESEARCHTOOL_FILTER_COMPOUND_LIST, nested);
        }
        bag.insert(keys::FILESEARCHTOOL_FILTERS, filters);
    }
    bag.insert_opt(keys::FILESEARCHTOOL_MAX_NUM_RESULTS, int_field(tool, "max_num_results"));
    bag.insert_opt(keys::FILESEARCHTOOL_RANKING_OPTIONS, map_field(tool, "ranking_options"));
}

fn web_search(tool: &Map<String, Value>, bag: &mut NormalizedResponse) {
    bag.insert_opt(keys::WEBSEARCHTOOL_TYPE, str_field(tool, "type"));
    bag.insert_opt(keys::WEBSEARCHTOOL_CONTEXT_SIZE, str_field(tool, "search_context_size"));
    if let Some(location) = map_field(tool, "user_location") {
        bag.insert_opt(keys::WEBSEARCHTOOL_LOCATION_TYPE, str_field(&location, "type"));
        bag.insert_opt(keys::WEBSEARCHTOOL_LOCATION_CITY, str_field(&location, "city"));
        bag.insert_opt(keys::WEBSEARCHTOOL_LOCATION_COUNTRY, str_field(&location, "country"));
        bag.insert_opt(keys::WEBSEARCHTOOL_LOCATION_REGION, str_field(&location, "region"));
        bag.insert_opt(keys::WEBSEARCHTOOL_LOCATION_TIMEZONE, str_field(&location, "timezone"));
    }
}

fn mcp(tool: &Map<String, Value>, bag: &mut NormalizedResponse) {
    bag.insert(keys::MCPTOOL_TYPE, "mcp");
    bag.insert_opt(keys::MCPTOOL_SERVER_LABEL, str_field(tool, "server_label"));
    bag.insert_opt(keys::MCPTOOL_SERVER_URL, str_field(tool, "server_url"));
    match tool.get("allowed_tools") {
        Some(list @ Value::Array(_)) => {
            bag.insert_opt(keys::MCPTOOL_ALLOWED_TOOLS, string_list(list));
        }
        Some(Value::Object(filter)) => {
            bag.insert(keys::MCPTOOL_ALLOWED_TOOLS_FILTER, filter.clone());
        }
        _ => {}
    }
    bag.insert_opt(keys::MCPTOOL_HEADERS, map_field(tool, "headers"));
    match tool.get("require_approval") {
        Some(Value::String(mode)) => {
            bag.insert(keys::MCPTOOL_REQUIRE_APPROVAL_MODE, mode.as_str());
        }
        Some(Value::Object(approval)) => {
            bag.insert_opt(keys::MCPTOOL_REQUIRE_APPROVAL_ALWAYS, map_field(approval, "always"));
            bag.insert_opt(keys::MCPTOOL_REQUIRE_APPROVAL_NEVER, map_field(approval, "never"));
        }
        _ => {}
    }
}

/// `tool_choice` contributes only when it is an object.
pub fn extract_tool_choice(choice: &Value, bag: &mut NormalizedResponse) {
    let Some(choice) = choice.as_object() else {
        return;
    };
    bag.insert_opt(keys::TOOLCHOICE_MODE, str_field(choice, "mode"));
    bag.insert_opt(keys::TOOLCHOICE_TOOL, str_field(choice, "tool"));
    bag.insert_opt(keys::TOOLCHOICE_INDEX, int_field(choice, "index"));
    bag.insert_opt(keys::TOOLCHOICE_ARGUMENTS, map_field(choice, "arguments"));
}
