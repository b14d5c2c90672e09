//! JSON-RPC 2.0 message types for the tool protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Used when `initialize` does not name a protocol version.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

// Standard JSON-RPC codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Server-defined: a method arrived before `initialize`.
pub const NOT_INITIALIZED: i64 = -32002;

/// An inbound request or notification.
///
/// A missing `id` marks a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn not_initialized() -> Self {
        Self::new(NOT_INITIALIZED, "Server not initialized")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

/// One outbound line. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: Value, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_id_is_notification() {
        let req: Request =
            serde_json::from_value(json!({"method": "notifications/initialized"})).unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_null());
        assert!(req.jsonrpc.is_none());
    }

    #[test]
    fn response_omits_absent_member() {
        let ok = serde_json::to_value(Response::success(json!(1), json!({}))).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["jsonrpc"], "2.0");

        let err = serde_json::to_value(Response::failure(Value::Null, RpcError::parse_error())).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["id"], Value::Null);
        assert_eq!(err["error"]["code"], -32700);
    }
}
