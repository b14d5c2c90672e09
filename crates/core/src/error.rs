//! Error types for the shellpilot domain.
//!
//! One `thiserror` enum per bounded context.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Non-2xx response from the backend.
    #[error("Unexpected response code: {status_code}, body: {body}")]
    Transport { status_code: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Missing {env_var}")]
    MissingCredential { env_var: String },

    /// The computed output-token budget was zero.
    #[error("Token budget unusable for model {model}")]
    TokenBudget { model: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Response parse failed: {0}")]
    Parse(#[from] NormalizeError),
}

impl ProviderError {
    /// Whether the control loop may retry this failure transparently.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Failures while mapping a backend payload onto a response shape.
///
/// Most fields are optional and simply stay unpopulated; only the fields a
/// shape declares mandatory produce one of these.
#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    #[error("The {shape} response is missing the mandatory '{field}' field")]
    MissingField { shape: &'static str, field: &'static str },

    #[error("Response payload is not a JSON object")]
    NotAnObject,

    #[error("Malformed response body: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
