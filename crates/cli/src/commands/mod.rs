//! Subcommand implementations.

pub mod backends;
pub mod repl;
pub mod run;
pub mod serve;

use shellpilot_config::{AppConfig, ConfigError};
use shellpilot_core::call::RequestKind;
use shellpilot_providers::EndpointTable;
use std::path::Path;

/// Load from `path`, or the default location, with environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(p) => AppConfig::load_with_env(p),
        None => AppConfig::load(),
    }
}

/// The endpoint a session calls: the configured URL, or the backend's
/// default for the configured request kind.
pub fn resolve_endpoint(config: &AppConfig, table: &EndpointTable) -> Result<String, String> {
    if let Some(endpoint) = &config.endpoint {
        return Ok(endpoint.clone());
    }
    let kind: RequestKind = config.request_kind.parse()?;
    table.default_endpoint(&config.backend, kind).ok_or_else(|| {
        format!(
            "Backend '{}' has no {kind} endpoint; set `endpoint` in the config",
            config.backend
        )
    })
}
