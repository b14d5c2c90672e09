//! Configuration loading, validation, and management for shellpilot.
//!
//! Loads configuration from `~/.shellpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.shellpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Explicit API key; when absent the backend's env var is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend name from the endpoint table (llama, openai, openrouter, ...)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model identifier sent in every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint URL; when absent it is derived from `backend` + `request_kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Request body family: completion, responses, moderation, latest
    #[serde(default = "default_request_kind")]
    pub request_kind: String,

    /// System instructions sent with every call
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Use the streaming transport
    #[serde(default)]
    pub streaming: bool,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub shell: ShellConfig,
}

fn default_backend() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_request_kind() -> String {
    "responses".into()
}
fn default_instructions() -> String {
    "You are a command-line agent. Propose shell commands to accomplish the user's task, \
     one step at a time, and set local_shell_command_sequence_finished when done."
        .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("request_kind", &self.request_kind)
            .field("instructions", &self.instructions)
            .field("streaming", &self.streaming)
            .field("provider", &self.provider)
            .field("session", &self.session)
            .field("context", &self.context)
            .field("shell", &self.shell)
            .finish()
    }
}

/// Transport settings for the provider gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Output limit for models missing from the lookup table
    #[serde(default = "default_output_limit")]
    pub default_output_limit: u32,

    /// Additional backends matched by URL prefix
    #[serde(default)]
    pub extra_backends: Vec<ExtraBackend>,
}

fn default_request_timeout() -> u64 {
    600
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_output_limit() -> u32 {
    4096
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            default_output_limit: default_output_limit(),
            extra_backends: Vec::new(),
        }
    }
}

/// A user-declared backend (e.g. a self-hosted OpenAI-compatible server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraBackend {
    pub name: String,
    pub url_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Approval mode for proposed shell commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    FullAuto,
    ApproveAll,
    ApproveDestructive,
}

impl std::str::FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full_auto" => Ok(Self::FullAuto),
            "approve_all" | "edit_approve_all" => Ok(Self::ApproveAll),
            "approve_destructive" | "edit_approve_destructive" => Ok(Self::ApproveDestructive),
            other => Err(ConfigError::ValidationError(format!(
                "unknown approval mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_approval")]
    pub approval: ApprovalMode,

    /// Substrings that mark a command as destructive
    #[serde(default = "default_dangerous_tokens")]
    pub dangerous_tokens: Vec<String>,

    /// Wall-clock budget for one session
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// Deadline after which an outstanding gateway call is retried
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_approval() -> ApprovalMode {
    ApprovalMode::ApproveDestructive
}
fn default_dangerous_tokens() -> Vec<String> {
    ["rm", "mv", "git", "patch", "shutdown", "reboot"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_call_timeout() -> u64 {
    600
}
fn default_max_iterations() -> u32 {
    200
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            approval: default_approval(),
            dangerous_tokens: default_dangerous_tokens(),
            timeout_secs: default_session_timeout(),
            call_timeout_secs: default_call_timeout(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    3200
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell used to run commands (`<shell> -c <cmd>`)
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_command_timeout")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_max_stdout_lines")]
    pub max_stdout_lines: usize,
}

fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".into())
}
fn default_command_timeout() -> u64 {
    30
}
fn default_max_stdout_lines() -> usize {
    1000
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            default_timeout_secs: default_command_timeout(),
            max_stdout_lines: default_max_stdout_lines(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.shellpilot/config.toml).
    ///
    /// Environment overrides, applied after the file:
    /// - `SHELLPILOT_BACKEND`, or the legacy `REPL_RESPONSE_SOURCE`
    ///   (`llama` → completion, `openai` → responses)
    /// - `SHELLPILOT_MODEL`
    /// - `SHELLPILOT_ENDPOINT`
    /// - `SHELLPILOT_APPROVAL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(source) = lookup("REPL_RESPONSE_SOURCE") {
            match source.as_str() {
                "llama" => {
                    self.backend = "llama".into();
                    self.request_kind = "completion".into();
                }
                "openai" => {
                    self.backend = "openai".into();
                    self.request_kind = "responses".into();
                }
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Unknown model for response source of type: {other}"
                    )));
                }
            }
        }
        if let Some(backend) = lookup("SHELLPILOT_BACKEND") {
            self.backend = backend;
        }
        if let Some(model) = lookup("SHELLPILOT_MODEL") {
            self.model = model;
        }
        if let Some(endpoint) = lookup("SHELLPILOT_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(mode) = lookup("SHELLPILOT_APPROVAL") {
            self.session.approval = mode.parse()?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".shellpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if self.context.max_entries < 2 {
            return Err(ConfigError::ValidationError(
                "context.max_entries must be at least 2".into(),
            ));
        }
        if self.session.timeout_secs == 0 || self.session.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session timeouts must be greater than zero".into(),
            ));
        }
        if self.session.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_iterations must be greater than zero".into(),
            ));
        }
        if self.provider.request_timeout_secs == 0 || self.provider.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider timeouts must be greater than zero".into(),
            ));
        }
        if self.shell.max_stdout_lines == 0 {
            return Err(ConfigError::ValidationError(
                "shell.max_stdout_lines must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: default_backend(),
            model: default_model(),
            endpoint: None,
            request_kind: default_request_kind(),
            instructions: default_instructions(),
            streaming: false,
            provider: ProviderSettings::default(),
            session: SessionConfig::default(),
            context: ContextConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
