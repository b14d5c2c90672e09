//! Endpoint table: maps a call's endpoint URL onto a backend adapter.
//!
//! Lookup walks the table in order and the first backend that claims the URL
//! wins. Built-in backends match exact URLs; backends declared in config
//! match by prefix.

use shellpilot_config::AppConfig;
use shellpilot_core::call::RequestKind;
use shellpilot_core::error::ProviderError;

/// How a backend frames its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// JSON payloads in the OpenAI family of shapes.
    Json,
    /// Local chat servers: the payload is `{message: {content}}` where the
    /// content is a (possibly fenced) JSON object.
    LocalChat,
}

/// One backend adapter entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    pub urls: Vec<String>,
    /// Env var holding the bearer token; `None` for unauthenticated local servers.
    pub credential_env: Option<String>,
    pub framing: Framing,
    prefix_match: bool,
}

impl Backend {
    fn builtin(name: &str, urls: &[&str], credential_env: Option<&str>, framing: Framing) -> Self {
        Self {
            name: name.into(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            credential_env: credential_env.map(String::from),
            framing,
            prefix_match: false,
        }
    }

    fn claims(&self, endpoint: &str) -> bool {
        let endpoint = endpoint.trim_end_matches('/');
        self.urls.iter().any(|u| {
            let u = u.trim_end_matches('/');
            if self.prefix_match {
                endpoint.starts_with(u)
            } else {
                endpoint == u
            }
        })
    }

    /// The URL this backend uses for a request kind, if it serves it.
    pub fn url_for(&self, kind: RequestKind) -> Option<&str> {
        let wanted = match kind {
            RequestKind::Responses => "/responses",
            RequestKind::Moderation => "/moderations",
            RequestKind::Completion => "/chat/completions",
            RequestKind::Latest => "/api/chat",
        };
        self.urls
            .iter()
            .find(|u| u.ends_with(wanted))
            .or_else(|| self.urls.first())
            .map(String::as_str)
    }
}

/// The ordered backend table.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    backends: Vec<Backend>,
}

impl EndpointTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        Self {
            backends: vec![
                Backend::builtin("llama", &["http://127.0.0.1:8080/api/chat"], None, Framing::LocalChat),
                Backend::builtin("ollama", &["http://localhost:11434/api/chat"], None, Framing::LocalChat),
                Backend::builtin(
                    "lmstudio",
                    &["http://127.0.0.1:1234/v1/chat/completions"],
                    None,
                    Framing::Json,
                ),
                Backend::builtin(
                    "openai",
                    &[
                        "https://api.openai.com/v1/chat/completions",
                        "https://api.openai.com/v1/completions",
                        "https://api.openai.com/v1/responses",
                        "https://api.openai.com/v1/moderations",
                        "https://api.openai.com/v1/models",
                    ],
                    Some("OPENAI_API_KEY"),
                    Framing::Json,
                ),
                Backend::builtin(
                    "openrouter",
                    &["https://openrouter.ai/api/v1/chat/completions"],
                    Some("OPENROUTER_API_KEY"),
                    Framing::Json,
                ),
            ],
        }
    }

    /// Built-in table followed by the backends declared in config.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut table = Self::builtin();
        for extra in &config.provider.extra_backends {
            table.backends.push(Backend {
                name: extra.name.clone(),
                urls: vec![extra.url_prefix.clone()],
                credential_env: extra.api_key_env.clone(),
                framing: Framing::Json,
                prefix_match: true,
            });
        }
        table
    }

    /// Find the backend that serves `endpoint`. First match wins.
    pub fn resolve(&self, endpoint: &str) -> Result<&Backend, ProviderError> {
        self.backends
            .iter()
            .find(|b| b.claims(endpoint))
            .ok_or_else(|| ProviderError::InvalidEndpoint(endpoint.to_string()))
    }

    pub fn by_name(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Endpoint URL for a named backend and request kind.
    pub fn default_endpoint(&self, backend: &str, kind: RequestKind) -> Option<String> {
        self.by_name(backend)
            .and_then(|b| b.url_for(kind))
            .map(String::from)
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::builtin()
    }
}
