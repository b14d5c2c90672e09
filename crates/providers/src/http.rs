//! HTTP gateway: routes a call to its backend, sends it with `reqwest`, and
//! normalizes what comes back.

use async_trait::async_trait;
use serde_json::Value;
use shellpilot_config::{AppConfig, ProviderSettings};
use shellpilot_core::call::CallDescriptor;
use shellpilot_core::error::{NormalizeError, ProviderError};
use shellpilot_core::gateway::{Gateway, ResponseStream, StreamEvent};
use shellpilot_core::response::NormalizedResponse;
use shellpilot_core::token::{HeuristicCounter, TokenCounter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::body::build_request_body;
use crate::budget::ModelInfo;
use crate::endpoints::{Backend, EndpointTable, Framing};
use crate::normalizer::{normalize, normalize_local_chat};
use crate::sse;

type CredentialLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The production [`Gateway`].
///
/// Holds only immutable state, so one instance serves concurrent calls.
pub struct HttpGateway {
    client: reqwest::Client,
    endpoints: EndpointTable,
    counter: Arc<dyn TokenCounter>,
    default_output_limit: u32,
    api_key: Option<String>,
    credentials: CredentialLookup,
}

impl HttpGateway {
    pub fn new(settings: &ProviderSettings, endpoints: EndpointTable) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoints,
            counter: Arc::new(HeuristicCounter),
            default_output_limit: settings.default_output_limit,
            api_key: None,
            credentials: Arc::new(|var| std::env::var(var).ok()),
        })
    }

    /// Build from application config: endpoint table with extra backends,
    /// transport timeouts, and the optional API key override.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut gateway = Self::new(&config.provider, EndpointTable::from_config(config))?;
        gateway.api_key = config.api_key.clone();
        Ok(gateway)
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Replace the environment lookup used for credentials.
    pub fn with_credentials(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.credentials = Arc::new(lookup);
        self
    }

    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    fn credential(&self, backend: &Backend) -> Result<Option<String>, ProviderError> {
        let Some(env_var) = &backend.credential_env else {
            return Ok(None);
        };
        self.api_key
            .clone()
            .or_else(|| (self.credentials)(env_var))
            .filter(|k| !k.trim().is_empty())
            .map(Some)
            .ok_or_else(|| ProviderError::MissingCredential {
                env_var: env_var.clone(),
            })
    }

    /// Resolve, authenticate, and send. Returns the backend and the
    /// successful response.
    async fn send(&self, call: &CallDescriptor, stream: bool) -> Result<(Framing, reqwest::Response), ProviderError> {
        let backend = self.endpoints.resolve(call.endpoint())?;
        let api_key = self.credential(backend)?;

        let info = ModelInfo::lookup(call.model(), self.default_output_limit);
        let mut body = build_request_body(call, self.counter.as_ref(), info)?;
        body["stream"] = Value::Bool(stream);

        debug!(
            backend = %backend.name,
            endpoint = %call.endpoint(),
            model = %call.model(),
            kind = %call.request_kind(),
            stream,
            "Sending request"
        );

        let mut request = self
            .client
            .post(call.endpoint())
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Backend returned error");
            return Err(ProviderError::Transport {
                status_code: status.as_u16(),
                body: error_body,
            });
        }

        Ok((backend.framing, response))
    }
}

/// Decode a buffered response body according to its backend's framing.
pub fn decode_body(framing: Framing, text: &str) -> Result<NormalizedResponse, ProviderError> {
    let value: Value = serde_json::from_str(text).map_err(|e| NormalizeError::Malformed(e.to_string()))?;
    let normalized = match framing {
        Framing::Json => normalize(&value)?,
        Framing::LocalChat => normalize_local_chat(&value)?,
    };
    Ok(normalized)
}

#[async_trait]
impl Gateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete_request(&self, call: &CallDescriptor) -> Result<NormalizedResponse, ProviderError> {
        let (framing, response) = self.send(call, false).await?;
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;
        decode_body(framing, &text)
    }

    async fn stream_request(&self, call: &CallDescriptor) -> Result<ResponseStream, ProviderError> {
        let backend = self.endpoints.resolve(call.endpoint())?;

        // Local chat servers stream NDJSON, not SSE; read those buffered
        if !call.streaming() || backend.framing == Framing::LocalChat {
            let response = self.complete_request(call).await?;
            let (tx, rx) = mpsc::channel(2);
            if let Some(text) = response.output_text() {
                let _ = tx.send(Ok(StreamEvent::Delta(text.to_string()))).await;
            }
            let _ = tx.send(Ok(StreamEvent::Done(response))).await;
            return Ok(rx);
        }

        let (_, response) = self.send(call, true).await?;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(sse::pump(response.bytes_stream(), tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellpilot_core::call::RequestKind;

    fn gateway() -> HttpGateway {
        HttpGateway::new(&ProviderSettings::default(), EndpointTable::builtin())
            .unwrap()
            .with_credentials(|_| None)
    }

    #[tokio::test]
    async fn unknown_endpoint_fails_before_sending() {
        let call = CallDescriptor::builder("gpt-4.1", "https://nowhere.invalid/v1", RequestKind::Completion).build();
        let err = gateway().complete_request(&call).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn missing_key_names_the_variable() {
        let call = CallDescriptor::builder(
            "gpt-4.1",
            "https://api.openai.com/v1/responses",
            RequestKind::Responses,
        )
        .content("hi")
        .build();
        let err = gateway().complete_request(&call).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing OPENAI_API_KEY");
    }

    #[test]
    fn config_key_overrides_environment() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-config".into());
        let gw = HttpGateway::from_config(&config).unwrap().with_credentials(|_| None);
        let backend = gw.endpoints().resolve("https://openrouter.ai/api/v1/chat/completions").unwrap();
        assert_eq!(gw.credential(backend).unwrap().as_deref(), Some("sk-config"));
    }

    #[test]
    fn local_backends_need_no_key() {
        let gw = gateway();
        let backend = gw.endpoints().resolve("http://localhost:11434/api/chat").unwrap();
        assert_eq!(gw.credential(backend).unwrap(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_body(Framing::Json, "<html>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(NormalizeError::Malformed(_))));
    }
}
