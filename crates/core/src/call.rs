//! Call descriptors: the provider-agnostic description of one outbound request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which request body family a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Chat-completion style: system + user messages.
    Completion,
    /// "Responses" style: `input` array plus `instructions`.
    Responses,
    /// Flat `{model, input, metadata}` moderation body.
    Moderation,
    /// Local chat server returning a fenced JSON object.
    Latest,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Responses => "responses",
            Self::Moderation => "moderation",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completion" | "completions" => Ok(Self::Completion),
            "responses" | "response" => Ok(Self::Responses),
            "moderation" | "moderations" => Ok(Self::Moderation),
            "latest" => Ok(Self::Latest),
            other => Err(format!("unknown request kind '{other}'")),
        }
    }
}

/// An immutable description of a single model call.
///
/// Built once per request through [`CallDescriptor::builder`] and never
/// mutated afterwards; only accessors are exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    instructions: String,
    content: String,
    previous_response_id: Option<String>,
    model: String,
    request_kind: RequestKind,
    endpoint: String,
    streaming: bool,
}

impl CallDescriptor {
    pub fn builder(
        model: impl Into<String>,
        endpoint: impl Into<String>,
        request_kind: RequestKind,
    ) -> CallDescriptorBuilder {
        CallDescriptorBuilder {
            inner: CallDescriptor {
                instructions: String::new(),
                content: String::new(),
                previous_response_id: None,
                model: model.into(),
                request_kind,
                endpoint: endpoint.into(),
                streaming: false,
            },
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_kind(&self) -> RequestKind {
        self.request_kind
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }
}

/// Builder for [`CallDescriptor`]. Consumed by [`CallDescriptorBuilder::build`].
#[derive(Debug, Clone)]
pub struct CallDescriptorBuilder {
    inner: CallDescriptor,
}

impl CallDescriptorBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.inner.instructions = instructions.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.inner.content = content.into();
        self
    }

    /// Blank ids are treated as absent.
    pub fn previous_response_id(mut self, id: Option<impl Into<String>>) -> Self {
        self.inner.previous_response_id = id.map(Into::into).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.inner.streaming = streaming;
        self
    }

    pub fn build(self) -> CallDescriptor {
        self.inner
    }
}
