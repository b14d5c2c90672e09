//! Gateway trait: the abstraction over model backends.
//!
//! A Gateway turns a [`CallDescriptor`] into a [`NormalizedResponse`], either
//! in one buffered call or as a stream of text deltas.

use async_trait::async_trait;
use tokio::sync::mpsc;
use crate::call::CallDescriptor;
use crate::error::ProviderError;
use crate::response::NormalizedResponse;

/// One item of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of output text, in arrival order.
    Delta(String),
    /// The final response, built from the last fragment with the
    /// accumulated text substituted as its content.
    Done(NormalizedResponse),
}

/// A finite, pull-based sequence of stream events.
///
/// Dropping the receiver abandons the underlying read.
pub type ResponseStream = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// A human-readable name (e.g., "http").
    fn name(&self) -> &str;

    /// Send a call and get the full normalized response.
    async fn complete_request(&self, call: &CallDescriptor) -> Result<NormalizedResponse, ProviderError>;

    /// Send a call and get a stream of events.
    ///
    /// Default implementation calls `complete_request()` and emits the output
    /// text as a single delta followed by `Done`.
    async fn stream_request(&self, call: &CallDescriptor) -> Result<ResponseStream, ProviderError> {
        let response = self.complete_request(call).await?;
        let (tx, rx) = mpsc::channel(2);
        if let Some(text) = response.output_text() {
            let _ = tx.send(Ok(StreamEvent::Delta(text.to_string()))).await;
        }
        let _ = tx.send(Ok(StreamEvent::Done(response))).await;
        Ok(rx)
    }
}

/// Pull a stream to completion, handing each delta to `on_delta`.
pub async fn drain_stream(
    mut stream: ResponseStream,
    mut on_delta: impl FnMut(&str) + Send,
) -> Result<NormalizedResponse, ProviderError> {
    while let Some(event) = stream.recv().await {
        match event? {
            StreamEvent::Delta(text) => on_delta(&text),
            StreamEvent::Done(response) => return Ok(response),
        }
    }
    Err(ProviderError::StreamInterrupted(
        "stream ended without a final response".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::RequestKind;
    use crate::response::keys;

    struct FixedGateway;

    #[async_trait]
    impl Gateway for FixedGateway {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete_request(&self, _call: &CallDescriptor) -> Result<NormalizedResponse, ProviderError> {
            let mut resp = NormalizedResponse::new();
            resp.insert(keys::CONTENT, "hi there");
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let call = CallDescriptor::builder("m", "e", RequestKind::Completion).build();
        let stream = FixedGateway.stream_request(&call).await.unwrap();
        let mut seen = String::new();
        let resp = drain_stream(stream, |d| seen.push_str(d)).await.unwrap();
        assert_eq!(seen, "hi there");
        assert_eq!(resp.output_text(), Some("hi there"));
    }

    #[tokio::test]
    async fn drain_reports_truncated_stream() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(StreamEvent::Delta("partial".into()))).await.unwrap();
        drop(tx);
        let err = drain_stream(rx, |_| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }
}
