//! Server-sent event reading and stream assembly.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder`] splits them into `data:`
//! payloads, [`StreamAssembler`] accumulates the text deltas and builds the
//! final response from the last fragment.

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use shellpilot_core::error::ProviderError;
use shellpilot_core::gateway::StreamEvent;
use shellpilot_core::response::{NormalizedResponse, keys};
use tokio::sync::mpsc;
use tracing::trace;

use crate::normalizer::{embedded_directive, normalize};

/// One meaningful line of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Data(String),
    Done,
}

/// Incremental line splitter for `text/event-stream` bodies.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes; returns every complete line that carries data.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = Self::classify(&String::from_utf8_lossy(&raw)) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<SseLine> {
        let rest = std::mem::take(&mut self.buffer);
        Self::classify(&String::from_utf8_lossy(&rest))
    }

    fn classify(line: &str) -> Option<SseLine> {
        let line = line.trim_end_matches(['\r', '\n']);

        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();
        if data == "[DONE]" {
            Some(SseLine::Done)
        } else {
            Some(SseLine::Data(data.to_string()))
        }
    }
}

/// The text carried by one fragment: `choices[0].delta.content` for chat
/// chunks, or `delta` for responses-style output text events.
pub fn delta_text(fragment: &Value) -> Option<&str> {
    if let Some(content) = fragment
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        return Some(content);
    }
    let is_text_event = match fragment.get("type").and_then(Value::as_str) {
        Some(kind) => kind == "response.output_text.delta",
        None => true,
    };
    if is_text_event {
        fragment.get("delta").and_then(Value::as_str)
    } else {
        None
    }
}

/// Accumulates deltas and remembers the last fragment.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    text: String,
    last: Option<Value>,
}

impl StreamAssembler {
    /// Record a fragment; returns its delta text, if any.
    pub fn push(&mut self, fragment: Value) -> Option<String> {
        let delta = delta_text(&fragment)
            .filter(|d| !d.is_empty())
            .map(String::from);
        if let Some(d) = &delta {
            self.text.push_str(d);
        }
        self.last = Some(fragment);
        delta
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build the final response from the last fragment with the accumulated
    /// text as its content.
    pub fn finish(self) -> Result<NormalizedResponse, ProviderError> {
        let Some(mut last) = self.last else {
            return Err(ProviderError::StreamInterrupted(
                "stream ended before any data arrived".into(),
            ));
        };

        // Chat chunk: substitute choices[0].message.content
        if let Some(choice) = last
            .get_mut("choices")
            .and_then(Value::as_array_mut)
            .and_then(|c| c.first_mut())
            .and_then(Value::as_object_mut)
        {
            choice.remove("delta");
            let message = choice
                .entry("message")
                .or_insert_with(|| json!({ "role": "assistant" }));
            if let Some(message) = message.as_object_mut() {
                message.insert("content".into(), Value::String(self.text));
            }
            return Ok(normalize(&last)?);
        }

        // Responses event: the final event wraps the full response object
        let payload = match last.get("response") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => last,
        };
        let normalized = normalize(&payload)?;
        let mut bag = NormalizedResponse::new();
        if let Some(directive) = embedded_directive(&self.text) {
            bag.merge_missing(directive);
            bag.insert(keys::CONTENT, self.text);
        } else if !self.text.is_empty() {
            bag.insert(keys::OUTPUT_CONTENT, self.text);
        }
        bag.merge_missing(normalized);
        Ok(bag)
    }
}

/// Drive a byte stream to completion, forwarding deltas and a final
/// [`StreamEvent::Done`]. Returns early when the receiver is dropped.
pub async fn pump<S, B, E>(byte_stream: S, tx: mpsc::Sender<Result<StreamEvent, ProviderError>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut decoder = SseDecoder::default();
    let mut assembler = StreamAssembler::default();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
        };

        for line in decoder.push(bytes.as_ref()) {
            match line {
                SseLine::Done => {
                    let _ = tx.send(assembler.finish().map(StreamEvent::Done)).await;
                    return;
                }
                SseLine::Data(data) => {
                    if !forward(&mut assembler, &data, &tx).await {
                        return; // receiver dropped
                    }
                }
            }
        }
    }

    // Stream ended without [DONE]
    match decoder.finish() {
        Some(SseLine::Data(data)) => {
            if !forward(&mut assembler, &data, &tx).await {
                return;
            }
        }
        Some(SseLine::Done) | None => {}
    }
    let _ = tx.send(assembler.finish().map(StreamEvent::Done)).await;
}

async fn forward(
    assembler: &mut StreamAssembler,
    data: &str,
    tx: &mpsc::Sender<Result<StreamEvent, ProviderError>>,
) -> bool {
    match serde_json::from_str::<Value>(data) {
        Ok(fragment) => match assembler.push(fragment) {
            Some(delta) => tx.send(Ok(StreamEvent::Delta(delta))).await.is_ok(),
            None => true,
        },
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellpilot_core::gateway::drain_stream;

    fn chat_chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({"id": "chatcmpl-s", "object": "chat.completion.chunk",
                   "choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let lines = decoder.push(b":1}\r\n: keep-alive\n\nevent: ping\ndata: [DONE]\n");
        assert_eq!(
            lines,
            vec![SseLine::Data("{\"a\":1}".into()), SseLine::Done]
        );
    }

    #[test]
    fn delta_from_responses_event() {
        let event = json!({"type": "response.output_text.delta", "delta": "Hi"});
        assert_eq!(delta_text(&event), Some("Hi"));
        let other = json!({"type": "response.function_call_arguments.delta", "delta": "{"});
        assert_eq!(delta_text(&other), None);
    }

    #[tokio::test]
    async fn chunks_assemble_into_content() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(chat_chunk("Hel").into_bytes()),
            Ok(chat_chunk("lo").into_bytes()),
            Ok(b"data: not-json\n\ndata: [DONE]\n\n".to_vec()),
        ];
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(futures::stream::iter(chunks), tx));

        let mut deltas = Vec::new();
        let resp = drain_stream(rx, |d| deltas.push(d.to_string())).await.unwrap();
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(resp.output_text(), Some("Hello"));
        assert_eq!(resp.response_id(), Some("chatcmpl-s"));
    }

    #[tokio::test]
    async fn responses_events_use_completed_payload() {
        let events = [
            json!({"type": "response.output_text.delta", "delta": "Do"}),
            json!({"type": "response.output_text.delta", "delta": "ne"}),
            json!({"type": "response.completed", "response": {
                "id": "resp_s", "object": "response", "output": [],
                "metadata": {"local_shell_command_sequence_finished": true}
            }}),
        ];
        let body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(body.into_bytes())];
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(futures::stream::iter(chunks), tx));

        let resp = drain_stream(rx, |_| {}).await.unwrap();
        assert_eq!(resp.output_text(), Some("Done"));
        assert_eq!(resp.response_id(), Some("resp_s"));
        assert!(resp.is_finished());
    }

    #[tokio::test]
    async fn streamed_directive_survives_empty_final_choices() {
        let directive = json!({
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "Listing."}]},
                {"type": "local_shell_call", "call_id": "call_9", "action": {"command": ["ls", "-la"]}}
            ],
            "metadata": {"local_shell_command_sequence_finished": false}
        })
        .to_string();
        let (head, tail) = directive.split_at(directive.len() / 2);
        let usage_chunk = json!({"id": "chatcmpl-s", "object": "chat.completion.chunk",
                                 "choices": [], "usage": {"total_tokens": 12}});
        let body = format!(
            "{}{}data: {usage_chunk}\n\ndata: [DONE]\n\n",
            chat_chunk(head),
            chat_chunk(tail)
        );
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(body.into_bytes())];
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(futures::stream::iter(chunks), tx));

        let resp = drain_stream(rx, |_| {}).await.unwrap();
        assert_eq!(resp.shell_commands(), ["ls -la".to_string()]);
        assert!(!resp.is_finished());
        assert_eq!(resp.output_text(), Some("Listing."));
        assert_eq!(resp.response_id(), Some("chatcmpl-s"));
    }

    #[tokio::test]
    async fn missing_done_still_finishes() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(chat_chunk("x").into_bytes())];
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(futures::stream::iter(chunks), tx));
        let resp = drain_stream(rx, |_| {}).await.unwrap();
        assert_eq!(resp.output_text(), Some("x"));
    }

    #[tokio::test]
    async fn transport_error_interrupts() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(chat_chunk("a").into_bytes()),
            Err(std::io::Error::other("connection reset")),
        ];
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(pump(futures::stream::iter(chunks), tx));
        let err = drain_stream(rx, |_| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    #[test]
    fn empty_stream_is_interrupted() {
        assert!(StreamAssembler::default().finish().is_err());
    }
}
