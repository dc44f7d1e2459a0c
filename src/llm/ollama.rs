//! Ollama chat driver.
//!
//! This module implements the [`ChatBackend`] trait for Ollama's `/api/chat`
//! endpoint, which streams newline-delimited JSON objects of the form
//! `{"message": {"content": "<token>"}, "done": false}`.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatBackend, ChatError, Message, TokenStream};

/// One decoded line of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

/// The message part of a [`ChatChunk`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Incremental newline-delimited JSON decoder.
///
/// Network chunks can end anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    /// Append bytes and return every complete chunk they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChatChunk> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(chunk) = decode_line(&line) {
                out.push(chunk);
            }
        }
        out
    }

    /// Decode a final line that had no trailing newline.
    pub fn finish(&mut self) -> Option<ChatChunk> {
        let line = std::mem::take(&mut self.buf);
        decode_line(&line)
    }
}

fn decode_line(line: &[u8]) -> Option<ChatChunk> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<ChatChunk>(text) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::warn!(error = %e, line_length = text.len(), "Skipping malformed chat stream line");
            None
        }
    }
}

/// Driver for Ollama's streaming chat API.
#[derive(Clone)]
pub struct OllamaChat {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for OllamaChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaChat")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OllamaChat {
    /// Create a driver for `model` at `base_url`. `timeout` bounds the whole
    /// exchange, including the streamed body.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl ChatBackend for OllamaChat {
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<TokenStream, ChatError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
        };

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&raw).map_or(raw, |b| b.error);
            return Err(ChatError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let byte_stream = resp.bytes_stream();

        let out = async_stream::stream! {
            let mut decoder = NdjsonDecoder::default();
            let mut done = false;

            futures::pin_mut!(byte_stream);
            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ChatError::Transport(e));
                        return;
                    }
                };

                for parsed in decoder.push(&chunk) {
                    if let Some(message) = parsed.message {
                        if !message.content.is_empty() {
                            yield Ok(message.content);
                        }
                    }
                    if parsed.done {
                        done = true;
                        break 'read;
                    }
                }
            }

            if !done {
                if let Some(message) = decoder.finish().and_then(|c| c.message) {
                    if !message.content.is_empty() {
                        yield Ok(message.content);
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(br#"{"message":{"content":"Hel"#).is_empty());
        let chunks = decoder.push(b"lo\"},\"done\":false}\n{\"message\":{\"content\":\"!\"},\"done\":true}\n");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].message.as_ref().map(|m| m.content.as_str()), Some("Hello"));
        assert!(chunks[1].done);
    }

    #[test]
    fn test_decoder_skips_malformed_and_blank_lines() {
        let mut decoder = NdjsonDecoder::default();
        let chunks = decoder.push(b"\nnot json\n{\"done\":true}\n");
        assert_eq!(chunks, vec![ChatChunk { message: None, done: true }]);
    }

    #[test]
    fn test_decoder_keeps_multibyte_split() {
        let line = "{\"message\":{\"content\":\"caf\u{e9}\"},\"done\":false}\n".as_bytes();
        let split = line.iter().position(|&b| b >= 0x80).map_or(0, |p| p + 1);
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(&line[..split]).is_empty());
        let chunks = decoder.push(&line[split..]);
        assert_eq!(chunks[0].message.as_ref().map(|m| m.content.as_str()), Some("caf\u{e9}"));
    }

    #[test]
    fn test_decoder_finish_reads_unterminated_line() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(br#"{"message":{"content":"tail"},"done":true}"#).is_empty());
        assert!(decoder.finish().is_some_and(|c| c.done));
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![Message::user("hi")];
        let body = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "llama3.2",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true
            })
        );
    }
}
