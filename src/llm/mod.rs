//! Chat backend abstraction and the per-exchange orchestrator.
//!
//! The [`ChatBackend`] trait defines the streaming interface a chat model
//! must offer: a list of messages in, a stream of text tokens out. The
//! [`Orchestrator`] builds on top of a backend to ground each exchange in
//! long-term memory and to act on memory directives in the reply.
//!
//! # Backends
//!
//! - [`OllamaChat`]: Ollama `/api/chat` with newline-delimited JSON streaming

pub mod ollama;
pub mod orchestrator;

pub use ollama::OllamaChat;
pub use orchestrator::{ChatExchange, Orchestrator, OrchestratorSettings};

use futures::Stream;
use std::pin::Pin;

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Errors from a chat backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The backend answered the request with a non-success status.
    #[error("Chat backend returned {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned by the backend.
        detail: String,
    },

    /// The request or the response body transfer failed.
    #[error("Chat backend transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Stream of reply tokens, ending after the backend's end-of-turn.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Trait for streaming chat backends.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Start streaming a reply to `messages`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or answers with a
    /// non-success status. Once the stream is returned, later failures are
    /// reported as stream items.
    async fn stream_chat(&self, messages: Vec<Message>) -> Result<TokenStream, ChatError>;
}
