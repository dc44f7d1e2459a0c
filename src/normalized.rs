//! Outbound event model for streamed chat exchanges.
//!
//! Each event is serialized as one JSON object per server-sent event:
//!
//! - `{"token": "..."}` for user-visible text
//! - `{"tool": "save_memory" | "suggest_memory", "title": "...", "content": "..."}`
//! - `{"error": "..."}` when the exchange could not start
//! - `{"done": true}` as the terminal event
//!
//! # Example
//!
//! ```rust
//! use companion_memory::normalized::ChatEvent;
//!
//! let event = ChatEvent::token("Hello");
//! assert_eq!(event.to_json(), r#"{"token":"Hello"}"#);
//! ```

use serde::{Deserialize, Serialize};

/// Memory tool a directive maps to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// A memory was persisted.
    SaveMemory,
    /// A memory is proposed and awaits user confirmation.
    SuggestMemory,
}

/// Events emitted to the caller of a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatEvent {
    /// Text safe to show to the user.
    Token {
        /// The text fragment to append.
        token: String,
    },

    /// A memory directive was handled.
    Tool {
        tool: ToolName,
        title: String,
        content: String,
    },

    /// The exchange failed before streaming started.
    Error {
        /// Error detail from the chat backend.
        error: String,
    },

    /// Stream has completed. Always `true`.
    Done { done: bool },
}

impl ChatEvent {
    #[must_use]
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { token: text.into() }
    }

    #[must_use]
    pub fn tool(tool: ToolName, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool,
            title: title.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    #[must_use]
    pub fn done() -> Self {
        Self::Done { done: true }
    }

    /// JSON payload of this event.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": e.to_string() }).to_string()
        })
    }
}
