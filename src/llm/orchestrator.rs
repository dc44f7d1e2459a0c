//! Session orchestrator for one chat exchange.
//!
//! The orchestrator manages the complete lifecycle of an exchange:
//! 1. Grounding: retrieve memories relevant to the latest user message and
//!    build a system preamble from them
//! 2. Streaming: send the history to the chat backend and run every token
//!    through a [`DirectiveInterceptor`]
//! 3. Apply directive side effects (persist saves, surface suggestions)
//! 4. Completion: drain the interceptor and emit `done`
//!
//! If the backend refuses the request, a single `error` event is emitted
//! instead and the exchange ends.
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::new(backend, retriever, store, OrchestratorSettings::default());
//! let stream = orchestrator.chat(ChatExchange {
//!     messages: vec![Message::user("I just adopted a cat!")],
//!     journal_context: None,
//! });
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::directive::{DirectiveInterceptor, DirectiveKind, DirectiveRecord, InterceptEvent};
use crate::memory::{MemoryRecord, MemoryStore, Retriever};
use crate::normalized::{ChatEvent, ToolName};

use super::{ChatBackend, Message, MessageRole};

/// Base instructions sent ahead of every conversation.
pub const BASE_INSTRUCTIONS: &str = "You are a warm, attentive companion who remembers what the user \
tells you about themselves.\n\
When the user shares a lasting fact about themselves that they clearly want remembered, save it \
by writing <<<SAVE_MEMORY:short_title|the fact>>> anywhere in your reply.\n\
When a fact might be worth remembering but you are not sure, propose it by writing \
<<<SUGGEST_MEMORY:short_title|the fact>>> instead; the user will decide.\n\
Titles are a few words, the fact is one sentence. These markers are hidden from the user, so \
never mention them and always answer the user naturally as well.";

/// Tunables for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Fixed instruction block at the top of the system preamble.
    pub base_instructions: String,
    /// Number of memories injected per exchange.
    pub retrieval_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            base_instructions: BASE_INSTRUCTIONS.to_string(),
            retrieval_limit: 5,
        }
    }
}

/// Input for one exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatExchange {
    /// Full conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Optional external text to ground the reply in (e.g. a journal excerpt).
    #[serde(default)]
    pub journal_context: Option<String>,
}

/// Composes retrieval, the chat backend, and the directive interceptor.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    retriever: Arc<Retriever>,
    store: Arc<MemoryStore>,
    settings: OrchestratorSettings,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend)
            .field("retrieval_limit", &self.settings.retrieval_limit)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        retriever: Arc<Retriever>,
        store: Arc<MemoryStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            backend,
            retriever,
            store,
            settings,
        }
    }

    /// Build the system preamble from retrieved memories and journal text.
    #[must_use]
    pub fn build_preamble(&self, memories: &[MemoryRecord], journal_context: Option<&str>) -> String {
        let mut preamble = self.settings.base_instructions.clone();

        if !memories.is_empty() {
            preamble.push_str("\n\nWhat you remember about the user:\n");
            for m in memories {
                preamble.push_str(&format!("{}: {}\n", m.title, m.content));
            }
        }

        if let Some(journal) = journal_context.map(str::trim).filter(|j| !j.is_empty()) {
            preamble.push_str("\n\nFrom the user's journal:\n");
            preamble.push_str(journal);
            preamble.push('\n');
        }

        preamble
    }

    /// Run one exchange, yielding outbound events in order.
    ///
    /// Dropping the returned stream stops reading from the backend and
    /// releases its connection.
    pub fn chat(&self, exchange: ChatExchange) -> impl Stream<Item = ChatEvent> + Send + 'static {
        let orchestrator = self.clone();
        let request_id = Uuid::new_v4().to_string();

        async_stream::stream! {
            // Grounding
            let query = exchange
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();

            let memories = orchestrator
                .retriever
                .search(&query, orchestrator.settings.retrieval_limit)
                .await;

            tracing::info!(
                request_id = %request_id,
                message_count = exchange.messages.len(),
                memories = memories.len(),
                has_journal = exchange.journal_context.is_some(),
                "Grounding complete"
            );

            let preamble = orchestrator.build_preamble(&memories, exchange.journal_context.as_deref());
            let mut messages = Vec::with_capacity(exchange.messages.len() + 1);
            messages.push(Message::system(preamble));
            messages.extend(exchange.messages);

            // Streaming
            let tokens = match orchestrator.backend.stream_chat(messages).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Chat backend refused the exchange"
                    );
                    yield ChatEvent::error(e.to_string());
                    return;
                }
            };

            let mut interceptor = DirectiveInterceptor::new();
            let mut token_count = 0usize;

            futures::pin_mut!(tokens);
            while let Some(token) = tokens.next().await {
                let token = match token {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(
                            request_id = %request_id,
                            error = %e,
                            "Chat stream interrupted, ending turn"
                        );
                        break;
                    }
                };
                token_count += 1;

                for event in interceptor.push(&token) {
                    if let Some(out) = orchestrator.apply(event, &request_id).await {
                        yield out;
                    }
                }
            }

            // Completed
            for event in interceptor.finish() {
                if let Some(out) = orchestrator.apply(event, &request_id).await {
                    yield out;
                }
            }

            tracing::info!(request_id = %request_id, tokens = token_count, "Exchange complete");
            yield ChatEvent::done();
        }
    }

    /// Turn an interceptor event into an outbound event, running side effects.
    async fn apply(&self, event: InterceptEvent, request_id: &str) -> Option<ChatEvent> {
        match event {
            InterceptEvent::Passthrough(text) => Some(ChatEvent::token(text)),
            InterceptEvent::Directive(DirectiveRecord {
                kind: DirectiveKind::Save,
                title,
                content,
            }) => match self.store.upsert(&title, &content).await {
                Ok(persisted) => {
                    tracing::info!(
                        request_id = %request_id,
                        title = %persisted.record.title,
                        "Saved memory from directive"
                    );
                    Some(ChatEvent::tool(
                        ToolName::SaveMemory,
                        persisted.record.title,
                        persisted.record.content,
                    ))
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        title = %title,
                        error = %e,
                        "Failed to persist memory directive"
                    );
                    None
                }
            },
            InterceptEvent::Directive(DirectiveRecord {
                kind: DirectiveKind::Suggest,
                title,
                content,
            }) => {
                tracing::info!(request_id = %request_id, title = %title, "Memory suggested");
                Some(ChatEvent::tool(ToolName::SuggestMemory, title, content))
            }
        }
    }
}
