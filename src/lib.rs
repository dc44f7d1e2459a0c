//! Companion Memory
//!
//! A local conversational companion that remembers facts about the user
//! across conversations.
//!
//! # Architecture
//!
//! - **Server**: Axum-based HTTP server with SSE streaming
//! - **Directive interception**: incremental parser that separates the
//!   model's visible reply from embedded memory directives
//! - **Memory**: authoritative SurrealDB table plus a best-effort vector
//!   index, searched through semantic, lexical and recency tiers
//! - **LLM Orchestration**: grounds each exchange in memory and streams the
//!   reply from an Ollama chat model
//!
//! # Modules
//!
//! - [`directive`]: streaming directive interceptor
//! - [`memory`]: memory store, embeddings and retrieval
//! - [`llm`]: chat backend trait, Ollama driver and orchestrator
//! - [`normalized`]: outbound event model
//! - [`api`]: HTTP handlers

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod directive;
pub mod llm;
pub mod memory;
pub mod normalized;
pub mod server;
pub mod telemetry;

use std::sync::Arc;

use crate::config::AppConfig;
use llm::Orchestrator;
use memory::{MemoryStore, Retriever};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Orchestrator for chat exchanges.
    pub orchestrator: Arc<Orchestrator>,
    /// Memory store behind the CRUD surface.
    pub store: Arc<MemoryStore>,
    /// Tiered search for the search endpoint.
    pub retriever: Arc<Retriever>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
