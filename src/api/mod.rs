//! HTTP handlers.
//!
//! - [`chat`]: `POST /api/chat`, streamed as server-sent events
//! - [`memory`]: memory CRUD, search and index maintenance

pub mod chat;
pub mod memory;
pub mod sse;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// All API routes, relative to the server root.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(memory::health_handler))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/memories", get(memory::list_handler))
        .route(
            "/api/memories/{title}",
            get(memory::get_handler)
                .put(memory::upsert_handler)
                .post(memory::upsert_handler)
                .delete(memory::delete_handler),
        )
        .route("/api/search", get(memory::search_handler))
        .route("/api/reindex", post(memory::reindex_handler))
}
