use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::sse::build_sse_response;
use crate::AppState;
use crate::llm::ChatExchange;

/// POST /api/chat - Run one exchange and stream its events.
///
/// The orchestrator stream is owned by the response body, so a client
/// disconnect drops it and with it the upstream chat connection.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(exchange): Json<ChatExchange>,
) -> Response {
    if exchange.messages.is_empty() {
        return (StatusCode::BAD_REQUEST, "messages must not be empty").into_response();
    }

    tracing::info!(
        messages = exchange.messages.len(),
        has_journal = exchange.journal_context.is_some(),
        "Received chat request"
    );

    build_sse_response(state.orchestrator.chat(exchange)).into_response()
}
