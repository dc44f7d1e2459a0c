use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::AppState;
use crate::memory::{
    MemoryRecord, Persisted, RebuildReport, Removed, RetrievalTier, StoreError,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Debug, Deserialize)]
pub struct UpsertMemoryRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchMemoryQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub tier: RetrievalTier,
    pub memories: Vec<MemoryRecord>,
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::InvalidTitle => (StatusCode::BAD_REQUEST, e.to_string()),
        _ => {
            tracing::error!(error = %e, "Memory table operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn not_found(title: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No memory titled '{title}'"))
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let indexed = state.store.index().count().await.ok();
    Json(json!({
        "status": "ok",
        "chat_model": state.config.ollama.chat_model,
        "indexed_memories": indexed,
    }))
}

/// GET /api/memories - All memories, most recently updated first.
pub async fn list_handler(State(state): State<AppState>) -> ApiResult<Vec<MemoryRecord>> {
    state.store.list_all().await.map(Json).map_err(store_error)
}

/// GET /api/memories/{title}
pub async fn get_handler(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<MemoryRecord> {
    match state.store.get(&title).await.map_err(store_error)? {
        Some(record) => Ok(Json(record)),
        None => Err(not_found(&title)),
    }
}

/// PUT|POST /api/memories/{title} - Create or overwrite a memory.
///
/// This is also how a suggested memory gets confirmed.
pub async fn upsert_handler(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(payload): Json<UpsertMemoryRequest>,
) -> ApiResult<Persisted> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content must not be empty".into()));
    }

    state
        .store
        .upsert(&title, content)
        .await
        .map(Json)
        .map_err(store_error)
}

/// DELETE /api/memories/{title}
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Removed> {
    let removed = state.store.delete(&title).await.map_err(store_error)?;
    if removed.existed {
        Ok(Json(removed))
    } else {
        Err(not_found(&title))
    }
}

/// GET /api/search?q=&limit=
pub async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchMemoryQuery>,
) -> Json<SearchResponse> {
    let limit = query.limit.unwrap_or(state.config.retrieval.limit);
    let (tier, memories) = state.retriever.search_with_tier(&query.q, limit).await;
    Json(SearchResponse { tier, memories })
}

/// POST /api/reindex - Rebuild the vector index from the memory table.
pub async fn reindex_handler(State(state): State<AppState>) -> ApiResult<RebuildReport> {
    state.store.rebuild_index().await.map(Json).map_err(store_error)
}
