//! Integration tests for the HTTP surface: memory CRUD, search and the
//! streamed chat endpoint.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use companion_memory::AppState;
use companion_memory::config::{
    AppConfig, OllamaConfig, PersistenceConfig, RetrievalConfig, ServerConfig,
};
use companion_memory::llm::{
    ChatBackend, ChatError, Message, Orchestrator, OrchestratorSettings, TokenStream,
};
use companion_memory::memory::{
    MemoryRecord, MemoryStore, Retriever,
    embedding::DisabledEmbedder,
    providers::{SurrealMemoryTable, SurrealVectorIndex, connect},
};
use companion_memory::normalized::{ChatEvent, ToolName};
use companion_memory::server::build_router;
use serde_json::{Value, json};
use std::sync::Arc;

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Debug)]
struct CannedBackend(Vec<&'static str>);

#[async_trait]
impl ChatBackend for CannedBackend {
    async fn stream_chat(&self, _messages: Vec<Message>) -> Result<TokenStream, ChatError> {
        let items: Vec<Result<String, ChatError>> =
            self.0.iter().map(|t| Ok((*t).to_string())).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".into(),
            cors_permissive: true,
        },
        ollama: OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            chat_model: "test-model".into(),
            embedding_models: Vec::new(),
            embeddings_enabled: false,
            discovery_timeout_secs: 1,
            embed_timeout_secs: 1,
            chat_timeout_secs: 5,
        },
        persistence: PersistenceConfig {
            database_url: "mem://".into(),
            namespace: "test".into(),
            database: "memory".into(),
        },
        retrieval: RetrievalConfig { limit: 5 },
    }
}

async fn setup_server(tokens: Vec<&'static str>) -> (TestServer, Arc<MemoryStore>) {
    let db = connect("mem://", "test", "memory").await.expect("in-memory db");
    let store = Arc::new(MemoryStore::new(
        Arc::new(SurrealMemoryTable::new(db.clone())),
        Arc::new(SurrealVectorIndex::new(db)),
        Arc::new(DisabledEmbedder),
    ));
    let retriever = Arc::new(Retriever::new(store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(CannedBackend(tokens)),
        retriever.clone(),
        store.clone(),
        OrchestratorSettings::default(),
    ));

    let state = AppState {
        orchestrator,
        store: store.clone(),
        retriever,
        config: Arc::new(test_config()),
    };

    let server = TestServer::new(build_router(state)).expect("test server");
    (server, store)
}

/// Decode every `data:` frame of an SSE body.
fn sse_events(body: &str) -> Vec<ChatEvent> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).expect("event json"))
        .collect()
}

// =============================================================================
// Memory CRUD
// =============================================================================

#[tokio::test]
async fn test_memory_crud_lifecycle() {
    let (server, _store) = setup_server(vec![]).await;

    let created = server
        .put("/api/memories/Favourite%20Drink")
        .json(&json!({"content": "Likes tea"}))
        .await;
    created.assert_status_ok();
    let body: Value = created.json();
    assert_eq!(body["record"]["title"], "favourite_drink");
    assert_eq!(body["index"]["status"], "no_embedding");

    let fetched = server.get("/api/memories/favourite_drink").await;
    fetched.assert_status_ok();
    assert_eq!(fetched.json::<MemoryRecord>().content, "Likes tea");

    server
        .post("/api/memories/favourite_drink")
        .json(&json!({"content": "Likes coffee"}))
        .await
        .assert_status_ok();

    let all: Vec<MemoryRecord> = server.get("/api/memories").await.json();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "Likes coffee");

    server
        .delete("/api/memories/favourite_drink")
        .await
        .assert_status_ok();
    server
        .get("/api/memories/favourite_drink")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .delete("/api/memories/favourite_drink")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_rejects_empty_content() {
    let (server, store) = setup_server(vec![]).await;

    server
        .put("/api/memories/pet")
        .json(&json!({"content": "   "}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_reports_tier() {
    let (server, store) = setup_server(vec![]).await;
    store.upsert("city", "Lives in Oslo").await.unwrap();
    store.upsert("pet", "Has a cat").await.unwrap();

    let body: Value = server
        .get("/api/search")
        .add_query_param("q", "weather in oslo")
        .await
        .json();
    assert_eq!(body["tier"], "lexical");
    assert_eq!(body["memories"][0]["title"], "city");
    assert_eq!(body["memories"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_reindex_reports_skipped_without_embeddings() {
    let (server, store) = setup_server(vec![]).await;
    store.upsert("city", "Lives in Oslo").await.unwrap();

    let body: Value = server.post("/api/reindex").await.json();
    assert_eq!(body, json!({"total": 1, "indexed": 0, "skipped": 1}));
}

#[tokio::test]
async fn test_health() {
    let (server, _store) = setup_server(vec![]).await;
    let body: Value = server.get("/api/health").await.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["chat_model"], "test-model");
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_streams_events_as_sse() {
    let (server, store) = setup_server(vec![
        "Hi! <<<SAVE_MEMORY:foo_bar|User",
        " likes tea.>>> Got it.",
    ])
    .await;

    let response = server
        .post("/api/chat")
        .json(&json!({"messages": [{"role": "user", "content": "I like tea"}]}))
        .await;
    response.assert_status_ok();

    let events = sse_events(&response.text());
    assert_eq!(
        events,
        vec![
            ChatEvent::token("Hi! "),
            ChatEvent::tool(ToolName::SaveMemory, "foo_bar", "User likes tea."),
            ChatEvent::token(" Got it."),
            ChatEvent::done(),
        ]
    );
    assert!(store.get("foo_bar").await.unwrap().is_some());
}

#[tokio::test]
async fn test_chat_rejects_empty_history() {
    let (server, _store) = setup_server(vec!["unused"]).await;
    server
        .post("/api/chat")
        .json(&json!({"messages": []}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
