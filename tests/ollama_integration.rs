//! Integration tests for the Ollama embedding and chat clients, run against
//! a fake Ollama server bound to an ephemeral local port.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use companion_memory::llm::{ChatBackend, ChatError, Message, OllamaChat};
use companion_memory::memory::{Embedder, OllamaEmbedder};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Fake Ollama
// =============================================================================

#[derive(Clone, Default)]
struct FakeOllama {
    embedding_requests: Arc<Mutex<Vec<String>>>,
}

async fn tags() -> Json<Value> {
    Json(json!({
        "models": [
            {"name": "nomic-embed-text"},
            {"name": "custom-embed"}
        ]
    }))
}

async fn embeddings(State(fake): State<FakeOllama>, Json(body): Json<Value>) -> impl IntoResponse {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    assert!(body["prompt"].is_string());
    fake.embedding_requests.lock().unwrap().push(model.clone());

    if model == "custom-embed" {
        (StatusCode::OK, Json(json!({"embedding": [0.1, 0.2, 0.3]})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("model \"{model}\" not found")})),
        )
    }
}

async fn chat(Json(body): Json<Value>) -> impl IntoResponse {
    assert_eq!(body["stream"], json!(true));
    if body["model"] == json!("missing") {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"error":"model \"missing\" not found"}"#.to_string(),
        );
    }

    let ndjson = [
        r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
        "this line is not json",
        r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
        r#"{"message":{"role":"assistant","content":""},"done":true}"#,
        r#"{"message":{"role":"assistant","content":"ignored"},"done":false}"#,
    ]
    .join("\n");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        ndjson + "\n",
    )
}

async fn spawn_fake_ollama() -> (String, FakeOllama) {
    let fake = FakeOllama::default();
    let app = Router::new()
        .route("/api/tags", get(tags))
        .route("/api/embeddings", post(embeddings))
        .route("/api/chat", post(chat))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), fake)
}

// An address nothing listens on.
const DEAD_URL: &str = "http://127.0.0.1:1";

// =============================================================================
// Embeddings
// =============================================================================

#[tokio::test]
async fn test_embedder_falls_back_to_discovered_model() {
    let (url, fake) = spawn_fake_ollama().await;
    let embedder = OllamaEmbedder::new(
        url,
        vec!["nomic-embed-text".to_string(), "all-minilm".to_string()],
    );

    let embedding = embedder.embed("likes tea").await;
    assert_eq!(embedding, Some(vec![0.1, 0.2, 0.3]));

    // Each candidate is tried once, preferred models first
    let tried = fake.embedding_requests.lock().unwrap().clone();
    assert_eq!(tried, vec!["nomic-embed-text", "all-minilm", "custom-embed"]);
}

#[tokio::test]
async fn test_embedder_unavailable_when_service_is_down() {
    let embedder = OllamaEmbedder::new(DEAD_URL, vec!["nomic-embed-text".to_string()])
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));
    assert_eq!(embedder.embed("anything").await, None);
}

// =============================================================================
// Chat
// =============================================================================

#[tokio::test]
async fn test_chat_stream_stops_at_done() {
    let (url, _fake) = spawn_fake_ollama().await;
    let backend = OllamaChat::new(url, "llama3.2", Duration::from_secs(5));

    let stream = backend
        .stream_chat(vec![Message::user("hi")])
        .await
        .expect("stream starts");
    let tokens: Vec<String> = stream.map(|t| t.expect("token")).collect().await;

    assert_eq!(tokens, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_chat_non_success_status_carries_detail() {
    let (url, _fake) = spawn_fake_ollama().await;
    let backend = OllamaChat::new(url, "missing", Duration::from_secs(5));

    match backend.stream_chat(vec![Message::user("hi")]).await {
        Err(ChatError::Status { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "model \"missing\" not found");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected the stream to be refused"),
    }
}

#[tokio::test]
async fn test_chat_unreachable_backend_fails_at_start() {
    let backend = OllamaChat::new(DEAD_URL, "llama3.2", Duration::from_secs(2));
    assert!(matches!(
        backend.stream_chat(vec![Message::user("hi")]).await,
        Err(ChatError::Transport(_))
    ));
}
