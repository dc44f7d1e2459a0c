use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::AppConfig;
use crate::llm::{OllamaChat, Orchestrator, OrchestratorSettings};
use crate::memory::{
    Embedder, MemoryStore, OllamaEmbedder, Retriever,
    embedding::DisabledEmbedder,
    providers::{SurrealMemoryTable, SurrealVectorIndex, connect},
};

/// Maximum accepted request body.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Connect to the database and the Ollama service and wire up shared state.
pub async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let db = connect(
        &config.persistence.database_url,
        &config.persistence.namespace,
        &config.persistence.database,
    )
    .await?;

    info!(
        name: "persistence.connected",
        database_url = %config.persistence.database_url,
        "Memory database connected"
    );

    let embedder: Arc<dyn Embedder> = if config.ollama.embeddings_enabled {
        Arc::new(
            OllamaEmbedder::new(&config.ollama.base_url, config.ollama.embedding_models.clone())
                .with_timeouts(config.ollama.discovery_timeout(), config.ollama.embed_timeout()),
        )
    } else {
        info!("Embeddings disabled, semantic search is off");
        Arc::new(DisabledEmbedder)
    };

    let store = Arc::new(MemoryStore::new(
        Arc::new(SurrealMemoryTable::new(db.clone())),
        Arc::new(SurrealVectorIndex::new(db)),
        embedder,
    ));
    let retriever = Arc::new(Retriever::new(Arc::clone(&store)));

    let backend = Arc::new(OllamaChat::new(
        &config.ollama.base_url,
        &config.ollama.chat_model,
        config.ollama.chat_timeout(),
    ));

    info!(
        name: "llm.config.loaded",
        base_url = %config.ollama.base_url,
        model = %backend.model(),
        "LLM configuration loaded"
    );

    let orchestrator = Arc::new(Orchestrator::new(
        backend,
        Arc::clone(&retriever),
        Arc::clone(&store),
        OrchestratorSettings {
            retrieval_limit: config.retrieval.limit,
            ..OrchestratorSettings::default()
        },
    ));

    Ok(AppState {
        orchestrator,
        store,
        retriever,
        config,
    })
}

/// Router with every route and middleware layer applied.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    api::router()
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config)).await?;
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
