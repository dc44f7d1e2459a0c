//! Text embeddings from an Ollama-compatible service.
//!
//! Embedding capability is optional on a local install, so a missing model
//! is the common case rather than an error: [`Embedder::embed`] returns
//! `None` and callers fall back to lexical search.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Anything that can turn text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// Embed `text`, or `None` when no embedding is obtainable.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Well-known embedding models tried before anything discovered.
pub const DEFAULT_EMBEDDING_MODELS: [&str; 3] = ["nomic-embed-text", "mxbai-embed-large", "all-minilm"];

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Embedder backed by Ollama's `/api/embeddings`, with model fallback.
#[derive(Clone)]
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    preferred_models: Vec<String>,
    discovery_timeout: Duration,
    embed_timeout: Duration,
}

impl std::fmt::Debug for OllamaEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaEmbedder")
            .field("base_url", &self.base_url)
            .field("preferred_models", &self.preferred_models)
            .finish_non_exhaustive()
    }
}

impl OllamaEmbedder {
    #[must_use]
    pub fn new(base_url: impl Into<String>, preferred_models: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            preferred_models,
            discovery_timeout: Duration::from_secs(3),
            embed_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, discovery: Duration, embed: Duration) -> Self {
        self.discovery_timeout = discovery;
        self.embed_timeout = embed;
        self
    }

    /// Model names reported by `/api/tags`; empty when discovery fails.
    async fn discover_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = match self
            .http
            .get(&url)
            .timeout(self.discovery_timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "Model discovery failed");
                return Vec::new();
            }
        };

        match resp.json::<TagsResponse>().await {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                debug!(error = %e, "Model discovery returned an unexpected body");
                Vec::new()
            }
        }
    }

    /// Preferred models first, then discovered ones, each at most once.
    async fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in self.preferred_models.iter().cloned().chain(self.discover_models().await) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    async fn try_model(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let result = self
            .http
            .post(&url)
            .timeout(self.embed_timeout)
            .json(&EmbeddingRequest { model, prompt: text })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(model = %model, error = %e, "Embedding request failed");
                return None;
            }
        };

        match resp.json::<EmbeddingResponse>().await {
            Ok(body) if !body.embedding.is_empty() => Some(body.embedding),
            Ok(_) => {
                debug!(model = %model, "Model returned an empty embedding");
                None
            }
            Err(e) => {
                debug!(model = %model, error = %e, "Embedding response could not be decoded");
                None
            }
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let candidates = self.candidates().await;
        for model in &candidates {
            if let Some(embedding) = self.try_model(model, text).await {
                debug!(model = %model, dimension = embedding.len(), "Embedding generated");
                return Some(embedding);
            }
        }
        debug!(
            candidates = candidates.len(),
            "No embedding model produced a vector"
        );
        None
    }
}

/// Embedder that never produces a vector. Useful when no embedding service
/// is configured: every search then runs on the lexical tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}
