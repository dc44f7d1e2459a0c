//! Long-term memory of facts about the user.
//!
//! # Architecture
//!
//! - [`MemoryTable`]: authoritative title → content table (source of truth)
//! - [`VectorIndex`]: derived, best-effort nearest-neighbour index
//! - [`store::MemoryStore`]: pairs the two with the write policy
//! - [`embedding::Embedder`]: text → vector via an external service
//! - [`retrieval::Retriever`]: tiered search used to ground each turn

pub mod embedding;
pub mod providers;
pub mod retrieval;
pub mod store;

pub use embedding::{Embedder, OllamaEmbedder};
pub use retrieval::{RetrievalTier, Retriever};
pub use store::{IndexOutcome, MemoryStore, Persisted, RebuildReport, Removed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single remembered fact, keyed by its normalized title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Text used for lexical matching and embedding.
    #[must_use]
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.content)
    }
}

/// Metadata stored alongside a vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub title: String,
}

/// An entry of the vector index. `id` is the memory title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: VectorMetadata,
}

impl VectorEntry {
    #[must_use]
    pub fn new(title: &str, content: &str, embedding: Vec<f32>) -> Self {
        Self {
            id: title.to_string(),
            embedding,
            document: content.to_string(),
            metadata: VectorMetadata {
                title: title.to_string(),
            },
        }
    }
}

/// A vector hit with its cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: VectorEntry,
    pub score: f32,
}

/// Errors from the authoritative table.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("Database error: {0}")]
    Database(String),

    /// The title is empty after normalization.
    #[error("Memory title must not be empty")]
    InvalidTitle,

    /// A stored row could not be decoded.
    #[error("Corrupt record '{title}': {reason}")]
    Corrupt { title: String, reason: String },
}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Authoritative key/content table.
#[async_trait]
pub trait MemoryTable: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite. `created_at` survives an overwrite.
    ///
    /// Concurrent calls for the same title must all succeed, the last one
    /// winning. Implementations that read the old record to carry
    /// `created_at` over must serialize that read with the write.
    async fn upsert(&self, title: &str, content: &str) -> Result<MemoryRecord, StoreError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, title: &str) -> Result<bool, StoreError>;

    /// All records, most recently updated first.
    async fn list_all(&self) -> Result<Vec<MemoryRecord>, StoreError>;

    async fn get(&self, title: &str) -> Result<Option<MemoryRecord>, StoreError>;
}

/// Derived nearest-neighbour index over memory embeddings.
///
/// Implementations may fail freely; callers treat every error as "index
/// unavailable" and never as a failure of the memory itself.
#[async_trait]
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    async fn upsert(&self, entry: VectorEntry) -> anyhow::Result<()>;

    async fn delete(&self, id: &str) -> anyhow::Result<()>;

    async fn count(&self) -> anyhow::Result<usize>;

    /// Up to `limit` entries ordered by descending cosine similarity. Empty
    /// when the index is.
    async fn nearest(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredEntry>>;
}

/// Normalize a memory title: trimmed, lowercased, spaces become underscores.
#[must_use]
pub fn normalize_title(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Cosine similarity, `0.0` when either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
