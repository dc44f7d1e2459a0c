//! The memory store: authoritative table first, vector index second.
//!
//! Every mutation writes the table and fails only if that write fails. The
//! index write that follows is best-effort; its result is reported as an
//! [`IndexOutcome`] and never rolls back the table. The index is therefore
//! a lagging, possibly incomplete view that [`MemoryStore::rebuild_index`]
//! can reconstruct at any time.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    Embedder, MemoryRecord, MemoryTable, StoreError, VectorEntry, VectorIndex, normalize_title,
};

/// Result of the best-effort vector index step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The index reflects the write.
    Updated,
    /// No embedding could be produced; the index was left untouched.
    NoEmbedding,
    /// The index rejected the write.
    Failed(String),
}

/// A successful upsert.
#[derive(Debug, Clone, Serialize)]
pub struct Persisted {
    pub record: MemoryRecord,
    pub index: IndexOutcome,
}

/// A successful delete.
#[derive(Debug, Clone, Serialize)]
pub struct Removed {
    /// Whether the title existed in the table.
    pub existed: bool,
    pub index: IndexOutcome,
}

/// Summary of an index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub total: usize,
    pub indexed: usize,
    pub skipped: usize,
}

/// Memory store combining the authoritative table with the vector index.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    table: Arc<dyn MemoryTable>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryStore {
    pub fn new(
        table: Arc<dyn MemoryTable>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            table,
            index,
            embedder,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Insert or overwrite the memory under the normalized `title`.
    pub async fn upsert(&self, title: &str, content: &str) -> Result<Persisted, StoreError> {
        let title = normalize_title(title);
        if title.is_empty() {
            return Err(StoreError::InvalidTitle);
        }

        let record = self.table.upsert(&title, content).await?;
        let index = self.index_record(&record).await;

        info!(title = %record.title, index = ?index, "Memory persisted");
        Ok(Persisted { record, index })
    }

    /// Remove the memory under the normalized `title`.
    pub async fn delete(&self, title: &str) -> Result<Removed, StoreError> {
        let title = normalize_title(title);
        let existed = self.table.delete(&title).await?;

        let index = match self.index.delete(&title).await {
            Ok(()) => IndexOutcome::Updated,
            Err(e) => {
                warn!(title = %title, error = %e, "Vector index delete failed");
                IndexOutcome::Failed(e.to_string())
            }
        };

        info!(title = %title, existed, "Memory removed");
        Ok(Removed { existed, index })
    }

    /// All memories, most recently updated first.
    pub async fn list_all(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.table.list_all().await
    }

    pub async fn get(&self, title: &str) -> Result<Option<MemoryRecord>, StoreError> {
        self.table.get(&normalize_title(title)).await
    }

    /// Replay every memory through the embedder into the index.
    pub async fn rebuild_index(&self) -> Result<RebuildReport, StoreError> {
        let records = self.table.list_all().await?;
        let mut report = RebuildReport {
            total: records.len(),
            ..RebuildReport::default()
        };

        for record in &records {
            match self.index_record(record).await {
                IndexOutcome::Updated => report.indexed += 1,
                IndexOutcome::NoEmbedding | IndexOutcome::Failed(_) => report.skipped += 1,
            }
        }

        info!(
            total = report.total,
            indexed = report.indexed,
            skipped = report.skipped,
            "Vector index rebuilt"
        );
        Ok(report)
    }

    async fn index_record(&self, record: &MemoryRecord) -> IndexOutcome {
        let Some(embedding) = self.embedder.embed(&record.content).await else {
            debug!(title = %record.title, "No embedding available, index not updated");
            return IndexOutcome::NoEmbedding;
        };

        let entry = VectorEntry::new(&record.title, &record.content, embedding);
        match self.index.upsert(entry).await {
            Ok(()) => IndexOutcome::Updated,
            Err(e) => {
                warn!(title = %record.title, error = %e, "Vector index write failed");
                IndexOutcome::Failed(e.to_string())
            }
        }
    }
}
