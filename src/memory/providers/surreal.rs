use crate::memory::{
    MemoryRecord, MemoryTable, ScoredEntry, StoreError, VectorEntry, VectorIndex, VectorMetadata,
    cosine_similarity,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use tokio::sync::Mutex;

const MEMORY_TABLE: &str = "memories";
const VECTOR_TABLE: &str = "memory_vectors";

/// Open a SurrealDB connection (`surrealkv://path`, `mem://`, `ws://host`).
pub async fn connect(connection_string: &str, namespace: &str, database: &str) -> Result<Surreal<Any>> {
    let db = connect_any(connection_string).await?;
    db.use_ns(namespace).use_db(database).await?;
    Ok(db)
}

// Timestamps are stored as RFC3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryRow {
    title: String,
    content: String,
    created_at: String,
    updated_at: String,
}

impl MemoryRow {
    fn into_record(self) -> Result<MemoryRecord, StoreError> {
        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| StoreError::Corrupt {
                    title: self.title.clone(),
                    reason: e.to_string(),
                })
        };
        let created_at = parse(&self.created_at)?;
        let updated_at = parse(&self.updated_at)?;
        Ok(MemoryRecord {
            title: self.title,
            content: self.content,
            created_at,
            updated_at,
        })
    }
}

/// Authoritative memory table stored in SurrealDB, one record per title.
///
/// Mutations are serialized through `write_lock`, so concurrent writes to
/// one title are applied in turn and the last one wins.
#[derive(Debug, Clone)]
pub struct SurrealMemoryTable {
    db: Surreal<Any>,
    write_lock: Arc<Mutex<()>>,
}

impl SurrealMemoryTable {
    pub fn new(db: Surreal<Any>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl MemoryTable for SurrealMemoryTable {
    async fn upsert(&self, title: &str, content: &str) -> Result<MemoryRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let existing: Option<MemoryRow> = self.db.select((MEMORY_TABLE, title.to_string())).await?;
        let now = Utc::now().to_rfc3339();

        let row = MemoryRow {
            title: title.to_string(),
            content: content.to_string(),
            created_at: existing.map_or_else(|| now.clone(), |r| r.created_at),
            updated_at: now,
        };

        let saved: Option<MemoryRow> = self
            .db
            .upsert((MEMORY_TABLE, title.to_string()))
            .content(row)
            .await?;

        saved
            .ok_or_else(|| StoreError::Database(format!("upsert of '{title}' returned no record")))?
            .into_record()
    }

    async fn delete(&self, title: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let removed: Option<MemoryRow> = self.db.delete((MEMORY_TABLE, title.to_string())).await?;
        Ok(removed.is_some())
    }

    async fn list_all(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows: Vec<MemoryRow> = self.db.select(MEMORY_TABLE).await?;
        let mut records = rows
            .into_iter()
            .map(MemoryRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        records.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(records)
    }

    async fn get(&self, title: &str) -> Result<Option<MemoryRecord>, StoreError> {
        let row: Option<MemoryRow> = self.db.select((MEMORY_TABLE, title.to_string())).await?;
        row.map(MemoryRow::into_record).transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorRow {
    document: String,
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

impl From<VectorRow> for VectorEntry {
    fn from(row: VectorRow) -> Self {
        Self {
            id: row.metadata.title.clone(),
            embedding: row.embedding,
            document: row.document,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

/// Vector index kept in a separate SurrealDB table.
///
/// Similarity is computed in memory over all rows, which is fine for the
/// size of a personal memory. Writes are serialized like the memory table's.
#[derive(Debug, Clone)]
pub struct SurrealVectorIndex {
    db: Surreal<Any>,
    write_lock: Arc<Mutex<()>>,
}

impl SurrealVectorIndex {
    pub fn new(db: Surreal<Any>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl VectorIndex for SurrealVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        let row = VectorRow {
            document: entry.document,
            embedding: entry.embedding,
            metadata: entry.metadata,
        };
        let _guard = self.write_lock.lock().await;
        let _: Option<VectorRow> = self
            .db
            .upsert((VECTOR_TABLE, entry.id))
            .content(row)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _: Option<VectorRow> = self.db.delete((VECTOR_TABLE, id.to_string())).await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        // An empty table yields no group, hence no row.
        let sql = format!("SELECT count() AS count FROM {VECTOR_TABLE} GROUP ALL");
        let mut response = self.db.query(sql).await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count))
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredEntry>> {
        let rows: Vec<VectorRow> = self.db.select(VECTOR_TABLE).await?;

        let mut matches: Vec<ScoredEntry> = rows
            .into_iter()
            .map(|row| {
                let score = cosine_similarity(&row.embedding, query);
                ScoredEntry {
                    entry: row.into(),
                    score,
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);

        Ok(matches)
    }
}
