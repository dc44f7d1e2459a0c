//! Tiered memory retrieval.
//!
//! Tiers are tried in order and the first non-empty result wins:
//!
//! 1. **Semantic**: nearest neighbours of the query embedding.
//! 2. **Lexical**: records containing the most distinct query terms.
//! 3. **Recent**: the most recently updated records, regardless of relevance.
//!
//! Results are never merged across tiers, and search never fails: any
//! backend error just moves on to the next tier.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::{MemoryRecord, MemoryStore};

/// Minimum length (exclusive) of a lexical query term, in characters.
const MIN_TERM_LEN: usize = 2;

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalTier {
    Semantic,
    Lexical,
    Recent,
}

/// Tiered search over a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<MemoryStore>,
}

impl Retriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Up to `limit` memories, most relevant first.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        self.search_with_tier(query, limit).await.1
    }

    /// Like [`search`](Self::search), also reporting the tier that answered.
    pub async fn search_with_tier(
        &self,
        query: &str,
        limit: usize,
    ) -> (RetrievalTier, Vec<MemoryRecord>) {
        if limit == 0 {
            return (RetrievalTier::Recent, Vec::new());
        }

        let semantic = self.semantic(query, limit).await;
        if !semantic.is_empty() {
            debug!(tier = "semantic", hits = semantic.len(), "Memory search answered");
            return (RetrievalTier::Semantic, semantic);
        }

        // Lexical and recent tiers both scan the authoritative table.
        let records = match self.store.list_all().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Memory table unavailable for search");
                return (RetrievalTier::Recent, Vec::new());
            }
        };

        let lexical = lexical_rank(query, &records, limit);
        if !lexical.is_empty() {
            debug!(tier = "lexical", hits = lexical.len(), "Memory search answered");
            return (RetrievalTier::Lexical, lexical);
        }

        let recent: Vec<MemoryRecord> = records.into_iter().take(limit).collect();
        debug!(tier = "recent", hits = recent.len(), "Memory search answered");
        (RetrievalTier::Recent, recent)
    }

    async fn semantic(&self, query: &str, limit: usize) -> Vec<MemoryRecord> {
        let Some(query_vec) = self.store.embedder().embed(query).await else {
            return Vec::new();
        };

        // `nearest` caps hits at the index size; an empty index yields none.
        let hits = match self.store.index().nearest(&query_vec, limit).await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "Vector index unavailable");
                return Vec::new();
            }
        };

        // The index may be stale; the table decides what still exists.
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get(&hit.entry.id).await {
                Ok(Some(record)) => out.push(record),
                Ok(None) => debug!(title = %hit.entry.id, "Skipping stale vector entry"),
                Err(e) => {
                    warn!(error = %e, "Memory table unavailable for semantic hits");
                    return Vec::new();
                }
            }
        }
        out
    }
}

/// Distinct lowercase terms longer than [`MIN_TERM_LEN`] characters.
fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > MIN_TERM_LEN)
        .map(str::to_lowercase)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Score = number of distinct terms present in `title + " " + content`.
/// Ties keep the input order.
fn lexical_rank(query: &str, records: &[MemoryRecord], limit: usize) -> Vec<MemoryRecord> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &MemoryRecord)> = records
        .iter()
        .filter_map(|record| {
            let haystack = record.searchable_text().to_lowercase();
            let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            (score > 0).then_some((score, record))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, record)| record.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(title: &str, content: &str, age_secs: i64) -> MemoryRecord {
        let at = Utc::now() - Duration::seconds(age_secs);
        MemoryRecord {
            title: title.to_string(),
            content: content.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("Do I like Tea, tea or coffee?"),
            vec!["like", "tea", "coffee"]
        );
        assert!(query_terms("a is of").is_empty());
    }

    #[test]
    fn test_lexical_rank_orders_by_distinct_matches() {
        let records = vec![
            record("drink", "likes tea tea tea", 1),
            record("breakfast", "coffee and tea every morning", 2),
            record("city", "lives in Oslo", 3),
        ];
        let ranked = lexical_rank("tea or coffee", &records, 5);
        let titles: Vec<&str> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["breakfast", "drink"]);
    }

    #[test]
    fn test_lexical_rank_ties_keep_store_order() {
        let records = vec![
            record("newer", "enjoys hiking", 1),
            record("older", "went hiking once", 10),
        ];
        let ranked = lexical_rank("hiking", &records, 5);
        assert_eq!(ranked[0].title, "newer");
        assert_eq!(ranked[1].title, "older");
    }

    #[test]
    fn test_lexical_rank_matches_title() {
        let records = vec![record("favourite_colour", "green", 1)];
        assert_eq!(lexical_rank("favourite", &records, 5).len(), 1);
    }

    #[test]
    fn test_lexical_rank_respects_limit() {
        let records = vec![
            record("a", "music", 1),
            record("b", "music", 2),
            record("c", "music", 3),
        ];
        assert_eq!(lexical_rank("music", &records, 2).len(), 2);
    }
}
