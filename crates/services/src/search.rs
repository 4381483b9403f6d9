//! Search engine (spec §4.4): validates the query, embeds it, pre-filters
//! in the vector store, then post-filters on fields the store can't filter
//! on directly, and finally scores relevance.
//!
//! Grounded on `original_source/.../search/search_engine.py` for the
//! validation rule and the distance-to-relevance mapping.

use crate::embedder::Embedder;
use crate::vector_index::{VectorIndex, WhereFilter};
use chrono::{DateTime, Utc};
use shared::types::IndexedFileMetadata;
use std::sync::Arc;

pub const MIN_QUERY_LENGTH: usize = 2;
pub const DEFAULT_RESULT_LIMIT: usize = 10;
const SNIPPET_MAX_CHARS: usize = 210;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query must be at least {min} characters")]
    QueryTooShort { min: usize },
    #[error(transparent)]
    Embedding(#[from] shared::error::EmbeddingError),
    #[error(transparent)]
    Index(#[from] crate::vector_index::VectorIndexError),
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub extension: Option<Vec<String>>,
    pub file_type: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub metadata: IndexedFileMetadata,
    pub snippet: String,
    pub relevance: f64,
}

pub struct SearchEngine {
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
}

impl SearchEngine {
    pub fn new(embedder: Arc<Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Rejects queries shorter than `MIN_QUERY_LENGTH` after trimming (spec
    /// §4.4), embeds the query, pre-filters equality/`in` fields in SQL,
    /// then applies the filters the store can't express (tag membership,
    /// date range) in memory before scoring and truncating to `limit`.
    pub fn search(&self, query: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<SearchResult>, SearchError> {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_LENGTH {
            return Err(SearchError::QueryTooShort { min: MIN_QUERY_LENGTH });
        }

        if self.index.count()? == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.generate(trimmed);
        if !embedding.success {
            return Ok(Vec::new());
        }

        let where_filter = WhereFilter { extension: filters.extension.clone(), file_type: filters.file_type.clone() };

        // Fetch min(2 * limit, 100) from the store (spec §4.4 step 5) so
        // post-filters (date range, tags) have enough candidates to work
        // with without unbounded over-fetch.
        let fetch_k = (limit.saturating_mul(2)).min(100).max(1);
        let raw = self.index.search(&embedding.embedding, fetch_k, &where_filter)?;

        let mut results: Vec<SearchResult> = raw
            .into_iter()
            .filter(|(meta, _, _)| passes_post_filters(meta, filters))
            .map(|(metadata, distance, snippet)| SearchResult {
                relevance: distance_to_relevance(distance),
                metadata,
                snippet: truncate_snippet(&snippet),
            })
            .collect();

        results.truncate(limit);
        Ok(results)
    }
}

fn passes_post_filters(meta: &IndexedFileMetadata, filters: &SearchFilters) -> bool {
    if let Some(tags) = &filters.tags {
        // Spec §4.4 step 6: "tag requires non-empty case-insensitive
        // intersection with metadata.tags" — any requested tag matching is
        // sufficient, not all of them.
        let meta_lower: Vec<String> = meta.tags.iter().map(|t| t.to_lowercase()).collect();
        let matches = tags.iter().any(|t| meta_lower.contains(&t.to_lowercase()));
        if !matches {
            return false;
        }
    }
    if let Some(after) = filters.modified_after {
        if meta.modified_at < after {
            return false;
        }
    }
    if let Some(before) = filters.modified_before {
        if meta.modified_at > before {
            return false;
        }
    }
    true
}

/// Truncates `text` to `SNIPPET_MAX_CHARS`, backing up to the nearest word
/// boundary and appending "..." (spec §4.4 `SearchResult.content_snippet`).
/// Short text is returned unchanged.
fn truncate_snippet(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_MAX_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
    let boundary = truncated.rfind(' ').unwrap_or(truncated.len());
    format!("{}...", &truncated[..boundary])
}

/// `clamp(1 - distance/2, 0, 1)` rounded to 3 decimals (spec §4.4): L2
/// distance in normalized embedding space ranges roughly `[0, 2]`.
fn distance_to_relevance(distance: f32) -> f64 {
    let relevance = (1.0 - distance as f64 / 2.0).clamp(0.0, 1.0);
    (relevance * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbeddingBackend;

    struct StubBackend;
    impl EmbeddingBackend for StubBackend {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, shared::error::EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn sample_meta(id: &str) -> IndexedFileMetadata {
        IndexedFileMetadata {
            file_id: id.into(),
            file_path: format!("/tmp/{id}.txt"),
            filename: format!("{id}.txt"),
            extension: ".txt".into(),
            file_type: "document".into(),
            tags: vec!["work".into()],
            content_summary: "s".into(),
            content_hash: "h".into(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
            size_bytes: 1,
            source_folder: "tmp".into(),
        }
    }

    #[test]
    fn rejects_short_queries() {
        let engine = SearchEngine::new(Arc::new(Embedder::with_defaults(Arc::new(StubBackend))), Arc::new(VectorIndex::open_in_memory("files").unwrap()));
        let result = engine.search("a", 10, &SearchFilters::default());
        assert!(matches!(result, Err(SearchError::QueryTooShort { .. })));
    }

    #[test]
    fn returns_results_scored_by_relevance() {
        let index = Arc::new(VectorIndex::open_in_memory("files").unwrap());
        index.upsert("a", &[4.0, 0.0], "snippet a", &sample_meta("a")).unwrap();
        let engine = SearchEngine::new(Arc::new(Embedder::with_defaults(Arc::new(StubBackend))), index);
        let results = engine.search("test query", 10, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].relevance >= 0.0 && results[0].relevance <= 1.0);
    }

    #[test]
    fn post_filters_by_tag_membership() {
        let index = Arc::new(VectorIndex::open_in_memory("files").unwrap());
        let mut untagged = sample_meta("b");
        untagged.tags = vec![];
        index.upsert("b", &[4.0, 0.0], "snippet b", &untagged).unwrap();
        let engine = SearchEngine::new(Arc::new(Embedder::with_defaults(Arc::new(StubBackend))), index);
        let filters = SearchFilters { tags: Some(vec!["work".into()]), ..Default::default() };
        let results = engine.search("test query", 10, &filters).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn snippet_truncates_at_word_boundary_with_ellipsis() {
        let long = "word ".repeat(100);
        let snippet = truncate_snippet(&long);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= SNIPPET_MAX_CHARS + 3);
    }

    #[test]
    fn short_snippet_is_unchanged() {
        assert_eq!(truncate_snippet("hello world"), "hello world");
    }

    #[test]
    fn distance_to_relevance_matches_clamped_formula() {
        assert_eq!(distance_to_relevance(0.0), 1.0);
        assert_eq!(distance_to_relevance(2.0), 0.0);
        assert_eq!(distance_to_relevance(1.0), 0.5);
    }
}
