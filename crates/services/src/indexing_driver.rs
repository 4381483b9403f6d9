//! Indexing driver (spec §4.10): walks a folder tree, extracts + hashes +
//! embeds files that are new or changed, and upserts them into the vector
//! index. Skips files whose content hash already matches what's indexed.
//!
//! Grounded on `original_source/.../search/index_manager.py`'s "reindex"
//! batch job and the teacher's `walkdir`-based traversal style.

use crate::analyzer::FileAnalyzer;
use crate::embedder::Embedder;
use crate::vector_index::VectorIndex;
use chrono::Utc;
use persistence::Store;
use sha2::{Digest, Sha256};
use shared::types::{FileRecord, FileStatus, IndexedFileMetadata};
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct IndexingSummary {
    pub scanned: usize,
    pub indexed: usize,
    pub already_indexed: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

/// Outcome of indexing a single candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    AlreadyIndexed,
    SkippedEmpty,
}

/// First 16 hex characters of the SHA-256 of `content`; distinct from the
/// whole-file MD5 identity hash used elsewhere, since this tracks
/// extracted-text changes for re-embedding decisions (spec §4.10).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    full[..16].to_string()
}

pub struct IndexingDriver<'a> {
    analyzer: &'a FileAnalyzer,
    embedder: &'a Embedder,
    index: &'a VectorIndex,
    store: Option<&'a Store>,
}

impl<'a> IndexingDriver<'a> {
    pub fn new(analyzer: &'a FileAnalyzer, embedder: &'a Embedder, index: &'a VectorIndex) -> Self {
        Self { analyzer, embedder, index, store: None }
    }

    /// Attaches a persistence handle so indexed files get a `FileRecord`
    /// created when none exists yet (spec §4.10 step 8). Without a store,
    /// the driver only touches the vector index.
    pub fn with_store(mut self, store: &'a Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Walks `root`, re-(re)indexing any watched-extension file whose
    /// content hash doesn't match what's already stored. `recursive`
    /// controls whether subdirectories are descended into; `force` bypasses
    /// the content-hash skip; `max_size` (bytes) rejects oversized files
    /// before extraction; `dry_run` computes outcomes without writing to
    /// the vector index or persistence.
    pub fn reindex_folder(
        &self,
        root: &Path,
        recursive: bool,
        force: bool,
        dry_run: bool,
        max_size: Option<u64>,
    ) -> IndexingSummary {
        let mut summary = IndexingSummary::default();
        let mut walker = WalkDir::new(root);
        if !recursive {
            walker = walker.max_depth(1);
        }
        let indexable = self.analyzer.supported_extensions();

        for entry in walker.into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            // Spec §4.10 step 1: skip any path with a dot-hidden component,
            // relative to the walked root (the root itself may legitimately
            // live under a dot-prefixed temp/system directory).
            let relative = path.strip_prefix(root).unwrap_or(path);
            if relative.components().any(|c| c.as_os_str().to_string_lossy().starts_with('.')) {
                continue;
            }
            let ext = crate::extractor::lowercased_extension(path);
            if !indexable.contains(&ext) {
                continue;
            }
            if let Some(limit) = max_size {
                if entry.metadata().map(|m| m.len()).unwrap_or(0) > limit {
                    continue;
                }
            }

            summary.scanned += 1;
            match self.index_file(root, path, force, dry_run) {
                Ok(IndexOutcome::Indexed) => summary.indexed += 1,
                Ok(IndexOutcome::AlreadyIndexed) => summary.already_indexed += 1,
                Ok(IndexOutcome::SkippedEmpty) => summary.skipped_empty += 1,
                Err(_) => summary.failed += 1,
            }
        }

        summary
    }

    /// Indexes a single file if it isn't already indexed with a matching
    /// content hash (unless `force`). `dry_run` still runs extraction and
    /// embedding to classify the outcome but skips the upsert and the
    /// persistence write.
    pub fn index_file(&self, source_folder: &Path, path: &Path, force: bool, dry_run: bool) -> Result<IndexOutcome, String> {
        let analysis = self.analyzer.analyze(path);
        if !analysis.success {
            return Err(analysis.error_message.unwrap_or_else(|| "extraction failed".into()));
        }
        if !analysis.has_content() {
            return Ok(IndexOutcome::SkippedEmpty);
        }

        let file_id = path.display().to_string();
        let hash = content_hash(&analysis.content);

        if !force && self.index.is_indexed(&file_id, Some(&hash)).map_err(|e| e.to_string())? {
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let embedding = self.embedder.generate(&analysis.content);
        if !embedding.success {
            return Err(embedding.error_message.unwrap_or_else(|| "embedding failed".into()));
        }

        if dry_run {
            return Ok(IndexOutcome::Indexed);
        }

        let metadata = analysis.metadata.as_ref();
        let file_meta = IndexedFileMetadata {
            file_id: file_id.clone(),
            file_path: path.display().to_string(),
            filename: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            extension: crate::extractor::lowercased_extension(path),
            file_type: classify_file_type(&crate::extractor::lowercased_extension(path)),
            tags: Vec::new(),
            content_summary: analysis.content_preview.clone(),
            content_hash: hash,
            created_at: metadata.map(|m| m.created_at).unwrap_or_else(Utc::now),
            modified_at: metadata.map(|m| m.modified_at).unwrap_or_else(Utc::now),
            indexed_at: Utc::now(),
            size_bytes: metadata.map(|m| m.size_bytes).unwrap_or(0),
            source_folder: source_folder.display().to_string(),
        };

        self.index
            .upsert(&file_id, &embedding.embedding, &analysis.content, &file_meta)
            .map_err(|e| e.to_string())?;

        if let Some(store) = self.store {
            if store.get_file_by_path(&file_id).map_err(|e| e.to_string())?.is_none() {
                let record = FileRecord {
                    id: None,
                    path: file_id.clone(),
                    filename: file_meta.filename.clone(),
                    extension: file_meta.extension.clone(),
                    size_bytes: file_meta.size_bytes,
                    md5: metadata.map(|m| m.md5.clone()).unwrap_or_default(),
                    status: FileStatus::Processed,
                    embedding_ref: Some(file_id.clone()),
                    created_at: file_meta.created_at,
                    modified_at: file_meta.modified_at,
                    processed_at: Some(Utc::now()),
                };
                store.insert_file(&record).map_err(|e| e.to_string())?;
            }
        }

        Ok(IndexOutcome::Indexed)
    }
}

fn classify_file_type(extension: &str) -> String {
    match extension {
        ".pdf" | ".docx" => "document",
        ".md" | ".rst" | ".txt" => "text",
        ".py" | ".js" | ".ts" | ".rs" | ".go" | ".java" | ".c" | ".cpp" => "code",
        _ => "other",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct StubBackend;
    impl crate::embedder::EmbeddingBackend for StubBackend {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, shared::error::EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32; 4]).collect())
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn content_hash_is_stable_and_16_hex_chars() {
        let a = content_hash("hello world");
        let b = content_hash("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn reindex_indexes_new_files_and_skips_unchanged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), "hello world, this is content").unwrap();

        let analyzer = FileAnalyzer::new(10 * 1024 * 1024);
        let embedder = Embedder::with_defaults(std::sync::Arc::new(StubBackend));
        let index = VectorIndex::open_in_memory("files").unwrap();
        let driver = IndexingDriver::new(&analyzer, &embedder, &index);

        let first = driver.reindex_folder(dir.path(), true, false, false, None);
        assert_eq!(first.indexed, 1);

        let second = driver.reindex_folder(dir.path(), true, false, false, None);
        assert_eq!(second.already_indexed, 1);
        assert_eq!(second.indexed, 0);
    }

    #[test]
    fn reindex_picks_up_content_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "version one").unwrap();

        let analyzer = FileAnalyzer::new(10 * 1024 * 1024);
        let embedder = Embedder::with_defaults(std::sync::Arc::new(StubBackend));
        let index = VectorIndex::open_in_memory("files").unwrap();
        let driver = IndexingDriver::new(&analyzer, &embedder, &index);

        driver.reindex_folder(dir.path(), true, false, false, None);
        fs::write(&path, "version two, much longer content than before").unwrap();
        let second = driver.reindex_folder(dir.path(), true, false, false, None);
        assert_eq!(second.indexed, 1);
    }

    #[test]
    fn force_reindexes_even_when_unchanged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), "stable content here").unwrap();

        let analyzer = FileAnalyzer::new(10 * 1024 * 1024);
        let embedder = Embedder::with_defaults(std::sync::Arc::new(StubBackend));
        let index = VectorIndex::open_in_memory("files").unwrap();
        let driver = IndexingDriver::new(&analyzer, &embedder, &index);

        driver.reindex_folder(dir.path(), true, false, false, None);
        let forced = driver.reindex_folder(dir.path(), true, true, false, None);
        assert_eq!(forced.indexed, 1);
        assert_eq!(forced.already_indexed, 0);
    }

    #[test]
    fn dry_run_does_not_upsert() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("note.txt"), "dry run content body").unwrap();

        let analyzer = FileAnalyzer::new(10 * 1024 * 1024);
        let embedder = Embedder::with_defaults(std::sync::Arc::new(StubBackend));
        let index = VectorIndex::open_in_memory("files").unwrap();
        let driver = IndexingDriver::new(&analyzer, &embedder, &index);

        let summary = driver.reindex_folder(dir.path(), true, false, true, None);
        assert_eq!(summary.indexed, 1);
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn max_size_skips_oversized_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(100)).unwrap();

        let analyzer = FileAnalyzer::new(10 * 1024 * 1024);
        let embedder = Embedder::with_defaults(std::sync::Arc::new(StubBackend));
        let index = VectorIndex::open_in_memory("files").unwrap();
        let driver = IndexingDriver::new(&analyzer, &embedder, &index);

        let summary = driver.reindex_folder(dir.path(), true, false, false, Some(10));
        assert_eq!(summary.scanned, 0);
    }
}
