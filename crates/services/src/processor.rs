//! File processor (spec §4.11): the per-file pipeline state machine —
//! received -> analyzed -> classified -> awaiting_decision -> {moved |
//! skipped | errored}. Single-threaded, serial; the watcher and CLI both
//! funnel individual files through one `Processor`.
//!
//! Grounded on `original_source/.../processor/pipeline.py`'s stage
//! sequencing and the confidence-threshold auto-accept rule.

use crate::analyzer::FileAnalyzer;
use crate::classifier::{build_prompt, Classifier};
use crate::embedder::Embedder;
use crate::folder_scanner::{render_prompt_context, FolderScanner};
use crate::llm_client::OllamaClient;
use crate::mover::Mover;
use crate::vector_index::VectorIndex;
use parking_lot::Mutex;
use persistence::Store;
use shared::config::AppConfig;
use shared::types::{Decision, FileRecord, FileStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStage {
    Received,
    Analyzed,
    Classified,
    AwaitingDecision,
    Moved,
    Skipped,
    Errored,
}

#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub file_id: i64,
    pub stage: ProcessingStage,
    pub destination: Option<PathBuf>,
    pub message: Option<String>,
}

pub struct Processor {
    store: Arc<Store>,
    analyzer: Arc<FileAnalyzer>,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    llm: Arc<OllamaClient>,
    config: Arc<AppConfig>,
    /// Folder-scan context, memoized on the first file a session processes
    /// (spec §4.11 step 2) rather than recomputed per file.
    folder_context: Mutex<Option<String>>,
}

impl Processor {
    pub fn new(
        store: Arc<Store>,
        analyzer: Arc<FileAnalyzer>,
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        llm: Arc<OllamaClient>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { store, analyzer, embedder, index, llm, config, folder_context: Mutex::new(None) }
    }

    /// Runs the full pipeline for a single file: analyze, embed/index,
    /// classify, and either auto-accept (confidence at/above the high
    /// threshold) or park as `awaiting_decision` for the operator (spec
    /// §4.11). Never panics: every failure mode maps to `Errored` with a
    /// message so a batch keeps moving.
    pub async fn process(&self, path: &Path) -> ProcessingOutcome {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let file_id = match self.ensure_file_record(&canonical) {
            Ok(id) => id,
            Err(e) => return ProcessingOutcome { file_id: -1, stage: ProcessingStage::Errored, destination: None, message: Some(e) },
        };

        let analysis = self.analyzer.analyze(&canonical);
        if !analysis.success {
            let _ = self.store.update_file_status(file_id, FileStatus::Error, None);
            return ProcessingOutcome {
                file_id,
                stage: ProcessingStage::Errored,
                destination: None,
                message: analysis.error_message,
            };
        }

        let embedding = self.embedder.generate(&analysis.content);
        if embedding.success {
            if let Some(metadata) = &analysis.metadata {
                let index_meta = shared::types::IndexedFileMetadata {
                    file_id: canonical.display().to_string(),
                    file_path: canonical.display().to_string(),
                    filename: metadata.filename.clone(),
                    extension: metadata.extension.clone(),
                    file_type: "document".to_string(),
                    tags: Vec::new(),
                    content_summary: analysis.content_preview.clone(),
                    content_hash: crate::indexing_driver::content_hash(&analysis.content),
                    created_at: metadata.created_at,
                    modified_at: metadata.modified_at,
                    indexed_at: chrono::Utc::now(),
                    size_bytes: metadata.size_bytes,
                    source_folder: canonical.parent().map(|p| p.display().to_string()).unwrap_or_default(),
                };
                let _ = self.index.upsert(&canonical.display().to_string(), &embedding.embedding, &analysis.content, &index_meta);
                let _ = self.store.set_embedding_ref(file_id, &canonical.display().to_string());
            }
        }

        let folder_context = self.folder_context();
        let metadata = analysis.metadata.as_ref().expect("analysis.success guarantees metadata");
        let prompt = build_prompt(metadata, &analysis.content, &folder_context, &[]);

        // A transport failure (retries exhausted) or an unparsable reply both
        // degrade to a zero-confidence "Unsorted" classification (spec §4.6,
        // §7: LlmTransportError/LlmParseError never abort the pipeline) —
        // the operator still gets a decision screen rather than an error.
        let classification = match self.llm.generate(&prompt).await {
            Ok(reply) => Classifier::parse_reply(file_id, &reply),
            Err(_) => Classifier::parse_reply(file_id, ""),
        };

        let classification_id = match self.store.insert_classification(&classification) {
            Ok(id) => id,
            Err(e) => return ProcessingOutcome { file_id, stage: ProcessingStage::Errored, destination: None, message: Some(e.to_string()) },
        };

        // Always parks for a decision here, whatever the confidence: spec §1
        // Non-goals forbid automatic moves without operator confirmation in
        // interactive mode, and §4.11 step 4 puts the accept/edit/skip and
        // always-accept behavior in the caller (operator vs non-interactive
        // driver), not in the pipeline itself.
        ProcessingOutcome { file_id, stage: ProcessingStage::AwaitingDecision, destination: None, message: None }
    }

    /// Called after the pipeline parks on `awaiting_decision` and an
    /// operator (or the auto-accept rule) supplies a final destination.
    /// `decision` must be `Accepted` or `Modified` (spec §4.11 step 5: an
    /// edited destination is recorded as `Modified`, an as-suggested one as
    /// `Accepted`).
    pub fn finalize(&self, file_id: i64, classification_id: i64, decision: Decision, destination: &str, source: &Path) -> ProcessingOutcome {
        let dest_root = self.organized_base_path().join(destination);
        let mover = Mover::new(&self.store);
        match mover.move_file(file_id, source, &dest_root) {
            Ok(target) => {
                let _ = self.store.finalize_processing(
                    file_id,
                    classification_id,
                    decision,
                    Some(destination),
                    None,
                    FileStatus::Processed,
                );
                ProcessingOutcome { file_id, stage: ProcessingStage::Moved, destination: Some(target), message: None }
            }
            Err(e) => {
                let _ = self.store.update_file_status(file_id, FileStatus::Error, None);
                ProcessingOutcome { file_id, stage: ProcessingStage::Errored, destination: None, message: Some(e.to_string()) }
            }
        }
    }

    fn organized_base_path(&self) -> PathBuf {
        self.config.organized_base_path.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Scans the configured context folders on first use and caches the
    /// rendered tree for the lifetime of this processor (spec §4.11 step 2).
    fn folder_context(&self) -> String {
        let mut cached = self.folder_context.lock();
        if let Some(context) = cached.as_ref() {
            return context.clone();
        }
        let scanner = FolderScanner::new(self.config.folder_scan_depth);
        let mut rendered = String::new();
        for root in self.config.context_folders() {
            let tree = scanner.scan(&root);
            // spec §4.6: "a bulleted list of up to 100 existing destination paths".
            rendered.push_str(&render_prompt_context(&tree, 100));
            rendered.push('\n');
        }
        *cached = Some(rendered.clone());
        rendered
    }

    fn ensure_file_record(&self, path: &Path) -> Result<i64, String> {
        let path_str = path.display().to_string();
        if let Some(existing) = self.store.get_file_by_path(&path_str).map_err(|e| e.to_string())? {
            return Ok(existing.id.expect("persisted file always has an id"));
        }

        let metadata = crate::analyzer::extract_metadata(path).map_err(|e| e.to_string())?;
        let record = FileRecord {
            id: None,
            path: path_str,
            filename: metadata.filename,
            extension: metadata.extension,
            size_bytes: metadata.size_bytes,
            md5: metadata.md5,
            status: FileStatus::Processing,
            embedding_ref: None,
            created_at: metadata.created_at,
            modified_at: metadata.modified_at,
            processed_at: None,
        };
        self.store.insert_file(&record).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_transitions_are_distinct_variants() {
        assert_ne!(ProcessingStage::Received, ProcessingStage::Moved);
        assert_eq!(ProcessingStage::Errored, ProcessingStage::Errored);
    }
}
