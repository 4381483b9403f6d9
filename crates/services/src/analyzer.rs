//! File analyzer (spec §4.1): metadata + extraction wrapper around the
//! extractor registry. Grounded on
//! `original_source/.../analyzer/analyzer.py`.

use crate::extractor::ExtractorRegistry;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use shared::error::ExtractionError;
use std::fs;
use std::path::{Path, PathBuf};

pub const PREVIEW_LENGTH: usize = 500;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub md5: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub file_path: PathBuf,
    pub metadata: Option<FileMetadata>,
    pub content: String,
    pub content_preview: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub word_count: usize,
    pub line_count: usize,
}

impl AnalysisResult {
    fn failure(file_path: PathBuf, metadata: Option<FileMetadata>, message: impl Into<String>) -> Self {
        Self {
            file_path,
            metadata,
            content: String::new(),
            content_preview: String::new(),
            success: false,
            error_message: Some(message.into()),
            word_count: 0,
            line_count: 0,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

fn compute_md5(path: &Path) -> String {
    let Ok(bytes) = fs::read(path) else {
        return String::new();
    };
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

pub(crate) fn extract_metadata(path: &Path) -> std::io::Result<FileMetadata> {
    let meta = fs::metadata(path)?;
    let created_at = meta.created().or_else(|_| meta.modified()).map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
    let modified_at = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
    Ok(FileMetadata {
        path: path.to_path_buf(),
        filename: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        extension: crate::extractor::lowercased_extension(path),
        size_bytes: meta.len(),
        created_at,
        modified_at,
        md5: compute_md5(path),
    })
}

pub struct FileAnalyzer {
    registry: ExtractorRegistry,
    max_file_size_bytes: u64,
}

impl FileAnalyzer {
    pub fn new(max_file_size_bytes: u64) -> Self {
        Self { registry: ExtractorRegistry::default(), max_file_size_bytes }
    }

    pub fn can_analyze(&self, path: &Path) -> bool {
        path.is_file() && self.registry.get(path).is_some()
    }

    /// The full indexable extension set (spec §6: watched set plus
    /// code/config text files), used by the indexing driver to decide which
    /// candidates to walk.
    pub fn supported_extensions(&self) -> std::collections::HashSet<String> {
        self.registry.supported_extensions()
    }

    /// Analyze a single file: metadata, size-limit check, extraction,
    /// preview/word/line stats. Never panics; every failure mode is
    /// surfaced on `AnalysisResult.error_message` per spec §7.
    pub fn analyze(&self, path: &Path) -> AnalysisResult {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if !path.exists() {
            return AnalysisResult::failure(path.clone(), None, format!("File not found: {}", path.display()));
        }

        let metadata = match extract_metadata(&path) {
            Ok(m) => m,
            Err(e) => return AnalysisResult::failure(path.clone(), None, format!("Could not read file metadata: {e}")),
        };

        if metadata.size_bytes > self.max_file_size_bytes {
            let msg = format!(
                "File too large: {:.1}MB exceeds limit of {:.0}MB",
                metadata.size_bytes as f64 / 1024.0 / 1024.0,
                self.max_file_size_bytes as f64 / 1024.0 / 1024.0
            );
            return AnalysisResult::failure(path, Some(metadata), msg);
        }

        match self.registry.extract(&path) {
            Ok(content) => {
                let content_preview = preview(&content);
                let word_count = content.split_whitespace().count();
                let line_count = if content.is_empty() { 0 } else { content.matches('\n').count() + 1 };
                AnalysisResult {
                    file_path: path,
                    metadata: Some(metadata),
                    content,
                    content_preview,
                    success: true,
                    error_message: None,
                    word_count,
                    line_count,
                }
            }
            Err(ExtractionError::Unsupported { extension }) => {
                AnalysisResult::failure(path, Some(metadata), format!("No extractor available for extension: {extension}"))
            }
            Err(e) => AnalysisResult::failure(path, Some(metadata), e.to_string()),
        }
    }

    pub fn analyze_multiple(&self, paths: &[PathBuf]) -> Vec<AnalysisResult> {
        paths.iter().map(|p| self.analyze(p)).collect()
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LENGTH {
        return content.to_string();
    }
    let truncated: String = content.chars().take(PREVIEW_LENGTH).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn analyze_succeeds_on_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "hello world, this is a note").unwrap();
        let analyzer = FileAnalyzer::new(100 * 1024 * 1024);
        let result = analyzer.analyze(&path);
        assert!(result.success);
        assert_eq!(result.word_count, 6);
        assert!(result.metadata.unwrap().md5.len() == 32);
    }

    #[test]
    fn rejects_file_over_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, vec![b'x'; 2048]).unwrap();
        let analyzer = FileAnalyzer::new(1024);
        let result = analyzer.analyze(&path);
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("too large"));
    }

    #[test]
    fn accepts_file_exactly_at_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exact.txt");
        fs::write(&path, vec![b'x'; 1024]).unwrap();
        let analyzer = FileAnalyzer::new(1024);
        let result = analyzer.analyze(&path);
        assert!(result.success);
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        let long = "a".repeat(PREVIEW_LENGTH + 10);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.len(), PREVIEW_LENGTH + 3);
    }

    #[test]
    fn missing_extractor_reports_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"\x00\x01").unwrap();
        let analyzer = FileAnalyzer::new(100 * 1024 * 1024);
        let result = analyzer.analyze(&path);
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("No extractor"));
    }
}
