//! Extractor registry (spec §4.1): extension -> text-extraction strategy.
//!
//! Grounded on `original_source/.../analyzer/extractors.py` (decoder
//! fallback order, extractor list) and spec.md §9's "abstract extractor base
//! class with a registry list" -> a two-capability trait plus an ordered
//! `Vec`, first-match wins.

use shared::error::ExtractionError;
use std::collections::HashSet;
use std::path::Path;

/// Code/config extensions indexed as plain text alongside `.txt`/`.md`.
pub const PLAIN_TEXT_CODE_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".c", ".cpp", ".h", ".hpp",
    ".go", ".rs", ".rb", ".php", ".css", ".scss", ".less", ".sh", ".bash", ".zsh", ".ps1",
    ".json", ".yaml", ".yml", ".toml", ".xml", ".html", ".htm", ".csv", ".ini", ".cfg", ".conf",
    ".rst", ".tex", ".log",
];

/// The extensions the watcher/pipeline watches for directly (spec §6).
pub const WATCHED_EXTENSIONS: &[&str] = &[".txt", ".md", ".pdf", ".docx"];

pub trait Extractor: Send + Sync {
    fn supported_extensions(&self) -> HashSet<String>;
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

pub struct PlainTextExtractor {
    extensions: HashSet<String>,
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self {
            extensions: PLAIN_TEXT_CODE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Extractor for PlainTextExtractor {
    fn supported_extensions(&self) -> HashSet<String> {
        self.extensions.clone()
    }

    /// Tries UTF-8, UTF-8-BOM, Latin-1, Windows-1252 in order (spec §4.1);
    /// the first decoder that consumes the whole file wins. Latin-1
    /// (ISO-8859-1) is decoded by direct byte-to-codepoint mapping, which
    /// never fails, so the Windows-1252 step (`encoding_rs`) is kept as a
    /// documented fallback rather than a reachable branch.
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;

        if let Ok(s) = std::str::from_utf8(&bytes) {
            return Ok(s.to_string());
        }

        let bom_stripped = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        if let Ok(s) = std::str::from_utf8(bom_stripped) {
            return Ok(s.to_string());
        }

        let latin1: String = bytes.iter().map(|&b| b as char).collect();
        if !latin1.is_empty() {
            return Ok(latin1);
        }

        let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&bytes);
        if !had_errors {
            return Ok(decoded.into_owned());
        }
        Err(ExtractionError::UnsupportedEncoding { path: path.to_path_buf() })
    }
}

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn supported_extensions(&self) -> HashSet<String> {
        [".pdf".to_string()].into_iter().collect()
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractionError::Backend {
            path: path.to_path_buf(),
            source: anyhow::anyhow!(e.to_string()),
        })?;
        let pages: Vec<&str> = text.split('\u{c}').map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
        Ok(pages.join("\n\n"))
    }
}

pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn supported_extensions(&self) -> HashSet<String> {
        [".docx".to_string()].into_iter().collect()
    }

    /// Concatenates paragraph text, then table-cell text (cells joined by
    /// ` | `, rows by line breaks), per spec §4.1.
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let docx = docx_rs::read_docx(&bytes).map_err(|e| ExtractionError::Backend {
            path: path.to_path_buf(),
            source: anyhow::anyhow!("{:?}", e),
        })?;

        let mut parts = Vec::new();
        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => {
                    let text = paragraph_text(p);
                    if !text.trim().is_empty() {
                        parts.push(text);
                    }
                }
                docx_rs::DocumentChild::Table(t) => {
                    for row in &t.rows {
                        let docx_rs::TableChild::TableRow(row) = row;
                        let mut cells = Vec::new();
                        for cell in &row.cells {
                            let docx_rs::TableRowChild::TableCell(cell) = cell;
                            let mut cell_text = String::new();
                            for content in &cell.children {
                                if let docx_rs::TableCellContent::Paragraph(p) = content {
                                    cell_text.push_str(&paragraph_text(p));
                                }
                            }
                            let cell_text = cell_text.trim().to_string();
                            if !cell_text.is_empty() {
                                cells.push(cell_text);
                            }
                        }
                        if !cells.is_empty() {
                            parts.push(cells.join(" | "));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(parts.join("\n"))
    }
}

fn paragraph_text(p: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// Ordered registry, first match wins (spec §9 "abstract extractor base
/// class with a registry list").
pub struct ExtractorRegistry {
    strategies: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self { strategies: Vec::new() };
        registry.register(Box::new(PlainTextExtractor::default()));
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(DocxExtractor));
        registry
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self { strategies: Vec::new() }
    }

    pub fn register(&mut self, strategy: Box<dyn Extractor>) {
        self.strategies.push(strategy);
    }

    pub fn get(&self, path: &Path) -> Option<&dyn Extractor> {
        let ext = lowercased_extension(path);
        self.strategies
            .iter()
            .find(|s| s.supported_extensions().contains(&ext))
            .map(|b| b.as_ref())
    }

    pub fn supported_extensions(&self) -> HashSet<String> {
        let mut all = HashSet::new();
        for s in &self.strategies {
            all.extend(s.supported_extensions());
        }
        all
    }

    pub fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let ext = lowercased_extension(path);
        match self.get(path) {
            Some(strategy) => strategy.extract(path),
            None => Err(ExtractionError::Unsupported { extension: ext }),
        }
    }
}

pub fn lowercased_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn plain_text_extractor_reads_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world").unwrap();
        let registry = ExtractorRegistry::default();
        let text = registry.extract(&path).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn registry_returns_none_for_unsupported_extension() {
        let registry = ExtractorRegistry::default();
        assert!(registry.get(Path::new("a.bin")).is_none());
    }

    #[test]
    fn supported_extensions_cover_watched_set() {
        let registry = ExtractorRegistry::default();
        let all = registry.supported_extensions();
        for ext in WATCHED_EXTENSIONS {
            assert!(all.contains(*ext), "missing {ext}");
        }
    }

    #[test]
    fn lowercases_and_keeps_leading_dot() {
        assert_eq!(lowercased_extension(Path::new("A.TXT")), ".txt");
        assert_eq!(lowercased_extension(Path::new("noext")), "");
    }
}
