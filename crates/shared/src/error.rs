//! Error taxonomy for the file organizer core.
//!
//! Each kind below is a typed result variant, not an exception path: service
//! functions return these directly rather than panicking, so a failure on
//! one file never aborts a batch (see spec §7).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported encoding in {path}")]
    UnsupportedEncoding { path: PathBuf },
    #[error("extraction backend failed for {path}: {source}")]
    Backend {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("document produced no extractable text: {path}")]
    Empty { path: PathBuf },
    #[error("no extractor registered for extension {extension:?}")]
    Unsupported { extension: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("empty input text")]
    EmptyInput,
    #[error("embedding model failed to load: {0}")]
    ModelLoad(String),
    #[error("embedding backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum LlmTransportError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    #[error("non-success status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

#[derive(Debug, Error)]
pub enum LlmParseError {
    #[error("no JSON object found in reply")]
    NoJsonObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("upstream analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("invalid classifier configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("permission denied moving {path}")]
    PermissionError { path: PathBuf },
    #[error("source file missing: {path}")]
    SourceMissingError { path: PathBuf },
    #[error("failed to create destination directory {path}: {source}")]
    DestinationError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("exhausted collision probes for {path}")]
    CollisionError { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("action {0} not found")]
    NotFound(i64),
    #[error("action {0} already undone")]
    AlreadyUndone(i64),
    #[error("action {id} is not undoable (kind {kind})")]
    NotUndoable { id: i64, kind: String },
    #[error("file at {0} is missing, cannot undo")]
    FileMissing(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Aggregate error for the CLI boundary. Library call sites use the specific
/// kinds above; the binary collapses them here for a single exit path.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    LlmTransport(#[from] LlmTransportError),
    #[error(transparent)]
    LlmParse(#[from] LlmParseError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error(transparent)]
    Undo(#[from] UndoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
