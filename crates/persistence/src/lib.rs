pub mod store;

pub use store::Store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("classification {0} is immutable once decided")]
    Immutable(i64),
    #[error("tag hierarchy would form a cycle")]
    TagCycle,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
