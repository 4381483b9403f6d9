//! Vector index (spec §4.3): façade over a persistent ANN-ish store.
//!
//! Grounded on the teacher's rusqlite connection/schema style (previously
//! `services::file_index::FileIndexService`), generalized into its own
//! rusqlite-backed collection with brute-force L2 k-NN — a faithful but
//! simple stand-in for the original's ChromaDB collection. Distance is L2
//! in the embedding space; `search` ordering is the contract (spec §4.3),
//! not a specific ANN data structure.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use shared::types::IndexedFileMetadata;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize embedding: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, VectorIndexError>;

#[derive(Debug, Clone, Default)]
pub struct WhereFilter {
    pub extension: Option<Vec<String>>,
    pub file_type: Option<Vec<String>>,
}

impl WhereFilter {
    pub fn is_empty(&self) -> bool {
        self.extension.is_none() && self.file_type.is_none()
    }
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// A single named collection (spec §4.3: "a single collection ... holds all
/// entries").
pub struct VectorIndex {
    conn: Arc<Mutex<Connection>>,
    collection: String,
}

impl VectorIndex {
    pub fn open(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn, collection)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), collection: collection.to_string() })
    }

    pub fn open_in_memory(collection: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn, collection)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), collection: collection.to_string() })
    }

    fn init_schema(conn: &Connection, collection: &str) -> Result<()> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                    file_id TEXT PRIMARY KEY,
                    embedding BLOB NOT NULL,
                    document_snippet TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    filename TEXT NOT NULL,
                    extension TEXT NOT NULL,
                    file_type TEXT NOT NULL,
                    tags TEXT NOT NULL,
                    content_summary TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    created_at INTEGER,
                    modified_at INTEGER,
                    indexed_at INTEGER NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    source_folder TEXT NOT NULL
                )"
            ),
            [],
        )?;
        Ok(())
    }

    fn table(&self) -> String {
        format!("\"{}\"", self.collection)
    }

    /// Idempotent on `file_id`; replaces any prior entry.
    pub fn upsert(
        &self,
        file_id: &str,
        embedding: &[f32],
        document_snippet: &str,
        metadata: &IndexedFileMetadata,
    ) -> Result<()> {
        let snippet: String = document_snippet.chars().take(IndexedFileMetadata::MAX_DOCUMENT_SNIPPET).collect();
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (file_id, embedding, document_snippet, file_path, filename, extension,
                    file_type, tags, content_summary, content_hash, created_at, modified_at, indexed_at,
                    size_bytes, source_folder)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                 ON CONFLICT(file_id) DO UPDATE SET
                    embedding=excluded.embedding, document_snippet=excluded.document_snippet,
                    file_path=excluded.file_path, filename=excluded.filename, extension=excluded.extension,
                    file_type=excluded.file_type, tags=excluded.tags, content_summary=excluded.content_summary,
                    content_hash=excluded.content_hash, created_at=excluded.created_at,
                    modified_at=excluded.modified_at, indexed_at=excluded.indexed_at,
                    size_bytes=excluded.size_bytes, source_folder=excluded.source_folder",
                self.table()
            ),
            params![
                file_id,
                encode_vector(embedding),
                snippet,
                metadata.file_path,
                metadata.filename,
                metadata.extension,
                metadata.file_type,
                metadata.tags_to_store(),
                metadata.content_summary.chars().take(IndexedFileMetadata::MAX_CONTENT_SUMMARY).collect::<String>(),
                metadata.content_hash,
                metadata.created_at.timestamp(),
                metadata.modified_at.timestamp(),
                metadata.indexed_at.timestamp(),
                metadata.size_bytes as i64,
                metadata.source_folder,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, file_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {} WHERE file_id = ?1", self.table()), params![file_id])?;
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table()), [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn get(&self, file_id: &str) -> Result<Option<(IndexedFileMetadata, String)>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM {} WHERE file_id = ?1", Self::select_columns(), self.table()),
            params![file_id],
            Self::row_to_metadata,
        )
        .optional()
        .map_err(Into::into)
    }

    /// `true` iff an entry exists and, if `content_hash` is provided,
    /// matches (spec §4.3).
    pub fn is_indexed(&self, file_id: &str, content_hash: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock();
        let stored: Option<String> = conn
            .query_row(&format!("SELECT content_hash FROM {} WHERE file_id = ?1", self.table()), params![file_id], |r| r.get(0))
            .optional()?;
        Ok(match (stored, content_hash) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(stored), Some(expected)) => stored == expected,
        })
    }

    pub fn all_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT file_id FROM {}", self.table()))?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(&format!("DELETE FROM {}", self.table()), [])?;
        Ok(())
    }

    /// Brute-force k-NN by ascending L2 distance, with an equality/`in`
    /// pre-filter on `extension`/`file_type` pushed into SQL (spec §4.3).
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &WhereFilter,
    ) -> Result<Vec<(IndexedFileMetadata, f32, String)>> {
        let conn = self.conn.lock();
        let mut sql = format!("SELECT {} FROM {}", Self::select_columns(), self.table());
        let mut clauses = Vec::new();
        if let Some(exts) = &filter.extension {
            let list = exts.iter().map(|e| format!("'{}'", e.replace('\'', "''"))).collect::<Vec<_>>().join(",");
            clauses.push(format!("extension IN ({list})"));
        }
        if let Some(types) = &filter.file_type {
            let list = types.iter().map(|t| format!("'{}'", t.replace('\'', "''"))).collect::<Vec<_>>().join(",");
            clauses.push(format!("file_type IN ({list})"));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_metadata)?;
        let mut scored: Vec<(IndexedFileMetadata, f32, String)> = Vec::new();
        for row in rows {
            let (meta, snippet) = row?;
            let embedding_blob: Vec<u8> = conn.query_row(
                &format!("SELECT embedding FROM {} WHERE file_id = ?1", self.table()),
                params![meta.file_id],
                |r| r.get(0),
            )?;
            let vec = decode_vector(&embedding_blob);
            let distance = l2_distance(query_embedding, &vec);
            scored.push((meta, distance, snippet));
        }
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn select_columns() -> &'static str {
        "file_id, file_path, filename, extension, file_type, tags, content_summary, content_hash,
         created_at, modified_at, indexed_at, size_bytes, source_folder, document_snippet"
    }

    fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<(IndexedFileMetadata, String)> {
        let tags_str: String = row.get(5)?;
        let created_at: Option<i64> = row.get(8)?;
        let modified_at: Option<i64> = row.get(9)?;
        let indexed_at: i64 = row.get(10)?;
        let snippet: String = row.get(13)?;
        let meta = IndexedFileMetadata {
            file_id: row.get(0)?,
            file_path: row.get(1)?,
            filename: row.get(2)?,
            extension: row.get(3)?,
            file_type: row.get(4)?,
            tags: IndexedFileMetadata::tags_from_store(&tags_str),
            content_summary: row.get(6)?,
            content_hash: row.get(7)?,
            created_at: created_at.and_then(ts_to_dt).unwrap_or_else(Utc::now),
            modified_at: modified_at.and_then(ts_to_dt).unwrap_or_else(Utc::now),
            indexed_at: ts_to_dt(indexed_at).unwrap_or_else(Utc::now),
            size_bytes: row.get::<_, i64>(11)? as u64,
            source_folder: row.get(12)?,
        };
        Ok((meta, snippet))
    }
}

fn ts_to_dt(ts: i64) -> Option<DateTime<Utc>> {
    chrono::Utc.timestamp_opt(ts, 0).single()
}

use chrono::TimeZone;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta(id: &str, ext: &str) -> IndexedFileMetadata {
        IndexedFileMetadata {
            file_id: id.into(),
            file_path: format!("/tmp/{id}{ext}"),
            filename: format!("{id}{ext}"),
            extension: ext.into(),
            file_type: "document".into(),
            tags: vec!["a".into()],
            content_summary: "summary".into(),
            content_hash: "hash1".into(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
            size_bytes: 10,
            source_folder: "tmp".into(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        let meta = sample_meta("a", ".txt");
        idx.upsert("a", &[1.0, 2.0, 3.0], "hello", &meta).unwrap();
        let (got, snippet) = idx.get("a").unwrap().unwrap();
        assert_eq!(got.file_id, "a");
        assert_eq!(snippet, "hello");
    }

    #[test]
    fn upsert_is_idempotent_count_unchanged() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        let meta = sample_meta("a", ".txt");
        idx.upsert("a", &[1.0], "x", &meta).unwrap();
        idx.upsert("a", &[1.0], "x", &meta).unwrap();
        assert_eq!(idx.count().unwrap(), 1);
    }

    #[test]
    fn is_indexed_respects_content_hash() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        let meta = sample_meta("a", ".txt");
        idx.upsert("a", &[1.0], "x", &meta).unwrap();
        assert!(idx.is_indexed("a", Some("hash1")).unwrap());
        assert!(!idx.is_indexed("a", Some("hash2")).unwrap());
        assert!(idx.is_indexed("a", None).unwrap());
        assert!(!idx.is_indexed("missing", None).unwrap());
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        idx.upsert("near", &[1.0, 0.0], "n", &sample_meta("near", ".txt")).unwrap();
        idx.upsert("far", &[10.0, 0.0], "f", &sample_meta("far", ".txt")).unwrap();
        let results = idx.search(&[0.0, 0.0], 10, &WhereFilter::default()).unwrap();
        assert_eq!(results[0].0.file_id, "near");
        assert_eq!(results[1].0.file_id, "far");
    }

    #[test]
    fn search_filters_by_extension() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        idx.upsert("a", &[1.0], "a", &sample_meta("a", ".pdf")).unwrap();
        idx.upsert("b", &[1.0], "b", &sample_meta("b", ".txt")).unwrap();
        let filter = WhereFilter { extension: Some(vec![".pdf".into()]), file_type: None };
        let results = idx.search(&[1.0], 10, &filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.file_id, "a");
    }

    #[test]
    fn clear_drops_all_entries() {
        let idx = VectorIndex::open_in_memory("files").unwrap();
        idx.upsert("a", &[1.0], "a", &sample_meta("a", ".txt")).unwrap();
        idx.clear().unwrap();
        assert_eq!(idx.count().unwrap(), 0);
    }
}
