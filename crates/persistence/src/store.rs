//! Relational store (spec §3, §5): files, tags, file_tags, classifications,
//! actions. Schema mirrors the original implementation's SQLAlchemy model,
//! translated to explicit rusqlite statements (grounded on the teacher's
//! `services::file_index::FileIndexService` connection/schema style).

use crate::{PersistenceError, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use shared::types::*;
use std::path::Path;
use std::sync::Arc;

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT UNIQUE NOT NULL,
                filename TEXT NOT NULL,
                extension TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                md5 TEXT NOT NULL,
                status TEXT NOT NULL,
                embedding_ref TEXT,
                created_at INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                processed_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                description TEXT,
                color TEXT,
                parent_tag_id INTEGER REFERENCES tags(id),
                auto_generated INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS file_tags (
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                confidence REAL,
                source TEXT NOT NULL,
                PRIMARY KEY (file_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS classifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                timestamp INTEGER NOT NULL,
                suggested_destination TEXT NOT NULL,
                suggested_tags TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasoning TEXT NOT NULL,
                decision TEXT NOT NULL,
                final_destination TEXT,
                final_tags TEXT
            );

            CREATE TABLE IF NOT EXISTS actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                action_type TEXT NOT NULL,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                before_state TEXT,
                after_state TEXT,
                undone INTEGER NOT NULL DEFAULT 0,
                undone_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
            CREATE INDEX IF NOT EXISTS idx_classifications_file ON classifications(file_id);
            CREATE INDEX IF NOT EXISTS idx_actions_file ON actions(file_id);
            ",
        )?;
        Ok(())
    }

    // ---- files ----

    pub fn insert_file(&self, rec: &FileRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO files (path, filename, extension, size_bytes, md5, status, embedding_ref, created_at, modified_at, processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rec.path,
                rec.filename,
                rec.extension,
                rec.size_bytes as i64,
                rec.md5,
                rec.status.as_str(),
                rec.embedding_ref,
                to_ts(rec.created_at),
                to_ts(rec.modified_at),
                rec.processed_at.map(to_ts),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        let status_str: String = row.get(6)?;
        let processed_at: Option<i64> = row.get(10)?;
        Ok(FileRecord {
            id: Some(row.get(0)?),
            path: row.get(1)?,
            filename: row.get(2)?,
            extension: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)? as u64,
            md5: row.get(5)?,
            status: FileStatus::parse(&status_str).unwrap_or(FileStatus::Pending),
            embedding_ref: row.get(7)?,
            created_at: from_ts(row.get(8)?),
            modified_at: from_ts(row.get(9)?),
            processed_at: processed_at.map(from_ts),
        })
    }

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, path, filename, extension, size_bytes, md5, status, embedding_ref, created_at, modified_at, processed_at FROM files WHERE id = ?1",
            params![id],
            Self::row_to_file,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, path, filename, extension, size_bytes, md5, status, embedding_ref, created_at, modified_at, processed_at FROM files WHERE path = ?1",
            params![path],
            Self::row_to_file,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn update_file_status(&self, id: i64, status: FileStatus, processed_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE files SET status = ?1, processed_at = ?2, modified_at = ?3 WHERE id = ?4",
            params![status.as_str(), processed_at.map(to_ts), to_ts(Utc::now()), id],
        )?;
        Ok(())
    }

    pub fn set_embedding_ref(&self, id: i64, embedding_ref: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE files SET embedding_ref = ?1 WHERE id = ?2",
            params![embedding_ref, id],
        )?;
        Ok(())
    }

    pub fn list_files(&self, status: Option<FileStatus>) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();
        let mut stmt = if status.is_some() {
            conn.prepare(
                "SELECT id, path, filename, extension, size_bytes, md5, status, embedding_ref, created_at, modified_at, processed_at
                 FROM files WHERE status = ?1 ORDER BY id",
            )?
        } else {
            conn.prepare(
                "SELECT id, path, filename, extension, size_bytes, md5, status, embedding_ref, created_at, modified_at, processed_at
                 FROM files ORDER BY id",
            )?
        };
        let rows = if let Some(s) = status {
            stmt.query_map(params![s.as_str()], Self::row_to_file)?
        } else {
            stmt.query_map(params![], Self::row_to_file)?
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_by_status(&self) -> Result<Vec<(FileStatus, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM files GROUP BY status")?;
        let rows = stmt.query_map(params![], |row| {
            let s: String = row.get(0)?;
            let c: i64 = row.get(1)?;
            Ok((s, c))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (s, c) = r?;
            if let Some(status) = FileStatus::parse(&s) {
                out.push((status, c));
            }
        }
        Ok(out)
    }

    /// Cascades to classifications, file_tags, actions (ON DELETE CASCADE).
    pub fn delete_file(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---- classifications ----

    fn row_to_classification(row: &rusqlite::Row) -> rusqlite::Result<ClassificationRecord> {
        let tags_str: String = row.get(4)?;
        let decision_str: String = row.get(7)?;
        let final_tags_str: Option<String> = row.get(9)?;
        Ok(ClassificationRecord {
            id: Some(row.get(0)?),
            file_id: row.get(1)?,
            timestamp: from_ts(row.get(2)?),
            suggested_destination: row.get(3)?,
            suggested_tags: split_tags(&tags_str),
            confidence: row.get(5)?,
            reasoning: row.get(6)?,
            decision: Decision::parse(&decision_str).unwrap_or(Decision::Pending),
            final_destination: row.get(8)?,
            final_tags: final_tags_str.map(|s| split_tags(&s)),
        })
    }

    pub fn insert_classification(&self, rec: &ClassificationRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO classifications (file_id, timestamp, suggested_destination, suggested_tags, confidence, reasoning, decision, final_destination, final_tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rec.file_id,
                to_ts(rec.timestamp),
                rec.suggested_destination,
                rec.suggested_tags.join(","),
                ClassificationRecord::clamp_confidence(rec.confidence),
                rec.reasoning,
                rec.decision.as_str(),
                rec.final_destination,
                rec.final_tags.as_ref().map(|t| t.join(",")),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_classification(&self, id: i64) -> Result<Option<ClassificationRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, file_id, timestamp, suggested_destination, suggested_tags, confidence, reasoning, decision, final_destination, final_tags
             FROM classifications WHERE id = ?1",
            params![id],
            Self::row_to_classification,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_classifications_for_file(&self, file_id: i64) -> Result<Vec<ClassificationRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, timestamp, suggested_destination, suggested_tags, confidence, reasoning, decision, final_destination, final_tags
             FROM classifications WHERE file_id = ?1 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![file_id], Self::row_to_classification)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Record the operator's decision. Fails if the row is already decided
    /// (`ClassificationRecord` is immutable once `decision != pending`, §3).
    pub fn decide_classification(
        &self,
        id: i64,
        decision: Decision,
        final_destination: Option<&str>,
        final_tags: Option<&[String]>,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current: String = tx.query_row(
            "SELECT decision FROM classifications WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if Decision::parse(&current) != Some(Decision::Pending) {
            return Err(PersistenceError::Immutable(id));
        }
        tx.execute(
            "UPDATE classifications SET decision = ?1, final_destination = ?2, final_tags = ?3 WHERE id = ?4",
            params![
                decision.as_str(),
                final_destination,
                final_tags.map(|t| t.join(",")),
                id
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Transactional: update file status and decide its classification in
    /// one write (spec §5 "new FileRecord + new ClassificationRecord").
    pub fn finalize_processing(
        &self,
        file_id: i64,
        classification_id: i64,
        decision: Decision,
        final_destination: Option<&str>,
        final_tags: Option<&[String]>,
        file_status: FileStatus,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current: String = tx.query_row(
            "SELECT decision FROM classifications WHERE id = ?1",
            params![classification_id],
            |row| row.get(0),
        )?;
        if Decision::parse(&current) != Some(Decision::Pending) {
            return Err(PersistenceError::Immutable(classification_id));
        }
        tx.execute(
            "UPDATE classifications SET decision = ?1, final_destination = ?2, final_tags = ?3 WHERE id = ?4",
            params![
                decision.as_str(),
                final_destination,
                final_tags.map(|t| t.join(",")),
                classification_id
            ],
        )?;
        let now = to_ts(Utc::now());
        tx.execute(
            "UPDATE files SET status = ?1, processed_at = ?2, modified_at = ?2 WHERE id = ?3",
            params![file_status.as_str(), now, file_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ---- tags ----

    pub fn upsert_tag(&self, tag: &Tag) -> Result<i64> {
        let name = tag.name.to_lowercase();
        if let Some(parent) = tag.parent_tag_id {
            self.check_no_cycle(parent, &name)?;
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tags (name, description, color, parent_tag_id, auto_generated)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET description = excluded.description, color = excluded.color,
                parent_tag_id = excluded.parent_tag_id, auto_generated = excluded.auto_generated",
            params![
                name,
                tag.description,
                tag.color,
                tag.parent_tag_id,
                tag.auto_generated as i64,
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM tags WHERE name = ?1",
            params![name],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn check_no_cycle(&self, parent_id: i64, new_name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut current = Some(parent_id);
        while let Some(id) = current {
            let (name, next): (String, Option<i64>) = conn.query_row(
                "SELECT name, parent_tag_id FROM tags WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            if name == new_name {
                return Err(PersistenceError::TagCycle);
            }
            current = next;
        }
        Ok(())
    }

    pub fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, description, color, parent_tag_id, auto_generated FROM tags WHERE name = ?1",
            params![name.to_lowercase()],
            |row| {
                Ok(Tag {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                    color: row.get(3)?,
                    parent_tag_id: row.get(4)?,
                    auto_generated: row.get::<_, i64>(5)? != 0,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn add_file_tag(&self, ft: &FileTag) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO file_tags (file_id, tag_id, confidence, source) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_id, tag_id) DO UPDATE SET confidence = excluded.confidence, source = excluded.source",
            params![ft.file_id, ft.tag_id, ft.confidence, ft.source.as_str()],
        )?;
        Ok(())
    }

    pub fn list_tags_for_file(&self, file_id: i64) -> Result<Vec<Tag>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.description, t.color, t.parent_tag_id, t.auto_generated
             FROM tags t JOIN file_tags ft ON ft.tag_id = t.id WHERE ft.file_id = ?1",
        )?;
        let rows = stmt.query_map(params![file_id], |row| {
            Ok(Tag {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                description: row.get(2)?,
                color: row.get(3)?,
                parent_tag_id: row.get(4)?,
                auto_generated: row.get::<_, i64>(5)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- actions ----

    fn row_to_action(row: &rusqlite::Row) -> rusqlite::Result<ActionRecord> {
        let kind_str: String = row.get(2)?;
        let before: Option<String> = row.get(4)?;
        let after: Option<String> = row.get(5)?;
        let undone_at: Option<i64> = row.get(7)?;
        Ok(ActionRecord {
            id: Some(row.get(0)?),
            timestamp: from_ts(row.get(1)?),
            action_type: ActionType::parse(&kind_str).unwrap_or(ActionType::Move),
            file_id: row.get(3)?,
            before_state: before.and_then(|s| serde_json::from_str(&s).ok()),
            after_state: after.and_then(|s| serde_json::from_str(&s).ok()),
            undone: row.get::<_, i64>(6)? != 0,
            undone_at: undone_at.map(from_ts),
        })
    }

    pub fn append_action(&self, rec: &ActionRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO actions (timestamp, action_type, file_id, before_state, after_state, undone, undone_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)",
            params![
                to_ts(rec.timestamp),
                rec.action_type.as_str(),
                rec.file_id,
                rec.before_state.as_ref().map(|s| serde_json::to_string(s).unwrap()),
                rec.after_state.as_ref().map(|s| serde_json::to_string(s).unwrap()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_action(&self, id: i64) -> Result<Option<ActionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, timestamp, action_type, file_id, before_state, after_state, undone, undone_at
             FROM actions WHERE id = ?1",
            params![id],
            Self::row_to_action,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_actions(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, action_type, file_id, before_state, after_state, undone, undone_at
             FROM actions ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], Self::row_to_action)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark an action undone. Append-only: no new row, the existing one is
    /// mutated (spec §3).
    pub fn mark_action_undone(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE actions SET undone = 1, undone_at = ?1 WHERE id = ?2",
            params![to_ts(Utc::now()), id],
        )?;
        Ok(())
    }
}

fn split_tags(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(',').map(|t| t.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(path: &str) -> FileRecord {
        FileRecord {
            id: None,
            path: path.into(),
            filename: "a.txt".into(),
            extension: ".txt".into(),
            size_bytes: 10,
            md5: "deadbeef".into(),
            status: FileStatus::Pending,
            embedding_ref: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn inserts_and_fetches_file_by_path() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_file(&sample_file("/tmp/a.txt")).unwrap();
        let got = store.get_file_by_path("/tmp/a.txt").unwrap().unwrap();
        assert_eq!(got.id, Some(id));
        assert_eq!(got.status, FileStatus::Pending);
    }

    #[test]
    fn delete_file_cascades_to_classifications_and_actions() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store.insert_file(&sample_file("/tmp/b.txt")).unwrap();
        let cls = ClassificationRecord {
            id: None,
            file_id,
            timestamp: Utc::now(),
            suggested_destination: "Docs".into(),
            suggested_tags: vec!["x".into()],
            confidence: 0.5,
            reasoning: "because".into(),
            decision: Decision::Pending,
            final_destination: None,
            final_tags: None,
        };
        let cls_id = store.insert_classification(&cls).unwrap();
        store.delete_file(file_id).unwrap();
        assert!(store.get_classification(cls_id).unwrap().is_none());
    }

    #[test]
    fn classification_is_immutable_once_decided() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store.insert_file(&sample_file("/tmp/c.txt")).unwrap();
        let cls = ClassificationRecord {
            id: None,
            file_id,
            timestamp: Utc::now(),
            suggested_destination: "Docs".into(),
            suggested_tags: vec![],
            confidence: 0.5,
            reasoning: "x".into(),
            decision: Decision::Pending,
            final_destination: None,
            final_tags: None,
        };
        let cls_id = store.insert_classification(&cls).unwrap();
        store
            .decide_classification(cls_id, Decision::Accepted, Some("Docs"), None)
            .unwrap();
        let err = store.decide_classification(cls_id, Decision::Rejected, None, None);
        assert!(matches!(err, Err(PersistenceError::Immutable(_))));
    }

    #[test]
    fn tag_cycle_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let parent = store
            .upsert_tag(&Tag {
                id: None,
                name: "parent".into(),
                description: None,
                color: None,
                parent_tag_id: None,
                auto_generated: false,
            })
            .unwrap();
        let child = store
            .upsert_tag(&Tag {
                id: None,
                name: "child".into(),
                description: None,
                color: None,
                parent_tag_id: Some(parent),
                auto_generated: false,
            })
            .unwrap();
        // make "parent" a child of "child" -> cycle
        let err = store.upsert_tag(&Tag {
            id: None,
            name: "parent".into(),
            description: None,
            color: None,
            parent_tag_id: Some(child),
            auto_generated: false,
        });
        assert!(matches!(err, Err(PersistenceError::TagCycle)));
    }

    #[test]
    fn action_undo_is_mutate_not_append() {
        let store = Store::open_in_memory().unwrap();
        let file_id = store.insert_file(&sample_file("/tmp/d.txt")).unwrap();
        let action = ActionRecord {
            id: None,
            timestamp: Utc::now(),
            action_type: ActionType::Move,
            file_id,
            before_state: Some(FileState {
                path: "/src/d.txt".into(),
                filename: "d.txt".into(),
            }),
            after_state: Some(FileState {
                path: "/O/d.txt".into(),
                filename: "d.txt".into(),
            }),
            undone: false,
            undone_at: None,
        };
        let action_id = store.append_action(&action).unwrap();
        store.mark_action_undone(action_id).unwrap();
        let got = store.get_action(action_id).unwrap().unwrap();
        assert!(got.undone);
        assert_eq!(store.list_actions(10).unwrap().len(), 1);
    }
}
