//! Domain entities (spec §3). Plain data structs, no ORM — persistence maps
//! these to rows explicitly in `persistence::store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Processing,
    Processed,
    Error,
    Skipped,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Processed => "processed",
            FileStatus::Error => "error",
            FileStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FileStatus::Pending),
            "processing" => Some(FileStatus::Processing),
            "processed" => Some(FileStatus::Processed),
            "error" => Some(FileStatus::Error),
            "skipped" => Some(FileStatus::Skipped),
            _ => None,
        }
    }
}

/// Identity is the canonicalized absolute `path`. `id` is assigned by
/// persistence on first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub size_bytes: u64,
    pub md5: String,
    pub status: FileStatus,
    pub embedding_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Pending,
    Accepted,
    Rejected,
    Modified,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pending => "pending",
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
            Decision::Modified => "modified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Decision::Pending),
            "accepted" => Some(Decision::Accepted),
            "rejected" => Some(Decision::Rejected),
            "modified" => Some(Decision::Modified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: Option<i64>,
    pub file_id: i64,
    pub timestamp: DateTime<Utc>,
    pub suggested_destination: String,
    pub suggested_tags: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub decision: Decision,
    pub final_destination: Option<String>,
    pub final_tags: Option<Vec<String>>,
}

impl ClassificationRecord {
    /// Clamp confidence into `[0, 1]` at construction time, per spec §3.
    pub fn clamp_confidence(confidence: f64) -> f64 {
        confidence.clamp(0.0, 1.0)
    }

    pub fn confidence_bucket(&self, high: f64, medium: f64) -> ConfidenceBucket {
        if self.confidence >= high {
            ConfidenceBucket::High
        } else if self.confidence >= medium {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }

    pub fn is_immutable(&self) -> bool {
        self.decision != Decision::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub parent_tag_id: Option<i64>,
    pub auto_generated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagSource {
    Ai,
    User,
    Rule,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Ai => "ai",
            TagSource::User => "user",
            TagSource::Rule => "rule",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTag {
    pub file_id: i64,
    pub tag_id: i64,
    pub confidence: Option<f64>,
    pub source: TagSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Move,
    Tag,
    CreateFolder,
    Delete,
    Rename,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Move => "move",
            ActionType::Tag => "tag",
            ActionType::CreateFolder => "create_folder",
            ActionType::Delete => "delete",
            ActionType::Rename => "rename",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "move" => Some(ActionType::Move),
            "tag" => Some(ActionType::Tag),
            "create_folder" => Some(ActionType::CreateFolder),
            "delete" => Some(ActionType::Delete),
            "rename" => Some(ActionType::Rename),
            _ => None,
        }
    }
}

/// Opaque structured blob recorded as `before_state`/`after_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    pub file_id: i64,
    pub before_state: Option<FileState>,
    pub after_state: Option<FileState>,
    pub undone: bool,
    pub undone_at: Option<DateTime<Utc>>,
}

/// Lives in the vector index, not the relational store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedFileMetadata {
    pub file_id: String,
    pub file_path: String,
    pub filename: String,
    pub extension: String,
    pub file_type: String,
    pub tags: Vec<String>,
    pub content_summary: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub source_folder: String,
}

impl IndexedFileMetadata {
    pub const MAX_CONTENT_SUMMARY: usize = 1000;
    pub const MAX_DOCUMENT_SNIPPET: usize = 2000;

    /// Tags are stored comma-joined, sorted, de-duplicated (spec §3/§6).
    pub fn tags_to_store(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        tags.join(",")
    }

    pub fn tags_from_store(s: &str) -> Vec<String> {
        if s.is_empty() {
            Vec::new()
        } else {
            s.split(',').map(|t| t.to_string()).collect()
        }
    }
}

/// Transient; produced by the folder scanner, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    pub name: String,
    pub absolute_path: String,
    pub depth: u32,
    pub children: Vec<FolderNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_clamps_into_unit_interval() {
        assert_eq!(ClassificationRecord::clamp_confidence(1.7), 1.0);
        assert_eq!(ClassificationRecord::clamp_confidence(-0.3), 0.0);
        assert_eq!(ClassificationRecord::clamp_confidence(0.42), 0.42);
    }

    #[test]
    fn tags_round_trip_sorted_and_deduped() {
        let meta = IndexedFileMetadata {
            file_id: "abc".into(),
            file_path: "/x".into(),
            filename: "x".into(),
            extension: ".txt".into(),
            file_type: "text".into(),
            tags: vec!["beta".into(), "alpha".into(), "alpha".into()],
            content_summary: String::new(),
            content_hash: "0".repeat(16),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
            size_bytes: 0,
            source_folder: String::new(),
        };
        assert_eq!(meta.tags_to_store(), "alpha,beta");
        assert_eq!(
            IndexedFileMetadata::tags_from_store("alpha,beta"),
            vec!["alpha".to_string(), "beta".to_string()]
        );
    }

    #[test]
    fn action_type_round_trips_through_str() {
        for kind in [
            ActionType::Move,
            ActionType::Tag,
            ActionType::CreateFolder,
            ActionType::Delete,
            ActionType::Rename,
        ] {
            assert_eq!(ActionType::parse(kind.as_str()), Some(kind));
        }
    }
}
