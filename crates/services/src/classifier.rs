//! Classifier (spec §4.6): composes the LLM prompt, parses its reply into a
//! suggested destination/tags/confidence, and sanitizes the result before it
//! reaches persistence.
//!
//! Grounded on `original_source/.../classifier/classifier.py` for the
//! prompt template and JSON-extraction regex, and spec.md §9's "non-greedy
//! `{...}` match, not a full JSON parser of the surrounding text" — the
//! regex only locates the object, `serde_json` parses it.

use crate::analyzer::FileMetadata;
use regex::Regex;
use serde::Deserialize;
use shared::error::LlmParseError;
use shared::types::ClassificationRecord;
use std::sync::OnceLock;

/// Cap on the content preview embedded in the classification prompt (spec
/// §4.6), distinct from the analyzer's own ≤500-char `content_preview`.
pub const PROMPT_CONTENT_PREVIEW_MAX_CHARS: usize = 2000;

fn json_object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*?\}").expect("static pattern is valid"))
}

#[derive(Debug, Default, serde::Deserialize)]
struct RawClassification {
    #[serde(default, alias = "destination")]
    destination_folder: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Coerces the LLM's `tags` field to a list of strings: a single string
/// becomes a one-element list, a non-list/non-string value becomes a
/// one-element list of its string form (spec §4.6 sanitization rule).
fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        serde_json::Value::String(s) => vec![s],
        serde_json::Value::Null => Vec::new(),
        other => vec![other.to_string()],
    })
}

/// Coerces the LLM's `confidence` field to a float, accepting a numeric
/// string as well as a bare number (spec §4.6 "coerce to float").
fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Builds the classification prompt from file analysis + folder context
/// (spec §4.6: filename, extension, size, created/modified timestamps
/// formatted `YYYY-MM-DD HH:MM`, a content preview truncated to ≤2000
/// characters, and the folder structure). `known_tags` nudges the model to
/// reuse existing tags instead of minting near-duplicates.
pub fn build_prompt(metadata: &FileMetadata, content: &str, folder_context: &str, known_tags: &[String]) -> String {
    let tags_hint = if known_tags.is_empty() {
        "none yet".to_string()
    } else {
        known_tags.join(", ")
    };
    let content_preview: String = content.chars().take(PROMPT_CONTENT_PREVIEW_MAX_CHARS).collect();
    let filename = &metadata.filename;
    let extension = &metadata.extension;
    let size_bytes = metadata.size_bytes;
    let created_at = metadata.created_at.format("%Y-%m-%d %H:%M");
    let modified_at = metadata.modified_at.format("%Y-%m-%d %H:%M");
    format!(
        "You are a file organization assistant. Given a file's name and content, \
         suggest a destination folder (relative to the organized root), up to \
         5 tags, and a confidence score.\n\n\
         Filename: {filename}\n\
         Extension: {extension}\n\
         Size: {size_bytes} bytes\n\
         Created: {created_at}\n\
         Modified: {modified_at}\n\
         Content preview:\n{content_preview}\n\n\
         Existing folder structure:\n{folder_context}\n\n\
         Existing tags you may reuse: {tags_hint}\n\n\
         Respond with a single JSON object only, no prose, matching exactly:\n\
         {{\"destination_folder\": \"<folder path>\", \"tags\": [\"tag1\", \"tag2\"], \
         \"confidence\": <0.0-1.0>, \"reasoning\": \"<one sentence>\"}}"
    )
}

/// Extracts the first `{...}` object from `reply` (non-greedy, spec §4.6 /
/// §9) and parses it with `serde_json`.
fn extract_json(reply: &str) -> Result<RawClassification, LlmParseError> {
    let mat = json_object_pattern().find(reply).ok_or(LlmParseError::NoJsonObject)?;
    serde_json::from_str(mat.as_str()).map_err(|e| LlmParseError::InvalidJson(e.to_string()))
}

/// Rejects `..` path segments and absolute-looking destinations, collapsing
/// backslashes and repeated separators (spec §4.6 sanitization rule).
pub fn sanitize_destination(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let cleaned: Vec<&str> = normalized
        .split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect();
    if cleaned.is_empty() {
        "Unsorted".to_string()
    } else {
        cleaned.join("/")
    }
}

fn sanitize_tags(raw: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .take(5)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

pub struct Classifier;

impl Classifier {
    /// Parses and sanitizes a raw LLM reply into a pending
    /// `ClassificationRecord` for `file_id` (not yet persisted). Never
    /// fails: on any parse problem (no JSON object found, invalid JSON,
    /// missing destination) this falls back to a `Unsorted`/zero-confidence
    /// record rather than propagating an error, per spec §4.6 ("on any
    /// failure, return a `ClassificationResult` with `destination_folder =
    /// "Unsorted"`, empty tags, confidence 0, `success = false`").
    pub fn parse_reply(file_id: i64, reply: &str) -> ClassificationRecord {
        match extract_json(reply) {
            Ok(raw) => ClassificationRecord {
                id: None,
                file_id,
                timestamp: chrono::Utc::now(),
                suggested_destination: sanitize_destination(&raw.destination_folder),
                suggested_tags: sanitize_tags(raw.tags),
                confidence: ClassificationRecord::clamp_confidence(raw.confidence),
                reasoning: raw.reasoning,
                decision: shared::types::Decision::Pending,
                final_destination: None,
                final_tags: None,
            },
            _ => Self::fallback(file_id),
        }
    }

    fn fallback(file_id: i64) -> ClassificationRecord {
        ClassificationRecord {
            id: None,
            file_id,
            timestamp: chrono::Utc::now(),
            suggested_destination: "Unsorted".to_string(),
            suggested_tags: Vec::new(),
            confidence: 0.0,
            reasoning: "No reasoning provided".to_string(),
            decision: shared::types::Decision::Pending,
            final_destination: None,
            final_tags: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_reply() {
        let reply = r#"Sure, here you go: {"destination": "Invoices/2024", "tags": ["finance", "invoice"], "confidence": 0.92, "reasoning": "looks like an invoice"}"#;
        let record = Classifier::parse_reply(1, reply);
        assert_eq!(record.suggested_destination, "Invoices/2024");
        assert_eq!(record.suggested_tags, vec!["finance".to_string(), "invoice".to_string()]);
        assert_eq!(record.confidence, 0.92);
    }

    #[test]
    fn sanitizes_backslashes_clamped_confidence_and_string_tag() {
        // spec.md §8 scenario 6.
        let reply = r#"{"destination_folder":"/Docs\\Work/","tags":"alpha","confidence":1.7,"reasoning":""}"#;
        let record = Classifier::parse_reply(1, reply);
        assert_eq!(record.suggested_destination, "Docs/Work");
        assert_eq!(record.suggested_tags, vec!["alpha".to_string()]);
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn missing_json_object_falls_back_to_unsorted() {
        let reply = "I cannot classify this file.";
        let record = Classifier::parse_reply(1, reply);
        assert_eq!(record.suggested_destination, "Unsorted");
        assert!(record.suggested_tags.is_empty());
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn confidence_outside_unit_interval_is_clamped() {
        let reply = r#"{"destination": "Misc", "tags": [], "confidence": 5.0, "reasoning": "x"}"#;
        let record = Classifier::parse_reply(1, reply);
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn sanitize_destination_rejects_parent_traversal() {
        assert_eq!(sanitize_destination("../../etc"), "etc");
        assert_eq!(sanitize_destination("Documents/../Invoices"), "Documents/Invoices");
        assert_eq!(sanitize_destination("../.."), "Unsorted");
    }

    #[test]
    fn sanitize_tags_dedupes_lowercases_and_caps_at_five() {
        let tags = vec!["Finance".into(), "finance".into(), "a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        let sanitized = sanitize_tags(tags);
        assert!(sanitized.len() <= 5);
        assert!(sanitized.contains(&"finance".to_string()));
    }

    #[test]
    fn extraction_is_non_greedy_across_multiple_objects() {
        let reply = r#"{"a": 1} some text {"destination": "X", "tags": [], "confidence": 0.5, "reasoning": "y"}"#;
        // Non-greedy match grabs the first complete object, which lacks
        // `destination`, so parsing falls back to Unsorted rather than
        // continuing on to the second, well-formed object.
        let record = Classifier::parse_reply(1, reply);
        assert_eq!(record.suggested_destination, "Unsorted");
    }
}
