//! Configuration (spec §6, defaults from the original Python implementation's
//! `FileAssistantConfig`). Loaded once at the CLI boundary; every field has
//! an explicit default so `init` can write a usable config with no input.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn home_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.9,
            medium: 0.6,
            low: 0.0,
        }
    }
}

impl ConfidenceThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.high)
            || !(0.0..=1.0).contains(&self.medium)
            || !(0.0..=1.0).contains(&self.low)
        {
            return Err(ConfigError::Invalid {
                field: "confidence_thresholds".into(),
                reason: "thresholds must be within [0, 1]".into(),
            });
        }
        if !(self.low <= self.medium && self.medium < self.high) {
            return Err(ConfigError::Invalid {
                field: "confidence_thresholds".into(),
                reason: "require low <= medium < high".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub idle_only: bool,
    pub debounce_seconds: u64,
    pub max_file_size_mb: u64,
    pub batch_size: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            idle_only: true,
            debounce_seconds: 2,
            max_file_size_mb: 100,
            batch_size: 10,
        }
    }
}

impl ProcessingSettings {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size_mb < 1 {
            return Err(ConfigError::Invalid {
                field: "processing.max_file_size_mb".into(),
                reason: "must be >= 1".into(),
            });
        }
        if self.batch_size < 1 {
            return Err(ConfigError::Invalid {
                field: "processing.batch_size".into(),
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub model_name: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub ollama_base_url: String,
    pub max_retries: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model_name: "qwen2.5:latest".into(),
            embedding_model: "all-MiniLM-L6-v2".into(),
            temperature: 0.1,
            ollama_base_url: "http://localhost:11434".into(),
            max_retries: 3,
        }
    }
}

impl AiSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "ai_settings.temperature".into(),
                reason: "must be within [0, 2]".into(),
            });
        }
        if self.max_retries < 1 {
            return Err(ConfigError::Invalid {
                field: "ai_settings.max_retries".into(),
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    pub log_dir: PathBuf,
    pub max_bytes: u64,
    pub backup_count: u32,
    pub console_enabled: bool,
    pub file_enabled: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_dir: PathBuf::from("logs"),
            max_bytes: 10 * 1024 * 1024,
            backup_count: 5,
            console_enabled: true,
            file_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub vector_store_path: PathBuf,
    pub backup_enabled: bool,
    pub backup_interval_hours: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/fileassistant.db"),
            vector_store_path: PathBuf::from("data/vector_store"),
            backup_enabled: true,
            backup_interval_hours: 24,
        }
    }
}

impl DatabaseSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_interval_hours < 1 {
            return Err(ConfigError::Invalid {
                field: "database.backup_interval_hours".into(),
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inbox_folders: Vec<PathBuf>,
    pub organized_base_path: Option<PathBuf>,
    pub confidence_thresholds: ConfidenceThresholds,
    pub processing: ProcessingSettings,
    pub ai_settings: AiSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub scan_folders_for_context: Option<Vec<PathBuf>>,
    pub folder_scan_depth: u32,
    pub auto_process_enabled: bool,
    pub learning_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inbox_folders: vec![home_dir().join("Downloads"), home_dir().join("Desktop")],
            organized_base_path: None,
            confidence_thresholds: ConfidenceThresholds::default(),
            processing: ProcessingSettings::default(),
            ai_settings: AiSettings::default(),
            logging: LoggingSettings::default(),
            database: DatabaseSettings::default(),
            scan_folders_for_context: None,
            folder_scan_depth: 4,
            auto_process_enabled: false,
            learning_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn load_from_str(s: &str) -> Result<Self, ConfigError> {
        let mut cfg: AppConfig =
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.apply_defaults();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let mut cfg = AppConfig::default();
            cfg.apply_defaults();
            cfg.validate()?;
            return Ok(cfg);
        }
        let text = std::fs::read_to_string(path)?;
        Self::load_from_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolution order matters (spec §9 Open Question): `organized_base_path`
    /// is defaulted first; only then is `scan_folders_for_context` resolved
    /// against the now-final value.
    pub fn apply_defaults(&mut self) {
        if self.organized_base_path.is_none() {
            self.organized_base_path = Some(home_dir().join("Documents").join("FileAssistant"));
        }
    }

    /// Folders to scan for classifier context (`get_context_folders`).
    pub fn context_folders(&self) -> Vec<PathBuf> {
        match &self.scan_folders_for_context {
            Some(folders) if !folders.is_empty() => folders.clone(),
            _ => self
                .organized_base_path
                .clone()
                .into_iter()
                .collect::<Vec<_>>(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbox_folders.is_empty() {
            return Err(ConfigError::Missing("inbox_folders".into()));
        }
        if !(1..=10).contains(&self.folder_scan_depth) {
            return Err(ConfigError::Invalid {
                field: "folder_scan_depth".into(),
                reason: "must be within [1, 10]".into(),
            });
        }
        self.confidence_thresholds.validate()?;
        self.processing.validate()?;
        self.ai_settings.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut cfg = AppConfig::default();
        cfg.apply_defaults();
        cfg.validate().unwrap();
        assert!(cfg.organized_base_path.is_some());
    }

    #[test]
    fn context_folders_falls_back_to_organized_base_path() {
        let mut cfg = AppConfig::default();
        cfg.apply_defaults();
        let base = cfg.organized_base_path.clone().unwrap();
        assert_eq!(cfg.context_folders(), vec![base]);
    }

    #[test]
    fn context_folders_prefers_explicit_scan_folders() {
        let mut cfg = AppConfig::default();
        cfg.apply_defaults();
        cfg.scan_folders_for_context = Some(vec![PathBuf::from("/tmp/scan")]);
        assert_eq!(cfg.context_folders(), vec![PathBuf::from("/tmp/scan")]);
    }

    #[test]
    fn rejects_medium_greater_equal_high() {
        let thresholds = ConfidenceThresholds {
            high: 0.8,
            medium: 0.8,
            low: 0.0,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn rejects_empty_inbox_folders() {
        let mut cfg = AppConfig::default();
        cfg.apply_defaults();
        cfg.inbox_folders.clear();
        assert!(cfg.validate().is_err());
    }
}
