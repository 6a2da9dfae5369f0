use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SimilarityThreshold;

/// Files larger than this are skipped during discovery
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// How candidates are matched against existing groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupingStrategy {
    /// First representative within the similarity threshold wins
    #[default]
    Threshold,

    /// Only bit-identical fingerprints are grouped (hash bucket lookup)
    ExactHash,
}

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Configuration for a duplicate scan and the deletion ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum similarity percentage for two images to be duplicates (70-100)
    pub similarity_threshold: u8,

    /// Whether to descend into subdirectories
    pub recursive_search: bool,

    /// Number of candidates processed between progress/cancellation checks
    pub chunk_size: usize,

    /// Size guard in bytes; larger files are skipped
    pub max_file_size: u64,

    /// Whether to decode and fingerprint a chunk in parallel
    pub parallel_decode: bool,

    /// Number of threads to use for decoding (0 = auto)
    pub threads: usize,

    /// Matching granularity used by the grouper
    pub grouping: GroupingStrategy,

    /// Where the undo ledger keeps backup copies of deleted files
    pub backup_dir: PathBuf,

    /// Maximum number of undoable operations retained
    pub max_history: usize,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: 85,
            recursive_search: true,
            chunk_size: 10,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            parallel_decode: true,
            threads: 0, // Auto
            grouping: GroupingStrategy::Threshold,
            backup_dir: default_backup_dir(),
            max_history: 100,
            log_level: LogLevel::Info,
        }
    }
}

fn default_backup_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".image_dedup_backup"))
        .unwrap_or_else(|| PathBuf::from("backup"))
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.threshold()?;

        if self.chunk_size == 0 {
            return Err(Error::Configuration(
                "Chunk size must be at least 1".to_string(),
            ));
        }

        if self.max_history == 0 {
            return Err(Error::Configuration(
                "Undo history must retain at least one operation".to_string(),
            ));
        }

        Ok(())
    }

    /// The similarity threshold as a validated value
    pub fn threshold(&self) -> Result<SimilarityThreshold> {
        SimilarityThreshold::new(self.similarity_threshold)
    }

    /// Number of decode threads, resolving 0 to the CPU count
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.similarity_threshold, 85);
        assert!(config.recursive_search);
        assert_eq!(config.max_history, 100);
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        for threshold in [0, 69, 101, 255] {
            let config = Config {
                similarity_threshold: threshold,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        }
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let config = Config {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image-dedup.json");
        let config = Config {
            similarity_threshold: 92,
            recursive_search: false,
            grouping: GroupingStrategy::ExactHash,
            ..Default::default()
        };

        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.similarity_threshold, 92);
        assert!(!loaded.recursive_search);
        assert_eq!(loaded.grouping, GroupingStrategy::ExactHash);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "similarity_threshold": 75 }"#).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.similarity_threshold, 75);
        assert_eq!(loaded.chunk_size, 10);
    }
}
