//! Repository configuration via `warcrepo.toml`
//!
//! Configuration lives in a TOML file next to the data (or is built
//! programmatically, which is what the tests do). On first open a default
//! `warcrepo.toml` can be written; to change settings, edit the file and
//! restart.

use crate::error::{RepoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name placed next to the repository data.
pub const CONFIG_FILE_NAME: &str = "warcrepo.toml";

/// One gibibyte; default seal threshold for AU active WARCs.
pub const DEFAULT_THRESHOLD_WARC_SIZE: u64 = 1024 * 1024 * 1024;

/// One week in milliseconds; default TTL for unacknowledged temp artifacts.
pub const DEFAULT_UNCOMMITTED_EXPIRATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// base_paths = ["/data/repo"]
/// threshold_warc_size = 1073741824
/// uncommitted_artifact_expiration_ms = 604800000
/// use_warc_compression = false
/// block_size = 4096
/// commit_worker_count = 2
/// gc_interval_ms = 600000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Directories used for permanent storage and temp WARCs, in preference
    /// order (multi-disk support). Writes go to the first with room; reads
    /// dispatch on the storage URL's path.
    pub base_paths: Vec<PathBuf>,

    /// Seal-on-size for AU active WARCs; `0` disables sealing.
    #[serde(default = "default_threshold_warc_size")]
    pub threshold_warc_size: u64,

    /// TTL in milliseconds for unacknowledged temp artifacts.
    #[serde(default = "default_uncommitted_expiration_ms")]
    pub uncommitted_artifact_expiration_ms: u64,

    /// Whether new WARCs are gzipped per-record.
    #[serde(default)]
    pub use_warc_compression: bool,

    /// Filesystem block size used by the temp-pool best-fit heuristic.
    #[serde(default = "default_block_size")]
    pub block_size: u64,

    /// Size of the commit copy worker pool.
    #[serde(default = "default_commit_worker_count")]
    pub commit_worker_count: usize,

    /// Temp-WARC garbage-collection period in milliseconds.
    #[serde(default = "default_gc_interval_ms")]
    pub gc_interval_ms: u64,
}

fn default_threshold_warc_size() -> u64 {
    DEFAULT_THRESHOLD_WARC_SIZE
}

fn default_uncommitted_expiration_ms() -> u64 {
    DEFAULT_UNCOMMITTED_EXPIRATION_MS
}

fn default_block_size() -> u64 {
    4096
}

fn default_commit_worker_count() -> usize {
    2
}

fn default_gc_interval_ms() -> u64 {
    10 * 60 * 1000
}

impl RepoConfig {
    /// Config with a single base path and defaults for everything else.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_paths: vec![base_path.into()],
            threshold_warc_size: default_threshold_warc_size(),
            uncommitted_artifact_expiration_ms: default_uncommitted_expiration_ms(),
            use_warc_compression: false,
            block_size: default_block_size(),
            commit_worker_count: default_commit_worker_count(),
            gc_interval_ms: default_gc_interval_ms(),
        }
    }

    /// TTL for unacknowledged temp artifacts.
    pub fn uncommitted_artifact_expiration(&self) -> Duration {
        Duration::from_millis(self.uncommitted_artifact_expiration_ms)
    }

    /// Temp-WARC garbage-collection period.
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when no base path is configured, the block size is
    /// zero, or the worker pool is empty.
    pub fn validate(&self) -> Result<()> {
        if self.base_paths.is_empty() {
            return Err(RepoError::invalid_argument("no base paths configured"));
        }
        if self.block_size == 0 {
            return Err(RepoError::invalid_argument("block_size must be positive"));
        }
        if self.commit_worker_count == 0 {
            return Err(RepoError::invalid_argument(
                "commit_worker_count must be positive",
            ));
        }
        Ok(())
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RepoConfig = toml::from_str(&content).map_err(|e| {
            RepoError::invalid_argument(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            RepoError::illegal_state(format!("failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write this config if no file exists yet. Returns `Ok(())` whether the
    /// file was created or already present.
    pub fn write_if_missing(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            self.write_to_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RepoConfig::new("/data/repo");
        assert_eq!(config.base_paths, vec![PathBuf::from("/data/repo")]);
        assert_eq!(config.threshold_warc_size, 1024 * 1024 * 1024);
        assert_eq!(
            config.uncommitted_artifact_expiration(),
            Duration::from_millis(604_800_000)
        );
        assert!(!config.use_warc_compression);
        assert_eq!(config.block_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_base_paths() {
        let mut config = RepoConfig::new("/data/repo");
        config.base_paths.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_block_size() {
        let mut config = RepoConfig::new("/data/repo");
        config.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = RepoConfig::new(dir.path());
        config.use_warc_compression = true;
        config.threshold_warc_size = 1024;
        config.write_to_file(&path).unwrap();

        let loaded = RepoConfig::from_file(&path).unwrap();
        assert!(loaded.use_warc_compression);
        assert_eq!(loaded.threshold_warc_size, 1024);
        assert_eq!(loaded.base_paths, config.base_paths);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "base_paths = [\"/data/repo\"]\n").unwrap();

        let config = RepoConfig::from_file(&path).unwrap();
        assert_eq!(config.threshold_warc_size, DEFAULT_THRESHOLD_WARC_SIZE);
        assert_eq!(config.commit_worker_count, 2);
    }

    #[test]
    fn test_write_if_missing_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut first = RepoConfig::new("/a");
        first.block_size = 512;
        first.write_to_file(&path).unwrap();

        RepoConfig::new("/b").write_if_missing(&path).unwrap();

        let loaded = RepoConfig::from_file(&path).unwrap();
        assert_eq!(loaded.base_paths, vec![PathBuf::from("/a")]);
        assert_eq!(loaded.block_size, 512);
    }
}
