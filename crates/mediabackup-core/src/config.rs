//! Configuration module for the backup engine.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::BucketId;
use crate::hashing::ContentHashAlgorithm;

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the backup engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub storage: StorageConfig,
    /// Local source buckets available to the directory enumerator.
    pub buckets: Vec<BucketConfig>,
    /// Bucket offered when the user enables backup without choosing one.
    pub default_bucket: Option<i64>,
    pub logging: LoggingConfig,
}

/// Backup pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Maximum number of files in flight (enqueued) per folder.
    pub upload_limit_threshold: u32,
    /// Failed uploads are retried automatically while attempts stay below this.
    pub backup_max_attempts: u32,
    /// Device space (in MiB) uploads must never eat into.
    pub reserved_left_space_mb: u64,
    /// Page size of remote duplicate lookups.
    pub api_page_size: u32,
    /// Page size of state store reads.
    pub db_page_size: u32,
    /// Leading files of a batch uploaded with thumbnail caching.
    pub thumbnail_cache_limit: u32,
    /// Thumbnail caching is only used while free space (in MiB) exceeds this.
    pub thumbnail_storage_threshold_mb: u64,
    /// Digest used for content hashes.
    pub content_hash_algorithm: ContentHashAlgorithm,
    /// Folders not synced for this many seconds are re-triggered by the sweep.
    pub stale_sync_window_secs: u64,
    /// Seconds between stale-folder sweeps.
    pub sweep_interval_secs: u64,
    /// Enqueued files older than this many seconds are reconciled to failed.
    pub enqueued_timeout_secs: u64,
}

/// State store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database.
    pub database: PathBuf,
}

/// A local source bucket backed by a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub id: i64,
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/mediabackup/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("mediabackup")
            .join("config.yaml")
    }

    /// The configured default bucket, if any.
    pub fn default_bucket_id(&self) -> Option<BucketId> {
        self.default_bucket.map(BucketId::new)
    }
}

impl BackupConfig {
    /// Page size for duplicate resolution, bounded by both the API and the store.
    pub fn batch_size(&self) -> u32 {
        self.api_page_size.min(self.db_page_size)
    }

    pub fn reserved_left_space_bytes(&self) -> u64 {
        self.reserved_left_space_mb.saturating_mul(MIB)
    }

    pub fn thumbnail_storage_threshold_bytes(&self) -> u64 {
        self.thumbnail_storage_threshold_mb.saturating_mul(MIB)
    }

    pub fn stale_sync_window(&self) -> Duration {
        Duration::from_secs(self.stale_sync_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn enqueued_timeout(&self) -> Duration {
        Duration::from_secs(self.enqueued_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            upload_limit_threshold: 10,
            backup_max_attempts: 3,
            reserved_left_space_mb: 500,
            api_page_size: 150,
            db_page_size: 500,
            thumbnail_cache_limit: 20,
            thumbnail_storage_threshold_mb: 1024,
            content_hash_algorithm: ContentHashAlgorithm::Sha256,
            stale_sync_window_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            enqueued_timeout_secs: 6 * 60 * 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("mediabackup")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"backup.api_page_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- backup ---
        let backup = &self.backup;
        positive(
            "backup.upload_limit_threshold",
            backup.upload_limit_threshold.into(),
        );
        positive("backup.backup_max_attempts", backup.backup_max_attempts.into());
        positive("backup.api_page_size", backup.api_page_size.into());
        positive("backup.db_page_size", backup.db_page_size.into());
        positive("backup.stale_sync_window_secs", backup.stale_sync_window_secs);
        positive("backup.sweep_interval_secs", backup.sweep_interval_secs);
        positive("backup.enqueued_timeout_secs", backup.enqueued_timeout_secs);

        // --- buckets ---
        let mut seen = HashSet::new();
        for bucket in &self.buckets {
            if !seen.insert(bucket.id) {
                errors.push(ValidationError {
                    field: "buckets".into(),
                    message: format!("duplicate bucket id {}", bucket.id),
                });
            }
            if !bucket.path.is_absolute() {
                errors.push(ValidationError {
                    field: format!("buckets.{}.path", bucket.id),
                    message: format!("path must be absolute: {}", bucket.path.display()),
                });
            }
        }
        if let Some(default) = self.default_bucket {
            if !seen.contains(&default) {
                errors.push(ValidationError {
                    field: "default_bucket".into(),
                    message: format!("bucket {default} is not configured"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use mediabackup_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .bucket(1, PathBuf::from("/home/user/Pictures"))
///     .default_bucket(1)
///     .upload_limit_threshold(5)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backup ---

    pub fn upload_limit_threshold(mut self, n: u32) -> Self {
        self.config.backup.upload_limit_threshold = n;
        self
    }

    pub fn backup_max_attempts(mut self, n: u32) -> Self {
        self.config.backup.backup_max_attempts = n;
        self
    }

    pub fn reserved_left_space_mb(mut self, mb: u64) -> Self {
        self.config.backup.reserved_left_space_mb = mb;
        self
    }

    pub fn page_sizes(mut self, api: u32, db: u32) -> Self {
        self.config.backup.api_page_size = api;
        self.config.backup.db_page_size = db;
        self
    }

    pub fn thumbnail_cache(mut self, limit: u32, storage_threshold_mb: u64) -> Self {
        self.config.backup.thumbnail_cache_limit = limit;
        self.config.backup.thumbnail_storage_threshold_mb = storage_threshold_mb;
        self
    }

    pub fn content_hash_algorithm(mut self, algorithm: ContentHashAlgorithm) -> Self {
        self.config.backup.content_hash_algorithm = algorithm;
        self
    }

    pub fn stale_sync_window_secs(mut self, seconds: u64) -> Self {
        self.config.backup.stale_sync_window_secs = seconds;
        self
    }

    pub fn sweep_interval_secs(mut self, seconds: u64) -> Self {
        self.config.backup.sweep_interval_secs = seconds;
        self
    }

    pub fn enqueued_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.backup.enqueued_timeout_secs = seconds;
        self
    }

    // --- storage ---

    pub fn database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- buckets ---

    pub fn bucket(mut self, id: i64, path: PathBuf) -> Self {
        self.config.buckets.push(BucketConfig { id, path });
        self
    }

    pub fn default_bucket(mut self, id: i64) -> Self {
        self.config.default_bucket = Some(id);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.backup.upload_limit_threshold, 10);
        assert_eq!(cfg.backup.backup_max_attempts, 3);
        assert_eq!(cfg.backup.reserved_left_space_mb, 500);
        assert_eq!(cfg.backup.batch_size(), 150);
        assert_eq!(
            cfg.backup.content_hash_algorithm,
            ContentHashAlgorithm::Sha256
        );
        assert_eq!(cfg.backup.stale_sync_window(), Duration::from_secs(86_400));
        assert!(cfg.buckets.is_empty());
        assert!(cfg.storage.database.ends_with("mediabackup/state.db"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
backup:
  upload_limit_threshold: 4
  backup_max_attempts: 5
  reserved_left_space_mb: 100
  api_page_size: 50
  db_page_size: 20
  content_hash_algorithm: sha512
storage:
  database: /tmp/mediabackup-test.db
buckets:
  - id: 1
    path: /tmp/camera
  - id: 2
    path: /tmp/screenshots
default_bucket: 1
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.backup.upload_limit_threshold, 4);
        assert_eq!(cfg.backup.backup_max_attempts, 5);
        assert_eq!(cfg.backup.reserved_left_space_bytes(), 100 * MIB);
        assert_eq!(cfg.backup.batch_size(), 20);
        assert_eq!(
            cfg.backup.content_hash_algorithm,
            ContentHashAlgorithm::Sha512
        );
        // unspecified fields keep their defaults
        assert_eq!(cfg.backup.thumbnail_cache_limit, 20);
        assert_eq!(cfg.storage.database, PathBuf::from("/tmp/mediabackup-test.db"));
        assert_eq!(cfg.buckets.len(), 2);
        assert_eq!(cfg.default_bucket_id(), Some(BucketId::new(1)));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.backup.upload_limit_threshold, 10);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_backup_values() {
        let mut cfg = Config::default();
        cfg.backup.upload_limit_threshold = 0;
        cfg.backup.backup_max_attempts = 0;
        cfg.backup.api_page_size = 0;
        cfg.backup.sweep_interval_secs = 0;
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"backup.upload_limit_threshold".to_string()));
        assert!(fields.contains(&"backup.backup_max_attempts".to_string()));
        assert!(fields.contains(&"backup.api_page_size".to_string()));
        assert!(fields.contains(&"backup.sweep_interval_secs".to_string()));
    }

    #[test]
    fn validate_catches_bucket_problems() {
        let cfg = ConfigBuilder::new()
            .bucket(1, PathBuf::from("/tmp/a"))
            .bucket(1, PathBuf::from("relative/b"))
            .default_bucket(9)
            .build();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"buckets".to_string()));
        assert!(fields.contains(&"buckets.1.path".to_string()));
        assert!(fields.contains(&"default_bucket".to_string()));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".into();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    // -- Builder --

    #[test]
    fn builder_overrides_and_validates() {
        let cfg = ConfigBuilder::new()
            .upload_limit_threshold(2)
            .page_sizes(10, 5)
            .bucket(3, PathBuf::from("/tmp/photos"))
            .default_bucket(3)
            .build_validated()
            .expect("valid config");
        assert_eq!(cfg.backup.upload_limit_threshold, 2);
        assert_eq!(cfg.backup.batch_size(), 5);

        let err = ConfigBuilder::new()
            .backup_max_attempts(0)
            .build_validated()
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].to_string(), "backup.backup_max_attempts: must be greater than 0");
    }
}
