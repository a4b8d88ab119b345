//! Configuration module for drivesync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file kept in the metadata directory, with loading, validation, defaults,
//! and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the configuration file inside the metadata directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Retries for throttled (429) and server (5xx) responses.
    pub max_retries: u32,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of concurrent content transfers.
    pub transfer_concurrency: usize,
    /// Number of ids per batched metadata request.
    pub metadata_batch_size: usize,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client id of the desktop application.
    pub client_id: Option<String>,
    /// OAuth client secret (desktop clients are not confidential).
    pub client_secret: Option<String>,
    /// Loopback port for the authorization callback.
    pub redirect_port: u16,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
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

    /// Location of the configuration file inside a metadata directory.
    pub fn path_in(metadata_dir: &Path) -> PathBuf {
        metadata_dir.join(CONFIG_FILE_NAME)
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            read_timeout_ms: 120_000,
            max_retries: 3,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transfer_concurrency: 8,
            metadata_batch_size: 100,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_port: 8400,
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
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.transfer_concurrency"`.
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

/// Upper bound for `sync.transfer_concurrency`.
const MAX_TRANSFER_CONCURRENCY: usize = 64;

/// Upper bound for `http.max_retries`.
const MAX_RETRIES: u32 = 10;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- http ---
        if self.http.connect_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "http.connect_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.http.read_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "http.read_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.http.max_retries > MAX_RETRIES {
            errors.push(ValidationError {
                field: "http.max_retries".into(),
                message: format!("must be at most {MAX_RETRIES}"),
            });
        }

        // --- sync ---
        if self.sync.transfer_concurrency == 0
            || self.sync.transfer_concurrency > MAX_TRANSFER_CONCURRENCY
        {
            errors.push(ValidationError {
                field: "sync.transfer_concurrency".into(),
                message: format!("must be between 1 and {MAX_TRANSFER_CONCURRENCY}"),
            });
        }
        if self.sync.metadata_batch_size == 0 {
            errors.push(ValidationError {
                field: "sync.metadata_batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- auth ---
        if self.auth.redirect_port == 0 {
            errors.push(ValidationError {
                field: "auth.redirect_port".into(),
                message: "must be a non-zero port".into(),
            });
        }
        if let Some(id) = &self.auth.client_id {
            if id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "auth.client_id".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
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

/// Fluent builder for [`Config`].
///
/// ```
/// use drivesync_core::config::ConfigBuilder;
///
/// let cfg = ConfigBuilder::new()
///     .transfer_concurrency(4)
///     .logging_level("debug")
///     .build();
/// assert_eq!(cfg.sync.transfer_concurrency, 4);
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

    // --- http ---

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.http.connect_timeout_ms = ms;
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.http.read_timeout_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.http.max_retries = n;
        self
    }

    // --- sync ---

    pub fn transfer_concurrency(mut self, n: usize) -> Self {
        self.config.sync.transfer_concurrency = n;
        self
    }

    pub fn metadata_batch_size(mut self, n: usize) -> Self {
        self.config.sync.metadata_batch_size = n;
        self
    }

    // --- auth ---

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.auth.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.client_secret = Some(secret.into());
        self
    }

    pub fn redirect_port(mut self, port: u16) -> Self {
        self.config.auth.redirect_port = port;
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
        assert_eq!(cfg.http.connect_timeout_ms, 30_000);
        assert_eq!(cfg.http.read_timeout_ms, 120_000);
        assert_eq!(cfg.http.max_retries, 3);
        assert_eq!(cfg.sync.transfer_concurrency, 8);
        assert_eq!(cfg.sync.metadata_batch_size, 100);
        assert!(cfg.auth.client_id.is_none());
        assert_eq!(cfg.auth.redirect_port, 8400);
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
http:
  connect_timeout_ms: 1000
  read_timeout_ms: 2000
  max_retries: 1
sync:
  transfer_concurrency: 2
  metadata_batch_size: 50
auth:
  client_id: "abc.apps.googleusercontent.com"
  client_secret: "s3cret"
  redirect_port: 9000
logging:
  level: debug
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.http.connect_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.http.read_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.http.max_retries, 1);
        assert_eq!(cfg.sync.transfer_concurrency, 2);
        assert_eq!(cfg.sync.metadata_batch_size, 50);
        assert_eq!(
            cfg.auth.client_id.as_deref(),
            Some("abc.apps.googleusercontent.com")
        );
        assert_eq!(cfg.auth.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.auth.redirect_port, 9000);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"sync:\n  transfer_concurrency: 3\n").unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).unwrap();
        assert_eq!(cfg.sync.transfer_concurrency, 3);
        assert_eq!(cfg.sync.metadata_batch_size, 100);
        assert_eq!(cfg.http.read_timeout_ms, 120_000);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.sync.transfer_concurrency, 8);
    }

    #[test]
    fn load_invalid_yaml_returns_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"sync: [not, a, map").unwrap();
        tmp.flush().unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn path_in_metadata_dir() {
        let p = Config::path_in(Path::new("/home/u/drive/.drivesync"));
        assert_eq!(p, PathBuf::from("/home/u/drive/.drivesync/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn validate_zero_timeouts() {
        let cfg = ConfigBuilder::new()
            .connect_timeout_ms(0)
            .read_timeout_ms(0)
            .build();
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"http.connect_timeout_ms".to_string()));
        assert!(fields.contains(&"http.read_timeout_ms".to_string()));
    }

    #[test]
    fn validate_transfer_concurrency_range() {
        for bad in [0, 65] {
            let errors = ConfigBuilder::new().transfer_concurrency(bad).build().validate();
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "sync.transfer_concurrency");
        }
        assert!(ConfigBuilder::new()
            .transfer_concurrency(64)
            .build()
            .validate()
            .is_empty());
    }

    #[test]
    fn validate_bad_log_level() {
        let errors = ConfigBuilder::new().logging_level("loud").build().validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("loud"));
    }

    #[test]
    fn validate_blank_client_id() {
        let errors = ConfigBuilder::new().client_id("  ").build().validate();
        assert_eq!(errors[0].field, "auth.client_id");
    }

    #[test]
    fn validate_too_many_retries() {
        let errors = ConfigBuilder::new().max_retries(11).build().validate();
        assert_eq!(errors[0].field, "http.max_retries");
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError {
            field: "sync.metadata_batch_size".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(e.to_string(), "sync.metadata_batch_size: must be greater than 0");
    }

    // -- Builder --

    #[test]
    fn builder_sets_all_sections() {
        let cfg = ConfigBuilder::new()
            .max_retries(5)
            .metadata_batch_size(10)
            .client_id("cid")
            .client_secret("sec")
            .redirect_port(1234)
            .build();
        assert_eq!(cfg.http.max_retries, 5);
        assert_eq!(cfg.sync.metadata_batch_size, 10);
        assert_eq!(cfg.auth.client_id.as_deref(), Some("cid"));
        assert_eq!(cfg.auth.client_secret.as_deref(), Some("sec"));
        assert_eq!(cfg.auth.redirect_port, 1234);
    }

    #[test]
    fn build_validated_rejects_invalid() {
        let result = ConfigBuilder::new().metadata_batch_size(0).build_validated();
        assert!(result.is_err());
        assert!(ConfigBuilder::new().build_validated().is_ok());
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let cfg = ConfigBuilder::new().client_id("x").logging_level("warn").build();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.auth.client_id.as_deref(), Some("x"));
        assert_eq!(back.logging.level, "warn");
    }
}
