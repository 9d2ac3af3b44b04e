//! Configuration management for DSZ sync
//!
//! The configuration is loaded once at startup and is immutable afterwards.
//! Sources, later ones winning:
//!
//! 1. Built-in defaults (the constants below)
//! 2. A TOML file (`dsz-sync.toml`, or `--config` / `DSZ_CONFIG`)
//! 3. `.env` and the `DSZ_BASE_URL`, `DSZ_EMAIL`, `DSZ_PASSWORD`,
//!    `DSZ_DATA_DIR` environment variables
//!
//! Relative artifact paths are resolved against the data directory, which
//! defaults to the directory holding the config file.
//!
//! ```toml
//! [api]
//! email = "ops@example.com"
//! password = "secret"
//!
//! [sync]
//! batch_limit = 200
//! page_delay_ms = 6500
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "dsz-sync.toml";

/// Staging file name, placed next to the output.
pub const DEFAULT_TEMP_OUTPUT: &str = "temp_inventory.json";

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.dropshipzone.com.au";

/// User-Agent sent on every request.
pub const DEFAULT_USER_AGENT: &str = "DSZ-Integrator/1.0";

/// Items requested per page.
pub const DEFAULT_BATCH_LIMIT: u32 = 200;

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Retry ceiling for transport and 5xx failures.
pub const DEFAULT_RETRIES: u32 = 5;

/// Wait between transport/5xx retries in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;

/// Wait after a 429 that carries no usable `retry-after` header.
pub const DEFAULT_RATE_LIMIT_FALLBACK_SECS: u64 = 60;

/// Delay between page requests in milliseconds (~550 requests/hour, under
/// the remote 600/hour ceiling).
pub const DEFAULT_PAGE_DELAY_MS: u64 = 6_500;

/// Smallest output file accepted for publishing, in bytes.
pub const DEFAULT_MIN_OUTPUT_BYTES: u64 = 1024;

/// Cached token lifetime. The server states 8 hours; one hour is kept as margin.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7 * 60 * 60;

/// A cached token is renewed once it is this close to expiry.
pub const DEFAULT_TOKEN_REFRESH_SKEW_SECS: u64 = 300;

/// Age after which a held lock is reported as suspicious.
pub const DEFAULT_STALE_LOCK_SECS: u64 = 2 * 60 * 60;

/// Sink rotation threshold in bytes.
pub const DEFAULT_LOG_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Rotated sink files kept.
pub const DEFAULT_LOG_MAX_BACKUPS: u32 = 5;

/// Full sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote API access
    pub api: ApiConfig,

    /// Artifact locations
    pub paths: PathsConfig,

    /// Tuning constants
    pub sync: TuningConfig,

    /// Operational log sink
    pub logging: SinkConfig,

    /// Base directory for relative paths
    pub data_dir: Option<PathBuf>,
}

/// Remote API access settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            email: String::new(),
            password: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"***")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Artifact locations, relative to the data directory unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub token_store: PathBuf,
    pub lock_file: PathBuf,
    /// Staging file for the download; defaults to a sibling of `output`
    pub temp_output: Option<PathBuf>,
    pub output: PathBuf,
    pub log_file: PathBuf,
    pub summary_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            token_store: PathBuf::from("token_store.json"),
            lock_file: PathBuf::from("sync.lock"),
            temp_output: None,
            output: PathBuf::from("dropshipzone_inventory.json"),
            log_file: PathBuf::from("logs/sync.log"),
            summary_log: PathBuf::from("logs/sync_summary.log"),
        }
    }
}

/// Tuning constants for the fetch pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub batch_limit: u32,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub rate_limit_fallback_secs: u64,
    pub page_delay_ms: u64,
    pub min_output_bytes: u64,
    pub token_lifetime_secs: u64,
    pub token_refresh_skew_secs: u64,
    pub stale_lock_secs: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            rate_limit_fallback_secs: DEFAULT_RATE_LIMIT_FALLBACK_SECS,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            min_output_bytes: DEFAULT_MIN_OUTPUT_BYTES,
            token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            token_refresh_skew_secs: DEFAULT_TOKEN_REFRESH_SKEW_SECS,
            stale_lock_secs: DEFAULT_STALE_LOCK_SECS,
        }
    }
}

impl TuningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Sink rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub max_size: u64,
    pub max_backups: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_LOG_MAX_SIZE,
            max_backups: DEFAULT_LOG_MAX_BACKUPS,
        }
    }
}

impl SyncConfig {
    /// Build a configuration in code (used by tests and embedders)
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                email: email.into(),
                password: password.into(),
                ..ApiConfig::default()
            },
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Load configuration from file and environment, then validate it
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("DSZ_CONFIG").ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(SyncError::config(format!(
                        "Config file '{}' not found",
                        path.display()
                    )));
                }
                Self::from_file(&path)?
            },
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            },
        };

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file; its directory becomes the default data dir
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        if config.data_dir.is_none() {
            config.data_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `DSZ_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DSZ_BASE_URL") {
            self.api.base_url = url;
        }

        if let Ok(email) = std::env::var("DSZ_EMAIL") {
            self.api.email = email;
        }

        if let Ok(password) = std::env::var("DSZ_PASSWORD") {
            self.api.password = password;
        }

        if let Ok(dir) = std::env::var("DSZ_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(SyncError::config("api.base_url cannot be empty"));
        }

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SyncError::config(format!(
                "api.base_url must start with http:// or https:// (got '{}')",
                base_url
            )));
        }

        if self.api.email.trim().is_empty() {
            return Err(SyncError::config("api.email is missing"));
        }

        if self.api.password.is_empty() {
            return Err(SyncError::config("api.password is missing"));
        }

        if self.sync.batch_limit == 0 {
            return Err(SyncError::config("sync.batch_limit must be greater than 0"));
        }

        if self.sync.timeout_secs == 0 {
            return Err(SyncError::config("sync.timeout_secs must be greater than 0"));
        }

        if self.sync.token_lifetime_secs <= self.sync.token_refresh_skew_secs {
            return Err(SyncError::config(format!(
                "sync.token_lifetime_secs ({}) must exceed sync.token_refresh_skew_secs ({})",
                self.sync.token_lifetime_secs, self.sync.token_refresh_skew_secs
            )));
        }

        Ok(())
    }

    /// Base directory for relative artifact paths
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }

    pub fn token_store_path(&self) -> PathBuf {
        self.resolve(&self.paths.token_store)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.resolve(&self.paths.lock_file)
    }

    /// Staging path, next to the output unless configured
    ///
    /// The publish step renames this file onto the output, which only works
    /// within one filesystem.
    pub fn temp_output_path(&self) -> PathBuf {
        match &self.paths.temp_output {
            Some(path) => self.resolve(path),
            None => self.output_path().with_file_name(DEFAULT_TEMP_OUTPUT),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.paths.output)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.paths.log_file)
    }

    pub fn summary_log_path(&self) -> PathBuf {
        self.resolve(&self.paths.summary_log)
    }
}
