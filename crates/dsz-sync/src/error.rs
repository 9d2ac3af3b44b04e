//! Error types for DSZ sync
//!
//! Every fatal condition of a sync session maps to one variant here, carrying
//! enough context (URL, status, attempt count, response body) to diagnose a
//! failed cron run from the log alone.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Maximum number of response-body characters kept in an error message
pub const BODY_EXCERPT_CHARS: usize = 500;

/// Error type for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// The auth endpoint answered but did not hand out a token
    #[error("Auth Failed (HTTP {status}). Response: {body}. Check the email/password in the config file.")]
    Auth { status: u16, body: String },

    /// The auth endpoint could not be reached at all
    #[error("Network error during authentication: {0}")]
    AuthNetwork(String),

    /// Transport failures exhausted the retry ceiling
    #[error("Network failure for {url} after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        attempts: u32,
        message: String,
    },

    /// 5xx responses exhausted the retry ceiling
    #[error("Server error {status} for {url} after {attempts} attempt(s): {body}")]
    Server {
        url: String,
        status: u16,
        attempts: u32,
        body: String,
    },

    /// Non-retryable HTTP status
    #[error("API Failed with status {status} for {url}: {body}")]
    Client { url: String, status: u16, body: String },

    /// Still 401 after a forced credential refresh
    #[error("Token refresh failed. Still getting 401 for {url}. Check the account's API access.")]
    Unauthorized { url: String },

    /// A 200 response whose body is not the expected JSON
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// Output failed validation or could not be published
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Process lock could not be opened or written
    #[error("Lock file error: {0}")]
    Lock(String),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check the config file and DSZ_* environment variables.")]
    Config(String),

    /// The session was stopped by a termination signal
    #[error("Sync interrupted by {0}")]
    Interrupted(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Config file is not valid TOML
    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create a lock error
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::Lock(msg.into())
    }

    /// Create an auth error, truncating the body for the log
    pub fn auth(status: u16, body: &str) -> Self {
        Self::Auth {
            status,
            body: excerpt(body),
        }
    }

    /// Whether this error came from credential acquisition
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::AuthNetwork(_) | Self::Unauthorized { .. }
        )
    }
}

/// Trim a response body to a log-friendly excerpt
pub fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{}…", cut)
}
