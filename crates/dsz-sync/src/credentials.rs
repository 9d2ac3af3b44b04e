//! Credential cache
//!
//! Owns the bearer token used on every catalog request. A token is persisted
//! in the token store (`{"token", "created_at", "expires_at"}`, unix seconds,
//! mode 0600) and reused until it comes within the refresh skew of its expiry.
//!
//! Renewal is a single `POST /auth`. It is never retried here: a credential
//! problem should stop the run straight away, and transient failures of the
//! catalog requests are the fetch engine's concern.

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::error::{excerpt, Result, SyncError};
use chrono::Utc;
use dsz_common::SyncLog;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// A persisted bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Credential {
    /// Issue a credential at `now` with a fixed lifetime
    pub fn issue(token: impl Into<String>, now: i64, lifetime_secs: i64) -> Self {
        Self {
            token: token.into(),
            created_at: now,
            expires_at: now + lifetime_secs,
        }
    }

    /// Valid iff `now < expires_at - skew`
    pub fn is_valid_at(&self, now: i64, skew_secs: i64) -> bool {
        now < self.expires_at - skew_secs
    }

    /// Whole minutes until expiry, rounded to nearest
    pub fn minutes_remaining(&self, now: i64) -> i64 {
        ((self.expires_at - now) as f64 / 60.0).round() as i64
    }
}

// ============================================================================
// Token store
// ============================================================================

/// File-backed credential store with atomic replace
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the next credential is staged in
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the stored credential; missing or unreadable counts as absent
    pub async fn load(&self) -> Option<Credential> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No readable token store");
                return None;
            },
        };

        match serde_json::from_str(&content) {
            Ok(credential) => Some(credential),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Token store is not valid JSON");
                None
            },
        }
    }

    /// Replace the stored credential atomically
    ///
    /// The credential is written to the staging path, restricted to owner
    /// read/write, then renamed over the store, so readers see either the old
    /// file or the complete new one.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        let staging = self.staging_path();
        let result = self.write_and_swap(&staging, credential).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&staging).await;
        }
        result
    }

    async fn write_and_swap(&self, staging: &Path, credential: &Credential) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_vec(credential)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(staging).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        restrict_permissions(staging).await?;
        tokio::fs::rename(staging, &self.path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

// ============================================================================
// Token extraction
// ============================================================================

/// Pull the token out of a successful auth response body
///
/// Accepted shapes, in order:
/// 1. a JSON object with a string `token` or `access_token`
/// 2. a JSON string
/// 3. any body whose trimmed text does not start with `{`, taken verbatim
///
/// Shape 3 accepts servers that answer with the bare token as plain text.
pub fn extract_token(body: &str) -> Option<String> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let from_json = match &parsed {
        Some(Value::Object(map)) => ["token", "access_token"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|t| !t.is_empty())
            .map(str::to_string),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    };

    if from_json.is_some() {
        return from_json;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('{') {
        return Some(trimmed.to_string());
    }

    None
}

// ============================================================================
// Credential cache
// ============================================================================

/// Cached, self-renewing bearer token
///
/// The last credential issued in this process is held in memory and checked
/// before the store, so a failed store write costs one login per process.
pub struct CredentialCache {
    api: ApiClient,
    store: TokenStore,
    issued: Mutex<Option<Credential>>,
    email: String,
    password: String,
    lifetime_secs: i64,
    skew_secs: i64,
    log: SyncLog,
}

impl CredentialCache {
    pub fn new(api: ApiClient, config: &SyncConfig, log: SyncLog) -> Self {
        Self {
            api,
            store: TokenStore::new(config.token_store_path()),
            issued: Mutex::new(None),
            email: config.api.email.clone(),
            password: config.api.password.clone(),
            lifetime_secs: config.sync.token_lifetime_secs as i64,
            skew_secs: config.sync.token_refresh_skew_secs as i64,
            log,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Get a token, logging when the cached one is reused
    pub async fn get_token(&self, force_refresh: bool) -> Result<String> {
        self.fetch_token(force_refresh, true).await
    }

    /// Get a token without the "cached token" notice (used per request)
    pub async fn get_token_quiet(&self, force_refresh: bool) -> Result<String> {
        self.fetch_token(force_refresh, false).await
    }

    /// The credential issued by this cache, else the stored one, if still valid
    pub async fn cached(&self) -> Option<Credential> {
        let now = Utc::now().timestamp();
        let issued = self.issued.lock().await.clone();
        match issued {
            Some(credential) if credential.is_valid_at(now, self.skew_secs) => Some(credential),
            _ => self
                .store
                .load()
                .await
                .filter(|c| c.is_valid_at(now, self.skew_secs)),
        }
    }

    async fn fetch_token(&self, force_refresh: bool, announce: bool) -> Result<String> {
        if !force_refresh {
            if let Some(credential) = self.cached().await {
                if announce {
                    let minutes = credential.minutes_remaining(Utc::now().timestamp());
                    self.log.info(format!(
                        "Using cached token (Valid for {} more mins).",
                        minutes
                    ));
                }
                return Ok(credential.token);
            }
        }

        self.log
            .info("Token expired, missing, or refresh forced. Requesting new one...");
        self.renew().await
    }

    async fn renew(&self) -> Result<String> {
        let url = crate::api::endpoints::auth_url(self.api.base_url());
        self.log.info(format!("POST to: {}", url));

        let response = self
            .api
            .authenticate(&self.email, &self.password)
            .await
            .map_err(|e| SyncError::AuthNetwork(e.to_string()))?;

        if !response.is_ok() {
            return Err(SyncError::auth(response.status, &response.body));
        }

        let token = extract_token(&response.body).ok_or_else(|| {
            SyncError::Auth {
                status: response.status,
                body: format!("Could not find token in response: {}", excerpt(&response.body)),
            }
        })?;

        let credential = Credential::issue(token, Utc::now().timestamp(), self.lifetime_secs);
        *self.issued.lock().await = Some(credential.clone());

        match self.store.save(&credential).await {
            Ok(()) => self.log.info("Success! Token saved."),
            Err(e) => {
                debug!(error = %e, path = %self.store.path().display(), "Token store write failed");
                self.log
                    .warning("Could not save token to file. Cache will not work.");
            },
        }

        Ok(credential.token)
    }
}
