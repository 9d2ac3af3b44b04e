//! `dsz-sync token` command implementation
//!
//! Acquires a token through the credential cache and prints a short prefix.
//! Useful for checking credentials without running a full sync.

use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::credentials::CredentialCache;
use crate::error::Result;
use colored::Colorize;
use dsz_common::SyncLog;

/// Characters of the token shown on the console
const TOKEN_PREVIEW_CHARS: usize = 15;

/// Get (or renew with `force`) a token and print its prefix
pub async fn run(config: &SyncConfig, log: SyncLog, force: bool) -> Result<()> {
    let api = ApiClient::from_config(config)?;
    let credentials = CredentialCache::new(api, config, log);

    let token = credentials.get_token(force).await?;
    println!("{} Token: {}...", "✓".green(), preview(&token));

    Ok(())
}

fn preview(token: &str) -> String {
    token.chars().take(TOKEN_PREVIEW_CHARS).collect()
}
