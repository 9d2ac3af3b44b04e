//! `dsz-sync status` command implementation
//!
//! Shows token, lock and output state. Makes no network calls.

use crate::config::SyncConfig;
use crate::credentials::TokenStore;
use crate::error::Result;
use crate::lock::{LockState, ProcessLock};
use crate::units::{format_age, format_bytes};
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use dsz_common::SyncLog;

/// Print the state of the local sync artifacts
pub async fn run(config: &SyncConfig) -> Result<()> {
    println!("{}", "Token:".cyan().bold());
    let store = TokenStore::new(config.token_store_path());
    match store.load().await {
        Some(credential) => {
            let now = Utc::now().timestamp();
            let skew = config.sync.token_refresh_skew_secs as i64;
            if credential.is_valid_at(now, skew) {
                println!(
                    "  {} valid for {} more mins",
                    "✓".green(),
                    credential.minutes_remaining(now)
                );
            } else {
                println!("  {} expired (renewed on next sync)", "✗".yellow());
            }
        },
        None => println!("  {} none cached", "-".dimmed()),
    }
    println!("  Store: {}", store.path().display());
    println!();

    println!("{}", "Lock:".cyan().bold());
    let lock = ProcessLock::from_config(config, SyncLog::discard());
    match lock.inspect()? {
        LockState::Free => println!("  {} free", "✓".green()),
        LockState::Abandoned { pid } => println!(
            "  {} left behind by PID {} (cleaned up on next sync)",
            "!".yellow(),
            describe_pid(pid)
        ),
        LockState::Held { pid, held_for } => println!(
            "  {} held by PID {}{}",
            "→".cyan(),
            describe_pid(pid),
            held_for
                .map(|age| format!(" for {}", format_age(age)))
                .unwrap_or_default()
        ),
    }
    println!();

    println!("{}", "Output:".cyan().bold());
    let output = config.output_path();
    match tokio::fs::metadata(&output).await {
        Ok(meta) => {
            println!("  Path:     {}", output.display());
            println!("  Size:     {}", format_bytes(meta.len()));
            if let Ok(modified) = meta.modified() {
                let modified: DateTime<Local> = modified.into();
                println!("  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
            }
        },
        Err(_) => {
            println!("  {} not published yet", "-".dimmed());
            println!("  Run 'dsz-sync sync' to download the catalog.");
        },
    }

    Ok(())
}

fn describe_pid(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
