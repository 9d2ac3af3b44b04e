//! `dsz-sync sync` command implementation
//!
//! Runs one sync session and prints a short console report.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::fetch::TokioPause;
use crate::session::{SyncOutcome, SyncSession};
use crate::units::{format_bytes, format_run_duration};
use colored::Colorize;
use dsz_common::SyncLog;
use std::sync::Arc;

/// Run one session against the live API
pub async fn run(config: SyncConfig, log: SyncLog) -> Result<()> {
    let outcome = SyncSession::new(config, log, Arc::new(TokioPause)).run().await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Completed(report) => {
            println!(
                "{} Synced {} products ({} pages) in {}",
                "✓".green(),
                report.records,
                report.pages,
                format_run_duration(report.elapsed)
            );
            println!(
                "  Output: {} ({})",
                report.output.display(),
                format_bytes(report.bytes)
            );
        },
        SyncOutcome::AlreadyRunning { pid } => {
            let holder = pid
                .map(|p| format!(" (PID {})", p))
                .unwrap_or_default();
            println!(
                "{} Another sync is already running{}. Nothing to do.",
                "→".cyan(),
                holder
            );
        },
    }
}
