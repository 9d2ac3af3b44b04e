//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod status;
pub mod sync;
pub mod token;

use crate::config::SyncConfig;
use crate::error::Result;
use dsz_common::sink::RotatingFileSink;
use dsz_common::SyncLog;
use std::sync::Arc;

/// Open the operational log configured for this run
pub fn open_sync_log(config: &SyncConfig) -> Result<SyncLog> {
    let sink = RotatingFileSink::new(
        config.log_path(),
        config.logging.max_size,
        config.logging.max_backups,
    )
    .map_err(|e| {
        crate::error::SyncError::config(format!(
            "Cannot open log file {}: {}",
            config.log_path().display(),
            e
        ))
    })?;
    Ok(SyncLog::new(Arc::new(sink)))
}
