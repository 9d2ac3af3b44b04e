//! DSZ Sync Library
//!
//! Keeps a local JSON snapshot of the Dropshipzone product catalog
//! (`sku`, `stock`, `price`) in step with the remote API.
//!
//! # Overview
//!
//! - **Credentials**: cached bearer token with atomic, owner-only persistence
//!   ([`credentials`])
//! - **Single flight**: OS advisory process lock with guaranteed release
//!   ([`lock`])
//! - **Fetch**: paginated catalog reads under an explicit retry policy
//!   ([`fetch`])
//! - **Publish**: streaming JSON array writer with size check and atomic
//!   rename ([`publisher`])
//! - **Session**: the above wired together, all or nothing ([`session`])
//!
//! # Example
//!
//! ```no_run
//! use dsz_sync::config::SyncConfig;
//! use dsz_sync::fetch::TokioPause;
//! use dsz_sync::session::run_sync;
//! use dsz_common::SyncLog;
//! use std::sync::Arc;
//!
//! # async fn example() -> dsz_sync::Result<()> {
//! let config = SyncConfig::load(None)?;
//! let outcome = run_sync(config, SyncLog::discard(), Arc::new(TokioPause)).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod publisher;
pub mod session;
pub mod summary;
pub mod units;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use session::{run_sync, SyncOutcome, SyncReport};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DSZ Sync - Dropshipzone inventory snapshot
#[derive(Parser, Debug)]
#[command(name = "dsz-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./dsz-sync.toml)
    #[arg(short, long, env = "DSZ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print the CLI reference as Markdown and exit
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the catalog and publish a fresh inventory snapshot
    Sync,

    /// Get a bearer token (from cache or by logging in) and print its prefix
    Token {
        /// Ignore the cached token and log in again
        #[arg(short, long)]
        force: bool,
    },

    /// Show token, lock and output state
    Status,
}
