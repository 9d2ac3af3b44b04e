//! DSZ Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared logging and error handling for the DSZ sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber setup for console diagnostics
//! - **Sink**: the append-only operational log every sync component writes to
//!
//! # Example
//!
//! ```no_run
//! use dsz_common::sink::{RotatingFileSink, SyncLog};
//! use std::sync::Arc;
//!
//! fn open_log() -> dsz_common::Result<SyncLog> {
//!     let sink = RotatingFileSink::new("logs/sync.log", 5 * 1024 * 1024, 5)?;
//!     let log = SyncLog::new(Arc::new(sink));
//!     log.info("Starting Streaming Download...");
//!     Ok(log)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod sink;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use sink::{Sink, SyncLog};
