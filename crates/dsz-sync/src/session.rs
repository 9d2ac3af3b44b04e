//! Sync session orchestration
//!
//! One session is: take the process lock, make sure a token is available,
//! stream every catalog page into the temp output, validate and publish it,
//! then append the run summary. The outcome is all or nothing: either the
//! canonical output is replaced by a complete catalog or it is left exactly
//! as it was.

use crate::api::{endpoints, ApiClient};
use crate::config::SyncConfig;
use crate::credentials::CredentialCache;
use crate::error::Result;
use crate::fetch::{FetchEngine, Pause};
use crate::lock::{LockOutcome, ProcessLock};
use crate::publisher::StreamingPublisher;
use crate::summary;
use dsz_common::sink::RotatingFileSink;
use dsz_common::{Sink, SyncLog};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span, Instrument};

/// What a finished session did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another process holds the lock; nothing was done
    AlreadyRunning { pid: Option<u32> },
}

/// Figures for a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub output: PathBuf,
    pub records: u64,
    pub pages: u32,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// A configured, not yet started sync session
pub struct SyncSession {
    config: SyncConfig,
    log: SyncLog,
    pause: Arc<dyn Pause>,
    summary: Option<Arc<dyn Sink>>,
}

impl SyncSession {
    pub fn new(config: SyncConfig, log: SyncLog, pause: Arc<dyn Pause>) -> Self {
        Self {
            config,
            log,
            pause,
            summary: None,
        }
    }

    /// Write run summaries here instead of the configured summary file
    pub fn with_summary_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.summary = Some(sink);
        self
    }

    /// Run the session to completion
    ///
    /// Every fatal error is logged to the sink before it is returned. The lock
    /// and temp output are released before this returns, whatever the result.
    pub async fn run(&self) -> Result<SyncOutcome> {
        let started = Instant::now();
        let lock = ProcessLock::from_config(&self.config, self.log.clone());

        let guard = match lock.acquire() {
            Ok(LockOutcome::Acquired(guard)) => guard,
            Ok(LockOutcome::AlreadyRunning { pid, .. }) => {
                return Ok(SyncOutcome::AlreadyRunning { pid });
            },
            Err(e) => {
                self.log.error(format!("Critical Error: {}", e));
                return Err(e);
            },
        };

        let span = info_span!("sync", lock = %guard.lock_path().display());
        let result = self.run_locked(started).instrument(span).await;

        if let Err(e) = &result {
            self.log.error(format!("Critical Error: {}", e));
        }

        drop(guard);
        result.map(SyncOutcome::Completed)
    }

    async fn run_locked(&self, started: Instant) -> Result<SyncReport> {
        let config = &self.config;
        let api = ApiClient::from_config(config)?;
        let credentials = CredentialCache::new(api.clone(), config, self.log.clone());

        // Fail on credentials before touching any output
        credentials.get_token(false).await?;

        let mut publisher = StreamingPublisher::create(
            config.temp_output_path(),
            config.output_path(),
            config.sync.min_output_bytes,
        )
        .await?;

        self.log.info("Starting Streaming Download...");
        self.log.info(format!(
            "Target: {}",
            endpoints::products_root_url(api.base_url())
        ));

        let engine = FetchEngine::new(
            api,
            credentials,
            config,
            self.pause.clone(),
            self.log.clone(),
        );
        let fetched = engine.run(&mut publisher).await?;

        self.log.info("Download complete. Validating...");
        let published = publisher.finish().await?;

        self.log.info(format!(
            "Success! Inventory saved to {}",
            published.path.display()
        ));
        self.log
            .info(format!("Total Products Processed: {}", fetched.records));

        let elapsed = started.elapsed();
        self.write_summary(elapsed, fetched.records);

        Ok(SyncReport {
            output: published.path,
            records: fetched.records,
            pages: fetched.pages,
            bytes: published.bytes,
            elapsed,
        })
    }

    fn write_summary(&self, elapsed: Duration, products: u64) {
        let sink: Arc<dyn Sink> = match &self.summary {
            Some(sink) => sink.clone(),
            None => match RotatingFileSink::append_only(self.config.summary_log_path()) {
                Ok(sink) => Arc::new(sink),
                Err(e) => {
                    self.log
                        .warning(format!("Could not open summary log: {}", e));
                    return;
                },
            },
        };

        if let Err(e) = summary::record_success(sink.as_ref(), elapsed, products) {
            self.log
                .warning(format!("Could not write summary log: {}", e));
        } else {
            debug!(products, "Run summary written");
        }
    }
}

/// Run one sync session with the given configuration
pub async fn run_sync(
    config: SyncConfig,
    log: SyncLog,
    pause: Arc<dyn Pause>,
) -> Result<SyncOutcome> {
    SyncSession::new(config, log, pause).run().await
}
