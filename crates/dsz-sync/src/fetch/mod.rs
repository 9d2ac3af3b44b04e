//! Paginated catalog fetch
//!
//! [`policy`] holds the retry decision table, [`engine`] drives requests and
//! pagination. Every wait (backoff, rate limit, inter-page delay) goes through
//! the [`Pause`] seam so tests can record waits instead of sleeping.

pub mod engine;
pub mod policy;

pub use engine::{FetchEngine, FetchReport};
pub use policy::{AttemptState, Decision, FailureKind, Outcome, RetryPolicy};

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Suspension point used for every wait in the fetch pipeline
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real sleeping on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested waits and returns immediately
///
/// Public testing seam: hand it to [`crate::session::run_sync`] or
/// [`FetchEngine::new`] to drive retries and pagination without sleeping,
/// then assert on [`RecordingPause::waits`]. Not meant for production runs.
#[derive(Debug, Default)]
pub struct RecordingPause {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}
