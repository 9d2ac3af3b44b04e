//! Retry policy for catalog requests
//!
//! A pure decision table: given what a single request produced and where the
//! request is in its attempt sequence, say what happens next. The engine owns
//! the I/O and the sleeping; this module owns the rules.
//!
//! | Outcome       | Decision                                                   |
//! |---------------|------------------------------------------------------------|
//! | Success       | accept                                                     |
//! | NetworkError  | retry after backoff while `attempt <= ceiling`, else fail  |
//! | ServerError   | same as NetworkError                                       |
//! | RateLimited   | wait `retry-after`, retry without advancing the counter    |
//! | Unauthorized  | first time: refresh the token and restart at attempt 1     |
//! |               | after a forced refresh: fail                               |
//! | ClientError   | fail                                                       |

use std::time::Duration;

/// What one request produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// HTTP 200
    Success,
    /// No HTTP response (connect failure, timeout, reset)
    NetworkError(String),
    /// HTTP 429
    RateLimited { retry_after: Option<Duration> },
    /// HTTP 401
    Unauthorized,
    /// HTTP 5xx
    ServerError { status: u16 },
    /// Any other non-200 status
    ClientError { status: u16 },
}

impl Outcome {
    /// Classify an HTTP status with its `retry-after` header value
    pub fn from_status(status: u16, retry_after: Option<&str>) -> Self {
        match status {
            200 => Outcome::Success,
            429 => Outcome::RateLimited {
                retry_after: retry_after.and_then(parse_retry_after),
            },
            401 => Outcome::Unauthorized,
            s if s >= 500 => Outcome::ServerError { status: s },
            s => Outcome::ClientError { status: s },
        }
    }
}

/// Position of a request in its attempt sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    /// 1-based attempt number counted against the ceiling
    pub attempt: u32,
    /// Whether the token has already been force-refreshed for this request
    pub forced_refresh: bool,
}

impl AttemptState {
    pub fn first() -> Self {
        Self {
            attempt: 1,
            forced_refresh: false,
        }
    }
}

impl Default for AttemptState {
    fn default() -> Self {
        Self::first()
    }
}

/// Why a request was given up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Server { status: u16 },
    Client { status: u16 },
    Unauthorized,
}

/// What the engine does next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Sleep, then send again in state `next`
    Retry { after: Duration, next: AttemptState },
    /// Force-refresh the token, then send again in state `next`
    RefreshAndRetry { next: AttemptState },
    Fail(FailureKind),
}

/// Retry rules for one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt for transport and 5xx failures
    pub max_retries: u32,
    /// Wait between transport and 5xx retries
    pub backoff: Duration,
    /// Wait after a 429 without a usable `retry-after`
    pub rate_limit_fallback: Duration,
}

impl RetryPolicy {
    pub fn decide(&self, outcome: &Outcome, state: AttemptState) -> Decision {
        match outcome {
            Outcome::Success => Decision::Accept,

            Outcome::NetworkError(_) => self.backoff_or_fail(state, FailureKind::Transport),

            Outcome::ServerError { status } => {
                self.backoff_or_fail(state, FailureKind::Server { status: *status })
            },

            Outcome::RateLimited { retry_after } => Decision::Retry {
                after: retry_after.unwrap_or(self.rate_limit_fallback),
                next: state,
            },

            Outcome::Unauthorized if state.forced_refresh => {
                Decision::Fail(FailureKind::Unauthorized)
            },

            Outcome::Unauthorized => Decision::RefreshAndRetry {
                next: AttemptState {
                    attempt: 1,
                    forced_refresh: true,
                },
            },

            Outcome::ClientError { status } => {
                Decision::Fail(FailureKind::Client { status: *status })
            },
        }
    }

    fn backoff_or_fail(&self, state: AttemptState, failure: FailureKind) -> Decision {
        if state.attempt <= self.max_retries {
            Decision::Retry {
                after: self.backoff,
                next: AttemptState {
                    attempt: state.attempt + 1,
                    ..state
                },
            }
        } else {
            Decision::Fail(failure)
        }
    }
}

/// Parse a `retry-after` value given in whole seconds
///
/// HTTP-date values are not used by the catalog API and fall back to the
/// configured default.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
