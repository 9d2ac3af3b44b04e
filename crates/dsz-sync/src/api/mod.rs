//! API client module
//!
//! HTTP plumbing for the Dropshipzone auth and catalog endpoints. Retry and
//! credential policy live in `fetch` and `credentials`; this layer only sends
//! one request and reports what came back.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::{ApiClient, RawResponse};
pub use types::*;
