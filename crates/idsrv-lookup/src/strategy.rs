//! # Lookup Strategy
//!
//! The pluggable backend that resolves 3PIDs. A strategy may perform
//! network I/O; the pipeline awaits it without imposing a timeout, so any
//! timeout policy belongs to the strategy itself.

use async_trait::async_trait;
use idsrv_core::{BulkLookupRequest, SingleLookupReply, SingleLookupRequest, ThreePidMapping};
use thiserror::Error;

/// Resolves single and bulk lookup requests.
#[async_trait]
pub trait LookupStrategy: Send + Sync {
    /// Zero or one reply for one 3PID.
    async fn find_single(
        &self,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError>;

    /// Resolved mappings for as many of the requested 3PIDs as possible, in
    /// discovery order. Unresolvable 3PIDs are omitted.
    async fn find_bulk(
        &self,
        request: &BulkLookupRequest,
    ) -> Result<Vec<ThreePidMapping>, StrategyError>;
}

/// A strategy or one of its providers failed.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// HTTP transport error talking to an upstream server.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream returned a non-2xx status.
    #[error("upstream {endpoint} returned {status}: {body}")]
    UpstreamStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Upstream answered with something that is not a lookup response.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// A provider could not be set up or failed internally.
    #[error("provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },
}
