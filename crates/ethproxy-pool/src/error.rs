//! Error types for the endpoint pool.

use std::time::Duration;

use thiserror::Error;

use crate::consensus::HealthReport;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// An upstream query failed for a reason other than cancellation.
    #[error("endpoint {id} failed: {source}")]
    EndpointFault {
        id: String,
        #[source]
        source: UpstreamError,
    },

    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,

    #[error("consensus degraded: {0}")]
    ConsensusDegraded(HealthReport),

    #[error("request cancelled")]
    Cancelled,

    #[error("duplicate endpoint: {0}")]
    DuplicateEndpoint(String),
}

/// Errors returned by an [`Upstream`](crate::Upstream) query.
///
/// Everything except `Cancelled` counts as a liveness fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("http status {0}")]
    Http(u16),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("client closed")]
    Closed,
}

impl UpstreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UpstreamError::Cancelled)
    }
}
