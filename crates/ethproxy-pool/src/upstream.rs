//! Upstream node abstraction.
//!
//! An [`Upstream`] is one JSON-RPC node connection. The pool only ever
//! asks it for the current block height and an account balance, so the
//! trait stays small and easy to mock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ethproxy_types::{Address, BlockRef, Wei};
use tokio_util::sync::CancellationToken;

use crate::error::UpstreamError;

/// Boxed future returned by upstream queries.
pub type UpstreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + Send + 'a>>;

/// A single upstream JSON-RPC node.
pub trait Upstream: Send + Sync {
    /// Latest block number known to the node.
    fn current_height(&self) -> UpstreamFuture<'_, u64>;

    /// Balance of `account` at `block`.
    fn balance_at(&self, account: Address, block: BlockRef) -> UpstreamFuture<'_, Wei>;

    /// Release the underlying connection. Later queries fail with `Closed`.
    fn close(&self);
}

/// A pool entry: the endpoint id (its URL) and its connection handle.
#[derive(Clone)]
pub struct Endpoint {
    pub id: String,
    pub upstream: Arc<dyn Upstream>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Drive an upstream query, racing it against `cancel` and an optional
/// deadline. Cancellation drops the in-flight request.
pub(crate) async fn guarded<T>(
    query: UpstreamFuture<'_, T>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<T, UpstreamError> {
    let bounded = async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .unwrap_or(Err(UpstreamError::Timeout(limit))),
            None => query.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
        result = bounded => result,
    }
}
