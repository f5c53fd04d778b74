//! Failover router — answer queries from whichever healthy endpoint works.
//!
//! Each failed attempt demotes the endpoint that failed, so the next
//! selection lands on a different one. The attempt budget is the size of
//! the healthy set when the call starts. Each attempt is bounded by the
//! pool's `query_timeout`, so a hung endpoint is demoted like a failed one.

use ethproxy_types::{Address, BlockRef, Wei};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PoolError, PoolResult, UpstreamError};
use crate::pool::EndpointPool;
use crate::upstream::{Upstream, UpstreamFuture, guarded};

impl EndpointPool {
    /// Balance of `account` at `block`, failing over across healthy endpoints.
    pub async fn get_balance(
        &self,
        cancel: &CancellationToken,
        account: Address,
        block: BlockRef,
    ) -> PoolResult<Wei> {
        self.with_failover(cancel, "eth_getBalance", |upstream| {
            upstream.balance_at(account, block)
        })
        .await
    }

    /// Latest block height from a single healthy endpoint, with failover.
    pub async fn current_height(&self, cancel: &CancellationToken) -> PoolResult<u64> {
        self.with_failover(cancel, "eth_blockNumber", |upstream| {
            upstream.current_height()
        })
        .await
    }

    async fn with_failover<T, F>(
        &self,
        cancel: &CancellationToken,
        method: &'static str,
        query: F,
    ) -> PoolResult<T>
    where
        F: for<'a> Fn(&'a dyn Upstream) -> UpstreamFuture<'a, T>,
    {
        let budget = self.healthy_count().await;
        let timeout = Some(self.config().query_timeout);

        for attempt in 1..=budget {
            let Some(endpoint) = self.select_healthy().await else {
                break;
            };

            match guarded(query(&*endpoint.upstream), cancel, timeout).await {
                Ok(value) => {
                    debug!(endpoint = %endpoint.id, method, attempt, "upstream request served");
                    return Ok(value);
                }
                Err(UpstreamError::Cancelled) => {
                    debug!(endpoint = %endpoint.id, method, "upstream request cancelled by caller");
                    return Err(PoolError::Cancelled);
                }
                Err(source) => {
                    let fault = PoolError::EndpointFault {
                        id: endpoint.id.clone(),
                        source,
                    };
                    warn!(method, attempt, budget, error = %fault, "upstream request failed, failing over");
                    self.demote(&endpoint.id, &fault.to_string()).await;
                }
            }
        }

        Err(PoolError::NoHealthyEndpoint)
    }
}
