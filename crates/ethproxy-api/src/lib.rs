//! ethproxy-api — HTTP surface of the proxy.
//!
//! Provides axum route handlers that answer balance lookups through the
//! endpoint pool, report consensus health, and expose Prometheus metrics.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/eth/balance/{address}` | Account balance in wei (`?block=` optional) |
//! | GET | `/healthcheck` | Run a height consensus round |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;

use ethproxy_metrics::ProxyMetrics;
use ethproxy_pool::EndpointPool;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub pool: Arc<EndpointPool>,
    pub metrics: Arc<ProxyMetrics>,
    /// Upper bound on the time spent serving one request.
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(pool: Arc<EndpointPool>, request_timeout: Duration) -> Self {
        Self {
            pool,
            metrics: Arc::new(ProxyMetrics::new()),
            request_timeout,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/eth/balance/{address}", get(handlers::get_balance))
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
