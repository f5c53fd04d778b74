//! ethproxy-pool — endpoint pool manager for eth-proxy.
//!
//! Tracks the health of upstream JSON-RPC endpoints, demotes lagging nodes
//! through a block-height consensus round, answers balance queries with
//! automatic failover and re-probes unhealthy endpoints in the background.
//!
//! # Architecture
//!
//! ```text
//! EndpointPool (RwLock<healthy | unhealthy>)
//!   ├── add / demote / promote      ← exclusive lock
//!   ├── select_healthy / snapshot   ← shared lock, round-robin
//!   ├── check_heights()  → HealthReport (demotes laggards)
//!   ├── get_balance()    → failover loop over healthy endpoints
//!   └── probe_unhealthy() → promotes endpoints that answer again
//!
//! PoolMonitor
//!   └── background task: probe tick + optional consensus tick
//! ```
//!
//! The pool lock is never held across an upstream call. Every operation
//! copies what it needs under the shared lock, releases it, talks to the
//! upstreams, then takes the exclusive lock to apply moves.

pub mod consensus;
pub mod error;
pub mod monitor;
pub mod pool;
pub mod router;
pub mod upstream;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use consensus::{DEFAULT_MAX_BLOCK_LAG, HealthReport, HeightSample};
pub use error::{PoolError, PoolResult, UpstreamError};
pub use monitor::PoolMonitor;
pub use pool::{EndpointPool, PoolConfig, PoolSnapshot, PoolStats};
pub use upstream::{Endpoint, Upstream, UpstreamFuture};
