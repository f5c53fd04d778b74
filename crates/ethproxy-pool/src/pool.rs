//! Client pool — healthy/unhealthy partition of upstream endpoints.
//!
//! Both partitions live behind a single `RwLock`. Reads (selection,
//! snapshots) take the shared side, moves between partitions take the
//! exclusive side. Guards never leave this module, so no caller can hold
//! the shared lock while asking for the exclusive one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::consensus::DEFAULT_MAX_BLOCK_LAG;
use crate::error::{PoolError, PoolResult};
use crate::upstream::{Endpoint, Upstream};

/// Tunables for the pool and its background maintenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Height difference tolerated between the most and least advanced
    /// healthy endpoints.
    pub max_block_lag: u64,
    /// Deadline for each upstream query: failover attempts, consensus rounds
    /// and probes.
    pub query_timeout: Duration,
    /// How often unhealthy endpoints are re-probed.
    pub probe_interval: Duration,
    /// How often the monitor runs its own consensus round. `None` leaves
    /// consensus to health-check callers.
    pub consensus_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_block_lag: DEFAULT_MAX_BLOCK_LAG,
            query_timeout: Duration::from_secs(2),
            probe_interval: Duration::from_secs(10),
            consensus_interval: None,
        }
    }
}

/// Copied id listing of both partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
}

/// Point-in-time pool counters for metrics export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub healthy: usize,
    pub unhealthy: usize,
    pub demotions: u64,
    pub promotions: u64,
    pub consensus_rounds: u64,
}

#[derive(Default)]
struct Partitions {
    healthy: BTreeMap<String, Arc<dyn Upstream>>,
    unhealthy: BTreeMap<String, Arc<dyn Upstream>>,
}

/// Pool of upstream endpoints partitioned by health.
pub struct EndpointPool {
    partitions: RwLock<Partitions>,
    /// Round-robin cursor over the ordered healthy ids.
    cursor: AtomicUsize,
    config: PoolConfig,
    added: AtomicUsize,
    demotions: AtomicU64,
    promotions: AtomicU64,
    pub(crate) consensus_rounds: AtomicU64,
}

impl EndpointPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            partitions: RwLock::new(Partitions::default()),
            cursor: AtomicUsize::new(0),
            config,
            added: AtomicUsize::new(0),
            demotions: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            consensus_rounds: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Register a new endpoint as healthy.
    pub async fn add(&self, id: impl Into<String>, upstream: Arc<dyn Upstream>) -> PoolResult<()> {
        let id = id.into();
        let mut parts = self.partitions.write().await;
        if parts.healthy.contains_key(&id) || parts.unhealthy.contains_key(&id) {
            return Err(PoolError::DuplicateEndpoint(id));
        }
        parts.healthy.insert(id.clone(), upstream);
        let total = self.added.fetch_add(1, Ordering::Relaxed) + 1;
        info!(endpoint = %id, total, "endpoint added");
        Ok(())
    }

    /// Move an endpoint from healthy to unhealthy.
    ///
    /// Returns `false` when the endpoint was already unhealthy or unknown.
    pub async fn demote(&self, id: &str, reason: &str) -> bool {
        let mut parts = self.partitions.write().await;
        let Some(upstream) = parts.healthy.remove(id) else {
            debug!(endpoint = %id, "demote skipped, endpoint not healthy");
            return false;
        };
        parts.unhealthy.insert(id.to_string(), upstream);
        self.demotions.fetch_add(1, Ordering::Relaxed);
        warn!(
            endpoint = %id,
            %reason,
            healthy = parts.healthy.len(),
            "endpoint demoted"
        );
        true
    }

    /// Move an endpoint from unhealthy back to healthy.
    ///
    /// Returns `false` when the endpoint was already healthy or unknown.
    pub async fn promote(&self, id: &str) -> bool {
        let mut parts = self.partitions.write().await;
        let Some(upstream) = parts.unhealthy.remove(id) else {
            debug!(endpoint = %id, "promote skipped, endpoint not unhealthy");
            return false;
        };
        parts.healthy.insert(id.to_string(), upstream);
        self.promotions.fetch_add(1, Ordering::Relaxed);
        info!(endpoint = %id, healthy = parts.healthy.len(), "endpoint promoted");
        true
    }

    /// Pick the next healthy endpoint in round-robin order.
    pub async fn select_healthy(&self) -> Option<Endpoint> {
        let parts = self.partitions.read().await;
        if parts.healthy.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % parts.healthy.len();
        parts.healthy.iter().nth(idx).map(|(id, upstream)| Endpoint {
            id: id.clone(),
            upstream: Arc::clone(upstream),
        })
    }

    /// Copy the ids of both partitions.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let parts = self.partitions.read().await;
        PoolSnapshot {
            healthy: parts.healthy.keys().cloned().collect(),
            unhealthy: parts.unhealthy.keys().cloned().collect(),
        }
    }

    /// Copy the handles of every healthy endpoint.
    pub async fn healthy_endpoints(&self) -> Vec<Endpoint> {
        let parts = self.partitions.read().await;
        collect_endpoints(&parts.healthy)
    }

    /// Copy the handles of every unhealthy endpoint.
    pub async fn unhealthy_endpoints(&self) -> Vec<Endpoint> {
        let parts = self.partitions.read().await;
        collect_endpoints(&parts.unhealthy)
    }

    pub async fn healthy_count(&self) -> usize {
        self.partitions.read().await.healthy.len()
    }

    pub async fn unhealthy_count(&self) -> usize {
        self.partitions.read().await.unhealthy.len()
    }

    pub async fn len(&self) -> usize {
        let parts = self.partitions.read().await;
        parts.healthy.len() + parts.unhealthy.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of endpoints ever added.
    pub fn added_count(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> PoolStats {
        let parts = self.partitions.read().await;
        PoolStats {
            healthy: parts.healthy.len(),
            unhealthy: parts.unhealthy.len(),
            demotions: self.demotions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            consensus_rounds: self.consensus_rounds.load(Ordering::Relaxed),
        }
    }

    /// Release every upstream connection. Called once at shutdown.
    pub async fn close(&self) {
        let parts = self.partitions.read().await;
        for upstream in parts.healthy.values().chain(parts.unhealthy.values()) {
            upstream.close();
        }
        info!(
            endpoints = parts.healthy.len() + parts.unhealthy.len(),
            "endpoint pool closed"
        );
    }
}

fn collect_endpoints(map: &BTreeMap<String, Arc<dyn Upstream>>) -> Vec<Endpoint> {
    map.iter()
        .map(|(id, upstream)| Endpoint {
            id: id.clone(),
            upstream: Arc::clone(upstream),
        })
        .collect()
}
