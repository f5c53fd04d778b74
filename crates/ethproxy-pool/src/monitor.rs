//! Pool monitor — background recovery probes and periodic consensus.
//!
//! The `PoolMonitor` spawns one background task that re-probes unhealthy
//! endpoints every `probe_interval` and, when configured, runs a consensus
//! round every `consensus_interval`. Both use their own cancellation token
//! and per-query timeout, never a caller's.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pool::EndpointPool;
use crate::upstream::guarded;

impl EndpointPool {
    /// Probe every unhealthy endpoint once and promote those that answer.
    ///
    /// Returns the ids that were promoted.
    pub async fn probe_unhealthy(&self) -> Vec<String> {
        let endpoints = self.unhealthy_endpoints().await;
        if endpoints.is_empty() {
            return Vec::new();
        }

        let probe_cancel = CancellationToken::new();
        let timeout = Some(self.config().query_timeout);
        let results = join_all(endpoints.iter().map(|ep| {
            let cancel = &probe_cancel;
            async move { (ep, guarded(ep.upstream.current_height(), cancel, timeout).await) }
        }))
        .await;

        let mut promoted = Vec::new();
        for (ep, result) in results {
            match result {
                Ok(height) => {
                    debug!(endpoint = %ep.id, height, "recovery probe succeeded");
                    if self.promote(&ep.id).await {
                        promoted.push(ep.id.clone());
                    }
                }
                Err(e) => {
                    debug!(endpoint = %ep.id, error = %e, "recovery probe failed, endpoint stays unhealthy");
                }
            }
        }
        promoted
    }
}

/// Handle to the background maintenance task of an [`EndpointPool`].
pub struct PoolMonitor {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl PoolMonitor {
    /// Spawn the monitor loop for `pool`.
    pub fn start(pool: Arc<EndpointPool>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_monitor_loop(pool, shutdown_rx));
        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            debug!(error = %e, "pool monitor task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn ticker(period: Duration) -> Interval {
    // First tick one full period from now, not immediately.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_monitor_loop(pool: Arc<EndpointPool>, mut shutdown: watch::Receiver<bool>) {
    let config = pool.config().clone();
    let mut probe_tick = ticker(config.probe_interval);
    let mut consensus_tick = config.consensus_interval.map(ticker);

    let endpoints = pool.len().await;
    info!(
        endpoints,
        probe_interval_ms = config.probe_interval.as_millis() as u64,
        consensus_interval_ms = config.consensus_interval.map(|d| d.as_millis() as u64),
        "pool monitor started"
    );

    loop {
        tokio::select! {
            _ = probe_tick.tick() => {
                let promoted = pool.probe_unhealthy().await;
                if !promoted.is_empty() {
                    info!(count = promoted.len(), ?promoted, "endpoints recovered");
                }
            }
            _ = next_tick(&mut consensus_tick) => {
                let report = pool.check_heights(&CancellationToken::new()).await;
                if report.is_degraded() {
                    debug!(height = report.height, errors = report.errors.len(), "periodic consensus degraded");
                }
            }
            _ = shutdown.changed() => {
                info!("pool monitor shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolConfig;
    use crate::testing::MockUpstream;

    fn fast_config() -> PoolConfig {
        PoolConfig {
            query_timeout: Duration::from_millis(50),
            probe_interval: Duration::from_millis(20),
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn probe_promotes_endpoint_that_answers() {
        let pool = EndpointPool::new(fast_config());
        pool.add("a", MockUpstream::healthy(100, 0)).await.unwrap();
        pool.demote("a", "test").await;

        let promoted = pool.probe_unhealthy().await;
        assert_eq!(promoted, vec!["a"]);
        assert_eq!(pool.snapshot().await.healthy, vec!["a"]);
    }

    #[tokio::test]
    async fn probe_leaves_failing_endpoint_unhealthy() {
        let pool = EndpointPool::new(fast_config());
        pool.add("a", MockUpstream::failing()).await.unwrap();
        pool.demote("a", "test").await;

        assert!(pool.probe_unhealthy().await.is_empty());
        assert_eq!(pool.snapshot().await.unhealthy, vec!["a"]);
    }

    #[tokio::test]
    async fn probe_times_out_slow_endpoint() {
        let pool = EndpointPool::new(fast_config());
        let slow = MockUpstream::healthy(100, 0);
        slow.set_delay(Duration::from_secs(5));
        pool.add("slow", slow).await.unwrap();
        pool.demote("slow", "test").await;

        assert!(pool.probe_unhealthy().await.is_empty());
        assert_eq!(pool.unhealthy_count().await, 1);
    }

    #[tokio::test]
    async fn probe_with_nothing_unhealthy_is_noop() {
        let pool = EndpointPool::new(fast_config());
        let a = MockUpstream::healthy(100, 0);
        pool.add("a", a.clone()).await.unwrap();

        assert!(pool.probe_unhealthy().await.is_empty());
        assert_eq!(a.height_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_recovers_endpoint_in_background() {
        let pool = Arc::new(EndpointPool::new(fast_config()));
        let flaky = MockUpstream::failing();
        pool.add("flaky", flaky.clone()).await.unwrap();
        pool.demote("flaky", "test").await;

        let monitor = PoolMonitor::start(pool.clone());
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.unhealthy_count().await, 1);

        flaky.set_failing(false);
        let mut recovered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if pool.healthy_count().await == 1 {
                recovered = true;
                break;
            }
        }
        assert!(recovered, "monitor should promote the endpoint once it answers");

        monitor.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_runs_periodic_consensus() {
        let pool = Arc::new(EndpointPool::new(PoolConfig {
            probe_interval: Duration::from_secs(60),
            consensus_interval: Some(Duration::from_millis(20)),
            ..fast_config()
        }));
        pool.add("a", MockUpstream::healthy(100, 0)).await.unwrap();
        pool.add("b", MockUpstream::healthy(110, 0)).await.unwrap();

        let monitor = PoolMonitor::start(pool.clone());
        let mut demoted = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if pool.unhealthy_count().await == 1 {
                demoted = true;
                break;
            }
        }
        monitor.stop().await;

        assert!(demoted);
        assert_eq!(pool.snapshot().await.unhealthy, vec!["a"]);
        assert!(pool.stats().await.consensus_rounds >= 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn maintenance_futures_are_send() {
        let pool = Arc::new(EndpointPool::new(fast_config()));
        let (_tx, rx) = watch::channel(false);

        let monitor_loop = run_monitor_loop(pool.clone(), rx);
        assert_send(&monitor_loop);
        drop(monitor_loop);

        let cancel = CancellationToken::new();
        assert_send(&pool.probe_unhealthy());
        assert_send(&pool.check_heights(&cancel));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_stops_on_signal() {
        let pool = Arc::new(EndpointPool::new(fast_config()));
        let monitor = PoolMonitor::start(pool);
        monitor.stop().await;
    }
}
