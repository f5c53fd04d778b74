//! Request counters.
//!
//! Uses a lock-free design: every counter is an atomic, so handlers can
//! record from any task without coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::trace;

/// How a balance request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    Ok,
    /// Rejected before reaching the pool (bad address).
    BadRequest,
    /// The pool could not answer.
    Error,
    Timeout,
}

impl BalanceOutcome {
    pub fn label(self) -> &'static str {
        match self {
            BalanceOutcome::Ok => "ok",
            BalanceOutcome::BadRequest => "bad_request",
            BalanceOutcome::Error => "error",
            BalanceOutcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Ok,
    Degraded,
}

impl HealthOutcome {
    pub fn label(self) -> &'static str {
        match self {
            HealthOutcome::Ok => "ok",
            HealthOutcome::Degraded => "degraded",
        }
    }
}

/// Process-wide request metrics.
#[derive(Debug, Default)]
pub struct ProxyMetrics {
    balance_ok: AtomicU64,
    balance_bad_request: AtomicU64,
    balance_error: AtomicU64,
    balance_timeout: AtomicU64,
    health_ok: AtomicU64,
    health_degraded: AtomicU64,
    /// Sum of request latencies in microseconds.
    latency_us_sum: AtomicU64,
    latency_count: AtomicU64,
}

/// Point-in-time copy of [`ProxyMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub balance_ok: u64,
    pub balance_bad_request: u64,
    pub balance_error: u64,
    pub balance_timeout: u64,
    pub health_ok: u64,
    pub health_degraded: u64,
    pub latency_us_sum: u64,
    pub latency_count: u64,
}

impl MetricsSnapshot {
    pub fn balance_total(&self) -> u64 {
        self.balance_ok + self.balance_bad_request + self.balance_error + self.balance_timeout
    }

    pub fn balance(&self, outcome: BalanceOutcome) -> u64 {
        match outcome {
            BalanceOutcome::Ok => self.balance_ok,
            BalanceOutcome::BadRequest => self.balance_bad_request,
            BalanceOutcome::Error => self.balance_error,
            BalanceOutcome::Timeout => self.balance_timeout,
        }
    }

    pub fn health(&self, outcome: HealthOutcome) -> u64 {
        match outcome {
            HealthOutcome::Ok => self.health_ok,
            HealthOutcome::Degraded => self.health_degraded,
        }
    }
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished balance request.
    pub fn record_balance(&self, outcome: BalanceOutcome, latency: Duration) {
        let counter = match outcome {
            BalanceOutcome::Ok => &self.balance_ok,
            BalanceOutcome::BadRequest => &self.balance_bad_request,
            BalanceOutcome::Error => &self.balance_error,
            BalanceOutcome::Timeout => &self.balance_timeout,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        trace!(outcome = outcome.label(), latency_us = latency.as_micros() as u64, "balance request recorded");
    }

    /// Record a finished health check.
    pub fn record_health(&self, outcome: HealthOutcome, latency: Duration) {
        let counter = match outcome {
            HealthOutcome::Ok => &self.health_ok,
            HealthOutcome::Degraded => &self.health_degraded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
        trace!(outcome = outcome.label(), latency_us = latency.as_micros() as u64, "health check recorded");
    }

    fn record_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us_sum.fetch_add(us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            balance_ok: self.balance_ok.load(Ordering::Relaxed),
            balance_bad_request: self.balance_bad_request.load(Ordering::Relaxed),
            balance_error: self.balance_error.load(Ordering::Relaxed),
            balance_timeout: self.balance_timeout.load(Ordering::Relaxed),
            health_ok: self.health_ok.load(Ordering::Relaxed),
            health_degraded: self.health_degraded.load(Ordering::Relaxed),
            latency_us_sum: self.latency_us_sum.load(Ordering::Relaxed),
            latency_count: self.latency_count.load(Ordering::Relaxed),
        }
    }
}
