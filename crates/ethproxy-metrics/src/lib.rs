//! ethproxy-metrics — observability for the proxy.
//!
//! Counts balance lookups and health checks by outcome, accumulates
//! request latency, and renders everything together with the pool's
//! gauges in the Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! ProxyMetrics
//!   ├── record_balance() ← called per /eth/balance request
//!   ├── record_health()  ← called per /healthcheck request
//!   └── snapshot()       → point-in-time copy of the counters
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{BalanceOutcome, HealthOutcome, MetricsSnapshot, ProxyMetrics};
pub use prometheus::{PoolGauges, render_prometheus};
