//! Prometheus text exposition format.
//!
//! Renders request counters and pool gauges into the text format (0.0.4)
//! scraped by a Prometheus server or compatible agent.

use crate::collector::{BalanceOutcome, HealthOutcome, ProxyMetrics};

/// Endpoint pool state at render time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolGauges {
    pub healthy: usize,
    pub unhealthy: usize,
    pub demotions_total: u64,
    pub promotions_total: u64,
    pub consensus_rounds_total: u64,
}

/// Render `metrics` and `pool` into Prometheus text format.
pub fn render_prometheus(metrics: &ProxyMetrics, pool: &PoolGauges) -> String {
    let s = metrics.snapshot();
    let mut out = String::new();

    out.push_str("# HELP ethproxy_balance_requests_total Balance requests by outcome.\n");
    out.push_str("# TYPE ethproxy_balance_requests_total counter\n");
    for outcome in [
        BalanceOutcome::Ok,
        BalanceOutcome::BadRequest,
        BalanceOutcome::Error,
        BalanceOutcome::Timeout,
    ] {
        out.push_str(&format!(
            "ethproxy_balance_requests_total{{outcome=\"{}\"}} {}\n",
            outcome.label(),
            s.balance(outcome)
        ));
    }

    out.push_str("# HELP ethproxy_health_checks_total Health checks by outcome.\n");
    out.push_str("# TYPE ethproxy_health_checks_total counter\n");
    for outcome in [HealthOutcome::Ok, HealthOutcome::Degraded] {
        out.push_str(&format!(
            "ethproxy_health_checks_total{{outcome=\"{}\"}} {}\n",
            outcome.label(),
            s.health(outcome)
        ));
    }

    out.push_str("# HELP ethproxy_request_duration_seconds Time spent serving requests.\n");
    out.push_str("# TYPE ethproxy_request_duration_seconds summary\n");
    out.push_str(&format!(
        "ethproxy_request_duration_seconds_sum {:.6}\n",
        s.latency_us_sum as f64 / 1_000_000.0
    ));
    out.push_str(&format!(
        "ethproxy_request_duration_seconds_count {}\n",
        s.latency_count
    ));

    gauge(
        &mut out,
        "ethproxy_pool_healthy_endpoints",
        "Endpoints currently in the healthy partition.",
        pool.healthy as u64,
    );
    gauge(
        &mut out,
        "ethproxy_pool_unhealthy_endpoints",
        "Endpoints currently in the unhealthy partition.",
        pool.unhealthy as u64,
    );
    counter(
        &mut out,
        "ethproxy_pool_demotions_total",
        "Endpoints moved from healthy to unhealthy.",
        pool.demotions_total,
    );
    counter(
        &mut out,
        "ethproxy_pool_promotions_total",
        "Endpoints moved from unhealthy to healthy.",
        pool.promotions_total,
    );
    counter(
        &mut out,
        "ethproxy_pool_consensus_rounds_total",
        "Height consensus rounds completed.",
        pool.consensus_rounds_total,
    );

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    single(out, name, help, "gauge", value);
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    single(out, name, help, "counter", value);
}

fn single(out: &mut String, name: &str, help: &str, kind: &str, value: u64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} {kind}\n"));
    out.push_str(&format!("{name} {value}\n"));
}
