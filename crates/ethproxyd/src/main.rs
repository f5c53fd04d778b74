//! ethproxyd — the eth-proxy daemon.
//!
//! Single binary that assembles the proxy:
//! - One JSON-RPC client per configured upstream URL
//! - Endpoint pool with failover routing and height consensus
//! - Pool monitor (recovery probes, optional periodic consensus)
//! - HTTP API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! CLIENT_URLS=https://node-a.example,https://node-b.example ethproxyd --port 8080
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ethproxy_api::{ApiState, build_router};
use ethproxy_pool::{EndpointPool, PoolMonitor};
use ethproxy_rpc::RpcClient;

use crate::config::{Cli, LogFormat, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let settings = Settings::load(Cli::parse())?;
    init_tracing(&settings.log_level, settings.log_format);
    if dotenv_loaded {
        info!(".env file loaded");
    }

    run(settings).await
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(
        port = settings.port,
        endpoints = settings.client_urls.len(),
        "eth-proxy starting"
    );

    // ── Endpoint pool ──────────────────────────────────────────

    let pool = Arc::new(EndpointPool::new(settings.pool.clone()));
    for url in &settings.client_urls {
        let client = match RpcClient::new(url, settings.pool.query_timeout) {
            Ok(client) => client,
            Err(e) => {
                error!(%url, error = %e, "skipping upstream endpoint");
                continue;
            }
        };
        pool.add(url.clone(), Arc::new(client)).await?;
        info!(%url, "upstream endpoint added");
    }
    if pool.is_empty().await {
        anyhow::bail!("none of the configured upstream endpoints is usable");
    }

    // ── Background maintenance ─────────────────────────────────

    let monitor = PoolMonitor::start(pool.clone());

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState::new(pool.clone(), settings.request_timeout));
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    monitor.stop().await;
    pool.close().await;
    info!("eth-proxy stopped");

    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
