//! HTTP handlers.
//!
//! Every handler owns a cancellation token whose drop guard fires when
//! axum drops the handler future (client went away), and bounds its pool
//! work by the configured request timeout.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ethproxy_metrics::{BalanceOutcome, HealthOutcome, PoolGauges, render_prometheus};
use ethproxy_pool::PoolError;
use ethproxy_types::{Address, BlockRef};

use crate::ApiState;

const TIMEOUT_MESSAGE: &str = "Request timeout";

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorBody {
            message: msg.to_string(),
        }),
    )
        .into_response()
}

// ── Balance ────────────────────────────────────────────────────

#[derive(Serialize)]
struct BalanceBody {
    balance: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BalanceQuery {
    pub block: Option<String>,
}

/// GET /eth/balance/{address}
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Response {
    let started = Instant::now();

    let account: Address = match address.parse() {
        Ok(account) => account,
        Err(e) => {
            debug!(%address, error = %e, "rejected balance request");
            state
                .metrics
                .record_balance(BalanceOutcome::BadRequest, started.elapsed());
            return error_response(
                &format!("invalid address {address:?}: {e}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let block = match query.block.as_deref().map(str::parse::<BlockRef>) {
        None => BlockRef::Latest,
        Some(Ok(block)) => block,
        Some(Err(e)) => {
            state
                .metrics
                .record_balance(BalanceOutcome::BadRequest, started.elapsed());
            return error_response(&format!("invalid block: {e}"), StatusCode::BAD_REQUEST);
        }
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = tokio::time::timeout(
        state.request_timeout,
        state.pool.get_balance(&cancel, account, block),
    )
    .await;

    let (outcome, response) = match result {
        Ok(Ok(balance)) => (
            BalanceOutcome::Ok,
            (
                StatusCode::OK,
                Json(BalanceBody {
                    balance: balance.to_string(),
                }),
            )
                .into_response(),
        ),
        Ok(Err(PoolError::Cancelled)) | Err(_) => {
            warn!(%account, %block, "balance request timed out");
            (
                BalanceOutcome::Timeout,
                error_response(TIMEOUT_MESSAGE, StatusCode::REQUEST_TIMEOUT),
            )
        }
        Ok(Err(e)) => {
            warn!(%account, %block, error = %e, "balance request failed");
            (
                BalanceOutcome::Error,
                error_response(&e.to_string(), StatusCode::BAD_GATEWAY),
            )
        }
    };

    state.metrics.record_balance(outcome, started.elapsed());
    response
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    height: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

/// GET /healthcheck
pub async fn healthcheck(State(state): State<ApiState>) -> Response {
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = match tokio::time::timeout(
        state.request_timeout,
        state.pool.check_heights(&cancel),
    )
    .await
    {
        Ok(report) => report,
        Err(_) => {
            warn!("health check timed out");
            state
                .metrics
                .record_health(HealthOutcome::Degraded, started.elapsed());
            return error_response(TIMEOUT_MESSAGE, StatusCode::REQUEST_TIMEOUT);
        }
    };

    let (outcome, status, label) = if report.is_degraded() {
        (
            HealthOutcome::Degraded,
            StatusCode::SERVICE_UNAVAILABLE,
            "degraded",
        )
    } else {
        (HealthOutcome::Ok, StatusCode::OK, "ok")
    };
    if report.is_degraded() {
        info!(height = report.height, errors = ?report.errors, "health check degraded");
    }
    state.metrics.record_health(outcome, started.elapsed());

    (
        status,
        Json(HealthBody {
            status: label,
            height: report.height,
            errors: report.errors,
        }),
    )
        .into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.pool.stats().await;
    let gauges = PoolGauges {
        healthy: stats.healthy,
        unhealthy: stats.unhealthy,
        demotions_total: stats.demotions,
        promotions_total: stats.promotions,
        consensus_rounds_total: stats.consensus_rounds,
    };

    let body = render_prometheus(&state.metrics, &gauges);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
