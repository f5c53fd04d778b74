//! Proxy regression tests.
//!
//! Drives the full HTTP router against scripted upstreams and against a
//! fake JSON-RPC node served on loopback.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;

use ethproxy_api::{ApiState, build_router};
use ethproxy_pool::testing::MockUpstream;
use ethproxy_pool::{EndpointPool, PoolConfig, PoolMonitor};
use ethproxy_rpc::RpcClient;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn state(pool: &Arc<EndpointPool>) -> ApiState {
    ApiState::new(pool.clone(), Duration::from_secs(1))
}

#[tokio::test]
async fn balance_served_and_failover_visible_in_health() {
    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    pool.add("a", MockUpstream::failing()).await.unwrap();
    pool.add("b", MockUpstream::healthy(500, 42)).await.unwrap();
    let router = build_router(state(&pool));

    let resp = router
        .clone()
        .oneshot(get("/eth/balance/0x00000000000000000000000000000000000000ff"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"balance": "42"}));

    let resp = router.oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["height"], 500);
    assert_eq!(body["errors"], json!(["endpoint a is unhealthy"]));
}

#[tokio::test]
async fn invalid_address_is_bad_request() {
    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    pool.add("a", MockUpstream::healthy(1, 1)).await.unwrap();
    let router = build_router(state(&pool));

    let resp = router.oneshot(get("/eth/balance/not-an-address")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp).await["message"].is_string());
}

#[tokio::test]
async fn all_upstreams_down_is_bad_gateway() {
    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    pool.add("a", MockUpstream::failing()).await.unwrap();
    pool.add("b", MockUpstream::failing()).await.unwrap();
    let router = build_router(state(&pool));

    let resp = router.oneshot(get("/eth/balance/0x1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(pool.unhealthy_count().await, 2);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    let slow = MockUpstream::healthy(1, 1);
    slow.set_delay(Duration::from_secs(5));
    pool.add("slow", slow).await.unwrap();
    let router = build_router(ApiState::new(pool.clone(), Duration::from_millis(50)));

    let resp = router.oneshot(get("/eth/balance/0x1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body_json(resp).await, json!({"message": "Request timeout"}));
    assert_eq!(pool.snapshot().await.healthy, vec!["slow"]);
}

#[tokio::test]
async fn hung_upstream_is_masked_and_demoted() {
    let pool = Arc::new(EndpointPool::new(PoolConfig {
        query_timeout: Duration::from_millis(50),
        ..PoolConfig::default()
    }));
    let hung = MockUpstream::healthy(1, 1);
    hung.set_delay(Duration::from_secs(60));
    pool.add("hung", hung.clone()).await.unwrap();
    pool.add("live", MockUpstream::healthy(1, 8)).await.unwrap();
    let router = build_router(ApiState::new(pool.clone(), Duration::from_millis(500)));

    let mut codes = Vec::new();
    for _ in 0..4 {
        let resp = router.clone().oneshot(get("/eth/balance/0x1")).await.unwrap();
        codes.push(resp.status());
    }

    assert_eq!(codes, vec![StatusCode::OK; 4]);
    assert_eq!(pool.snapshot().await.unhealthy, vec!["hung"]);
    assert_eq!(hung.balance_calls(), 1);
}

#[tokio::test]
async fn lagging_endpoint_recovers_after_catching_up() {
    let pool = Arc::new(EndpointPool::new(PoolConfig {
        probe_interval: Duration::from_millis(20),
        query_timeout: Duration::from_millis(100),
        ..PoolConfig::default()
    }));
    let lagging = MockUpstream::healthy(90, 0);
    pool.add("lagging", lagging.clone()).await.unwrap();
    pool.add("leader", MockUpstream::healthy(100, 0)).await.unwrap();
    let router = build_router(state(&pool));

    let resp = router.clone().oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(pool.snapshot().await.unhealthy, vec!["lagging"]);

    let monitor = PoolMonitor::start(pool.clone());
    lagging.set_height(100);
    let mut recovered = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if pool.unhealthy_count().await == 0 {
            recovered = true;
            break;
        }
    }
    monitor.stop().await;
    assert!(recovered);

    let resp = router.oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"status": "ok", "height": 100}));
}

#[tokio::test]
async fn metrics_reflect_traffic() {
    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    pool.add("a", MockUpstream::healthy(7, 3)).await.unwrap();
    let router = build_router(state(&pool));

    router.clone().oneshot(get("/eth/balance/0x1")).await.unwrap();
    router.clone().oneshot(get("/eth/balance/0xqq")).await.unwrap();
    router.clone().oneshot(get("/healthcheck")).await.unwrap();

    let resp = router.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ethproxy_balance_requests_total{outcome=\"ok\"} 1"));
    assert!(text.contains("ethproxy_balance_requests_total{outcome=\"bad_request\"} 1"));
    assert!(text.contains("ethproxy_health_checks_total{outcome=\"ok\"} 1"));
    assert!(text.contains("ethproxy_pool_consensus_rounds_total 1"));
}

async fn fake_node(height: u64, balance_hex: &'static str) -> String {
    let router = Router::new().route(
        "/",
        post(move |Json(req): Json<Value>| async move {
            let result = match req["method"].as_str() {
                Some("eth_blockNumber") => json!(format!("{height:#x}")),
                Some("eth_getBalance") => json!(balance_hex),
                _ => Value::Null,
            };
            Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": result}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn end_to_end_over_json_rpc() {
    let node_a = fake_node(0x100, "0x3635c9adc5dea00000").await;
    let node_b = fake_node(0x101, "0x3635c9adc5dea00000").await;

    let pool = Arc::new(EndpointPool::new(PoolConfig::default()));
    for url in [&node_a, &node_b] {
        let client = RpcClient::new(url, Duration::from_secs(2)).unwrap();
        pool.add(url.clone(), Arc::new(client)).await.unwrap();
    }
    let router = build_router(state(&pool));

    let resp = router
        .clone()
        .oneshot(get("/eth/balance/0xde0B295669a9FD93d5F28D9Ec85E40f4cb697BAe"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        json!({"balance": "1000000000000000000000"})
    );

    let resp = router.oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"status": "ok", "height": 257}));

    pool.close().await;
    assert!(pool.current_height(&Default::default()).await.is_err());
}
