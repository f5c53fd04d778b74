//! HTTP JSON-RPC client for a single upstream Ethereum node.
//!
//! Requests go over HTTP/1.1 keep-alive connections (wrapped in TLS for
//! `https` URLs). Finished connections are parked in a small idle list
//! and reused by the next call; each one is driven by its own background
//! task, the same way the health probes drive theirs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use ethproxy_pool::{Upstream, UpstreamError, UpstreamFuture};
use ethproxy_types::{Address, BlockRef, Wei, parse_quantity};

use crate::error::RpcClientError;
use crate::wire::{RpcRequest, decode_string_result};

const USER_AGENT_VALUE: &str = concat!("ethproxy/", env!("CARGO_PKG_VERSION"));

/// Idle connections kept per client.
const MAX_IDLE_CONNECTIONS: usize = 4;

type Sender = SendRequest<Full<Bytes>>;

/// Why a single exchange failed.
enum SendFailure {
    /// The connection broke before a response arrived.
    Connection(hyper::Error),
    Upstream(UpstreamError),
}

impl SendFailure {
    fn into_upstream(self) -> UpstreamError {
        match self {
            SendFailure::Connection(e) => UpstreamError::Transport(format!("sending request: {e}")),
            SendFailure::Upstream(e) => e,
        }
    }
}

/// JSON-RPC client bound to one upstream URL.
pub struct RpcClient {
    url: String,
    host: String,
    port: u16,
    authority: String,
    path: String,
    tls: Option<TlsConnector>,
    timeout: Duration,
    next_id: AtomicU64,
    closed: AtomicBool,
    idle: Mutex<Vec<Sender>>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.url)
            .field("tls", &self.tls.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    /// Validate `url` and build a client whose requests give up after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcClientError> {
        let invalid = |reason: String| RpcClientError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;

        let secure = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            _ => return Err(RpcClientError::UnsupportedScheme(url.to_string())),
        };

        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(invalid("missing host".to_string()));
        }
        let port = authority.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        let tls = if secure { Some(tls_connector()?) } else { None };

        Ok(Self {
            url: url.to_string(),
            host,
            port,
            authority: authority.as_str().to_string(),
            path,
            tls,
            timeout,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            idle: Mutex::new(Vec::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of parked keep-alive connections.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Issue one JSON-RPC call and return its string `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<String, UpstreamError> {
        if self.is_closed() {
            return Err(UpstreamError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&RpcRequest::new(id, method, params))
            .map_err(|e| UpstreamError::Transport(format!("encoding request: {e}")))?;

        let body = match tokio::time::timeout(self.timeout, self.post(Bytes::from(body))).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(url = %self.url, method, "upstream request timed out");
                return Err(UpstreamError::Timeout(self.timeout));
            }
        };

        decode_string_result(&body)
    }

    async fn post(&self, body: Bytes) -> Result<Bytes, UpstreamError> {
        if let Some(sender) = self.checkout().await {
            match self.send(sender, body.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(SendFailure::Connection(e)) => {
                    debug!(url = %self.url, error = %e, "reused connection failed, redialing");
                }
                Err(failure) => return Err(failure.into_upstream()),
            }
        }

        let sender = self.dial().await?;
        self.send(sender, body).await.map_err(SendFailure::into_upstream)
    }

    async fn send(&self, mut sender: Sender, body: Bytes) -> Result<Bytes, SendFailure> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(Full::new(body))
            .map_err(|e| {
                SendFailure::Upstream(UpstreamError::Transport(format!("building request: {e}")))
            })?;

        let response = sender
            .send_request(request)
            .await
            .map_err(SendFailure::Connection)?;

        let status = response.status();
        let collected = response.into_body().collect().await.map_err(|e| {
            SendFailure::Upstream(UpstreamError::Transport(format!("reading response body: {e}")))
        })?;

        // Body fully read, so the connection can carry the next request.
        self.checkin(sender);

        if !status.is_success() {
            return Err(SendFailure::Upstream(UpstreamError::Http(status.as_u16())));
        }
        Ok(collected.to_bytes())
    }

    /// Take a parked connection that is still open.
    async fn checkout(&self) -> Option<Sender> {
        loop {
            let parked = self.idle.lock().ok()?.pop();
            let mut sender = parked?;
            if sender.ready().await.is_ok() {
                return Some(sender);
            }
        }
    }

    fn checkin(&self, sender: Sender) {
        if self.is_closed() || sender.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < MAX_IDLE_CONNECTIONS {
                idle.push(sender);
            }
        }
    }

    async fn dial(&self) -> Result<Sender, UpstreamError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                debug!(url = %self.url, error = %e, "upstream connection failed");
                UpstreamError::Transport(format!("connect {}: {e}", self.authority))
            })?;

        match &self.tls {
            None => handshake(stream).await,
            Some(connector) => {
                let server_name = rustls::pki_types::ServerName::try_from(self.host.as_str())
                    .map_err(|e| UpstreamError::Transport(format!("invalid tls server name: {e}")))?
                    .to_owned();
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| UpstreamError::Transport(format!("tls handshake: {e}")))?;
                handshake(stream).await
            }
        }
    }
}

async fn handshake<S>(io: S) -> Result<Sender, UpstreamError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| UpstreamError::Transport(format!("http handshake: {e}")))?;

    // Drive the connection in the background until it closes.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection closed with error");
        }
    });

    Ok(sender)
}

fn tls_connector() -> Result<TlsConnector, RpcClientError> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| RpcClientError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

impl Upstream for RpcClient {
    fn current_height(&self) -> UpstreamFuture<'_, u64> {
        Box::pin(async move {
            let raw = self.call("eth_blockNumber", json!([])).await?;
            parse_quantity(&raw).map_err(|e| UpstreamError::InvalidResponse(format!("block number {raw:?}: {e}")))
        })
    }

    fn balance_at(&self, account: Address, block: BlockRef) -> UpstreamFuture<'_, Wei> {
        Box::pin(async move {
            let raw = self
                .call(
                    "eth_getBalance",
                    json!([account.to_string(), block.to_rpc_param()]),
                )
                .await?;
            Wei::from_quantity(&raw)
                .map_err(|e| UpstreamError::InvalidResponse(format!("balance {raw:?}: {e}")))
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let dropped = self
                .idle
                .lock()
                .map(|mut idle| idle.drain(..).count())
                .unwrap_or(0);
            debug!(url = %self.url, dropped, "upstream client closed");
        }
    }
}
