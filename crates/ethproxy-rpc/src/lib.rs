//! ethproxy-rpc — upstream Ethereum JSON-RPC client.
//!
//! [`RpcClient`] speaks JSON-RPC 2.0 over HTTP/1.1 (plain or rustls TLS)
//! and implements [`ethproxy_pool::Upstream`], so the pool can route
//! `eth_blockNumber` and `eth_getBalance` calls through it.

pub mod client;
pub mod error;
pub mod wire;

pub use client::RpcClient;
pub use error::RpcClientError;
