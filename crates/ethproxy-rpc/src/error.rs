//! Errors raised while constructing an RPC client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("invalid endpoint url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme in {0}, expected http or https")]
    UnsupportedScheme(String),

    #[error("tls setup failed: {0}")]
    Tls(String),
}
