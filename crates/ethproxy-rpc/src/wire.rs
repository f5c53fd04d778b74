//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ethproxy_pool::UpstreamError;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// Decode a response body into the `result` value it carries.
pub fn decode_result(body: &[u8]) -> Result<Value, UpstreamError> {
    let response: RpcResponse = serde_json::from_slice(body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("malformed json-rpc body: {e}")))?;

    if let Some(err) = response.error {
        return Err(UpstreamError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    match response.result {
        Some(Value::Null) | None => Err(UpstreamError::InvalidResponse(
            "response has no result".to_string(),
        )),
        Some(value) => Ok(value),
    }
}

/// Extract a string result (quantities are hex strings on the wire).
pub fn decode_string_result(body: &[u8]) -> Result<String, UpstreamError> {
    match decode_result(body)? {
        Value::String(s) => Ok(s),
        other => Err(UpstreamError::InvalidResponse(format!(
            "expected string result, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_envelope() {
        let req = RpcRequest::new(7, "eth_blockNumber", serde_json::json!([]));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"jsonrpc": "2.0", "id": 7, "method": "eth_blockNumber", "params": []})
        );
    }

    #[test]
    fn decodes_result() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#;
        assert_eq!(decode_string_result(body).unwrap(), "0x10");
    }

    #[test]
    fn decodes_rpc_error() {
        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#;
        assert_eq!(
            decode_result(body),
            Err(UpstreamError::Rpc {
                code: -32000,
                message: "header not found".to_string()
            })
        );
    }

    #[test]
    fn rejects_missing_or_wrong_result() {
        assert!(matches!(
            decode_result(br#"{"jsonrpc":"2.0","id":1,"result":null}"#),
            Err(UpstreamError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_string_result(br#"{"jsonrpc":"2.0","id":1,"result":16}"#),
            Err(UpstreamError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_result(b"<html>bad gateway</html>"),
            Err(UpstreamError::InvalidResponse(_))
        ));
    }
}
