//! JSON-RPC over HTTP
//!
//! Pooled persistent connections via reqwest.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{RpcError, RpcFrame, RpcRequest};

/// HTTP JSON-RPC client
#[derive(Clone, Debug)]
pub struct HttpRpc {
    client: Client,
    url: String,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl HttpRpc {
    /// Create a client for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            timeout,
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, &params);

        debug!("POST {} {}", self.url, method);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.timeout)
                } else if e.is_connect() {
                    RpcError::ConnectionRefused(self.url.clone())
                } else {
                    RpcError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::RequestFailed(format!(
                "{} returned HTTP {}",
                method,
                status.as_u16()
            )));
        }

        let frame: RpcFrame = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        debug!("{} answered in {}ms", method, start.elapsed().as_millis());

        if frame.id != Some(id) {
            return Err(RpcError::Malformed(format!(
                "response id {:?} does not match request id {}",
                frame.id, id
            )));
        }
        frame.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::test_support::{handler, serve_http};
    use serde_json::json;

    #[tokio::test]
    async fn test_call_roundtrip() {
        let url = serve_http(handler(|method, params| match method {
            "eth_chainId" => Ok(json!("0x385")),
            "echo" => Ok(params.clone()),
            _ => Err((-32601, "method not found".to_string())),
        }))
        .await;

        let rpc = HttpRpc::new(url, Duration::from_secs(5)).unwrap();
        assert_eq!(rpc.call("eth_chainId", json!([])).await.unwrap(), json!("0x385"));
        assert_eq!(rpc.call("echo", json!([1, 2])).await.unwrap(), json!([1, 2]));

        let err = rpc.call("eth_nope", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::Server { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let rpc = HttpRpc::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = rpc.call("eth_chainId", json!([])).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionRefused(_)));
    }
}
