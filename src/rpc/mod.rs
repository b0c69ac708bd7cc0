//! JSON-RPC transport sessions
//!
//! A test runs over exactly one session, either a pooled HTTP client or a
//! dedicated WebSocket connection that can also carry subscriptions.

mod http;
mod ws;

pub use http::HttpRpc;
pub use ws::{Notification, WsRpc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::Transport;

/// RPC errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("RPC error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Connection closed")]
    Closed,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// Any frame a server can send: a response or a subscription notification
#[derive(Debug, Deserialize)]
struct RpcFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: String,
    result: Value,
}

impl RpcFrame {
    fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(RpcError::Server {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Transport session owned by a single test
pub enum Session {
    Http(HttpRpc),
    Ws(WsRpc),
}

impl Session {
    pub fn transport(&self) -> Transport {
        match self {
            Session::Http(_) => Transport::Http,
            Session::Ws(_) => Transport::Ws,
        }
    }

    /// Issue a JSON-RPC call
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        match self {
            Session::Http(rpc) => rpc.call(method, params).await,
            Session::Ws(rpc) => rpc.call(method, params).await,
        }
    }

    /// Subscription-capable view, if this is a WebSocket session
    pub fn as_ws(&mut self) -> Option<&mut WsRpc> {
        match self {
            Session::Ws(rpc) => Some(rpc),
            Session::Http(_) => None,
        }
    }
}

/// Parse a `0x`-prefixed quantity
pub fn parse_quantity(value: &Value) -> Result<u128, RpcError> {
    let text = value
        .as_str()
        .ok_or_else(|| RpcError::Malformed(format!("expected hex quantity, got {value}")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Malformed(format!("quantity '{text}' lacks 0x prefix")))?;
    if digits.is_empty() {
        return Err(RpcError::Malformed("empty quantity".to_string()));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Malformed(format!("quantity '{text}': {e}")))
}
