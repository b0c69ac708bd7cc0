//! JSON-RPC over WebSocket
//!
//! One connection per session. Subscription notifications that arrive while
//! a call is waiting for its response are buffered, not dropped.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{RpcError, RpcFrame, RpcRequest};

/// A subscription notification
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub subscription: String,
    pub result: Value,
}

/// WebSocket JSON-RPC client
pub struct WsRpc {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    next_id: u64,
    pending: VecDeque<Notification>,
    timeout: Duration,
}

impl WsRpc {
    /// Open a connection to `url`
    pub async fn connect(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let url = url.into();
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| RpcError::Timeout(timeout))?
            .map_err(|e| RpcError::ConnectionRefused(format!("{url}: {e}")))?;

        debug!("WebSocket connected to {}", url);

        Ok(Self {
            stream,
            url,
            next_id: 1,
            pending: VecDeque::new(),
            timeout,
        })
    }

    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let text = serde_json::to_string(&RpcRequest::new(id, method, &params))
            .map_err(|e| RpcError::RequestFailed(e.to_string()))?;
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| RpcError::RequestFailed(e.to_string()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let frame = self.read_frame(deadline, self.timeout).await?;
            if frame.id == Some(id) {
                return frame.into_result();
            }
            match (frame.id, frame.params) {
                (None, Some(params)) => self.pending.push_back(Notification {
                    subscription: params.subscription,
                    result: params.result,
                }),
                (other, _) => debug!("Ignoring unexpected frame with id {:?}", other),
            }
        }
    }

    /// Start a subscription, e.g. `newHeads`; returns the subscription id
    pub async fn subscribe(&mut self, kind: &str, extra: Option<Value>) -> Result<String, RpcError> {
        let params = match extra {
            Some(arg) => json!([kind, arg]),
            None => json!([kind]),
        };
        let id = self.call("eth_subscribe", params).await?;
        id.as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Malformed(format!("subscription id {id} is not a string")))
    }

    pub async fn unsubscribe(&mut self, subscription: &str) -> Result<bool, RpcError> {
        let result = self.call("eth_unsubscribe", json!([subscription])).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Wait for the next notification of `subscription`
    pub async fn next_notification(
        &mut self,
        subscription: &str,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|n| n.subscription == subscription)
        {
            if let Some(notification) = self.pending.remove(pos) {
                return Ok(notification.result);
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.read_frame(deadline, timeout).await?;
            if let Some(params) = frame.params {
                if params.subscription == subscription {
                    return Ok(params.result);
                }
                self.pending.push_back(Notification {
                    subscription: params.subscription,
                    result: params.result,
                });
            }
        }
    }

    /// Next JSON frame; `timeout` is the budget that `deadline` was built from
    async fn read_frame(
        &mut self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<RpcFrame, RpcError> {
        loop {
            let next = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .map_err(|_| RpcError::Timeout(timeout))?;

            let message = match next {
                None => {
                    debug!("{} closed the connection", self.url);
                    return Err(RpcError::Closed);
                }
                Some(Err(e)) => return Err(RpcError::RequestFailed(e.to_string())),
                Some(Ok(message)) => message,
            };

            return match message {
                Message::Text(text) => {
                    serde_json::from_str(&text).map_err(|e| RpcError::Malformed(e.to_string()))
                }
                Message::Binary(bytes) => {
                    serde_json::from_slice(&bytes).map_err(|e| RpcError::Malformed(e.to_string()))
                }
                Message::Close(_) => Err(RpcError::Closed),
                _ => continue,
            };
        }
    }
}
