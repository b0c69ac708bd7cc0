//! Transport categories encoded in test names
//!
//! Test names look like `http/CodeAt`; the part before the first `/` picks
//! the session type the test runs over.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Routing faults for malformed catalog entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("test name '{0}' has no transport separator '/'")]
    MissingSeparator(String),

    #[error("test name '{0}' has nothing after the transport prefix")]
    EmptySuffix(String),

    #[error("bad test prefix '{prefix}' in name '{name}'")]
    UnknownTransport { prefix: String, name: String },
}

/// Session variant a test executes over
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Persistent-connection JSON-RPC over HTTP
    Http,
    /// Subscription-capable JSON-RPC over WebSocket
    Ws,
}

impl Transport {
    pub fn prefix(&self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Ws => "ws",
        }
    }

    pub fn all() -> Vec<Transport> {
        vec![Transport::Http, Transport::Ws]
    }

    pub fn from_prefix(prefix: &str) -> Option<Transport> {
        match prefix {
            "http" => Some(Transport::Http),
            "ws" => Some(Transport::Ws),
            _ => None,
        }
    }

    /// Split a test name into its transport and the remaining test name
    pub fn parse_name(name: &str) -> Result<(Transport, &str), RouteError> {
        let (prefix, rest) = name
            .split_once('/')
            .ok_or_else(|| RouteError::MissingSeparator(name.to_string()))?;

        let transport =
            Transport::from_prefix(prefix).ok_or_else(|| RouteError::UnknownTransport {
                prefix: prefix.to_string(),
                name: name.to_string(),
            })?;

        if rest.is_empty() {
            return Err(RouteError::EmptySuffix(name.to_string()));
        }

        Ok((transport, rest))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}
