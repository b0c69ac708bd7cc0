//! Service control interface
//!
//! The bootstrapper only ever talks to services through `ServiceController`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::params::StartOptions;

/// Roles a devnet service can play
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceRole {
    /// L1 execution node
    Eth1,
    /// L2 execution engine
    OpL2,
    /// Rollup node driving the engine
    OpNode,
    OpBatcher,
    OpProposer,
}

impl ServiceRole {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceRole::Eth1 => "eth1",
            ServiceRole::OpL2 => "op-l2",
            ServiceRole::OpNode => "op-node",
            ServiceRole::OpBatcher => "op-batcher",
            ServiceRole::OpProposer => "op-proposer",
        }
    }

    pub fn all() -> Vec<ServiceRole> {
        vec![
            ServiceRole::Eth1,
            ServiceRole::OpL2,
            ServiceRole::OpNode,
            ServiceRole::OpBatcher,
            ServiceRole::OpProposer,
        ]
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Addressable handle of a started service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    pub role: ServiceRole,
    pub index: usize,
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
}

impl ServiceHandle {
    pub fn new(role: ServiceRole, index: usize, host: impl Into<String>) -> Self {
        Self {
            role,
            index,
            host: host.into(),
            http_port: 8545,
            ws_port: 8546,
        }
    }

    pub fn with_ports(mut self, http_port: u16, ws_port: u16) -> Self {
        self.http_port = http_port;
        self.ws_port = ws_port;
        self
    }

    /// Instance name, e.g. `op-l2-0`
    pub fn name(&self) -> String {
        format!("{}-{}", self.role, self.index)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.ws_port)
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name(), self.host, self.http_port)
    }
}

/// Starts services and answers readiness probes
#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Start an instance of `role`
    async fn start(&self, role: ServiceRole, options: StartOptions) -> Result<ServiceHandle>;

    /// One readiness probe; `Ok(false)` means not ready yet.
    /// An `Err` is fatal (e.g. the service exited).
    async fn probe(&self, handle: &ServiceHandle) -> Result<bool>;
}
