//! Devnet configuration and contract provisioning
//!
//! Produces the L1/L2/rollup configuration payloads the services start
//! from. `ArtifactProvisioner` works off a directory of pre-built artifacts:
//!
//! ```text
//! <artifacts>/
//!   contracts/            compiled contract artifacts
//!   deploy-config.json
//!   l1-genesis.json
//!   deployments.json      written by the deploy command, if any
//!   l2-genesis.json
//!   rollup.json           template; genesis block refs are filled in
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::service::ServiceHandle;
use crate::config::CommandSpec;
use crate::rpc::{parse_quantity, HttpRpc};

/// Compiled contracts plus their deploy configuration
#[derive(Clone, Debug)]
pub struct ContractArtifacts {
    pub dir: PathBuf,
    pub deploy_config: Value,
}

/// Configuration payloads shared read-only with every test
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DevnetConfigs {
    pub deploy: Value,
    pub l1_genesis: Value,
    pub deployments: Value,
    pub l2_genesis: Value,
    pub rollup: Value,
}

impl DevnetConfigs {
    pub fn l2_chain_id(&self) -> Option<u64> {
        self.l2_genesis["config"]["chainId"].as_u64()
    }

    /// L2 genesis block hash recorded in the rollup config
    pub fn l2_genesis_hash(&self) -> Option<&str> {
        self.rollup["genesis"]["l2"]["hash"].as_str()
    }

    /// Accounts funded in the L2 genesis allocation
    pub fn l2_alloc(&self) -> Option<&serde_json::Map<String, Value>> {
        self.l2_genesis["alloc"].as_object()
    }
}

/// Provisioning actions run by the bootstrapper
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Locate contract artifacts and their deploy configuration
    async fn init_contracts(&self) -> Result<ContractArtifacts>;

    /// L1 genesis configuration
    async fn init_l1_config(&self, artifacts: &ContractArtifacts) -> Result<Value>;

    /// Deploy contracts onto the live L1 node; returns deployment addresses
    async fn deploy_l1_contracts(
        &self,
        artifacts: &ContractArtifacts,
        l1: &ServiceHandle,
    ) -> Result<Value>;

    /// L2 genesis configuration, built on the L1 deployment results
    async fn init_l2_config(&self, artifacts: &ContractArtifacts, deployments: &Value)
        -> Result<Value>;

    /// Rollup configuration derived from the live L1 node and L2 engine
    async fn init_rollup_config(&self, l1: &ServiceHandle, l2: &ServiceHandle) -> Result<Value>;
}

/// Provisioner backed by an artifact directory
pub struct ArtifactProvisioner {
    dir: PathBuf,
    deploy_command: Option<CommandSpec>,
    rpc_timeout: Duration,
}

impl ArtifactProvisioner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            deploy_command: None,
            rpc_timeout: Duration::from_secs(10),
        }
    }

    /// Command run against L1 to deploy contracts; it must write `deployments.json`
    pub fn with_deploy_command(mut self, command: Option<CommandSpec>) -> Self {
        self.deploy_command = command;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn genesis_block(&self, handle: &ServiceHandle) -> Result<Value> {
        let rpc = HttpRpc::new(handle.http_url(), self.rpc_timeout)?;
        let block = rpc
            .call("eth_getBlockByNumber", json!(["0x0", false]))
            .await
            .with_context(|| format!("Failed to fetch genesis block from {}", handle.name()))?;
        if block.is_null() {
            anyhow::bail!("{} has no genesis block", handle.name());
        }
        Ok(block)
    }
}

#[async_trait]
impl Provisioner for ArtifactProvisioner {
    async fn init_contracts(&self) -> Result<ContractArtifacts> {
        let contracts = self.path("contracts");
        if !contracts.is_dir() {
            anyhow::bail!("Contract artifacts not found: {}", contracts.display());
        }

        let deploy_config = read_json(&self.path("deploy-config.json")).await?;
        info!("Using contract artifacts from {}", self.dir.display());

        Ok(ContractArtifacts {
            dir: self.dir.clone(),
            deploy_config,
        })
    }

    async fn init_l1_config(&self, artifacts: &ContractArtifacts) -> Result<Value> {
        let mut genesis = read_json(&self.path("l1-genesis.json")).await?;
        object_at(&mut genesis, &[], "l1-genesis.json")?.insert(
            "timestamp".to_string(),
            json!(format!("{:#x}", Utc::now().timestamp())),
        );
        if let Some(chain_id) = artifacts.deploy_config["l1ChainID"].as_u64() {
            object_at(&mut genesis, &["config"], "l1-genesis.json")?
                .insert("chainId".to_string(), json!(chain_id));
        }

        Ok(genesis)
    }

    async fn deploy_l1_contracts(
        &self,
        artifacts: &ContractArtifacts,
        l1: &ServiceHandle,
    ) -> Result<Value> {
        if let Some(command) = &self.deploy_command {
            info!("Deploying L1 contracts via {}", command.program);

            let output = Command::new(&command.program)
                .args(&command.args)
                .current_dir(&artifacts.dir)
                .env("L1_RPC", l1.http_url())
                .env("DEPLOY_CONFIG", self.path("deploy-config.json"))
                .output()
                .await
                .with_context(|| format!("Failed to run deploy command {}", command.program))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("Contract deployment failed ({}): {}", output.status, stderr.trim());
            }
            debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
        }

        let deployments = read_json(&self.path("deployments.json")).await?;
        match deployments.as_object() {
            Some(map) if !map.is_empty() => {
                info!("{} L1 contracts deployed", map.len());
                Ok(deployments)
            }
            _ => anyhow::bail!("deployments.json lists no contracts"),
        }
    }

    async fn init_l2_config(
        &self,
        _artifacts: &ContractArtifacts,
        deployments: &Value,
    ) -> Result<Value> {
        let mut genesis = read_json(&self.path("l2-genesis.json")).await?;
        object_at(&mut genesis, &[], "l2-genesis.json")?;

        if let Some(portal) = deployments["OptimismPortalProxy"].as_str() {
            object_at(&mut genesis, &["config", "optimism"], "l2-genesis.json")?
                .insert("portal".to_string(), json!(portal));
        }

        Ok(genesis)
    }

    async fn init_rollup_config(&self, l1: &ServiceHandle, l2: &ServiceHandle) -> Result<Value> {
        let mut rollup = read_json(&self.path("rollup.json")).await?;
        object_at(&mut rollup, &["genesis"], "rollup.json")?;

        let l1_block = self.genesis_block(l1).await?;
        let l2_block = self.genesis_block(l2).await?;
        let l2_time = parse_quantity(&l2_block["timestamp"])
            .context("L2 genesis block has no valid timestamp")?;

        let genesis = object_at(&mut rollup, &["genesis"], "rollup.json")?;
        genesis.insert("l1".to_string(), json!({"hash": l1_block["hash"], "number": 0}));
        genesis.insert("l2".to_string(), json!({"hash": l2_block["hash"], "number": 0}));
        genesis.insert("l2_time".to_string(), json!(l2_time as u64));

        info!(
            "Rollup genesis: l1={} l2={}",
            l1_block["hash"], l2_block["hash"]
        );
        Ok(rollup)
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Object reached by walking `path` from `value`. Missing or null keys are
/// created as empty objects; any other non-object is an error.
fn object_at<'a>(
    value: &'a mut Value,
    path: &[&str],
    name: &str,
) -> Result<&'a mut Map<String, Value>> {
    let mut current = value;
    for (depth, key) in path.iter().enumerate() {
        let map = current.as_object_mut().with_context(|| {
            format!("{name}: '{}' must be a JSON object", location(&path[..depth]))
        })?;
        let entry = map.entry(key.to_string()).or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }
    current
        .as_object_mut()
        .with_context(|| format!("{name}: '{}' must be a JSON object", location(path)))
}

fn location(path: &[&str]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}
