//! Execution context handed to each check

use serde_json::Value;
use std::sync::Arc;

use crate::devnet::{DevnetConfigs, ServiceTopology};
use crate::models::Transport;
use crate::rpc::{parse_quantity, Session};

/// Account funded in the L2 genesis allocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundedAccount {
    pub address: String,
    pub balance: u128,
    pub nonce: u64,
}

/// Read-only pool of pre-funded accounts
#[derive(Clone, Debug, Default)]
pub struct Vault {
    accounts: Vec<FundedAccount>,
}

impl Vault {
    pub fn new(accounts: Vec<FundedAccount>) -> Self {
        Self { accounts }
    }

    /// Externally owned accounts with a non-zero genesis balance, sorted by
    /// address. Contract entries are skipped.
    pub fn from_configs(configs: &DevnetConfigs) -> Self {
        let Some(alloc) = configs.l2_alloc() else {
            return Self::default();
        };

        let mut accounts: Vec<_> = alloc
            .iter()
            .filter(|(_, entry)| entry.get("code").map_or(true, is_empty_code))
            .filter_map(|(address, entry)| {
                let balance = parse_amount(&entry["balance"])?;
                let nonce = entry
                    .get("nonce")
                    .and_then(parse_amount)
                    .and_then(|n| u64::try_from(n).ok())
                    .unwrap_or(0);
                (balance > 0).then(|| FundedAccount {
                    address: normalize_address(address),
                    balance,
                    nonce,
                })
            })
            .collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));

        Self::new(accounts)
    }

    pub fn get(&self, index: usize) -> Option<&FundedAccount> {
        self.accounts.get(index)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn is_empty_code(code: &Value) -> bool {
    matches!(code.as_str(), None | Some("") | Some("0x"))
}

/// Genesis amounts appear both as hex quantities and decimal strings
fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) if s.starts_with("0x") => parse_quantity(value).ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn normalize_address(address: &str) -> String {
    let address = address.to_lowercase();
    if address.starts_with("0x") {
        address
    } else {
        format!("0x{address}")
    }
}

/// Read-only state shared by every test of a run
#[derive(Clone, Debug)]
pub struct SharedContext {
    pub topology: Arc<ServiceTopology>,
    pub vault: Arc<Vault>,
    /// Client label attached to results
    pub client: String,
}

impl SharedContext {
    pub fn new(topology: ServiceTopology, client: impl Into<String>) -> Self {
        let vault = Vault::from_configs(&topology.configs);
        Self {
            topology: Arc::new(topology),
            vault: Arc::new(vault),
            client: client.into(),
        }
    }

    pub fn configs(&self) -> &DevnetConfigs {
        &self.topology.configs
    }
}

/// Everything one check may use: its own session plus the shared state
pub struct ExecutionContext {
    pub test_name: String,
    pub transport: Transport,
    pub session: Session,
    pub shared: SharedContext,
}

impl ExecutionContext {
    pub fn topology(&self) -> &ServiceTopology {
        &self.shared.topology
    }

    pub fn vault(&self) -> &Vault {
        &self.shared.vault
    }

    pub fn configs(&self) -> &DevnetConfigs {
        self.shared.configs()
    }
}
