//! Configuration module
//!
//! Handles loading and managing configuration.

pub mod env;
pub mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::{default_config_path, ConfigFile};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::devnet::{BootstrapConfig, ReadinessConfig, ServiceRole};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum tests in flight
    pub max_concurrent: usize,

    /// Time a finished test keeps its slot, in milliseconds (0 disables)
    pub launch_delay_ms: u64,

    /// Per-test timeout in seconds
    pub test_timeout_secs: u64,

    pub l1_ready_timeout_secs: u64,
    pub l2_ready_timeout_secs: u64,
    pub ready_poll_interval_ms: u64,

    /// Start an output proposer alongside the sequencer
    pub with_proposer: bool,

    /// Client label attached to every result
    pub client_label: String,

    /// Pre-built contract and genesis artifacts
    pub artifacts_dir: PathBuf,

    /// Per-instance service directories are created here
    pub work_dir: PathBuf,

    /// Optional command deploying the L1 contracts
    pub deploy_command: Option<CommandSpec>,

    /// How to launch each service role
    pub clients: HashMap<ServiceRole, ClientCommand>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 40,
            launch_delay_ms: 5000,
            test_timeout_secs: 120,
            l1_ready_timeout_secs: 10,
            l2_ready_timeout_secs: 10,
            ready_poll_interval_ms: 500,
            with_proposer: false,
            client_label: "op-l2".to_string(),
            artifacts_dir: PathBuf::from("./artifacts"),
            work_dir: std::env::temp_dir().join("devnet-sim"),
            deploy_command: None,
            clients: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    /// Readiness and topology settings for the bootstrapper
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        let poll = Duration::from_millis(self.ready_poll_interval_ms);
        BootstrapConfig {
            l1_ready: ReadinessConfig::new(Duration::from_secs(self.l1_ready_timeout_secs))
                .poll_interval(poll),
            l2_ready: ReadinessConfig::new(Duration::from_secs(self.l2_ready_timeout_secs))
                .poll_interval(poll),
            with_proposer: self.with_proposer,
        }
    }

    /// Roles the bootstrap will start
    pub fn required_roles(&self) -> Vec<ServiceRole> {
        ServiceRole::all()
            .into_iter()
            .filter(|role| *role != ServiceRole::OpProposer || self.with_proposer)
            .collect()
    }

    /// Required roles without a client command
    pub fn missing_clients(&self) -> Vec<ServiceRole> {
        self.required_roles()
            .into_iter()
            .filter(|role| !self.clients.contains_key(role))
            .collect()
    }
}

/// Program plus arguments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Launch definition for one service role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCommand {
    #[serde(flatten)]
    pub command: CommandSpec,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Extra client flags, passed with the unpack prefix
    #[serde(default)]
    pub unpack: BTreeMap<String, String>,
}

impl ClientCommand {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            http_port: default_http_port(),
            ws_port: default_ws_port(),
            unpack: BTreeMap::new(),
        }
    }

    pub fn with_ports(mut self, http_port: u16, ws_port: u16) -> Self {
        self.http_port = http_port;
        self.ws_port = ws_port;
        self
    }
}

fn default_http_port() -> u16 {
    8545
}

fn default_ws_port() -> u16 {
    8546
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_concurrent, 40);
        assert_eq!(config.launch_delay(), Duration::from_secs(5));
        assert_eq!(config.test_timeout(), Duration::from_secs(120));
        assert_eq!(config.client_label, "op-l2");
    }

    #[test]
    fn test_bootstrap_config() {
        let config = AppConfig {
            l2_ready_timeout_secs: 30,
            ready_poll_interval_ms: 250,
            with_proposer: true,
            ..Default::default()
        };
        let bootstrap = config.bootstrap_config();
        assert_eq!(bootstrap.l1_ready.timeout, Duration::from_secs(10));
        assert_eq!(bootstrap.l2_ready.timeout, Duration::from_secs(30));
        assert_eq!(bootstrap.l2_ready.poll_interval, Duration::from_millis(250));
        assert!(bootstrap.with_proposer);
    }

    #[test]
    fn test_missing_clients() {
        let mut config = AppConfig::default();
        assert_eq!(config.missing_clients().len(), 4);

        config
            .clients
            .insert(ServiceRole::Eth1, ClientCommand::new(CommandSpec::new("geth")));
        assert!(!config.missing_clients().contains(&ServiceRole::Eth1));

        config.with_proposer = true;
        assert!(config.missing_clients().contains(&ServiceRole::OpProposer));
    }

    #[test]
    fn test_client_command_yaml() {
        let yaml = r#"
program: op-geth
args: ["--dev"]
unpack:
  GETH_VERBOSITY: "3"
"#;
        let client: ClientCommand = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(client.command.program, "op-geth");
        assert_eq!(client.command.args, vec!["--dev"]);
        assert_eq!(client.http_port, 8545);
        assert_eq!(client.unpack["GETH_VERBOSITY"], "3");
    }
}
