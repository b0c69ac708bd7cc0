//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{AppConfig, ClientCommand, CommandSpec};
use crate::devnet::ServiceRole;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./devnet-sim.yaml",
    "./devnet-sim.yml",
    "./.devnet-sim/config.yaml",
    "~/.config/devnet-sim/config.yaml",
];

/// Full configuration file structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::find() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = ConfigFormat::of(path)
            .parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = ConfigFormat::of(path).render(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !["1.0"].contains(&self.version.as_str()) {
            anyhow::bail!("Unsupported config version: {}", self.version);
        }

        let app = &self.app;
        if app.max_concurrent == 0 {
            anyhow::bail!("max_concurrent must be at least 1");
        }
        if app.test_timeout_secs == 0 {
            anyhow::bail!("test_timeout_secs must be at least 1");
        }
        if app.ready_poll_interval_ms == 0 {
            anyhow::bail!("ready_poll_interval_ms must be at least 1");
        }
        if app.client_label.trim().is_empty() {
            anyhow::bail!("client_label must not be empty");
        }

        for (role, client) in &app.clients {
            if client.command.program.trim().is_empty() {
                anyhow::bail!("Client '{}' has no program", role);
            }
            if client.http_port == 0 || client.ws_port == 0 {
                anyhow::bail!("Client '{}' needs non-zero http/ws ports", role);
            }
        }

        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        let client = |program: &str, http_port: u16| {
            ClientCommand::new(CommandSpec::new(program)).with_ports(http_port, http_port + 1)
        };

        let mut app = AppConfig {
            max_concurrent: 8,
            deploy_command: Some(CommandSpec::new("./deploy.sh")),
            ..Default::default()
        };
        app.clients.insert(ServiceRole::Eth1, client("./clients/eth1.sh", 8545));
        app.clients.insert(ServiceRole::OpL2, client("./clients/op-geth.sh", 9545));
        app.clients.insert(ServiceRole::OpNode, client("./clients/op-node.sh", 7545));
        app.clients.insert(ServiceRole::OpBatcher, client("./clients/op-batcher.sh", 6545));
        app.clients.insert(ServiceRole::OpProposer, client("./clients/op-proposer.sh", 5545));

        Self {
            version: default_version(),
            app,
        }
    }
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    expand_path("~/.config/devnet-sim/config.yaml")
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// On-disk encoding, picked by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }

    fn parse(self, content: &str) -> Result<ConfigFile> {
        Ok(match self {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        })
    }

    fn render(self, config: &ConfigFile) -> Result<String> {
        let content = match self {
            ConfigFormat::Yaml => serde_yaml::to_string(config)?,
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        };
        Ok(content)
    }
}
