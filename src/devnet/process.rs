//! Local process service controller
//!
//! Launches each role from a configured command. File payloads are written
//! below a per-instance directory (absolute paths are re-rooted there) and
//! parameters are passed as environment variables. A child's stdout and
//! stderr go to `output.log` in its instance directory, never to ours.
//! Children are killed when the controller is dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::params::{StartFile, StartOptions, UnpackParams};
use super::service::{ServiceController, ServiceHandle, ServiceRole};
use crate::config::ClientCommand;
use crate::rpc::HttpRpc;

/// Combined stdout/stderr of a service, inside its instance directory
pub const OUTPUT_LOG: &str = "output.log";

/// Controller that runs services as child processes on this host
pub struct ProcessController {
    clients: HashMap<ServiceRole, ClientCommand>,
    work_dir: PathBuf,
    host: String,
    probe_timeout: Duration,
    children: Mutex<HashMap<String, Child>>,
    counts: Mutex<HashMap<ServiceRole, usize>>,
}

impl ProcessController {
    pub fn new(clients: HashMap<ServiceRole, ClientCommand>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            clients,
            work_dir: work_dir.into(),
            host: "127.0.0.1".to_string(),
            probe_timeout: Duration::from_secs(2),
            children: Mutex::new(HashMap::new()),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn next_index(&self, role: ServiceRole) -> usize {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(role).or_insert(0);
        let index = *count;
        *count += 1;
        index
    }
}

#[async_trait]
impl ServiceController for ProcessController {
    async fn start(&self, role: ServiceRole, options: StartOptions) -> Result<ServiceHandle> {
        let client = self
            .clients
            .get(&role)
            .with_context(|| format!("No client command configured for {role}"))?;

        let index = self.next_index(role).await;
        // ports are offset per instance so several of a role can coexist
        let offset = u16::try_from(index * 10).context("Too many instances")?;
        let (http_port, ws_port) = client
            .http_port
            .checked_add(offset)
            .zip(client.ws_port.checked_add(offset))
            .with_context(|| format!("Port range exhausted for {role}"))?;
        let handle =
            ServiceHandle::new(role, index, self.host.clone()).with_ports(http_port, ws_port);

        let instance_dir = self.work_dir.join(handle.name());
        tokio::fs::create_dir_all(&instance_dir)
            .await
            .with_context(|| format!("Failed to create {}", instance_dir.display()))?;

        for file in &options.files {
            write_start_file(&instance_dir, file).await?;
        }

        let log_path = instance_dir.join(OUTPUT_LOG);
        let stdout = tokio::fs::File::create(&log_path)
            .await
            .with_context(|| format!("Failed to create {}", log_path.display()))?
            .into_std()
            .await;
        let stderr = stdout
            .try_clone()
            .with_context(|| format!("Failed to share {}", log_path.display()))?;

        let mut params = options.params;
        params.merge(UnpackParams::from(client.unpack.clone()).params());

        let mut command = Command::new(&client.command.program);
        command
            .args(&client.command.args)
            .current_dir(&instance_dir)
            .env("HIVE_INSTANCE_DIR", &instance_dir)
            .env("HIVE_HTTP_PORT", handle.http_port.to_string())
            .env("HIVE_WS_PORT", handle.ws_port.to_string())
            .envs(params.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to start {} ({})", role, client.command.program))?;

        info!(
            "Started {} (pid {:?}) with {} params, output in {}",
            handle,
            child.id(),
            params.len(),
            log_path.display()
        );
        let mut children = self.children.lock().await;
        children.insert(handle.name(), child);
        debug!("{} services running", children.len());

        Ok(handle)
    }

    async fn probe(&self, handle: &ServiceHandle) -> Result<bool> {
        {
            let mut children = self.children.lock().await;
            let child = children
                .get_mut(&handle.name())
                .with_context(|| format!("{} was never started", handle.name()))?;
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("{} exited with {}", handle.name(), status);
            }
        }

        let rpc = HttpRpc::new(handle.http_url(), self.probe_timeout)?;
        match rpc.call("eth_chainId", json!([])).await {
            Ok(chain_id) => {
                debug!("{} answered eth_chainId={}", handle.name(), chain_id);
                Ok(true)
            }
            Err(e) => {
                debug!("{} probe failed: {}", handle.name(), e);
                Ok(false)
            }
        }
    }
}

/// Write `file` under `root`, re-rooting absolute paths
async fn write_start_file(root: &Path, file: &StartFile) -> Result<PathBuf> {
    let relative = file.path.trim_start_matches('/');
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, &file.contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {} ({} bytes)", path.display(), file.contents.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandSpec;
    use crate::devnet::params::{default_jwt_file, Params};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn client(program: &str, args: &[&str]) -> ClientCommand {
        ClientCommand {
            command: CommandSpec {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            },
            http_port: 18545,
            ws_port: 18546,
            unpack: BTreeMap::from([("OP_NODE_RPC_PORT".to_string(), "9545".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_start_file_rerooted() {
        let dir = tempdir().unwrap();
        let path = write_start_file(dir.path(), &default_jwt_file())
            .await
            .unwrap();

        assert!(path.starts_with(dir.path()));
        assert!(path.ends_with("hive/input/jwt-secret.txt"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("0x2a"));
    }

    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let dir = tempdir().unwrap();
        let controller = ProcessController::new(HashMap::new(), dir.path());
        let result = controller
            .start(ServiceRole::Eth1, StartOptions::new())
            .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_passes_params_and_files() {
        let dir = tempdir().unwrap();
        let clients = HashMap::from([(
            ServiceRole::Eth1,
            client("sh", &["-c", "env > env.txt; sleep 5"]),
        )]);
        let controller = ProcessController::new(clients, dir.path());

        let options = StartOptions::new()
            .params(Params::new().set("HIVE_NETWORK_ID", "900"))
            .file(default_jwt_file());
        let first = controller.start(ServiceRole::Eth1, options).await.unwrap();
        let second = controller
            .start(ServiceRole::Eth1, StartOptions::new())
            .await
            .unwrap();

        assert_eq!(first.name(), "eth1-0");
        assert_eq!(second.http_port, first.http_port + 10);
        assert_eq!(controller.children.lock().await.len(), 2);

        let instance = dir.path().join("eth1-0");
        assert!(instance.join("hive/input/jwt-secret.txt").exists());

        let env_file = instance.join("env.txt");
        for _ in 0..50 {
            if std::fs::read_to_string(&env_file)
                .map(|s| s.contains("HIVE_UNPACK_OP_NODE_RPC_PORT"))
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let env = std::fs::read_to_string(&env_file).unwrap();
        assert!(env.contains("HIVE_NETWORK_ID=900"));
        assert!(env.contains("HIVE_UNPACK_OP_NODE_RPC_PORT=9545"));
        assert!(env.contains("HIVE_HTTP_PORT=18545"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_is_an_error() {
        let dir = tempdir().unwrap();
        let clients = HashMap::from([(ServiceRole::OpL2, client("sh", &["-c", "exit 3"]))]);
        let controller = ProcessController::new(clients, dir.path());

        let handle = controller
            .start(ServiceRole::OpL2, StartOptions::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(controller.probe(&handle).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_not_ready_while_port_closed() {
        let dir = tempdir().unwrap();
        let clients = HashMap::from([(ServiceRole::OpL2, client("sleep", &["5"]))]);
        let controller = ProcessController::new(clients, dir.path())
            .with_probe_timeout(Duration::from_millis(200));

        let handle = controller
            .start(ServiceRole::OpL2, StartOptions::new())
            .await
            .unwrap();
        assert!(!controller.probe(&handle).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_output_goes_to_instance_log() {
        let dir = tempdir().unwrap();
        let clients = HashMap::from([(
            ServiceRole::OpNode,
            client("sh", &["-c", "echo node-started; echo node-warning >&2; sleep 5"]),
        )]);
        let controller = ProcessController::new(clients, dir.path());
        controller
            .start(ServiceRole::OpNode, StartOptions::new())
            .await
            .unwrap();

        let log = dir.path().join("op-node-0").join(OUTPUT_LOG);
        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&log).unwrap_or_default();
            if contents.contains("node-warning") && contents.contains("node-started") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(contents.contains("node-started"), "{contents:?}");
        assert!(contents.contains("node-warning"), "{contents:?}");
    }
}
