//! Devnet bootstrap
//!
//! Brings the devnet up one stage at a time. Each stage needs the outputs
//! or the liveness of the one before it, so stages never run concurrently
//! and the first failure aborts the whole bootstrap.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::health::{wait_ready, ReadinessConfig, ReadinessError};
use super::params::{default_jwt_file, Params, StartFile, StartOptions, UnpackParams, DEFAULT_JWT_PATH};
use super::provision::{ContractArtifacts, Provisioner};
use super::service::{ServiceController, ServiceHandle, ServiceRole};
use super::topology::ServiceTopology;
use crate::utils::timer::StageTimer;

/// Bootstrap stages in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitContracts,
    InitL1Config,
    StartL1,
    WaitL1Ready,
    DeployL1Contracts,
    InitL2Config,
    StartL2Engine,
    WaitL2Ready,
    InitRollupConfig,
    StartSequencer,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::InitContracts,
        Stage::InitL1Config,
        Stage::StartL1,
        Stage::WaitL1Ready,
        Stage::DeployL1Contracts,
        Stage::InitL2Config,
        Stage::StartL2Engine,
        Stage::WaitL2Ready,
        Stage::InitRollupConfig,
        Stage::StartSequencer,
    ];

    /// 1-based position in the pipeline
    pub fn number(&self) -> usize {
        *self as usize + 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::InitContracts => "init contracts",
            Stage::InitL1Config => "init L1 config",
            Stage::StartL1 => "start L1 node",
            Stage::WaitL1Ready => "wait for L1 node",
            Stage::DeployL1Contracts => "deploy L1 contracts",
            Stage::InitL2Config => "init L2 config",
            Stage::StartL2Engine => "start L2 engine",
            Stage::WaitL2Ready => "wait for L2 engine",
            Stage::InitRollupConfig => "init rollup config",
            Stage::StartSequencer => "start sequencer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fatal bootstrap errors
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("bootstrap stage '{stage}' failed: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("bootstrap stage '{stage}' failed: {source}")]
    NotReady {
        stage: Stage,
        #[source]
        source: ReadinessError,
    },
}

impl BootstrapError {
    pub fn stage(&self) -> Stage {
        match self {
            BootstrapError::Failed { stage, .. } | BootstrapError::NotReady { stage, .. } => *stage,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BootstrapError::NotReady {
                source: ReadinessError::Timeout { .. },
                ..
            }
        )
    }
}

/// Bootstrap settings
#[derive(Clone, Debug)]
pub struct BootstrapConfig {
    pub l1_ready: ReadinessConfig,
    pub l2_ready: ReadinessConfig,
    /// Also start an output proposer with the sequencer stack
    pub with_proposer: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            l1_ready: ReadinessConfig::default(),
            l2_ready: ReadinessConfig::default(),
            with_proposer: false,
        }
    }
}

#[derive(Default)]
struct BootstrapState {
    artifacts: Option<ContractArtifacts>,
    topology: ServiceTopology,
}

impl BootstrapState {
    fn artifacts(&self) -> Result<&ContractArtifacts> {
        self.artifacts
            .as_ref()
            .context("contract artifacts not initialized")
    }

    fn l1(&self) -> Result<&ServiceHandle> {
        self.topology.l1(0).context("L1 node not started")
    }

    fn l2(&self) -> Result<&ServiceHandle> {
        self.topology.l2_engine(0).context("L2 engine not started")
    }
}

/// Runs the bootstrap stages against a controller and provisioner
pub struct Bootstrapper {
    controller: Arc<dyn ServiceController>,
    provisioner: Arc<dyn Provisioner>,
    config: BootstrapConfig,
}

impl Bootstrapper {
    pub fn new(
        controller: Arc<dyn ServiceController>,
        provisioner: Arc<dyn Provisioner>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            controller,
            provisioner,
            config,
        }
    }

    /// Run every stage in order and return the live topology
    pub async fn run(&self) -> Result<ServiceTopology, BootstrapError> {
        let mut state = BootstrapState::default();
        let mut timer = StageTimer::start();

        for stage in Stage::ALL {
            info!("[{}/{}] {}", stage.number(), Stage::ALL.len(), stage);
            self.run_stage(stage, &mut state).await?;
            timer.finish(stage.name());
        }

        info!(
            "Devnet up with {} services in {}ms",
            state.topology.len(),
            timer.total_ms()
        );
        if let Some((stage, took)) = timer.slowest() {
            debug!("Slowest stage: {} ({}ms)", stage, took.as_millis());
        }
        debug!("Stage timings:\n{}", timer.breakdown());

        Ok(state.topology)
    }

    async fn run_stage(&self, stage: Stage, state: &mut BootstrapState) -> Result<(), BootstrapError> {
        let failed = |e: anyhow::Error| BootstrapError::Failed {
            stage,
            source: e.into(),
        };
        let not_ready = |e: ReadinessError| BootstrapError::NotReady { stage, source: e };

        match stage {
            Stage::InitContracts => {
                let artifacts = self.provisioner.init_contracts().await.map_err(failed)?;
                state.topology.configs.deploy = artifacts.deploy_config.clone();
                state.artifacts = Some(artifacts);
            }
            Stage::InitL1Config => {
                let artifacts = state.artifacts().map_err(failed)?;
                let genesis = self
                    .provisioner
                    .init_l1_config(artifacts)
                    .await
                    .map_err(failed)?;
                state.topology.configs.l1_genesis = genesis;
            }
            Stage::StartL1 => {
                let options = genesis_options(&state.topology.configs.l1_genesis);
                let handle = self
                    .controller
                    .start(ServiceRole::Eth1, options)
                    .await
                    .map_err(failed)?;
                state.topology.add(handle);
            }
            Stage::WaitL1Ready => {
                let l1 = state.l1().map_err(failed)?;
                wait_ready(self.controller.as_ref(), l1, self.config.l1_ready)
                    .await
                    .map_err(not_ready)?;
            }
            Stage::DeployL1Contracts => {
                let deployments = self
                    .provisioner
                    .deploy_l1_contracts(state.artifacts().map_err(failed)?, state.l1().map_err(failed)?)
                    .await
                    .map_err(failed)?;
                state.topology.configs.deployments = deployments;
            }
            Stage::InitL2Config => {
                let genesis = self
                    .provisioner
                    .init_l2_config(
                        state.artifacts().map_err(failed)?,
                        &state.topology.configs.deployments,
                    )
                    .await
                    .map_err(failed)?;
                state.topology.configs.l2_genesis = genesis;
            }
            Stage::StartL2Engine => {
                let options = genesis_options(&state.topology.configs.l2_genesis);
                let handle = self
                    .controller
                    .start(ServiceRole::OpL2, options)
                    .await
                    .map_err(failed)?;
                state.topology.add(handle);
            }
            Stage::WaitL2Ready => {
                let l2 = state.l2().map_err(failed)?;
                wait_ready(self.controller.as_ref(), l2, self.config.l2_ready)
                    .await
                    .map_err(not_ready)?;
            }
            Stage::InitRollupConfig => {
                let rollup = self
                    .provisioner
                    .init_rollup_config(state.l1().map_err(failed)?, state.l2().map_err(failed)?)
                    .await
                    .map_err(failed)?;
                state.topology.configs.rollup = rollup;
            }
            Stage::StartSequencer => {
                self.start_sequencer(state).await.map_err(failed)?;
            }
        }

        Ok(())
    }

    /// Rollup node on top of L1 node 0 and L2 engine 0, then its batcher
    async fn start_sequencer(&self, state: &mut BootstrapState) -> Result<()> {
        let l1 = state.l1()?.clone();
        let l2 = state.l2()?.clone();
        let configs = &state.topology.configs;

        let node_options = StartOptions::new()
            .params(
                UnpackParams::new()
                    .set("OP_NODE_L1_ETH_RPC", l1.ws_url())
                    .set("OP_NODE_L2_ENGINE_RPC", l2.http_url())
                    .set("OP_NODE_L2_ENGINE_AUTH", DEFAULT_JWT_PATH)
                    .set("OP_NODE_ROLLUP_CONFIG", "/rollup.json")
                    .set("OP_NODE_SEQUENCER_ENABLED", "true")
                    .set("OP_NODE_SEQUENCER_L1_CONFS", "0")
                    .set("OP_NODE_VERIFIER_L1_CONFS", "0")
                    .params(),
            )
            .file(StartFile::json("/rollup.json", &configs.rollup))
            .file(default_jwt_file());
        let node = self
            .controller
            .start(ServiceRole::OpNode, node_options)
            .await?;

        let batcher_options = StartOptions::new().params(
            UnpackParams::new()
                .set("OP_BATCHER_L1_ETH_RPC", l1.http_url())
                .set("OP_BATCHER_L2_ETH_RPC", l2.http_url())
                .set("OP_BATCHER_ROLLUP_RPC", node.http_url())
                .set("OP_BATCHER_NUM_CONFIRMATIONS", "1")
                .set("OP_BATCHER_SAFE_ABORT_NONCE_TOO_LOW_COUNT", "3")
                .params(),
        );
        let batcher = self
            .controller
            .start(ServiceRole::OpBatcher, batcher_options)
            .await?;

        let proposer = if self.config.with_proposer {
            let oracle = configs.deployments["L2OutputOracleProxy"]
                .as_str()
                .context("deployments lack L2OutputOracleProxy")?;
            let options = StartOptions::new().params(
                UnpackParams::new()
                    .set("OP_PROPOSER_L1_ETH_RPC", l1.http_url())
                    .set("OP_PROPOSER_ROLLUP_RPC", node.http_url())
                    .set("OP_PROPOSER_L2OO_ADDRESS", oracle)
                    .params(),
            );
            Some(
                self.controller
                    .start(ServiceRole::OpProposer, options)
                    .await?,
            )
        } else {
            None
        };

        state.topology.add(node);
        state.topology.add(batcher);
        if let Some(proposer) = proposer {
            state.topology.add(proposer);
        }
        Ok(())
    }
}

/// Start options for an execution client booting from `genesis`
fn genesis_options(genesis: &Value) -> StartOptions {
    let mut params = Params::new();
    if let Some(chain_id) = genesis["config"]["chainId"].as_u64() {
        params = params
            .set("HIVE_NETWORK_ID", chain_id.to_string())
            .set("HIVE_CHAIN_ID", chain_id.to_string());
    }

    StartOptions::new()
        .params(params)
        .file(StartFile::json("/genesis.json", genesis))
        .file(default_jwt_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::provision::ContractArtifacts;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the stage each call belongs to and fails on request
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Stage>>,
        fail_at: Option<Stage>,
    }

    impl Recorder {
        fn hit(&self, stage: Stage) -> Result<()> {
            self.calls.lock().unwrap().push(stage);
            if self.fail_at == Some(stage) {
                anyhow::bail!("injected failure at {stage}");
            }
            Ok(())
        }

        fn calls(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeController {
        recorder: Arc<Recorder>,
        never_ready: Option<ServiceRole>,
        started: Mutex<Vec<(ServiceRole, StartOptions)>>,
    }

    #[async_trait]
    impl ServiceController for FakeController {
        async fn start(&self, role: ServiceRole, options: StartOptions) -> Result<ServiceHandle> {
            let stage = match role {
                ServiceRole::Eth1 => Stage::StartL1,
                ServiceRole::OpL2 => Stage::StartL2Engine,
                _ => Stage::StartSequencer,
            };
            self.recorder.hit(stage)?;
            self.started.lock().unwrap().push((role, options));
            Ok(ServiceHandle::new(role, 0, format!("{role}.devnet")))
        }

        async fn probe(&self, handle: &ServiceHandle) -> Result<bool> {
            let stage = match handle.role {
                ServiceRole::Eth1 => Stage::WaitL1Ready,
                _ => Stage::WaitL2Ready,
            };
            self.recorder.hit(stage)?;
            Ok(self.never_ready != Some(handle.role))
        }
    }

    struct FakeProvisioner {
        recorder: Arc<Recorder>,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn init_contracts(&self) -> Result<ContractArtifacts> {
            self.recorder.hit(Stage::InitContracts)?;
            Ok(ContractArtifacts {
                dir: "/artifacts".into(),
                deploy_config: json!({"l1ChainID": 900}),
            })
        }

        async fn init_l1_config(&self, _artifacts: &ContractArtifacts) -> Result<Value> {
            self.recorder.hit(Stage::InitL1Config)?;
            Ok(json!({"config": {"chainId": 900}}))
        }

        async fn deploy_l1_contracts(
            &self,
            _artifacts: &ContractArtifacts,
            l1: &ServiceHandle,
        ) -> Result<Value> {
            self.recorder.hit(Stage::DeployL1Contracts)?;
            assert_eq!(l1.role, ServiceRole::Eth1);
            Ok(json!({"L2OutputOracleProxy": "0x00000000000000000000000000000000000000aa"}))
        }

        async fn init_l2_config(
            &self,
            _artifacts: &ContractArtifacts,
            deployments: &Value,
        ) -> Result<Value> {
            self.recorder.hit(Stage::InitL2Config)?;
            assert!(deployments.is_object());
            Ok(json!({"config": {"chainId": 901}, "alloc": {}}))
        }

        async fn init_rollup_config(&self, l1: &ServiceHandle, l2: &ServiceHandle) -> Result<Value> {
            self.recorder.hit(Stage::InitRollupConfig)?;
            assert_eq!(l1.role, ServiceRole::Eth1);
            assert_eq!(l2.role, ServiceRole::OpL2);
            Ok(json!({"genesis": {"l2": {"hash": "0xbeef"}}}))
        }
    }

    fn fixture(
        fail_at: Option<Stage>,
        never_ready: Option<ServiceRole>,
        with_proposer: bool,
    ) -> (Bootstrapper, Arc<Recorder>, Arc<FakeController>) {
        let recorder = Arc::new(Recorder {
            fail_at,
            ..Default::default()
        });
        let controller = Arc::new(FakeController {
            recorder: recorder.clone(),
            never_ready,
            started: Mutex::new(Vec::new()),
        });
        let provisioner = Arc::new(FakeProvisioner {
            recorder: recorder.clone(),
        });
        let ready = ReadinessConfig::new(Duration::from_secs(10))
            .poll_interval(Duration::from_millis(500));
        let config = BootstrapConfig {
            l1_ready: ready,
            l2_ready: ready,
            with_proposer,
        };
        let bootstrapper = Bootstrapper::new(controller.clone(), provisioner, config);
        (bootstrapper, recorder, controller)
    }

    #[test]
    fn test_stage_numbers() {
        assert_eq!(Stage::InitContracts.number(), 1);
        assert_eq!(Stage::StartSequencer.number(), 10);
        assert!(Stage::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_run_in_order() {
        let (bootstrapper, recorder, controller) = fixture(None, None, false);
        let topology = bootstrapper.run().await.unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                Stage::InitContracts,
                Stage::InitL1Config,
                Stage::StartL1,
                Stage::WaitL1Ready,
                Stage::DeployL1Contracts,
                Stage::InitL2Config,
                Stage::StartL2Engine,
                Stage::WaitL2Ready,
                Stage::InitRollupConfig,
                Stage::StartSequencer,
                Stage::StartSequencer,
            ]
        );

        assert_eq!(topology.len(), 4);
        assert_eq!(topology.configs.l2_genesis_hash(), Some("0xbeef"));
        assert_eq!(topology.configs.l2_chain_id(), Some(901));

        let started = controller.started.lock().unwrap();
        let roles: Vec<_> = started.iter().map(|(role, _)| *role).collect();
        assert_eq!(
            roles,
            vec![
                ServiceRole::Eth1,
                ServiceRole::OpL2,
                ServiceRole::OpNode,
                ServiceRole::OpBatcher
            ]
        );

        let (_, l2_options) = &started[1];
        assert_eq!(l2_options.params.get("HIVE_NETWORK_ID"), Some("901"));
        assert!(l2_options.files.iter().any(|f| f.path == "/genesis.json"));

        let (_, batcher_options) = &started[3];
        assert_eq!(
            batcher_options
                .params
                .get("HIVE_UNPACK_OP_BATCHER_ROLLUP_RPC"),
            Some("http://op-node.devnet:8545")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_proposer_is_optional() {
        let (bootstrapper, _, _) = fixture(None, None, true);
        let topology = bootstrapper.run().await.unwrap();
        assert_eq!(topology.op_proposer.len(), 1);
        assert_eq!(topology.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_later_stages() {
        for failing in Stage::ALL {
            let (bootstrapper, recorder, _) = fixture(Some(failing), None, false);
            let err = bootstrapper.run().await.unwrap_err();

            assert_eq!(err.stage(), failing, "wrong stage reported for {failing}");
            assert!(
                recorder.calls().iter().all(|stage| *stage <= failing),
                "stage after {failing} ran: {:?}",
                recorder.calls()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_l1_readiness_timeout_is_fatal() {
        let (bootstrapper, recorder, _) = fixture(None, Some(ServiceRole::Eth1), false);
        let err = bootstrapper.run().await.unwrap_err();

        assert_eq!(err.stage(), Stage::WaitL1Ready);
        assert!(err.is_timeout());
        assert!(!recorder.calls().contains(&Stage::DeployL1Contracts));
    }

    #[tokio::test(start_paused = true)]
    async fn test_l2_readiness_timeout_is_fatal() {
        let (bootstrapper, recorder, _) = fixture(None, Some(ServiceRole::OpL2), false);
        let err = bootstrapper.run().await.unwrap_err();

        assert_eq!(err.stage(), Stage::WaitL2Ready);
        assert!(err.is_timeout());
        assert!(!recorder.calls().contains(&Stage::InitRollupConfig));
    }

    #[tokio::test]
    async fn test_malformed_l1_genesis_fails_its_stage() {
        use crate::devnet::provision::ArtifactProvisioner;

        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("contracts")).unwrap();
        std::fs::write(dir.path().join("deploy-config.json"), r#"{"l1ChainID": 900}"#).unwrap();
        std::fs::write(dir.path().join("l1-genesis.json"), r#"{"config": "bad"}"#).unwrap();

        let recorder = Arc::new(Recorder::default());
        let controller = Arc::new(FakeController {
            recorder: recorder.clone(),
            never_ready: None,
            started: Mutex::new(Vec::new()),
        });
        let bootstrapper = Bootstrapper::new(
            controller,
            Arc::new(ArtifactProvisioner::new(dir.path())),
            BootstrapConfig::default(),
        );

        let err = bootstrapper.run().await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Failed {
                stage: Stage::InitL1Config,
                ..
            }
        ));
        assert!(err.to_string().contains("init L1 config"), "{err}");
        assert!(recorder.calls().is_empty());
    }
}
