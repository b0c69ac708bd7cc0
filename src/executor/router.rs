//! Test routing
//!
//! Picks the session type from a test's name prefix, opens a fresh session
//! and runs the check in its own task. Whatever happens, the caller gets
//! exactly one `TestResult` back.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

use super::context::{ExecutionContext, SharedContext};
use crate::devnet::ServiceTopology;
use crate::models::{TestCaseSpec, TestResult, Transport};
use crate::rpc::{HttpRpc, Session, WsRpc};

/// Opens one session per test
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, transport: Transport, topology: &ServiceTopology) -> Result<Session>;
}

/// Sessions against the first L2 engine of the devnet
pub struct DevnetSessions {
    rpc_timeout: Duration,
}

impl DevnetSessions {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self { rpc_timeout }
    }
}

impl Default for DevnetSessions {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl SessionFactory for DevnetSessions {
    async fn open(&self, transport: Transport, topology: &ServiceTopology) -> Result<Session> {
        let engine = topology
            .l2_engine(0)
            .context("devnet has no L2 engine")?;

        let session = match transport {
            Transport::Http => Session::Http(HttpRpc::new(engine.http_url(), self.rpc_timeout)?),
            Transport::Ws => Session::Ws(
                WsRpc::connect(engine.ws_url(), self.rpc_timeout)
                    .await
                    .with_context(|| format!("WebSocket connect to {}", engine.name()))?,
            ),
        };
        Ok(session)
    }
}

/// Routes catalog entries to sessions and runs them
pub struct TestRouter {
    sessions: Arc<dyn SessionFactory>,
    test_timeout: Duration,
}

impl TestRouter {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            sessions,
            test_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Run one test to a result
    pub async fn execute(&self, spec: Arc<TestCaseSpec>, shared: SharedContext) -> TestResult {
        let start = Instant::now();
        let client = shared.client.clone();
        let elapsed_ms = || start.elapsed().as_millis() as u64;

        let transport = match spec.transport() {
            Ok(transport) => transport,
            Err(e) => {
                error!("Routing fault: {}", e);
                return TestResult::error(&spec.name, &client, 0, e.to_string());
            }
        };

        let session = match self.sessions.open(transport, &shared.topology).await {
            Ok(session) => session,
            Err(e) => {
                error!("Session setup for {} failed: {:#}", spec.name, e);
                return TestResult::error(
                    &spec.name,
                    &client,
                    elapsed_ms(),
                    format!("session setup failed: {e:#}"),
                );
            }
        };

        debug!("Running {} over {}", spec.name, transport);
        let ctx = ExecutionContext {
            test_name: spec.name.clone(),
            transport,
            session,
            shared,
        };

        let check = spec.check.clone();
        let mut task = tokio::spawn(async move { check(ctx).await });

        match tokio::time::timeout(self.test_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => TestResult::pass(&spec.name, &client, elapsed_ms()),
            Ok(Ok(Err(e))) => TestResult::fail(&spec.name, &client, elapsed_ms(), format!("{e:#}")),
            Ok(Err(join)) if join.is_panic() => TestResult::error(
                &spec.name,
                &client,
                elapsed_ms(),
                format!("check panicked: {}", panic_message(join.into_panic())),
            ),
            Ok(Err(join)) => {
                TestResult::error(&spec.name, &client, elapsed_ms(), join.to_string())
            }
            Err(_) => {
                task.abort();
                TestResult::error(
                    &spec.name,
                    &client,
                    elapsed_ms(),
                    format!("timed out after {:?}", self.test_timeout),
                )
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::OfflineSessions;
    use super::*;
    use crate::devnet::service::{ServiceHandle, ServiceRole};
    use crate::models::TestStatus;
    use crate::rpc::test_support::{handler, serve_http, serve_ws};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn shared() -> SharedContext {
        SharedContext::new(ServiceTopology::default(), "op-l2")
    }

    fn router(sessions: Arc<OfflineSessions>) -> TestRouter {
        TestRouter::new(sessions).with_test_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_pass_and_fail() {
        let sessions = Arc::new(OfflineSessions::default());
        let router = router(sessions.clone());

        let ok = Arc::new(TestCaseSpec::new("http/Ok", |ctx: ExecutionContext| async move {
            anyhow::ensure!(ctx.transport == Transport::Http);
            anyhow::ensure!(ctx.test_name == "http/Ok");
            Ok(())
        }));
        let result = router.execute(ok, shared()).await;
        assert_eq!(result.status, TestStatus::Pass);
        assert_eq!(result.client, "op-l2");

        let bad = Arc::new(TestCaseSpec::new("ws/Bad", |_ctx| async {
            Err(anyhow::anyhow!("balance mismatch"))
        }));
        let result = router.execute(bad, shared()).await;
        assert_eq!(result.status, TestStatus::Fail);
        assert_eq!(result.message.as_deref(), Some("balance mismatch"));
        assert_eq!(sessions.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routing_fault_is_error_without_session() {
        let sessions = Arc::new(OfflineSessions::default());
        let router = router(sessions.clone());

        let spec = Arc::new(TestCaseSpec::new("grpc/Foo", |_ctx| async { Ok(()) }));
        let result = router.execute(spec, shared()).await;

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.message.unwrap().contains("bad test prefix 'grpc'"));
        assert_eq!(sessions.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_failure_is_error() {
        let sessions = Arc::new(OfflineSessions {
            fail: true,
            ..Default::default()
        });
        let spec = Arc::new(TestCaseSpec::new("http/X", |_ctx| async { Ok(()) }));
        let result = router(sessions).execute(spec, shared()).await;

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.message.unwrap().contains("session setup failed"));
    }

    #[tokio::test]
    async fn test_panic_is_error() {
        let spec = Arc::new(TestCaseSpec::new("http/Panics", |_ctx| async {
            let blocks: Vec<u64> = Vec::new();
            anyhow::ensure!(blocks[0] == 0);
            Ok(())
        }));
        let result = router(Arc::default()).execute(spec, shared()).await;

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.message.unwrap().contains("index out of bounds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_error() {
        let spec = Arc::new(TestCaseSpec::new("ws/Hangs", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }));
        let result = router(Arc::default()).execute(spec, shared()).await;

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.message.unwrap().contains("timed out"));
        assert!(result.duration_ms >= 5000);
    }

    async fn loopback_topology() -> ServiceTopology {
        let rpc = handler(|method, _params| match method {
            "eth_chainId" => Ok(json!("0x385")),
            _ => Err((-32601, "method not found".to_string())),
        });
        let http = serve_http(rpc.clone()).await;
        let ws = serve_ws(rpc).await;
        let port = |url: &str| url.rsplit(':').next().unwrap().parse::<u16>().unwrap();

        let mut topology = ServiceTopology::new();
        topology.add(
            ServiceHandle::new(ServiceRole::OpL2, 0, "127.0.0.1").with_ports(port(&http), port(&ws)),
        );
        topology
    }

    #[tokio::test]
    async fn test_devnet_sessions_follow_transport() {
        let topology = loopback_topology().await;
        let sessions = DevnetSessions::new(Duration::from_secs(5));

        let mut ws = sessions.open(Transport::Ws, &topology).await.unwrap();
        assert!(matches!(ws, Session::Ws(_)));
        assert_eq!(ws.call("eth_chainId", json!([])).await.unwrap(), "0x385");

        let mut http = sessions.open(Transport::Http, &topology).await.unwrap();
        assert!(matches!(http, Session::Http(_)));
        assert_eq!(http.call("eth_chainId", json!([])).await.unwrap(), "0x385");
    }

    #[tokio::test]
    async fn test_ws_entry_runs_on_ws_session() {
        let topology = loopback_topology().await;
        let router = TestRouter::new(Arc::new(DevnetSessions::new(Duration::from_secs(5))))
            .with_test_timeout(Duration::from_secs(5));

        let spec = Arc::new(TestCaseSpec::new(
            "ws/ChainID",
            |mut ctx: ExecutionContext| async move {
                anyhow::ensure!(ctx.transport == Transport::Ws);
                anyhow::ensure!(ctx.session.as_ws().is_some(), "not a WebSocket session");
                let chain_id = ctx.session.call("eth_chainId", json!([])).await?;
                anyhow::ensure!(chain_id == "0x385");
                Ok(())
            },
        ));
        let result = router
            .execute(spec, SharedContext::new(topology, "op-l2"))
            .await;

        assert_eq!(result.status, TestStatus::Pass, "{:?}", result.message);
    }

    #[tokio::test]
    async fn test_devnet_sessions_need_engine() {
        let sessions = DevnetSessions::default();
        let result = sessions
            .open(Transport::Http, &ServiceTopology::default())
            .await;
        assert!(result.is_err());
    }
}
