//! Suite orchestration
//!
//! Announce, bootstrap, then schedule. A bootstrap failure ends the run
//! with a single run-level failure and no per-test outcomes.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::context::SharedContext;
use super::router::{SessionFactory, TestRouter};
use super::scheduler::Scheduler;
use crate::devnet::Bootstrapper;
use crate::models::{Catalog, RunReport};
use crate::report::Reporter;

/// Runs one catalog against a freshly bootstrapped devnet
pub struct SuiteRunner {
    bootstrapper: Bootstrapper,
    scheduler: Scheduler,
    sessions: Arc<dyn SessionFactory>,
    reporter: Arc<dyn Reporter>,
    client: String,
    test_timeout: Duration,
}

impl SuiteRunner {
    pub fn new(
        bootstrapper: Bootstrapper,
        scheduler: Scheduler,
        sessions: Arc<dyn SessionFactory>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            bootstrapper,
            scheduler,
            sessions,
            reporter,
            client: "op-l2".to_string(),
            test_timeout: Duration::from_secs(120),
        }
    }

    /// Label attached to every result
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = client.into();
        self
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub async fn run(&self, catalog: &Catalog) -> RunReport {
        self.reporter
            .start_suite(catalog.name(), catalog.description())
            .await;

        for fault in catalog.validate() {
            warn!("Catalog entry cannot be routed and will error: {}", fault);
        }

        let topology = match self.bootstrapper.run().await {
            Ok(topology) => topology,
            Err(e) => {
                error!("Devnet bootstrap failed at stage {}: {}", e.stage().number(), e);
                let message = e.to_string();
                self.reporter.bootstrap_failed(&message).await;
                return RunReport::BootstrapFailed {
                    suite: catalog.name().to_string(),
                    error: message,
                };
            }
        };

        let shared = SharedContext::new(topology, self.client.clone());
        info!(
            "Devnet ready: {} services, {} funded accounts",
            shared.topology.len(),
            shared.vault.len()
        );

        let router =
            Arc::new(TestRouter::new(self.sessions.clone()).with_test_timeout(self.test_timeout));
        let summary = self
            .scheduler
            .run(catalog, shared, router, self.reporter.clone())
            .await;

        RunReport::Completed(summary)
    }
}
