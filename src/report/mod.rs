//! Result reporting
//!
//! The scheduler hands every finished test to a `Reporter` exactly once.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::models::{RunSummary, TestResult, TestStatus};

/// Sink for suite lifecycle events and test results
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Announce a suite before anything else happens
    async fn start_suite(&self, name: &str, description: &str);

    /// Record the outcome of one test
    async fn record(&self, result: TestResult);

    /// The environment never came up; no test will be recorded
    async fn bootstrap_failed(&self, error: &str);
}

#[derive(Debug, Default)]
struct Collected {
    suite: String,
    results: Vec<TestResult>,
    bootstrap_error: Option<String>,
}

/// Reporter that logs each event and keeps results in arrival order
#[derive(Debug, Default)]
pub struct CollectingReporter {
    inner: Mutex<Collected>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<TestResult> {
        self.inner.lock().await.results.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.results.len()
    }

    pub async fn bootstrap_error(&self) -> Option<String> {
        self.inner.lock().await.bootstrap_error.clone()
    }

    /// Summary over everything recorded so far
    pub async fn summary(&self, wall_time_ms: u64) -> RunSummary {
        let inner = self.inner.lock().await;
        RunSummary::new(inner.suite.clone(), inner.results.clone(), wall_time_ms)
    }
}

#[async_trait]
impl Reporter for CollectingReporter {
    async fn start_suite(&self, name: &str, description: &str) {
        info!("Suite '{}': {}", name, description);
        self.inner.lock().await.suite = name.to_string();
    }

    async fn record(&self, result: TestResult) {
        match result.status {
            TestStatus::Pass => info!("{}", result),
            TestStatus::Fail => warn!("{}", result),
            TestStatus::Error => error!("{}", result),
        }
        self.inner.lock().await.results.push(result);
    }

    async fn bootstrap_failed(&self, error: &str) {
        error!("Bootstrap failed, no tests will run: {}", error);
        self.inner.lock().await.bootstrap_error = Some(error.to_string());
    }
}
