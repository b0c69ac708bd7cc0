//! Test scheduler
//!
//! Launches one task per catalog entry behind the worker gate. A task keeps
//! its slot until its result is recorded and the launch delay has passed,
//! which spaces out new work while the chain settles.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::context::SharedContext;
use super::gate::Gate;
use super::router::TestRouter;
use crate::models::{Catalog, RunSummary, TestResult};
use crate::report::Reporter;

/// Bounded-concurrency test scheduler
pub struct Scheduler {
    gate: Gate,
    launch_delay: Duration,
}

impl Scheduler {
    pub fn new(capacity: usize, launch_delay: Duration) -> Self {
        Self {
            gate: Gate::new(capacity),
            launch_delay,
        }
    }

    /// Run every entry of `catalog` and wait for all of them
    pub async fn run(
        &self,
        catalog: &Catalog,
        shared: SharedContext,
        router: Arc<TestRouter>,
        reporter: Arc<dyn Reporter>,
    ) -> RunSummary {
        let start = Instant::now();
        info!(
            "Running {} tests (max {} concurrent)",
            catalog.len(),
            self.gate.capacity()
        );
        if !self.launch_delay.is_zero() {
            warn!(
                "Each test holds its slot {:?} after finishing to let the chain settle",
                self.launch_delay
            );
        }

        let mut handles = Vec::with_capacity(catalog.len());
        for spec in catalog.iter() {
            let slot = match self.gate.acquire().await {
                Ok(slot) => slot,
                Err(e) => {
                    error!("Could not schedule {}: {}", spec.name, e);
                    let result = TestResult::error(&spec.name, &shared.client, 0, e.to_string());
                    reporter.record(result.clone()).await;
                    handles.push(tokio::spawn(async move { result }));
                    continue;
                }
            };

            let spec = spec.clone();
            let shared = shared.clone();
            let router = router.clone();
            let reporter = reporter.clone();
            let launch_delay = self.launch_delay;

            debug!("Launching {}", spec.name);
            handles.push(tokio::spawn(async move {
                let result = router.execute(spec, shared).await;
                reporter.record(result.clone()).await;

                if !launch_delay.is_zero() {
                    tokio::time::sleep(launch_delay).await;
                }
                drop(slot);
                result
            }));
        }

        if let Err(e) = self.gate.drain().await {
            error!("Gate drain failed: {}", e);
        }

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Test task failed after recording: {}", e),
            }
        }

        let summary = RunSummary::new(
            catalog.name(),
            results,
            start.elapsed().as_millis() as u64,
        );
        info!(
            "Suite '{}' finished: {}/{} passed ({:.1}%) in {}ms",
            summary.suite,
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.wall_time_ms
        );
        summary
    }
}
