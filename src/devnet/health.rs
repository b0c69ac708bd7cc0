//! Readiness waiting for devnet services

use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::service::{ServiceController, ServiceHandle};

/// Readiness failures
#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("{service} not ready after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("{service} failed readiness probe: {source}")]
    ProbeFailed {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Readiness wait configuration
#[derive(Clone, Copy, Debug)]
pub struct ReadinessConfig {
    /// Overall bound on the wait
    pub timeout: Duration,

    /// Interval between probes
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ReadinessConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Poll `handle` until it reports ready or the timeout elapses
pub async fn wait_ready(
    controller: &dyn ServiceController,
    handle: &ServiceHandle,
    config: ReadinessConfig,
) -> Result<(), ReadinessError> {
    let start = Instant::now();
    let deadline = start + config.timeout;

    info!(
        "Waiting for {} to become ready (timeout: {:?})",
        handle.name(),
        config.timeout
    );

    loop {
        let probe = tokio::time::timeout_at(deadline, controller.probe(handle)).await;

        match probe {
            Err(_) => break,
            Ok(Ok(true)) => {
                info!(
                    "{} is ready after {}ms",
                    handle.name(),
                    start.elapsed().as_millis()
                );
                return Ok(());
            }
            Ok(Ok(false)) => debug!("{} not ready yet", handle.name()),
            Ok(Err(e)) => {
                return Err(ReadinessError::ProbeFailed {
                    service: handle.name(),
                    source: e.into(),
                })
            }
        }

        if Instant::now() + config.poll_interval >= deadline {
            break;
        }
        sleep(config.poll_interval).await;
    }

    Err(ReadinessError::Timeout {
        service: handle.name(),
        timeout: config.timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::params::StartOptions;
    use crate::devnet::service::ServiceRole;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ready after `ready_after` probes; `u32::MAX` never becomes ready
    struct CountingController {
        probes: AtomicU32,
        ready_after: u32,
        fail: bool,
    }

    impl CountingController {
        fn new(ready_after: u32) -> Self {
            Self {
                probes: AtomicU32::new(0),
                ready_after,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ServiceController for CountingController {
        async fn start(&self, role: ServiceRole, _options: StartOptions) -> Result<ServiceHandle> {
            Ok(ServiceHandle::new(role, 0, "127.0.0.1"))
        }

        async fn probe(&self, _handle: &ServiceHandle) -> Result<bool> {
            if self.fail {
                anyhow::bail!("process exited with status 1");
            }
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.ready_after)
        }
    }

    fn handle() -> ServiceHandle {
        ServiceHandle::new(ServiceRole::Eth1, 0, "127.0.0.1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_retries() {
        let controller = CountingController::new(3);
        let config = ReadinessConfig::new(Duration::from_secs(10))
            .poll_interval(Duration::from_millis(100));

        wait_ready(&controller, &handle(), config).await.unwrap();
        assert_eq!(controller.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let controller = CountingController::new(u32::MAX);
        let config = ReadinessConfig::new(Duration::from_secs(10))
            .poll_interval(Duration::from_millis(500));

        let start = Instant::now();
        let err = wait_ready(&controller, &handle(), config).await.unwrap_err();
        assert!(matches!(err, ReadinessError::Timeout { .. }));
        assert!(start.elapsed() <= Duration::from_secs(10));
        assert!(err.to_string().contains("eth1-0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_is_fatal() {
        let mut controller = CountingController::new(1);
        controller.fail = true;

        let err = wait_ready(&controller, &handle(), ReadinessConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::ProbeFailed { .. }));
    }
}
