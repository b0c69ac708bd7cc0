//! Test result models
//!
//! Defines per-test outcomes, run summaries and the run-level report.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    /// Routing fault, session setup failure, panic or timeout
    Error,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub client: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl TestResult {
    pub fn pass(name: impl Into<String>, client: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            client: client.into(),
            status: TestStatus::Pass,
            duration_ms,
            message: None,
        }
    }

    pub fn fail(
        name: impl Into<String>,
        client: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client: client.into(),
            status: TestStatus::Fail,
            duration_ms,
            message: Some(message.into()),
        }
    }

    pub fn error(
        name: impl Into<String>,
        client: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client: client.into(),
            status: TestStatus::Error,
            duration_ms,
            message: Some(error.into()),
        }
    }

    /// Name as shown in reports, e.g. `http/CodeAt (op-l2)`
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.name, self.client)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.display_name(),
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of one suite run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub wall_time_ms: u64,
    pub results: Vec<TestResult>,
}

impl RunSummary {
    pub fn new(suite: impl Into<String>, results: Vec<TestResult>, wall_time_ms: u64) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        let passed = count(TestStatus::Pass);
        let failed = count(TestStatus::Fail);
        let errors = count(TestStatus::Error);

        Self {
            suite: suite.into(),
            total: results.len(),
            passed,
            failed,
            errors,
            wall_time_ms,
            results,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Sort results by test name for stable output
    pub fn sorted(mut self) -> Self {
        self.results.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite: {}", self.suite)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Error: {}",
            self.total, self.passed, self.failed, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Wall time: {}ms",
            self.pass_rate(),
            self.wall_time_ms
        )
    }
}

/// Outcome of a whole run as seen by the caller
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunReport {
    /// Bootstrap succeeded; one result per catalog entry
    Completed(RunSummary),
    /// Bootstrap failed; no test ran
    BootstrapFailed { suite: String, error: String },
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        match self {
            RunReport::Completed(summary) => summary.is_all_passed(),
            RunReport::BootstrapFailed { .. } => false,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunReport::Completed(summary) => Some(summary),
            RunReport::BootstrapFailed { .. } => None,
        }
    }
}
