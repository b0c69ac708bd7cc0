//! Data models for devnet testing
//!
//! Catalog entries, transport categories and test results.

mod catalog;
mod test_result;
mod transport;

pub use catalog::{Catalog, CheckFn, TestCaseSpec};
pub use test_result::{RunReport, RunSummary, TestResult, TestStatus};
pub use transport::{RouteError, Transport};
