//! Test execution engine
//!
//! Bounded-concurrency scheduling of catalog entries against a live devnet.

pub mod context;
mod gate;
mod router;
mod scheduler;
mod suite_runner;

pub use context::ExecutionContext;
pub use router::DevnetSessions;
pub use scheduler::Scheduler;
pub use suite_runner::SuiteRunner;
