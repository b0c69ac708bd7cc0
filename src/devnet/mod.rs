//! Devnet environment
//!
//! Everything needed to bring up an L1 chain with a rollup on top of it:
//! service control, readiness waits, provisioning and the staged bootstrap.

pub mod bootstrap;
pub mod health;
pub mod params;
pub mod process;
pub mod provision;
pub mod service;
pub mod topology;

pub use bootstrap::{BootstrapConfig, Bootstrapper};
pub use health::ReadinessConfig;
pub use process::ProcessController;
pub use provision::{ArtifactProvisioner, DevnetConfigs};
pub use service::ServiceRole;
pub use topology::ServiceTopology;
