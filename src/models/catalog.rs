//! Test catalog models
//!
//! A catalog is an ordered, immutable list of named checks. It is built once
//! and handed to the scheduler by reference.

use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::transport::{RouteError, Transport};
use crate::executor::ExecutionContext;

/// Executable check bound to a catalog entry
pub type CheckFn = Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A single named test case
#[derive(Clone)]
pub struct TestCaseSpec {
    pub name: String,
    pub description: String,
    pub check: CheckFn,
}

impl TestCaseSpec {
    pub fn new<F, Fut>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            check: Arc::new(move |ctx| Box::pin(check(ctx))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Transport this entry routes to
    pub fn transport(&self) -> Result<Transport, RouteError> {
        Transport::parse_name(&self.name).map(|(transport, _)| transport)
    }
}

impl fmt::Debug for TestCaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCaseSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TestCaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Ordered test catalog
#[derive(Clone, Debug)]
pub struct Catalog {
    name: String,
    description: String,
    entries: Vec<Arc<TestCaseSpec>>,
}

impl Catalog {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        entries: Vec<TestCaseSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TestCaseSpec>> {
        self.entries.iter()
    }

    /// Every entry whose name does not route
    pub fn validate(&self) -> Vec<RouteError> {
        self.entries
            .iter()
            .filter_map(|spec| spec.transport().err())
            .collect()
    }

    /// Entries whose name contains `pattern`
    pub fn filtered(&self, pattern: &str) -> Catalog {
        Catalog {
            name: self.name.clone(),
            description: self.description.clone(),
            entries: self
                .entries
                .iter()
                .filter(|spec| spec.name.contains(pattern))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> TestCaseSpec {
        TestCaseSpec::new(name, |_ctx| async { Ok(()) })
    }

    #[test]
    fn test_catalog_keeps_order() {
        let catalog = Catalog::new(
            "suite",
            "",
            vec![noop("http/B"), noop("http/A"), noop("ws/C")],
        );
        let names: Vec<_> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["http/B", "http/A", "ws/C"]);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_validate_reports_malformed_entries() {
        let catalog = Catalog::new(
            "suite",
            "",
            vec![noop("http/A"), noop("grpc/Foo"), noop("NoSeparator"), noop("ws/B")],
        );
        let faults = catalog.validate();
        assert_eq!(faults.len(), 2);
        assert!(matches!(faults[0], RouteError::UnknownTransport { .. }));
        assert!(matches!(faults[1], RouteError::MissingSeparator(_)));
    }

    #[test]
    fn test_filtered() {
        let catalog = Catalog::new(
            "suite",
            "",
            vec![noop("http/CodeAt"), noop("ws/CodeAt"), noop("http/SyncProgress")],
        );
        let subset = catalog.filtered("CodeAt");
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.name(), "suite");
        assert!(catalog.filtered("nothing").is_empty());
    }

    #[test]
    fn test_spec_transport() {
        assert_eq!(noop("ws/X").transport(), Ok(Transport::Ws));
        assert!(noop("grpc/X").transport().is_err());
    }
}
