//! Live service topology produced by bootstrap

use serde::Serialize;

use super::provision::DevnetConfigs;
use super::service::{ServiceHandle, ServiceRole};

/// Running services grouped by role, plus the configs they were started with
#[derive(Clone, Debug, Default, Serialize)]
pub struct ServiceTopology {
    pub eth1: Vec<ServiceHandle>,
    pub op_l2: Vec<ServiceHandle>,
    pub op_node: Vec<ServiceHandle>,
    pub op_batcher: Vec<ServiceHandle>,
    pub op_proposer: Vec<ServiceHandle>,
    pub configs: DevnetConfigs,
}

impl ServiceTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: ServiceHandle) {
        match handle.role {
            ServiceRole::Eth1 => self.eth1.push(handle),
            ServiceRole::OpL2 => self.op_l2.push(handle),
            ServiceRole::OpNode => self.op_node.push(handle),
            ServiceRole::OpBatcher => self.op_batcher.push(handle),
            ServiceRole::OpProposer => self.op_proposer.push(handle),
        }
    }

    pub fn l1(&self, index: usize) -> Option<&ServiceHandle> {
        self.eth1.get(index)
    }

    pub fn l2_engine(&self, index: usize) -> Option<&ServiceHandle> {
        self.op_l2.get(index)
    }

    /// All services in start order per role
    pub fn services(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.eth1
            .iter()
            .chain(&self.op_l2)
            .chain(&self.op_node)
            .chain(&self.op_batcher)
            .chain(&self.op_proposer)
    }

    pub fn len(&self) -> usize {
        self.services().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_groups_by_role() {
        let mut topology = ServiceTopology::new();
        topology.add(ServiceHandle::new(ServiceRole::Eth1, 0, "10.0.0.1"));
        topology.add(ServiceHandle::new(ServiceRole::OpL2, 0, "10.0.0.2"));
        topology.add(ServiceHandle::new(ServiceRole::OpNode, 0, "10.0.0.3"));

        assert_eq!(topology.len(), 3);
        assert_eq!(topology.l1(0).unwrap().host, "10.0.0.1");
        assert_eq!(topology.l2_engine(0).unwrap().host, "10.0.0.2");
        assert!(topology.op_batcher.is_empty());
    }

    #[test]
    fn test_empty_topology() {
        let topology = ServiceTopology::default();
        assert!(topology.is_empty());
        assert!(topology.l2_engine(0).is_none());
    }
}
