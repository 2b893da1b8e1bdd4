//! Cluster membership model and peer selection.
//!
//! [`ClusterNode`] is the membership collaborator's view of one node,
//! independent of where it came from. [`select_peers`] turns a node list
//! into the probe targets for this agent.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use netmon_core::Peer;

/// Taint set on nodes whose kubelet is not ready.
pub const TAINT_NOT_READY: &str = "node.kubernetes.io/not-ready";
/// Taint set on cordoned nodes.
pub const TAINT_UNSCHEDULABLE: &str = "node.kubernetes.io/unschedulable";
/// Address type carrying the node's cluster-internal IP.
pub const ADDRESS_INTERNAL_IP: &str = "InternalIP";

/// Errors from querying cluster membership. All of them are transient
/// from the discovery loop's point of view.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("membership query timed out after {0:?}")]
    Timeout(Duration),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("membership query failed: {0}")]
    Query(String),
}

/// One typed address entry of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    /// Address type, e.g. `InternalIP`, `ExternalIP`, `Hostname`.
    pub kind: String,
    pub address: String,
}

impl NodeAddress {
    pub fn new(kind: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            address: address.into(),
        }
    }

    pub fn internal(address: impl Into<String>) -> Self {
        Self::new(ADDRESS_INTERNAL_IP, address)
    }
}

/// A cluster member as reported by the membership collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNode {
    pub name: String,
    pub addresses: Vec<NodeAddress>,
    /// Taint keys.
    pub taints: Vec<String>,
}

impl ClusterNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: NodeAddress) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_taint(mut self, key: impl Into<String>) -> Self {
        self.taints.push(key.into());
        self
    }

    /// The node's internal IP.
    ///
    /// If several `InternalIP` entries are present the last one that
    /// parses wins. Unspecified addresses (`0.0.0.0`, `::`) never count.
    pub fn internal_ip(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .filter(|a| a.kind == ADDRESS_INTERNAL_IP)
            .filter_map(|a| a.address.trim().parse::<IpAddr>().ok())
            .filter(|ip| !ip.is_unspecified())
            .last()
    }

    /// The first taint that makes this node ineligible for probing.
    pub fn excluding_taint(&self) -> Option<&str> {
        self.taints
            .iter()
            .map(String::as_str)
            .find(|key| *key == TAINT_NOT_READY || *key == TAINT_UNSCHEDULABLE)
    }
}

/// Source of the cluster's node list.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, MembershipError>;
}

/// Reduce a node list to the peers this agent should probe.
///
/// Order of the input is preserved.
pub fn select_peers(nodes: &[ClusterNode], self_node_name: &str) -> Vec<Peer> {
    let mut peers = Vec::with_capacity(nodes.len());

    for node in nodes {
        if node.name == self_node_name {
            continue;
        }

        if let Some(taint) = node.excluding_taint() {
            debug!(node = %node.name, %taint, "skipping tainted node");
            continue;
        }

        match node.internal_ip() {
            Some(ip) => peers.push(Peer::new(node.name.clone(), ip)),
            None => warn!(node = %node.name, "unable to detect internal IP for node"),
        }
    }

    peers
}

/// A fixed, swappable node list. Useful for tests and for running the
/// agent outside a cluster.
#[derive(Debug)]
pub struct StaticMembership {
    nodes: Mutex<Result<Vec<ClusterNode>, String>>,
}

impl StaticMembership {
    pub fn new(nodes: Vec<ClusterNode>) -> Self {
        Self {
            nodes: Mutex::new(Ok(nodes)),
        }
    }

    /// Replace the node list returned by later queries.
    pub fn set_nodes(&self, nodes: Vec<ClusterNode>) {
        *self.lock() = Ok(nodes);
    }

    /// Make later queries fail with `message`.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.lock() = Err(message.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Result<Vec<ClusterNode>, String>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StaticMembership {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, MembershipError> {
        self.lock().clone().map_err(MembershipError::Query)
    }
}
