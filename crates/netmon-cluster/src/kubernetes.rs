//! Kubernetes-backed membership source.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::membership::{ClusterNode, MembershipError, MembershipSource, NodeAddress};

/// Lists cluster nodes through the Kubernetes API server.
#[derive(Clone)]
pub struct KubeMembership {
    api: Api<Node>,
}

impl KubeMembership {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    /// Connect using the in-cluster service account, falling back to the
    /// local kubeconfig.
    pub async fn try_default() -> Result<Self, MembershipError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl MembershipSource for KubeMembership {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, MembershipError> {
        let list = self.api.list(&ListParams::default()).await?;
        debug!(count = list.items.len(), "listed cluster nodes");
        Ok(list.items.into_iter().map(ClusterNode::from).collect())
    }
}

impl From<Node> for ClusterNode {
    fn from(node: Node) -> Self {
        let name = node.name_any();

        let taints = node
            .spec
            .and_then(|spec| spec.taints)
            .unwrap_or_default()
            .into_iter()
            .map(|taint| taint.key)
            .collect();

        let addresses = node
            .status
            .and_then(|status| status.addresses)
            .unwrap_or_default()
            .into_iter()
            .map(|a| NodeAddress::new(a.type_, a.address))
            .collect();

        ClusterNode {
            name,
            addresses,
            taints,
        }
    }
}
