//! Discovery loop — refreshes the shared peer set from cluster membership.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use netmon_core::{MonitorConfig, PeerSet};
use netmon_state::{MonitorState, PeerSetDiff};

use crate::membership::{MembershipError, MembershipSource, select_peers};

/// Periodically replaces the shared peer set with a fresh, filtered
/// snapshot of cluster membership.
pub struct DiscoveryLoop {
    source: Arc<dyn MembershipSource>,
    state: MonitorState,
    self_node_name: String,
    interval: Duration,
    query_timeout: Duration,
}

impl DiscoveryLoop {
    pub fn new(
        source: Arc<dyn MembershipSource>,
        state: MonitorState,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            source,
            state,
            self_node_name: config.self_node_name.clone(),
            interval: config.discovery_interval,
            query_timeout: config.membership_timeout,
        }
    }

    /// Run one discovery pass.
    ///
    /// On error the shared peer set is left exactly as it was.
    pub async fn refresh(&self) -> Result<PeerSetDiff, MembershipError> {
        let nodes = tokio::time::timeout(self.query_timeout, self.source.list_nodes())
            .await
            .map_err(|_| MembershipError::Timeout(self.query_timeout))??;

        let peers = select_peers(&nodes, &self.self_node_name);
        debug!(
            nodes = nodes.len(),
            peers = peers.len(),
            "membership refreshed"
        );

        Ok(self.state.replace_peers(PeerSet::new(peers)).await)
    }

    /// Refresh, then pause, until shutdown. The first refresh happens
    /// immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.interval,
            timeout = ?self.query_timeout,
            "discovery loop started"
        );

        loop {
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown.changed() => {
                    info!("discovery loop shutting down");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        debug!("updating nodes");
        match self.refresh().await {
            Ok(diff) => {
                for name in &diff.added {
                    info!(peer = %name, "peer discovered");
                }
                for name in &diff.removed {
                    info!(peer = %name, "peer left");
                }
            }
            Err(e) => warn!(error = %e, "updating nodes failed, keeping previous peer set"),
        }
        tokio::time::sleep(self.interval).await;
    }
}
