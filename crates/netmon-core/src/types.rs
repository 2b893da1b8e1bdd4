//! Shared types used across netmon crates.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Another cluster node that is a valid probe target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    /// Cluster-assigned node name, unique within the cluster.
    pub name: String,
    /// Address the probe is sent to.
    pub internal_ip: IpAddr,
}

impl Peer {
    pub fn new(name: impl Into<String>, internal_ip: IpAddr) -> Self {
        Self {
            name: name.into(),
            internal_ip,
        }
    }
}

/// One immutable discovery snapshot.
///
/// Discovery always publishes a whole new `PeerSet`; readers holding an
/// older clone keep seeing the old list, never a partially updated one.
/// Cloning is cheap (reference counted).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    peers: Arc<[Peer]>,
}

impl PeerSet {
    pub fn new(peers: Vec<Peer>) -> Self {
        Self {
            peers: peers.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether a peer with the given name is part of this snapshot.
    pub fn contains(&self, name: &str) -> bool {
        self.peers.iter().any(|p| p.name == name)
    }

    /// The set of peer names in this snapshot.
    pub fn names(&self) -> HashSet<&str> {
        self.peers.iter().map(|p| p.name.as_str()).collect()
    }

}

impl From<Vec<Peer>> for PeerSet {
    fn from(peers: Vec<Peer>) -> Self {
        Self::new(peers)
    }
}

impl<'a> IntoIterator for &'a PeerSet {
    type Item = &'a Peer;
    type IntoIter = std::slice::Iter<'a, Peer>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Outcome of one echo probe against a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Mean round-trip time over answered packets; zero when none answered.
    pub avg_rtt: Duration,
}

impl ProbeStats {
    pub fn packets_lost(&self) -> u64 {
        self.packets_sent.saturating_sub(self.packets_received)
    }

    /// A peer counts as reachable when at least one packet was answered.
    pub fn is_reachable(&self) -> bool {
        self.packets_received > 0
    }
}
