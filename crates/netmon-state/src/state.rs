//! MonitorState — peer set plus metric records behind one lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use netmon_core::PeerSet;
use netmon_metrics::{MetricsRegistry, PeerMetrics};

use crate::error::StateResult;

/// Names that entered and left the peer set on a discovery refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PeerSetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

struct Inner {
    peers: PeerSet,
    /// peer name → exported record. Every entry is registered in `metrics`.
    records: HashMap<String, PeerMetrics>,
}

/// Shared, lock-protected agent state.
#[derive(Clone)]
pub struct MonitorState {
    inner: Arc<Mutex<Inner>>,
    metrics: MetricsRegistry,
    /// The local node's name, used as the `source` label.
    source: Arc<str>,
}

impl MonitorState {
    pub fn new(source: impl Into<String>, metrics: MetricsRegistry) -> Self {
        let source: String = source.into();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                peers: PeerSet::default(),
                records: HashMap::new(),
            })),
            metrics,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    // ── Peer set ───────────────────────────────────────────────────

    /// Publish a new discovery snapshot, replacing the old one wholesale.
    pub async fn replace_peers(&self, peers: PeerSet) -> PeerSetDiff {
        let mut inner = self.inner.lock().await;

        let old = inner.peers.names();
        let new = peers.names();
        let mut diff = PeerSetDiff {
            added: new.difference(&old).map(|s| s.to_string()).collect(),
            removed: old.difference(&new).map(|s| s.to_string()).collect(),
        };
        diff.added.sort();
        diff.removed.sort();

        inner.peers = peers;
        diff
    }

    /// The current peer set. Cheap: clones a reference-counted snapshot.
    pub async fn peers(&self) -> PeerSet {
        self.inner.lock().await.peers.clone()
    }

    // ── Metric records ─────────────────────────────────────────────

    /// Return the record for `peer_name`, creating and registering it on
    /// first use.
    ///
    /// The lookup, construction and registration happen in one critical
    /// section, so concurrent callers for the same name always end up
    /// sharing a single registered record.
    pub async fn get_or_create(&self, peer_name: &str) -> StateResult<PeerMetrics> {
        let mut inner = self.inner.lock().await;

        if let Some(record) = inner.records.get(peer_name) {
            return Ok(record.clone());
        }

        let record = self.metrics.new_record(&self.source, peer_name)?;
        self.metrics.register(&record)?;
        info!(peer = %peer_name, "adding target");

        inner
            .records
            .insert(peer_name.to_string(), record.clone());
        Ok(record)
    }

    /// Drop and unregister every record whose name is not in `current`.
    ///
    /// Returns the removed names, sorted.
    pub async fn prune(&self, current: &HashSet<&str>) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        self.prune_locked(&mut inner, current)
    }

    /// Prune against the current peer set and return that same peer set,
    /// all under one lock acquisition.
    ///
    /// This is the start of every probe cycle: records for departed peers
    /// are gone before the returned snapshot is probed.
    pub async fn prune_and_snapshot(&self) -> (Vec<String>, PeerSet) {
        let mut inner = self.inner.lock().await;
        let peers = inner.peers.clone();
        let removed = self.prune_locked(&mut inner, &peers.names());
        (removed, peers)
    }

    fn prune_locked(&self, inner: &mut Inner, current: &HashSet<&str>) -> Vec<String> {
        let stale: Vec<String> = inner
            .records
            .keys()
            .filter(|name| !current.contains(name.as_str()))
            .cloned()
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for name in stale {
            if let Some(record) = inner.records.remove(&name) {
                info!(peer = %name, "removing target");
                self.metrics.unregister(&record);
                removed.push(name);
            }
        }
        removed.sort();
        removed
    }

    /// Look up a record without creating it.
    pub async fn record(&self, peer_name: &str) -> Option<PeerMetrics> {
        self.inner.lock().await.records.get(peer_name).cloned()
    }

    /// Names that currently have an exported record, sorted.
    pub async fn tracked_targets(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner.records.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorState")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
