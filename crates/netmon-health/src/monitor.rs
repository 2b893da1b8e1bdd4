//! Probe loop — one concurrent sweep over the peer set per interval.
//!
//! Each cycle prunes records of departed peers, snapshots the peer set,
//! spawns one probe task per peer and joins all of them before the
//! loop sleeps again. Cycles never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use netmon_core::{MonitorConfig, Peer};
use netmon_state::{MonitorState, StateError, StateResult};

use crate::prober::{ProbeError, ProbeSettings, Prober};

/// What happened during one probe cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Records unregistered before probing, sorted.
    pub pruned: Vec<String>,
    /// Peers whose metrics were updated.
    pub recorded: usize,
    /// Peers skipped because their probe failed.
    pub failed: usize,
}

enum PeerOutcome {
    Recorded,
    ProbeFailed,
}

pub struct ProbeLoop {
    prober: Arc<dyn Prober>,
    state: MonitorState,
    interval: Duration,
    settings: ProbeSettings,
}

impl ProbeLoop {
    pub fn new(prober: Arc<dyn Prober>, state: MonitorState, config: &MonitorConfig) -> Self {
        Self {
            prober,
            state,
            interval: config.interval,
            settings: ProbeSettings::from_config(config),
        }
    }

    /// Run one full cycle and wait for every probe in it.
    ///
    /// Individual probe failures are logged and counted. A registration
    /// error is returned after all tasks have finished.
    pub async fn run_cycle(&self) -> StateResult<CycleSummary> {
        let (pruned, peers) = self.state.prune_and_snapshot().await;

        let mut probes = JoinSet::new();
        for peer in peers.iter().cloned() {
            let prober = Arc::clone(&self.prober);
            let state = self.state.clone();
            let settings = self.settings;
            probes.spawn(async move { probe_peer(prober.as_ref(), &state, &peer, &settings).await });
        }

        let mut summary = CycleSummary {
            pruned,
            ..CycleSummary::default()
        };
        let mut fatal: Option<StateError> = None;

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Ok(PeerOutcome::Recorded)) => summary.recorded += 1,
                Ok(Ok(PeerOutcome::ProbeFailed)) => summary.failed += 1,
                Ok(Err(e)) => {
                    error!(error = %e, "metric registration failed");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "probe task did not complete");
                    summary.failed += 1;
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Sleep, then probe, until shutdown. Returns early only on a
    /// registration error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StateResult<()> {
        info!(
            interval = ?self.interval,
            count = self.settings.count,
            timeout = ?self.settings.timeout,
            "probe loop started"
        );

        loop {
            tokio::select! {
                result = self.tick() => result?,
                _ = shutdown.changed() => {
                    info!("probe loop shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn tick(&self) -> StateResult<()> {
        tokio::time::sleep(self.interval).await;
        debug!("pinging peers");

        let summary = self.run_cycle().await?;
        debug!(
            recorded = summary.recorded,
            failed = summary.failed,
            pruned = summary.pruned.len(),
            "probe cycle complete"
        );
        Ok(())
    }
}

async fn probe_peer(
    prober: &dyn Prober,
    state: &MonitorState,
    peer: &Peer,
    settings: &ProbeSettings,
) -> StateResult<PeerOutcome> {
    let deadline = settings.deadline();
    let result = match tokio::time::timeout(deadline, prober.probe(peer.internal_ip, settings)).await
    {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Deadline {
            target: peer.internal_ip,
            deadline,
        }),
    };

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            warn!(peer = %peer.name, ip = %peer.internal_ip, error = %e, "unable to ping peer");
            return Ok(PeerOutcome::ProbeFailed);
        }
    };

    if stats.packets_lost() > 0 {
        info!(
            peer = %peer.name,
            ip = %peer.internal_ip,
            lost = stats.packets_lost(),
            sent = stats.packets_sent,
            "probe lost packets"
        );
    }

    let record = state.get_or_create(&peer.name).await?;
    record.observe(&stats);
    Ok(PeerOutcome::Recorded)
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use netmon_core::{PeerSet, ProbeStats};
    use netmon_metrics::MetricsRegistry;

    use super::*;
    use crate::prober::StaticProber;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn answered(rtt_ms: u64) -> ProbeStats {
        ProbeStats {
            packets_sent: 1,
            packets_received: 1,
            avg_rtt: Duration::from_millis(rtt_ms),
        }
    }

    fn test_config() -> MonitorConfig {
        let mut config = MonitorConfig::new("a").unwrap();
        config.interval = Duration::from_millis(20);
        config.probe_timeout = Duration::from_millis(10);
        config
    }

    async fn state_with(peers: &[(&str, &str)]) -> MonitorState {
        let state = MonitorState::new("a", MetricsRegistry::new("network_monitor"));
        state
            .replace_peers(PeerSet::new(
                peers.iter().map(|(n, a)| Peer::new(*n, ip(a))).collect(),
            ))
            .await;
        state
    }

    /// Tracks how many probes are in flight at once.
    struct CountingProber {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(
            &self,
            _target: IpAddr,
            _settings: &ProbeSettings,
        ) -> Result<ProbeStats, ProbeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(answered(1))
        }
    }

    struct HangingProber;

    #[async_trait]
    impl Prober for HangingProber {
        async fn probe(
            &self,
            _target: IpAddr,
            _settings: &ProbeSettings,
        ) -> Result<ProbeStats, ProbeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(answered(1))
        }
    }

    #[tokio::test]
    async fn answered_probe_updates_record() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let prober = StaticProber::new();
        prober.set_reply(ip("10.0.0.2"), answered(12));
        let probes = ProbeLoop::new(Arc::new(prober), state.clone(), &test_config());

        let summary = probes.run_cycle().await.unwrap();
        assert_eq!(summary.recorded, 1);

        let record = state.record("b").await.unwrap();
        assert_eq!(record.reachable(), 1.0);
        assert_eq!(record.latency_sample_count(), 1);
        assert!((record.latency_sample_sum() - 0.012).abs() < 1e-9);
        assert_eq!(record.packets_sent(), 1);
        assert_eq!(record.packets_received(), 1);
        assert_eq!(record.packets_lost(), 0);

        let output = state.metrics().render().unwrap();
        assert!(output.contains("network_monitor_reachable{source=\"a\",target=\"b\"} 1"));
    }

    #[tokio::test]
    async fn silent_peer_is_unreachable() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let probes = ProbeLoop::new(Arc::new(StaticProber::new()), state.clone(), &test_config());

        probes.run_cycle().await.unwrap();

        let record = state.record("b").await.unwrap();
        assert_eq!(record.reachable(), 0.0);
        assert_eq!(record.latency_sample_count(), 0);
        assert_eq!(record.packets_sent(), 1);
        assert_eq!(record.packets_lost(), 1);
    }

    #[tokio::test]
    async fn failed_probe_skips_only_that_peer() {
        let state = state_with(&[("b", "10.0.0.2"), ("c", "10.0.0.3")]).await;
        let prober = StaticProber::new();
        prober.set_failure(ip("10.0.0.2"), "network unreachable");
        prober.set_reply(ip("10.0.0.3"), answered(3));
        let probes = ProbeLoop::new(Arc::new(prober), state.clone(), &test_config());

        let summary = probes.run_cycle().await.unwrap();
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.failed, 1);
        assert!(state.record("b").await.is_none());
        assert_eq!(state.record("c").await.unwrap().packets_received(), 1);
    }

    #[tokio::test]
    async fn failed_probe_leaves_previous_values() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let prober = Arc::new(StaticProber::new());
        prober.set_reply(ip("10.0.0.2"), answered(5));
        let probes = ProbeLoop::new(prober.clone(), state.clone(), &test_config());
        probes.run_cycle().await.unwrap();

        prober.set_failure(ip("10.0.0.2"), "no buffer space available");
        probes.run_cycle().await.unwrap();

        let record = state.record("b").await.unwrap();
        assert_eq!(record.reachable(), 1.0);
        assert_eq!(record.packets_sent(), 1);
    }

    #[tokio::test]
    async fn counters_accumulate_across_cycles() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let prober = Arc::new(StaticProber::new());
        prober.set_reply(ip("10.0.0.2"), answered(5));
        let probes = ProbeLoop::new(prober.clone(), state.clone(), &test_config());

        probes.run_cycle().await.unwrap();
        probes.run_cycle().await.unwrap();
        prober.set_reply(
            ip("10.0.0.2"),
            ProbeStats {
                packets_sent: 1,
                packets_received: 0,
                avg_rtt: Duration::ZERO,
            },
        );
        probes.run_cycle().await.unwrap();

        let record = state.record("b").await.unwrap();
        assert_eq!(record.packets_sent(), 3);
        assert_eq!(record.packets_received(), 2);
        assert_eq!(record.packets_lost(), 1);
        assert_eq!(record.reachable(), 0.0);
        assert_eq!(record.latency_sample_count(), 2);
    }

    #[tokio::test]
    async fn departed_peers_are_pruned_before_probing() {
        let state = state_with(&[("b", "10.0.0.2"), ("c", "10.0.0.3")]).await;
        let probes = ProbeLoop::new(Arc::new(StaticProber::new()), state.clone(), &test_config());
        probes.run_cycle().await.unwrap();
        assert_eq!(state.tracked_targets().await, vec!["b", "c"]);

        state
            .replace_peers(PeerSet::new(vec![Peer::new("c", ip("10.0.0.3"))]))
            .await;
        let summary = probes.run_cycle().await.unwrap();

        assert_eq!(summary.pruned, vec!["b"]);
        assert_eq!(state.tracked_targets().await, vec!["c"]);
        assert!(!state.metrics().render().unwrap().contains("target=\"b\""));
    }

    #[tokio::test]
    async fn empty_peer_set_is_a_noop() {
        let state = state_with(&[]).await;
        let probes = ProbeLoop::new(Arc::new(StaticProber::new()), state.clone(), &test_config());

        assert_eq!(probes.run_cycle().await.unwrap(), CycleSummary::default());
        assert!(state.tracked_targets().await.is_empty());
    }

    #[tokio::test]
    async fn probes_run_concurrently() {
        let peers: Vec<(String, String)> = (2..7)
            .map(|i| (format!("n{i}"), format!("10.0.0.{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = peers.iter().map(|(n, a)| (n.as_str(), a.as_str())).collect();
        let state = state_with(&refs).await;

        let prober = Arc::new(CountingProber {
            delay: Duration::from_millis(200),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let probes = ProbeLoop::new(prober.clone(), state.clone(), &test_config());

        let started = Instant::now();
        let summary = probes.run_cycle().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.recorded, 5);
        assert!(elapsed < Duration::from_millis(600), "took {elapsed:?}");
        assert!(prober.peak.load(Ordering::SeqCst) > 1);
        // Every task was joined before the cycle returned.
        assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hanging_probe_hits_deadline() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let probes = ProbeLoop::new(Arc::new(HangingProber), state.clone(), &test_config());

        let started = Instant::now();
        let summary = probes.run_cycle().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(state.record("b").await.is_none());
    }

    #[tokio::test]
    async fn registration_collision_fails_the_cycle() {
        let state = state_with(&[("b", "10.0.0.2"), ("c", "10.0.0.3")]).await;
        let rogue = state.metrics().new_record("a", "b").unwrap();
        state.metrics().register(&rogue).unwrap();

        let probes = ProbeLoop::new(Arc::new(StaticProber::new()), state.clone(), &test_config());
        let err = probes.run_cycle().await.unwrap_err();
        assert!(err.is_duplicate());

        // The other peer was still handled.
        assert!(state.record("c").await.is_some());
    }

    #[tokio::test]
    async fn run_probes_until_shutdown() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let prober = StaticProber::new();
        prober.set_reply(ip("10.0.0.2"), answered(2));
        let probes = ProbeLoop::new(Arc::new(prober), state.clone(), &test_config());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { probes.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(state.record("b").await.unwrap().packets_sent() >= 2);

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("probe loop did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn run_stops_on_registration_error() {
        let state = state_with(&[("b", "10.0.0.2")]).await;
        let rogue = state.metrics().new_record("a", "b").unwrap();
        state.metrics().register(&rogue).unwrap();

        let probes = ProbeLoop::new(Arc::new(StaticProber::new()), state, &test_config());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(1), probes.run(shutdown_rx))
            .await
            .expect("probe loop kept running");
        assert!(result.unwrap_err().is_duplicate());
    }
}
