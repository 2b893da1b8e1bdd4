//! ICMP echo probes.
//!
//! A probe sends `count` echo requests to one address, spaced by the
//! packet interval, each waiting at most the per-packet timeout. An
//! unanswered request counts as lost. Any other send failure aborts the
//! probe and is reported as a [`ProbeError`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use thiserror::Error;
use tracing::{debug, trace};

use netmon_core::{MonitorConfig, ProbeStats};

/// Echo payload size, matching the common `ping` default.
const PAYLOAD_LEN: usize = 56;

/// Errors from a single probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unable to open icmp socket: {0}")]
    Socket(#[from] std::io::Error),

    #[error("no icmp socket available for {0} targets")]
    Unsupported(&'static str),

    #[error("ping {target} failed: {reason}")]
    Transport { target: IpAddr, reason: String },

    #[error("probe of {target} exceeded its {deadline:?} deadline")]
    Deadline { target: IpAddr, deadline: Duration },
}

/// Packet count and timing of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub count: u32,
    /// How long to wait for each echo reply.
    pub timeout: Duration,
    /// Pause between consecutive requests.
    pub packet_interval: Duration,
}

impl ProbeSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            count: config.probe_count,
            timeout: config.probe_timeout,
            packet_interval: config.probe_packet_interval,
        }
    }

    /// Upper bound on a well-behaved probe's duration, plus one second of
    /// slack for socket setup.
    pub fn deadline(&self) -> Duration {
        let count = self.count.max(1);
        self.timeout * count + self.packet_interval * (count - 1) + Duration::from_secs(1)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            count: netmon_core::config::DEFAULT_PROBE_COUNT,
            timeout: netmon_core::config::DEFAULT_PROBE_TIMEOUT,
            packet_interval: netmon_core::config::DEFAULT_PROBE_PACKET_INTERVAL,
        }
    }
}

/// Something that can measure reachability and latency of an address.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: IpAddr, settings: &ProbeSettings)
    -> Result<ProbeStats, ProbeError>;
}

/// Fold per-request round trips into probe statistics. `None` is an
/// unanswered request.
pub fn summarize(replies: &[Option<Duration>]) -> ProbeStats {
    let answered: Vec<Duration> = replies.iter().flatten().copied().collect();
    let avg_rtt = match answered.len() {
        0 => Duration::ZERO,
        n => answered.iter().sum::<Duration>() / n as u32,
    };

    ProbeStats {
        packets_sent: replies.len() as u64,
        packets_received: answered.len() as u64,
        avg_rtt,
    }
}

/// Probes over raw (or unprivileged datagram) ICMP sockets.
///
/// Needs `CAP_NET_RAW` or a permissive `net.ipv4.ping_group_range`.
pub struct IcmpProber {
    v4: Option<Client>,
    v6: Option<Client>,
    next_id: AtomicU16,
}

impl IcmpProber {
    /// Open the ICMP sockets. Succeeds if at least one address family is
    /// usable.
    pub fn new() -> Result<Self, ProbeError> {
        let v4 = Client::new(&Config::default());
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build());

        match (v4, v6) {
            (Err(e), Err(_)) => Err(ProbeError::Socket(e)),
            (v4, v6) => {
                if let Err(e) = &v4 {
                    debug!(error = %e, "ipv4 icmp socket unavailable");
                }
                if let Err(e) = &v6 {
                    debug!(error = %e, "ipv6 icmp socket unavailable");
                }
                Ok(Self {
                    v4: v4.ok(),
                    v6: v6.ok(),
                    next_id: AtomicU16::new(std::process::id() as u16),
                })
            }
        }
    }

    fn client_for(&self, target: IpAddr) -> Result<&Client, ProbeError> {
        match target {
            IpAddr::V4(_) => self.v4.as_ref().ok_or(ProbeError::Unsupported("ipv4")),
            IpAddr::V6(_) => self.v6.as_ref().ok_or(ProbeError::Unsupported("ipv6")),
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(
        &self,
        target: IpAddr,
        settings: &ProbeSettings,
    ) -> Result<ProbeStats, ProbeError> {
        let client = self.client_for(target)?;
        let id = PingIdentifier(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut pinger = client.pinger(target, id).await;
        pinger.timeout(settings.timeout);

        let payload = [0u8; PAYLOAD_LEN];
        let mut replies = Vec::with_capacity(settings.count as usize);

        let count = u16::try_from(settings.count).unwrap_or(u16::MAX);
        for seq in 0..count {
            if seq > 0 {
                tokio::time::sleep(settings.packet_interval).await;
            }

            match pinger.ping(PingSequence(seq), &payload).await {
                Ok((_, rtt)) => {
                    trace!(%target, seq, ?rtt, "echo reply");
                    replies.push(Some(rtt));
                }
                Err(SurgeError::Timeout { .. }) => {
                    trace!(%target, seq, "echo timed out");
                    replies.push(None);
                }
                Err(e) => {
                    return Err(ProbeError::Transport {
                        target,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(summarize(&replies))
    }
}

/// Canned probe results per address.
///
/// Addresses without an entry behave like a silent host: every request
/// is lost. Useful for tests and for running without ICMP privileges.
#[derive(Debug, Default)]
pub struct StaticProber {
    replies: Mutex<HashMap<IpAddr, Result<ProbeStats, String>>>,
}

impl StaticProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reply(&self, target: IpAddr, stats: ProbeStats) {
        self.lock().insert(target, Ok(stats));
    }

    /// Make probes of `target` fail with a transport error.
    pub fn set_failure(&self, target: IpAddr, reason: impl Into<String>) {
        self.lock().insert(target, Err(reason.into()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<IpAddr, Result<ProbeStats, String>>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(
        &self,
        target: IpAddr,
        settings: &ProbeSettings,
    ) -> Result<ProbeStats, ProbeError> {
        let reply = self.lock().get(&target).cloned();
        match reply {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(reason)) => Err(ProbeError::Transport { target, reason }),
            None => Ok(summarize(&vec![None; settings.count as usize])),
        }
    }
}
