//! Per-peer metric record.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Opts};

use netmon_core::ProbeStats;

use crate::error::MetricsResult;

/// First latency bucket upper bound, in seconds.
const LATENCY_BUCKET_START: f64 = 0.000125;
const LATENCY_BUCKET_FACTOR: f64 = 2.0;
const LATENCY_BUCKET_COUNT: usize = 14;

/// Observability state for one probe target.
///
/// Cloning shares the underlying metrics, so a clone handed out by the
/// state layer updates the same exported series.
#[derive(Clone)]
pub struct PeerMetrics {
    target: String,
    reachable: Gauge,
    latency: Histogram,
    packets_sent: IntCounter,
    packets_received: IntCounter,
    packets_lost: IntCounter,
}

impl PeerMetrics {
    /// Build an unregistered record for `target`, as seen from `source`.
    pub fn new(namespace: &str, source: &str, target: &str) -> MetricsResult<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(namespace)
                .const_label("source", source)
                .const_label("target", target)
        };

        let latency_opts = HistogramOpts::new("latency", "Average echo round-trip time in seconds.")
            .namespace(namespace)
            .const_label("source", source)
            .const_label("target", target)
            .buckets(prometheus::exponential_buckets(
                LATENCY_BUCKET_START,
                LATENCY_BUCKET_FACTOR,
                LATENCY_BUCKET_COUNT,
            )?);

        Ok(Self {
            target: target.to_string(),
            reachable: Gauge::with_opts(opts(
                "reachable",
                "Whether the target answered the last probe (0 or 1).",
            ))?,
            latency: Histogram::with_opts(latency_opts)?,
            packets_sent: IntCounter::with_opts(opts(
                "packets_sent",
                "Echo packets sent to the target.",
            ))?,
            packets_received: IntCounter::with_opts(opts(
                "packets_received",
                "Echo replies received from the target.",
            ))?,
            packets_lost: IntCounter::with_opts(opts(
                "packets_lost",
                "Echo packets that were never answered.",
            ))?,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Record the outcome of one probe.
    ///
    /// A probe with no answered packets marks the target unreachable and
    /// contributes no latency sample.
    pub fn observe(&self, stats: &ProbeStats) {
        if stats.is_reachable() {
            self.reachable.set(1.0);
            self.latency.observe(stats.avg_rtt.as_secs_f64());
        } else {
            self.reachable.set(0.0);
        }
        self.packets_sent.inc_by(stats.packets_sent);
        self.packets_received.inc_by(stats.packets_received);
        self.packets_lost.inc_by(stats.packets_lost());
    }

    pub fn reachable(&self) -> f64 {
        self.reachable.get()
    }

    pub fn latency_sample_count(&self) -> u64 {
        self.latency.get_sample_count()
    }

    pub fn latency_sample_sum(&self) -> f64 {
        self.latency.get_sample_sum()
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.get()
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.get()
    }

    pub fn packets_lost(&self) -> u64 {
        self.packets_lost.get()
    }
}

impl std::fmt::Debug for PeerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerMetrics")
            .field("target", &self.target)
            .field("reachable", &self.reachable())
            .field("packets_sent", &self.packets_sent())
            .field("packets_received", &self.packets_received())
            .finish()
    }
}

impl Collector for PeerMetrics {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::with_capacity(5);
        descs.extend(self.reachable.desc());
        descs.extend(self.latency.desc());
        descs.extend(self.packets_sent.desc());
        descs.extend(self.packets_received.desc());
        descs.extend(self.packets_lost.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(5);
        families.extend(self.reachable.collect());
        families.extend(self.latency.collect());
        families.extend(self.packets_sent.collect());
        families.extend(self.packets_received.collect());
        families.extend(self.packets_lost.collect());
        families
    }
}
