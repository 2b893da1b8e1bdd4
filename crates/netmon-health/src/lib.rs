//! netmon-health — reachability and latency probes for every known peer.
//!
//! # Architecture
//!
//! ```text
//! ProbeLoop (every interval)
//!   ├── MonitorState::prune_and_snapshot()   stale records unregistered first
//!   ├── JoinSet: one task per peer
//!   │   ├── Prober::probe(ip) → ProbeStats   (IcmpProber in production)
//!   │   └── MonitorState::get_or_create(peer).observe(stats)
//!   └── join every task before the next cycle
//! ```
//!
//! A failed probe only skips that peer's update for the cycle. A metric
//! registration collision aborts the loop, since it means the record
//! lifecycle is broken.

pub mod monitor;
pub mod prober;

pub use monitor::{CycleSummary, ProbeLoop};
pub use prober::{IcmpProber, ProbeError, ProbeSettings, Prober, StaticProber};
