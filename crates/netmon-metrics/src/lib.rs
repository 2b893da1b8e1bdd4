//! netmon-metrics — observability records for probed peers.
//!
//! Each probed peer owns one [`PeerMetrics`] record: a reachability gauge,
//! a latency histogram and three packet counters, all labelled with the
//! local node (`source`) and the peer (`target`). Records are registered
//! into a [`MetricsRegistry`] as a single collector so that a peer's
//! metrics appear and disappear together.
//!
//! # Architecture
//!
//! ```text
//! MetricsRegistry (prometheus::Registry + namespace)
//!   ├── register(&PeerMetrics)   ← duplicate target → MetricsError::Duplicate
//!   ├── unregister(&PeerMetrics)
//!   └── render() → text/plain for the /metrics endpoint
//!
//! PeerMetrics (one per target)
//!   ├── reachable         gauge 0/1
//!   ├── latency           histogram, 0.000125s × 2^n, 14 buckets
//!   └── packets_{sent,received,lost}  counters
//! ```

pub mod error;
pub mod record;
pub mod registry;

pub use error::{MetricsError, MetricsResult};
pub use record::PeerMetrics;
pub use registry::{MetricsRegistry, TEXT_CONTENT_TYPE};
