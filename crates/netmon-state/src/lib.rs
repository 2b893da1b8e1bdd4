//! netmon-state — the state shared by the discovery and probe loops.
//!
//! [`MonitorState`] holds the current [`PeerSet`](netmon_core::PeerSet)
//! and the map from peer name to its exported
//! [`PeerMetrics`](netmon_metrics::PeerMetrics) record. Both live behind a
//! single mutex; every read and write goes through the methods here.
//!
//! The state is `Clone` (backed by `Arc`) and is handed to each loop
//! explicitly rather than living in a global.

pub mod error;
pub mod state;

pub use error::{StateError, StateResult};
pub use state::{MonitorState, PeerSetDiff};
