//! netmon-core — shared types and configuration for the netmon agent.
//!
//! Every other crate in the workspace speaks in terms of the types
//! defined here: a [`Peer`] is a probe target, a [`PeerSet`] is one
//! immutable discovery snapshot, and [`ProbeStats`] is what a single
//! echo probe reports back.

pub mod config;
pub mod duration;
pub mod error;
pub mod types;

pub use config::{FileConfig, MonitorConfig};
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
