//! netmon-cluster — keeps the agent's view of its peers current.
//!
//! # Architecture
//!
//! ```text
//! DiscoveryLoop (every discovery_interval)
//!   ├── MembershipSource::list_nodes()   bounded by membership_timeout
//!   │     └── KubeMembership → Api<Node>::list
//!   ├── select_peers()
//!   │     ├── drop the local node
//!   │     ├── drop nodes tainted not-ready / unschedulable
//!   │     └── drop nodes without a usable InternalIP
//!   └── MonitorState::replace_peers()   whole-list swap
//! ```
//!
//! A failed or timed-out query leaves the previous peer set in place.

pub mod discovery;
pub mod kubernetes;
pub mod membership;

pub use discovery::DiscoveryLoop;
pub use kubernetes::KubeMembership;
pub use membership::{
    ClusterNode, MembershipError, MembershipSource, NodeAddress, StaticMembership,
    TAINT_NOT_READY, TAINT_UNSCHEDULABLE, select_peers,
};
