//! Custom resource definitions for the `swarmops.io` API group (spec.md §3, §6).
//!
//! Each kind splits into a `kube::CustomResource`-derived spec and a plain
//! status struct. The enum/struct fields reuse `crate::domain::models`
//! directly rather than re-declaring them, so the pure reconciliation logic
//! and the wire schema never drift apart.

pub mod agent;
pub mod cluster;
pub mod legacy;
pub mod task;

pub use agent::{SwarmAgent, SwarmAgentSpec, SwarmAgentStatus};
pub use cluster::{SwarmCluster, SwarmClusterSpec, SwarmClusterStatus};
pub use task::{SwarmTask, SwarmTaskSpec, SwarmTaskStatus};

/// API group shared by all three kinds.
pub const GROUP: &str = "swarmops.io";
pub const VERSION: &str = "v1alpha1";

/// Builds the `<group>/finalizer` identifier for a kind (§6).
pub fn finalizer_name(kind: &str) -> String {
    format!("{kind}.{GROUP}/finalizer")
}

/// Builds a `<group>/<key>` label or annotation key (§6).
pub fn qualified_key(key: &str) -> String {
    format!("{GROUP}/{key}")
}
