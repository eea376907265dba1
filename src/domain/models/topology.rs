//! Topology kind — the peer-graph shape a `SwarmCluster` maintains across its agents.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coordination topology for a cluster's peer graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// Every agent peers with every other agent.
    Mesh,
    /// Agents ordered in a closed cycle, two peers each.
    Ring,
    /// One hub agent peers with all others; others peer only with the hub.
    Star,
    /// Agents arranged as a binary tree by sorted index.
    Hierarchical,
}

impl Default for TopologyKind {
    fn default() -> Self {
        Self::Mesh
    }
}

impl TopologyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mesh => "mesh",
            Self::Ring => "ring",
            Self::Star => "star",
            Self::Hierarchical => "hierarchical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mesh" => Some(Self::Mesh),
            "ring" => Some(Self::Ring),
            "star" => Some(Self::Star),
            "hierarchical" => Some(Self::Hierarchical),
            _ => None,
        }
    }
}
