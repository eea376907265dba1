//! The legacy `Swarm` kind (SPEC_FULL.md §B.1, spec.md §9 Open Questions).
//!
//! The source system carried both a richer `SwarmCluster` and a simpler
//! `Swarm` CRD with overlapping purpose. `Swarm` is kept only as a
//! bit-exact-schema compatibility alias: the controller never watches or
//! reconciles it directly. `SwarmClusterSpec::from_legacy` is the one-shot
//! migration path a cluster operator runs by hand (e.g. a one-off job or
//! `kubectl` script, out of scope here) to convert an existing `Swarm`
//! object into a `SwarmCluster` before deleting the old one.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::cluster::SwarmClusterSpec;
use crate::domain::models::{AgentTemplate, AutoscalingConfig, QueenMode, Strategy, TopologyKind};

/// The old, flatter spec shape. No status subresource: it was never
/// reconciled live, only read by the legacy CLI plugin (out of scope).
#[derive(Debug, Clone, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "swarmops.io",
    version = "v1alpha1",
    kind = "Swarm",
    plural = "swarms",
    shortname = "sw",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SwarmSpec {
    #[serde(default)]
    pub topology: TopologyKind,
    #[serde(default)]
    pub queen_mode: QueenMode,
    #[serde(default)]
    pub strategy: Strategy,
    pub agent_count: u32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub autoscaling: AutoscalingConfig,
}

impl SwarmClusterSpec {
    /// Converts a legacy `Swarm` object into a `SwarmCluster` spec.
    ///
    /// `agentCount` becomes both `minAgents` and `maxAgents`: the old kind
    /// had no notion of a scaling range, so the safest reading is "pin the
    /// population at exactly what was declared" until the operator edits it.
    pub fn from_legacy(legacy: &SwarmSpec) -> Self {
        Self {
            topology: legacy.topology,
            queen_mode: legacy.queen_mode,
            strategy: legacy.strategy,
            consensus_threshold: None,
            min_agents: legacy.agent_count,
            max_agents: legacy.agent_count,
            autoscaling: legacy.autoscaling.clone(),
            agent_template: AgentTemplate {
                image: legacy.image.clone(),
                ..Default::default()
            },
            credential_provider: None,
            namespace_placement: Default::default(),
        }
    }
}
