//! `SwarmCluster` — a declared population of agents sharing a topology (spec.md §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::Conditions;
use crate::domain::models::{
    AgentTemplate, AutoscalingConfig, ClusterHealth, ClusterPhase, QueenMode, Strategy,
    TopologyKind,
};

/// Reference to the secret holding a credential-provider's private key, plus
/// the provider identity and exchange endpoint (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CredentialProviderBinding {
    pub app_id: String,
    pub private_key_secret_name: String,
    #[serde(default = "default_private_key_secret_key")]
    pub private_key_secret_key: String,
    pub token_exchange_url: String,
    /// If true, tasks on this cluster must declare `repositories`; an empty
    /// list is a configuration error rather than "no credential needed".
    #[serde(default)]
    pub required: bool,
}

fn default_private_key_secret_key() -> String {
    "private-key.pem".to_string()
}

/// Where task namespaces land when `SwarmTask.spec.namespace` is unset (§4.5 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NamespacePlacement {
    /// Namespace used for ordinary task types. Defaults to the cluster's own namespace.
    #[serde(default)]
    pub default_namespace: Option<String>,
    /// Namespace used for `hivemind`/`consensus` task types.
    #[serde(default)]
    pub hive_mind_namespace: Option<String>,
}

#[derive(Debug, Clone, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "swarmops.io",
    version = "v1alpha1",
    kind = "SwarmCluster",
    plural = "swarmclusters",
    shortname = "swc",
    namespaced,
    status = "SwarmClusterStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.readyAgents"}"#,
    printcolumn = r#"{"name":"Topology","type":"string","jsonPath":".spec.topology"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    scale = r#"{"specReplicasPath":".spec.maxAgents","statusReplicasPath":".status.activeAgents"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SwarmClusterSpec {
    #[serde(default)]
    pub topology: TopologyKind,
    #[serde(default)]
    pub queen_mode: QueenMode,
    #[serde(default)]
    pub strategy: Strategy,
    /// Fraction of agents that must agree under `consensus` strategy; a hint
    /// to the external executor only (spec.md §9 Open Questions).
    #[serde(default)]
    pub consensus_threshold: Option<f64>,
    pub min_agents: u32,
    pub max_agents: u32,
    #[serde(default)]
    pub autoscaling: AutoscalingConfig,
    pub agent_template: AgentTemplate,
    #[serde(default)]
    pub credential_provider: Option<CredentialProviderBinding>,
    #[serde(default)]
    pub namespace_placement: NamespacePlacement,
}

/// Peer-graph summary surfaced on status (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TopologyDescriptor {
    #[serde(default)]
    pub kind: Option<TopologyKind>,
    pub connections: u32,
    pub avg_latency_ms: f64,
}

/// Aggregated task counters rolled up from owned agents' reported stats (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TaskStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub active: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwarmClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,
    #[serde(default)]
    pub health: ClusterHealth,
    #[serde(default)]
    pub ready_agents: u32,
    #[serde(default)]
    pub active_agents: u32,
    #[serde(default)]
    pub total_agents: u32,
    #[serde(default)]
    pub agents_by_type: BTreeMap<String, u32>,
    #[serde(default)]
    pub task_stats: TaskStats,
    #[serde(default)]
    pub topology: TopologyDescriptor,
    #[serde(default)]
    pub last_scale_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Conditions,
    #[serde(default)]
    pub observed_generation: i64,
}

impl SwarmClusterStatus {
    /// `count(agents whose phase ∉ {Failed, Terminating})`, used against I1/P5.
    pub fn in_population_count(&self) -> u32 {
        self.total_agents
    }
}
