//! `SwarmAgent` — a single worker record within a cluster (spec.md §3, §4.3).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::models::{AgentPhase, AgentType, CognitivePattern, ResourceSpec};

/// How an agent talks to its peers (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationDescriptor {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub broadcast: bool,
}

fn default_protocol() -> String {
    "grpc".to_string()
}

fn default_port() -> u16 {
    9000
}

impl Default for CommunicationDescriptor {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            port: default_port(),
            peers: Vec::new(),
            broadcast: false,
        }
    }
}

/// Optional model binding surfaced to the agent's runtime; opaque to the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NeuralModelDescriptor {
    pub model: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "swarmops.io",
    version = "v1alpha1",
    kind = "SwarmAgent",
    plural = "swarmagents",
    shortname = "swa",
    namespaced,
    status = "SwarmAgentStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SwarmAgentSpec {
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub cluster_ref: String,
    #[serde(default)]
    pub cognitive_pattern: CognitivePattern,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub communication: CommunicationDescriptor,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub neural_model: Option<NeuralModelDescriptor>,
}

/// Counters reported by the agent's own runtime and copied verbatim (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceCounters {
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub in_flight_tasks: u32,
    pub throughput_per_min: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwarmAgentStatus {
    #[serde(default)]
    pub phase: AgentPhase,
    #[serde(default)]
    pub counters: PerformanceCounters,
    /// Per-peer reachability, last observed by the runtime's own health probe.
    #[serde(default)]
    pub peer_health: BTreeMap<String, bool>,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observed_generation: i64,
}

impl SwarmAgentStatus {
    /// Whether this agent counts toward `minAgents ≤ … ≤ maxAgents` (I1).
    pub fn counts_toward_population(&self) -> bool {
        self.phase.counts_toward_population()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_defaults_are_grpc_on_9000() {
        let c = CommunicationDescriptor::default();
        assert_eq!(c.protocol, "grpc");
        assert_eq!(c.port, 9000);
        assert!(c.peers.is_empty());
    }

    #[test]
    fn failed_agents_do_not_count_toward_population() {
        let mut status = SwarmAgentStatus {
            phase: AgentPhase::Failed,
            ..Default::default()
        };
        assert!(!status.counts_toward_population());
        status.phase = AgentPhase::Ready;
        assert!(status.counts_toward_population());
    }
}
