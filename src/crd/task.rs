//! `SwarmTask` — a unit of work dispatched to a cluster (spec.md §3, §4.5).

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::models::{ResourceSpec, RetryPolicy, Strategy, SubtaskSpec, SubtaskStatus, TaskPhase, TaskPriority};

#[derive(Debug, Clone, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "swarmops.io",
    version = "v1alpha1",
    kind = "SwarmTask",
    plural = "swarmtasks",
    shortname = "swt",
    namespaced,
    status = "SwarmTaskStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Priority","type":"string","jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SwarmTaskSpec {
    pub cluster_ref: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub subtasks: Vec<SubtaskSpec>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Overrides the cluster's declared credential provider for this task only.
    #[serde(default)]
    pub credential_provider_override: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
    /// Free-form `PARAM_<UPPER>` environment values injected into the job (§4.5 step 5).
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwarmTaskStatus {
    #[serde(default)]
    pub phase: TaskPhase,
    #[serde(default)]
    pub progress_percent: u8,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskStatus>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub result_ref: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub observed_generation: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_phase_is_pending() {
        assert_eq!(SwarmTaskStatus::default().phase, TaskPhase::Pending);
    }
}
