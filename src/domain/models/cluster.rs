//! Cluster-level domain model: queen mode, execution strategy, phase, and autoscaling config.

use schemars::JsonSchema;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where scaling/coordination decisions are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueenMode {
    /// A single coordinator agent makes decisions for the cluster.
    Centralized,
    /// Decisions are made cooperatively; no single coordinator required.
    Distributed,
}

impl Default for QueenMode {
    fn default() -> Self {
        Self::Centralized
    }
}

/// Execution strategy hint surfaced to agents/the external executor.
///
/// `Consensus` and `Adaptive` are treated as hints only (spec.md §9 Open
/// Questions) — they do not alter controller control flow beyond being
/// injected into agent/task environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Parallel,
    Sequential,
    Adaptive,
    Consensus,
    Balanced,
    Specialized,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Balanced
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
            Self::Adaptive => "adaptive",
            Self::Consensus => "consensus",
            Self::Balanced => "balanced",
            Self::Specialized => "specialized",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parallel" => Some(Self::Parallel),
            "sequential" => Some(Self::Sequential),
            "adaptive" => Some(Self::Adaptive),
            "consensus" => Some(Self::Consensus),
            "balanced" => Some(Self::Balanced),
            "specialized" => Some(Self::Specialized),
            _ => None,
        }
    }
}

/// Lifecycle phase of a `SwarmCluster` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterPhase {
    Pending,
    Initializing,
    Running,
    Scaling,
    Failed,
    Terminating,
}

impl Default for ClusterPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Scaling => "Scaling",
            Self::Failed => "Failed",
            Self::Terminating => "Terminating",
        }
    }
}

/// Health summary surfaced on `status.health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Default for ClusterHealth {
    fn default() -> Self {
        Self::Healthy
    }
}

/// Autoscaling configuration block (§3, §4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AutoscalingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Average CPU percent above which a scale-up is considered.
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    /// Average CPU percent below which a scale-down is considered.
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    /// Declared type → percent ratio the autoscaler preserves when adding/removing agents.
    #[serde(default)]
    pub type_ratios: HashMap<String, f64>,
    /// Minimum time between two successive scaling decisions (seconds).
    #[serde(default = "default_stabilization_window_secs")]
    pub stabilization_window_secs: i64,
    /// Names of custom metric descriptors the cluster wants sampled (SPEC_FULL.md §B.2).
    #[serde(default)]
    pub custom_metrics: Vec<String>,
}

fn default_scale_up_threshold() -> f64 {
    80.0
}

fn default_scale_down_threshold() -> f64 {
    20.0
}

fn default_stabilization_window_secs() -> i64 {
    60
}

impl Default for AutoscalingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            type_ratios: HashMap::new(),
            stabilization_window_secs: default_stabilization_window_secs(),
            custom_metrics: Vec::new(),
        }
    }
}

/// Per-agent resource request/limit pair, shared by the cluster-level template and task caps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu_request: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_request: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
}

/// Template used to materialize agent specs (§4.4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AgentTemplate {
    pub image: String,
    #[serde(default)]
    pub resources: ResourceSpec,
    /// Explicit cognitive pattern cycle, if the user wants non-default ordering.
    #[serde(default)]
    pub cognitive_patterns: Vec<super::agent::CognitivePattern>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_autoscaling_is_disabled() {
        let cfg = AutoscalingConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.scale_up_threshold > cfg.scale_down_threshold);
    }

    #[test]
    fn strategy_round_trips() {
        for s in [
            Strategy::Parallel,
            Strategy::Sequential,
            Strategy::Adaptive,
            Strategy::Consensus,
            Strategy::Balanced,
            Strategy::Specialized,
        ] {
            assert_eq!(Strategy::from_str(s.as_str()), Some(s));
        }
    }
}
