//! Agent domain model — role, cognitive pattern, and lifecycle phase for a `SwarmAgent`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role label for an agent within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Coordinator,
    Researcher,
    Coder,
    Analyst,
    Architect,
    Tester,
    Reviewer,
    Optimizer,
    Documenter,
    Monitor,
    Specialist,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Researcher => "researcher",
            Self::Coder => "coder",
            Self::Analyst => "analyst",
            Self::Architect => "architect",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
            Self::Optimizer => "optimizer",
            Self::Documenter => "documenter",
            Self::Monitor => "monitor",
            Self::Specialist => "specialist",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "coordinator" => Some(Self::Coordinator),
            "researcher" => Some(Self::Researcher),
            "coder" => Some(Self::Coder),
            "analyst" => Some(Self::Analyst),
            "architect" => Some(Self::Architect),
            "tester" => Some(Self::Tester),
            "reviewer" => Some(Self::Reviewer),
            "optimizer" => Some(Self::Optimizer),
            "documenter" => Some(Self::Documenter),
            "monitor" => Some(Self::Monitor),
            "specialist" => Some(Self::Specialist),
            _ => None,
        }
    }

    /// Canonical role cycle used by the `specialized` cluster strategy (§4.4.1).
    pub const SPECIALIZED_CYCLE: [AgentType; 5] = [
        Self::Coordinator,
        Self::Researcher,
        Self::Coder,
        Self::Analyst,
        Self::Tester,
    ];
}

/// Cognitive pattern tag, opaque to the controller beyond selection and env injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CognitivePattern {
    Convergent,
    Divergent,
    Lateral,
    Systems,
    Critical,
    Adaptive,
}

impl Default for CognitivePattern {
    fn default() -> Self {
        Self::Adaptive
    }
}

impl CognitivePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convergent => "convergent",
            Self::Divergent => "divergent",
            Self::Lateral => "lateral",
            Self::Systems => "systems",
            Self::Critical => "critical",
            Self::Adaptive => "adaptive",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "convergent" => Some(Self::Convergent),
            "divergent" => Some(Self::Divergent),
            "lateral" => Some(Self::Lateral),
            "systems" => Some(Self::Systems),
            "critical" => Some(Self::Critical),
            "adaptive" => Some(Self::Adaptive),
            _ => None,
        }
    }

    /// Default cycle used when the agent template doesn't enumerate patterns (§4.4.1).
    pub const DEFAULT_CYCLE: [CognitivePattern; 4] =
        [Self::Adaptive, Self::Systems, Self::Convergent, Self::Divergent];
}

/// Lifecycle phase of a `SwarmAgent` (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AgentPhase {
    Pending,
    Initializing,
    Ready,
    Busy,
    Terminating,
    Failed,
}

impl Default for AgentPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Initializing => "Initializing",
            Self::Ready => "Ready",
            Self::Busy => "Busy",
            Self::Terminating => "Terminating",
            Self::Failed => "Failed",
        }
    }

    /// Whether an agent in this phase counts against `minAgents`/`maxAgents` (I1).
    pub fn counts_toward_population(&self) -> bool {
        !matches!(self, Self::Failed | Self::Terminating)
    }

    /// Whether an agent in this phase is a legal autoscale-down victim (§4.4, §4.4.2).
    pub fn is_scale_down_candidate(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_type_round_trips() {
        for t in [
            AgentType::Coordinator,
            AgentType::Researcher,
            AgentType::Coder,
            AgentType::Analyst,
            AgentType::Architect,
            AgentType::Tester,
            AgentType::Reviewer,
            AgentType::Optimizer,
            AgentType::Documenter,
            AgentType::Monitor,
            AgentType::Specialist,
        ] {
            assert_eq!(AgentType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn cognitive_pattern_round_trips() {
        for p in [
            CognitivePattern::Convergent,
            CognitivePattern::Divergent,
            CognitivePattern::Lateral,
            CognitivePattern::Systems,
            CognitivePattern::Critical,
            CognitivePattern::Adaptive,
        ] {
            assert_eq!(CognitivePattern::from_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn failed_and_terminating_do_not_count_toward_population() {
        assert!(!AgentPhase::Failed.counts_toward_population());
        assert!(!AgentPhase::Terminating.counts_toward_population());
        assert!(AgentPhase::Ready.counts_toward_population());
        assert!(AgentPhase::Busy.counts_toward_population());
    }

    #[test]
    fn only_ready_is_a_scale_down_candidate() {
        assert!(AgentPhase::Ready.is_scale_down_candidate());
        assert!(!AgentPhase::Busy.is_scale_down_candidate());
        assert!(!AgentPhase::Pending.is_scale_down_candidate());
    }
}
