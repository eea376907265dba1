//! Task domain model: phase machine, priority, retry policy, and subtask DAG rows (§3, §4.5).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Lifecycle phase of a `SwarmTask` (§3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TaskPhase {
    Pending,
    Assigning,
    Running,
    Completing,
    Completed,
    Failed,
    Cancelled,
}

impl Default for TaskPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Assigning => "Assigning",
            Self::Running => "Running",
            Self::Completing => "Completing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Terminal phases never reconcile further (besides finalizer cleanup).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Retry policy for a task's backing job (§3, §4.5 step 7).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub retryable_errors: Vec<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_multiplier: default_backoff_multiplier(),
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Seconds to wait before the next attempt, per §4.5 step 7:
    /// `backoffMultiplier^retryCount`.
    pub fn backoff_seconds(&self, retry_count: u32) -> f64 {
        self.backoff_multiplier.powi(retry_count as i32)
    }

    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }
}

/// A single node in a task's optional subtask DAG (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubtaskSpec {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub timeout_secs: Option<i64>,
}

fn default_weight() -> f64 {
    1.0
}

/// Status row for a single subtask (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubtaskStatus {
    pub name: String,
    pub phase: TaskPhase,
    #[serde(default)]
    pub assigned_agent: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips() {
        for p in [
            TaskPriority::Low,
            TaskPriority::Medium,
            TaskPriority::High,
            TaskPriority::Critical,
        ] {
            assert_eq!(TaskPriority::from_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn priority_ordering_is_low_to_critical() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn only_terminal_phases_are_terminal() {
        assert!(TaskPhase::Completed.is_terminal());
        assert!(TaskPhase::Failed.is_terminal());
        assert!(TaskPhase::Cancelled.is_terminal());
        assert!(!TaskPhase::Running.is_terminal());
        assert!(!TaskPhase::Pending.is_terminal());
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_multiplier: 2.0,
            retryable_errors: vec![],
        };
        assert!((policy.backoff_seconds(0) - 1.0).abs() < f64::EPSILON);
        assert!((policy.backoff_seconds(1) - 2.0).abs() < f64::EPSILON);
        assert!((policy.backoff_seconds(3) - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exhausted_at_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }
}
