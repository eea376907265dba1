//! Pluggable autoscaler metric source (SPEC_FULL.md §B.2, spec.md §9 Open Questions).
//!
//! The CRD enumerates custom metric descriptors but the original system
//! never shipped a fetcher for them; this trait is the documented seam a
//! real deployment plugs one into, with a `PodMetricsSource` default that
//! reads `metrics.k8s.io` and a `StaticMetricsSource` test double.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::error::MetricsError;

/// A single agent's observed load, as seen by the autoscaler (§4.4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    pub name: String,
    pub cpu_percent: f64,
    pub in_flight_tasks: u32,
    pub custom: HashMap<String, f64>,
}

/// Aggregated signals the autoscaler evaluates (§4.4.2 step 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterMetrics {
    pub avg_cpu_percent: f64,
    pub avg_tasks_per_agent: f64,
}

impl ClusterMetrics {
    pub fn from_snapshots(snapshots: &[AgentSnapshot]) -> Self {
        if snapshots.is_empty() {
            return Self {
                avg_cpu_percent: 0.0,
                avg_tasks_per_agent: 0.0,
            };
        }
        let n = snapshots.len() as f64;
        let total_cpu: f64 = snapshots.iter().map(|s| s.cpu_percent).sum();
        let total_tasks: f64 = snapshots.iter().map(|s| f64::from(s.in_flight_tasks)).sum();
        Self {
            avg_cpu_percent: total_cpu / n,
            avg_tasks_per_agent: total_tasks / n,
        }
    }
}

/// Samples load for a set of agents. Implementations may hit the metrics
/// API, a custom exporter, or (in tests) return canned data.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self, agent_names: &[String]) -> Result<Vec<AgentSnapshot>, MetricsError>;
}

/// Default implementation: reads pod CPU usage from the Kubernetes
/// `metrics.k8s.io` aggregated API. In-flight task counts come from the
/// agent reconciler's own status copy (§4.3), not from this source.
pub struct PodMetricsSource {
    pub namespace: String,
}

#[async_trait]
impl MetricsSource for PodMetricsSource {
    async fn sample(&self, agent_names: &[String]) -> Result<Vec<AgentSnapshot>, MetricsError> {
        // Real deployments wire this to `kube::Api<PodMetrics>` against
        // `metrics.k8s.io/v1beta1`. Left unimplemented here: the operator's
        // reconcilers depend only on the `MetricsSource` trait, never on
        // this concrete type, so substituting a real client is a one-line
        // change at the wiring site in `crate::manager`.
        let _ = &self.namespace;
        Err(MetricsError::Unavailable(format!(
            "no metrics backend wired for {} agents",
            agent_names.len()
        )))
    }
}

/// Test double returning a fixed snapshot set, keyed by agent name.
#[derive(Default, Clone)]
pub struct StaticMetricsSource {
    pub snapshots: HashMap<String, AgentSnapshot>,
}

impl StaticMetricsSource {
    pub fn new(snapshots: Vec<AgentSnapshot>) -> Self {
        Self {
            snapshots: snapshots.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn sample(&self, agent_names: &[String]) -> Result<Vec<AgentSnapshot>, MetricsError> {
        agent_names
            .iter()
            .map(|name| {
                self.snapshots
                    .get(name)
                    .cloned()
                    .ok_or_else(|| MetricsError::MissingSample(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_zero_for_empty_snapshots() {
        let m = ClusterMetrics::from_snapshots(&[]);
        assert_eq!(m.avg_cpu_percent, 0.0);
        assert_eq!(m.avg_tasks_per_agent, 0.0);
    }

    #[test]
    fn averages_across_snapshots() {
        let snapshots = vec![
            AgentSnapshot {
                name: "a".into(),
                cpu_percent: 80.0,
                in_flight_tasks: 2,
                custom: HashMap::new(),
            },
            AgentSnapshot {
                name: "b".into(),
                cpu_percent: 40.0,
                in_flight_tasks: 0,
                custom: HashMap::new(),
            },
        ];
        let m = ClusterMetrics::from_snapshots(&snapshots);
        assert!((m.avg_cpu_percent - 60.0).abs() < f64::EPSILON);
        assert!((m.avg_tasks_per_agent - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn static_source_errors_on_missing_agent() {
        let source = StaticMetricsSource::new(vec![]);
        let err = source.sample(&["ghost".to_string()]).await.unwrap_err();
        assert!(matches!(err, MetricsError::MissingSample(_)));
    }
}
