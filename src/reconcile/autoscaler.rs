//! Autoscaling evaluation (spec.md §4.4.2).
//!
//! `evaluate` is the pure decision function: one step at a time (never more
//! than one agent per decision, per P7), gated by a stabilization window
//! (P8). Victim/type selection for a chosen scale direction lives alongside
//! it so the whole evaluate-then-select path is unit testable without a
//! cluster.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::{AgentPhase, AgentType, AutoscalingConfig, Strategy};
use crate::metrics_source::ClusterMetrics;
use crate::reconcile::selection::select_agent_type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleUp,
    ScaleDown,
    None,
}

/// A minimal view of a live agent the autoscaler needs for victim/type
/// selection. Distinct from `crate::topology::TopologyAgent` because the
/// autoscaler additionally needs phase, in-flight count, and age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub name: String,
    pub agent_type: AgentType,
    pub phase: AgentPhase,
    pub in_flight_tasks: u32,
    pub created_at: DateTime<Utc>,
}

/// §4.4.2 steps 1-4: decide whether to scale up, down, or hold.
pub fn evaluate(
    metrics: ClusterMetrics,
    current: usize,
    min_agents: usize,
    max_agents: usize,
    config: &AutoscalingConfig,
    last_scale_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ScaleDecision {
    if !config.enabled {
        return ScaleDecision::None;
    }
    let stabilized = last_scale_time.map_or(true, |last| {
        now - last > Duration::seconds(config.stabilization_window_secs)
    });
    if !stabilized {
        return ScaleDecision::None;
    }

    if metrics.avg_cpu_percent > config.scale_up_threshold && current < max_agents {
        return ScaleDecision::ScaleUp;
    }
    if metrics.avg_cpu_percent < config.scale_down_threshold
        && metrics.avg_tasks_per_agent < 1.0
        && current > min_agents
    {
        return ScaleDecision::ScaleDown;
    }
    ScaleDecision::None
}

fn type_counts(population: &[AgentRecord]) -> HashMap<AgentType, usize> {
    let mut counts = HashMap::new();
    for agent in population {
        *counts.entry(agent.agent_type).or_insert(0) += 1;
    }
    counts
}

/// §4.4.2 step 5 (up-scale direction): pick the type most underrepresented
/// relative to the declared ratio; falls back to §4.4.1 selection when no
/// ratio map is configured.
pub fn select_scale_up_type(
    population: &[AgentRecord],
    type_ratios: &HashMap<String, f64>,
    strategy: Strategy,
) -> AgentType {
    if type_ratios.is_empty() {
        return select_agent_type(strategy, population.len());
    }
    let counts = type_counts(population);
    let total = population.len() as f64 + 1.0;

    let mut best: Option<(AgentType, f64)> = None;
    for (type_str, ratio) in type_ratios {
        let Some(agent_type) = AgentType::from_str(type_str) else {
            continue;
        };
        let actual = *counts.get(&agent_type).unwrap_or(&0) as f64;
        let desired = ratio * total;
        let deficit = desired - actual;
        if best.map_or(true, |(_, best_deficit)| deficit > best_deficit) {
            best = Some((agent_type, deficit));
        }
    }
    best.map_or_else(|| select_agent_type(strategy, population.len()), |(t, _)| t)
}

/// §4.4 "Scaling" phase (down direction): only `Ready`-with-zero-in-flight
/// agents are eligible; over-represented types (relative to the declared
/// ratio) are preferred victims; ties broken by oldest creation timestamp.
pub fn select_scale_down_victim<'a>(
    population: &'a [AgentRecord],
    type_ratios: &HashMap<String, f64>,
) -> Option<&'a AgentRecord> {
    let candidates: Vec<&AgentRecord> = population
        .iter()
        .filter(|a| a.phase.is_scale_down_candidate() && a.in_flight_tasks == 0)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    if type_ratios.is_empty() {
        return candidates.into_iter().min_by_key(|a| a.created_at);
    }

    let counts = type_counts(population);
    let total = population.len() as f64;

    let victim_type = candidates
        .iter()
        .map(|a| a.agent_type)
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .max_by(|a, b| {
            let score = |t: &AgentType| {
                let actual = *counts.get(t).unwrap_or(&0) as f64;
                let ratio = type_ratios.get(t.as_str()).copied().unwrap_or(0.0);
                actual - ratio * total
            };
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

    candidates
        .into_iter()
        .filter(|a| a.agent_type == victim_type)
        .min_by_key(|a| a.created_at)
}
