//! The topology engine (C1, spec.md §4.1).
//!
//! `compute_peers` is a pure function: no I/O, no randomness, deterministic
//! given the same agent set and topology kind. It cannot fail — callers that
//! see it panic have found a bug, not a runtime condition to handle.

use std::collections::BTreeMap;

use crate::domain::models::{AgentType, TopologyKind};

/// Minimal view of an agent the topology engine needs: its name (for stable
/// ordering) and, for star's tie-break, its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyAgent {
    pub name: String,
    pub agent_type: AgentType,
}

impl TopologyAgent {
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            name: name.into(),
            agent_type,
        }
    }
}

/// `computePeers(agents, topology) -> map<agentName, ordered list<agentName>>`.
///
/// Input order is irrelevant: agents are normalized by sorting names
/// lexicographically before any topology-specific rule runs, so the output
/// is stable across reconciles and independent of list/watch ordering (P4).
pub fn compute_peers(
    agents: &[TopologyAgent],
    topology: TopologyKind,
) -> BTreeMap<String, Vec<String>> {
    let mut sorted: Vec<&TopologyAgent> = agents.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted.dedup_by(|a, b| a.name == b.name);

    match topology {
        TopologyKind::Mesh => mesh(&sorted),
        TopologyKind::Ring => ring(&sorted),
        TopologyKind::Star => star(&sorted),
        TopologyKind::Hierarchical => hierarchical(&sorted),
    }
}

fn mesh(sorted: &[&TopologyAgent]) -> BTreeMap<String, Vec<String>> {
    let names: Vec<String> = sorted.iter().map(|a| a.name.clone()).collect();
    sorted
        .iter()
        .map(|a| {
            let peers = names.iter().filter(|n| **n != a.name).cloned().collect();
            (a.name.clone(), peers)
        })
        .collect()
}

fn ring(sorted: &[&TopologyAgent]) -> BTreeMap<String, Vec<String>> {
    let n = sorted.len();
    let mut out = BTreeMap::new();
    if n == 0 {
        return out;
    }
    if n == 1 {
        out.insert(sorted[0].name.clone(), Vec::new());
        return out;
    }
    if n == 2 {
        out.insert(sorted[0].name.clone(), vec![sorted[1].name.clone()]);
        out.insert(sorted[1].name.clone(), vec![sorted[0].name.clone()]);
        return out;
    }
    for (i, agent) in sorted.iter().enumerate() {
        let prev = sorted[(i + n - 1) % n].name.clone();
        let next = sorted[(i + 1) % n].name.clone();
        out.insert(agent.name.clone(), vec![prev, next]);
    }
    out
}

/// Hub selection: prefer a `coordinator`; among coordinators (or in their
/// absence, among all agents), the lexicographically first name.
fn star_hub<'a>(sorted: &[&'a TopologyAgent]) -> Option<&'a TopologyAgent> {
    sorted
        .iter()
        .filter(|a| a.agent_type == AgentType::Coordinator)
        .min_by(|a, b| a.name.cmp(&b.name))
        .or_else(|| sorted.iter().min_by(|a, b| a.name.cmp(&b.name)))
        .copied()
}

fn star(sorted: &[&TopologyAgent]) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    let Some(hub) = star_hub(sorted) else {
        return out;
    };
    let others: Vec<String> = sorted
        .iter()
        .filter(|a| a.name != hub.name)
        .map(|a| a.name.clone())
        .collect();
    out.insert(hub.name.clone(), others.clone());
    for other in &others {
        out.insert(other.clone(), vec![hub.name.clone()]);
    }
    out
}

fn hierarchical(sorted: &[&TopologyAgent]) -> BTreeMap<String, Vec<String>> {
    let n = sorted.len();
    let mut out = BTreeMap::new();
    for i in 0..n {
        let mut peers = Vec::new();
        if i > 0 {
            let parent = (i - 1) / 2;
            peers.push(sorted[parent].name.clone());
        }
        let left = 2 * i + 1;
        let right = 2 * i + 2;
        if left < n {
            peers.push(sorted[left].name.clone());
        }
        if right < n {
            peers.push(sorted[right].name.clone());
        }
        out.insert(sorted[i].name.clone(), peers);
    }
    out
}
