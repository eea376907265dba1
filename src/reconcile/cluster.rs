//! Cluster reconciler (C4, spec.md §4.4) — the phase state machine that owns
//! child `SwarmAgent` convergence, topology recompute, and autoscaling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{DeleteParams, ListParams, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::{Api, ResourceExt};

use crate::conditions::ConditionStatus;
use crate::crd::agent::SwarmAgentSpec;
use crate::crd::cluster::{SwarmCluster, SwarmClusterStatus, TopologyDescriptor};
use crate::crd::agent::SwarmAgent;
use crate::crd::qualified_key;
use crate::domain::error::ReconcileError;
use crate::domain::models::{AgentPhase, ClusterHealth, ClusterPhase};
use crate::manager::ReconcilerContext;
use crate::metrics_source::ClusterMetrics;
use crate::reconcile::autoscaler::{self, AgentRecord, ScaleDecision};
use crate::reconcile::selection::{select_agent_type, select_cognitive_pattern};
use crate::topology::{self, TopologyAgent};

const FIELD_MANAGER: &str = "swarm-operator";
const PENDING_SCALE_ANNOTATION: &str = "swarmops.io/pending-scale";

fn finalizer_id() -> String {
    crate::crd::finalizer_name("SwarmCluster")
}

fn owned_agent_list_params(cluster: &str) -> ListParams {
    ListParams::default().labels(&format!("{}={}", qualified_key("cluster"), cluster))
}

async fn list_owned_agents(
    ctx: &ReconcilerContext,
    namespace: &str,
    cluster: &str,
) -> Result<Vec<SwarmAgent>, ReconcileError> {
    let agents: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
    let list = agents.list(&owned_agent_list_params(cluster)).await?;
    Ok(list.items)
}

fn agent_name(cluster: &str, index: usize) -> String {
    format!("{cluster}-agent-{index}")
}

/// Lowest index whose derived name isn't already taken by an existing agent.
/// Agent indices aren't reused as a contiguous `0..len` range once a
/// scale-down has removed one from the middle, so the next scale-up can't
/// just reuse `existing.len()` — that collides with a surviving higher index.
fn next_available_index(cluster: &str, existing: &[SwarmAgent]) -> usize {
    let taken: std::collections::HashSet<String> = existing.iter().map(ResourceExt::name_any).collect();
    (0..)
        .find(|index| !taken.contains(&agent_name(cluster, *index)))
        .expect("an unbounded range always yields a free index")
}

fn build_agent(cluster: &SwarmCluster, index: usize) -> SwarmAgent {
    let name = cluster.name_any();
    let agent_type = select_agent_type(cluster.spec.strategy, index);
    let pattern = select_cognitive_pattern(&cluster.spec.agent_template, index);

    let mut labels = BTreeMap::new();
    labels.insert(qualified_key("cluster"), name.clone());
    labels.insert(qualified_key("agent-type"), agent_type.as_str().to_string());
    labels.insert(qualified_key("topology"), cluster.spec.topology.as_str().to_string());

    SwarmAgent {
        metadata: ObjectMeta {
            name: Some(agent_name(&name, index)),
            namespace: cluster.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![cluster
                .controller_owner_ref(&())
                .expect("cluster has no uid")]),
            ..Default::default()
        },
        spec: SwarmAgentSpec {
            agent_type,
            cluster_ref: name,
            cognitive_pattern: pattern,
            capabilities: Vec::new(),
            communication: Default::default(),
            resources: cluster.spec.agent_template.resources.clone(),
            neural_model: None,
        },
        status: None,
    }
}

/// `max(minAgents, 1)` per §4.4 "Initializing": the cluster always converges
/// on at least one agent even if `minAgents` is declared as 0.
fn initial_desired_count(cluster: &SwarmCluster) -> usize {
    cluster.spec.min_agents.max(1) as usize
}

async fn ensure_finalizer(
    ctx: &ReconcilerContext,
    namespace: &str,
    cluster: &SwarmCluster,
) -> Result<(), ReconcileError> {
    let finalizer = finalizer_id();
    if cluster.finalizers().iter().any(|f| f == &finalizer) {
        return Ok(());
    }
    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let mut finalizers = cluster.finalizers().to_vec();
    finalizers.push(finalizer);
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    clusters
        .patch(&cluster.name_any(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn remove_finalizer(
    ctx: &ReconcilerContext,
    namespace: &str,
    cluster: &SwarmCluster,
) -> Result<(), ReconcileError> {
    let finalizer = finalizer_id();
    let remaining: Vec<String> = cluster.finalizers().iter().filter(|f| *f != &finalizer).cloned().collect();
    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
    clusters
        .patch(&cluster.name_any(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn patch_status(
    ctx: &ReconcilerContext,
    namespace: &str,
    name: &str,
    status: &SwarmClusterStatus,
) -> Result<(), ReconcileError> {
    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    clusters
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn emit_event(
    ctx: &ReconcilerContext,
    cluster: &SwarmCluster,
    event_type: EventType,
    reason: &str,
    note: String,
) {
    let recorder = ctx.recorder(cluster);
    let _ = recorder
        .publish(&Event {
            type_: event_type,
            reason: reason.to_string(),
            note: Some(note),
            action: reason.to_string(),
            secondary: None,
        })
        .await;
}

async fn delete_cascade(
    ctx: &ReconcilerContext,
    namespace: &str,
    cluster_name: &str,
) -> Result<usize, ReconcileError> {
    let owned = list_owned_agents(ctx, namespace, cluster_name).await?;
    let agents: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
    for agent in &owned {
        let _ = agents.delete(&agent.name_any(), &DeleteParams::default()).await;
    }
    Ok(owned.len())
}

async fn reconcile_deleting(
    cluster: Arc<SwarmCluster>,
    ctx: &ReconcilerContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let remaining = delete_cascade(ctx, namespace, &name).await?;
    if remaining == 0 {
        remove_finalizer(ctx, namespace, &cluster).await?;
        emit_event(ctx, &cluster, EventType::Normal, "Finalized", "all owned agents removed".to_string()).await;
        return Ok(Action::await_change());
    }
    Ok(Action::requeue(Duration::from_secs(2)))
}

fn desired_replica_agents(cluster: &SwarmCluster, count: usize) -> Vec<SwarmAgent> {
    (0..count).map(|i| build_agent(cluster, i)).collect()
}

async fn reconcile_initializing(
    cluster: Arc<SwarmCluster>,
    ctx: &ReconcilerContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let existing = list_owned_agents(ctx, namespace, &name).await?;
    let desired_count = initial_desired_count(&cluster);

    if existing.len() < desired_count {
        let agents: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
        for candidate in desired_replica_agents(&cluster, desired_count) {
            if !existing.iter().any(|a| a.name_any() == candidate.name_any()) {
                agents.create(&Default::default(), &candidate).await?;
            }
        }
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    let all_ready = existing
        .iter()
        .all(|a| a.status.as_ref().map(|s| s.phase) == Some(AgentPhase::Ready));

    if !all_ready {
        return Ok(Action::requeue(Duration::from_secs(5)));
    }

    push_topology(ctx, namespace, &cluster, &existing).await?;

    let mut status = cluster.status.clone().unwrap_or_default();
    status.phase = ClusterPhase::Running;
    status.conditions.set(
        "Ready",
        ConditionStatus::True,
        "Initialized",
        "all agents ready and topology converged",
        Utc::now(),
    );
    status.conditions.set(
        "Progressing",
        ConditionStatus::False,
        "Initialized",
        "initialization complete",
        Utc::now(),
    );
    status.observed_generation = cluster.meta().generation.unwrap_or(0);
    patch_status(ctx, namespace, &name, &status).await?;
    emit_event(ctx, &cluster, EventType::Normal, "Ready", "cluster converged to Running".to_string()).await;

    Ok(Action::requeue(Duration::from_secs(10)))
}

async fn push_topology(
    ctx: &ReconcilerContext,
    namespace: &str,
    cluster: &SwarmCluster,
    agents: &[SwarmAgent],
) -> Result<(), ReconcileError> {
    let topology_agents: Vec<TopologyAgent> = agents
        .iter()
        .map(|a| TopologyAgent::new(a.name_any(), a.spec.agent_type))
        .collect();
    let peers = topology::compute_peers(&topology_agents, cluster.spec.topology);

    let agents_api: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
    for agent in agents {
        let Some(peer_list) = peers.get(&agent.name_any()) else {
            continue;
        };
        let patch = serde_json::json!({
            "spec": { "communication": { "peers": peer_list } }
        });
        agents_api
            .patch(&agent.name_any(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
    }
    Ok(())
}

fn aggregate_status(cluster: &SwarmCluster, agents: &[SwarmAgent]) -> SwarmClusterStatus {
    let mut status = cluster.status.clone().unwrap_or_default();
    let mut by_type: BTreeMap<String, u32> = BTreeMap::new();
    let mut ready = 0u32;
    let mut active = 0u32;
    let mut total = 0u32;

    for agent in agents {
        let phase = agent.status.as_ref().map(|s| s.phase).unwrap_or_default();
        if !phase.counts_toward_population() {
            continue;
        }
        total += 1;
        *by_type.entry(agent.spec.agent_type.as_str().to_string()).or_insert(0) += 1;
        match phase {
            AgentPhase::Ready => ready += 1,
            AgentPhase::Busy => {
                ready += 1;
                active += 1;
            }
            _ => {}
        }
    }

    status.ready_agents = ready;
    status.active_agents = active;
    status.total_agents = total;
    status.agents_by_type = by_type;
    status.topology = TopologyDescriptor {
        kind: Some(cluster.spec.topology),
        connections: connection_count(agents.len(), cluster.spec.topology),
        avg_latency_ms: status.topology.avg_latency_ms,
    };
    status
}

fn connection_count(n: usize, topology: crate::domain::models::TopologyKind) -> u32 {
    use crate::domain::models::TopologyKind as T;
    let n = n as u32;
    match topology {
        T::Mesh => n.saturating_sub(1).saturating_mul(n) / 2,
        T::Ring => n,
        T::Star => n.saturating_sub(1),
        T::Hierarchical => n.saturating_sub(1),
    }
}

async fn reconcile_running(
    cluster: Arc<SwarmCluster>,
    ctx: &ReconcilerContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let existing = list_owned_agents(ctx, namespace, &name).await?;
    let mut status = aggregate_status(&cluster, &existing);

    if status.ready_agents < cluster.spec.min_agents {
        status.health = ClusterHealth::Degraded;
        status.conditions.set(
            "Degraded",
            ConditionStatus::True,
            "InsufficientAgents",
            &format!("{} ready, {} required", status.ready_agents, cluster.spec.min_agents),
            Utc::now(),
        );
        emit_event(
            ctx,
            &cluster,
            EventType::Warning,
            "InsufficientAgents",
            "ready agent count below minAgents".to_string(),
        )
        .await;
    } else {
        status.health = ClusterHealth::Healthy;
        status.conditions.set("Degraded", ConditionStatus::False, "Nominal", "agent count nominal", Utc::now());
    }

    let mut next_phase = ClusterPhase::Running;
    if cluster.spec.autoscaling.enabled {
        let agent_names: Vec<String> = existing.iter().map(|a| a.name_any()).collect();
        let metrics = match ctx.metrics_source.sample(&agent_names).await {
            Ok(snapshots) => ClusterMetrics::from_snapshots(&snapshots),
            Err(error) => {
                tracing::debug!(%error, "metrics source unavailable, skipping autoscale this tick");
                ClusterMetrics { avg_cpu_percent: 0.0, avg_tasks_per_agent: 0.0 }
            }
        };
        let decision = autoscaler::evaluate(
            metrics,
            existing.len(),
            cluster.spec.min_agents as usize,
            cluster.spec.max_agents as usize,
            &cluster.spec.autoscaling,
            status.last_scale_time,
            Utc::now(),
        );
        if decision != ScaleDecision::None {
            next_phase = ClusterPhase::Scaling;
            status.last_scale_time = Some(Utc::now());
            mark_pending_scale(ctx, namespace, &name, decision).await?;
        }
    }

    status.phase = next_phase;
    status.observed_generation = cluster.meta().generation.unwrap_or(0);
    patch_status(ctx, namespace, &name, &status).await?;

    let requeue = if next_phase == ClusterPhase::Scaling {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(30)
    };
    Ok(Action::requeue(requeue))
}

async fn mark_pending_scale(
    ctx: &ReconcilerContext,
    namespace: &str,
    name: &str,
    decision: ScaleDecision,
) -> Result<(), ReconcileError> {
    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let value = match decision {
        ScaleDecision::ScaleUp => "up",
        ScaleDecision::ScaleDown => "down",
        ScaleDecision::None => return Ok(()),
    };
    let patch = serde_json::json!({ "metadata": { "annotations": { PENDING_SCALE_ANNOTATION: value } } });
    clusters
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

fn to_agent_records(agents: &[SwarmAgent]) -> Vec<AgentRecord> {
    agents
        .iter()
        .map(|a| AgentRecord {
            name: a.name_any(),
            agent_type: a.spec.agent_type,
            phase: a.status.as_ref().map(|s| s.phase).unwrap_or_default(),
            in_flight_tasks: a.status.as_ref().map(|s| s.counters.in_flight_tasks).unwrap_or(0),
            created_at: a.creation_timestamp().map(|t| t.0).unwrap_or_else(Utc::now),
        })
        .collect()
}

async fn reconcile_scaling(
    cluster: Arc<SwarmCluster>,
    ctx: &ReconcilerContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let existing = list_owned_agents(ctx, namespace, &name).await?;
    let pending = cluster
        .annotations()
        .get(PENDING_SCALE_ANNOTATION)
        .cloned()
        .unwrap_or_default();

    let agents_api: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
    let records = to_agent_records(&existing);

    match pending.as_str() {
        "up" => {
            let agent_type = autoscaler::select_scale_up_type(
                &records,
                &cluster.spec.autoscaling.type_ratios,
                cluster.spec.strategy,
            );
            let index = next_available_index(&name, &existing);
            let mut new_agent = build_agent(&cluster, index);
            new_agent.spec.agent_type = agent_type;
            agents_api.create(&Default::default(), &new_agent).await?;
            emit_event(ctx, &cluster, EventType::Normal, "Scaling", format!("added agent {}", new_agent.name_any())).await;
        }
        "down" => {
            if let Some(victim) = autoscaler::select_scale_down_victim(&records, &cluster.spec.autoscaling.type_ratios) {
                agents_api.delete(&victim.name, &DeleteParams::default()).await?;
                emit_event(ctx, &cluster, EventType::Normal, "Scaling", format!("removed agent {}", victim.name)).await;
            }
        }
        _ => {}
    }

    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    let clear_annotation = serde_json::json!({ "metadata": { "annotations": { PENDING_SCALE_ANNOTATION: serde_json::Value::Null } } });
    clusters
        .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(clear_annotation))
        .await?;

    let existing_after = list_owned_agents(ctx, namespace, &name).await?;
    let mut status = aggregate_status(&cluster, &existing_after);
    status.phase = ClusterPhase::Running;
    status.last_scale_time = cluster.status.as_ref().and_then(|s| s.last_scale_time);
    status.observed_generation = cluster.meta().generation.unwrap_or(0);
    patch_status(ctx, namespace, &name, &status).await?;
    emit_event(ctx, &cluster, EventType::Normal, "ScalingComplete", "scaling step complete".to_string()).await;

    Ok(Action::requeue(Duration::from_secs(10)))
}

async fn reconcile_failed(
    cluster: Arc<SwarmCluster>,
    ctx: &ReconcilerContext,
    namespace: &str,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let mut status = cluster.status.clone().unwrap_or_default();
    status.phase = ClusterPhase::Initializing;
    status.conditions.set("Progressing", ConditionStatus::True, "Recovery", "retrying initialization", Utc::now());
    patch_status(ctx, namespace, &name, &status).await?;
    emit_event(ctx, &cluster, EventType::Normal, "Recovery", "attempting recovery from Failed".to_string()).await;
    Ok(Action::requeue(Duration::from_secs(5)))
}

async fn reconcile_inner(cluster: Arc<SwarmCluster>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let namespace = cluster
        .namespace()
        .ok_or_else(|| ReconcileError::Configuration("SwarmCluster must be namespaced".to_string()))?;
    let name = cluster.name_any();

    if cluster.meta().deletion_timestamp.is_some() {
        return reconcile_deleting(cluster, &ctx, &namespace).await;
    }

    ensure_finalizer(&ctx, &namespace, &cluster).await?;

    let phase = cluster.status.as_ref().map(|s| s.phase).unwrap_or_default();
    if cluster.status.is_none() {
        let mut status = SwarmClusterStatus::default();
        status.phase = ClusterPhase::Pending;
        status.conditions.set("Progressing", ConditionStatus::True, "Initializing", "cluster created", Utc::now());
        patch_status(&ctx, &namespace, &name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    match phase {
        ClusterPhase::Pending => {
            let mut status = cluster.status.clone().unwrap_or_default();
            status.phase = ClusterPhase::Initializing;
            status.conditions.set("Progressing", ConditionStatus::True, "Initializing", "provisioning agents", Utc::now());
            patch_status(&ctx, &namespace, &name, &status).await?;
            emit_event(&ctx, &cluster, EventType::Normal, "Initializing", "beginning agent provisioning".to_string()).await;
            Ok(Action::requeue(Duration::from_millis(100)))
        }
        ClusterPhase::Initializing => reconcile_initializing(cluster, &ctx, &namespace).await,
        ClusterPhase::Running => reconcile_running(cluster, &ctx, &namespace).await,
        ClusterPhase::Scaling => reconcile_scaling(cluster, &ctx, &namespace).await,
        ClusterPhase::Failed => reconcile_failed(cluster, &ctx, &namespace).await,
        ClusterPhase::Terminating => Ok(Action::requeue(Duration::from_secs(5))),
    }
}

#[tracing::instrument(skip_all, fields(name = %cluster.name_any(), namespace = cluster.namespace()))]
pub async fn reconcile(cluster: Arc<SwarmCluster>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let started = std::time::Instant::now();
    let result = reconcile_inner(cluster, ctx.clone()).await;
    ctx.record_reconcile("cluster", started.elapsed(), &result);
    result
}

pub fn on_error(cluster: Arc<SwarmCluster>, error: &ReconcileError, _ctx: Arc<ReconcilerContext>) -> Action {
    tracing::warn!(name = %cluster.name_any(), %error, "cluster reconcile failed");
    Action::requeue(super::ERROR_REQUEUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TopologyKind;

    #[test]
    fn connection_count_matches_topology_shape() {
        assert_eq!(connection_count(4, TopologyKind::Mesh), 6);
        assert_eq!(connection_count(4, TopologyKind::Ring), 4);
        assert_eq!(connection_count(4, TopologyKind::Star), 3);
        assert_eq!(connection_count(0, TopologyKind::Mesh), 0);
    }

    #[test]
    fn initial_desired_count_is_at_least_one() {
        let cluster = SwarmCluster::new(
            "test",
            crate::crd::cluster::SwarmClusterSpec {
                topology: TopologyKind::Mesh,
                queen_mode: Default::default(),
                strategy: Default::default(),
                consensus_threshold: None,
                min_agents: 0,
                max_agents: 3,
                autoscaling: Default::default(),
                agent_template: Default::default(),
                credential_provider: None,
                namespace_placement: Default::default(),
            },
        );
        assert_eq!(initial_desired_count(&cluster), 1);
    }

    fn named_agent(name: &str) -> SwarmAgent {
        SwarmAgent {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: SwarmAgentSpec {
                agent_type: Default::default(),
                cluster_ref: "demo".to_string(),
                cognitive_pattern: Default::default(),
                capabilities: Vec::new(),
                communication: Default::default(),
                resources: Default::default(),
                neural_model: None,
            },
            status: None,
        }
    }

    #[test]
    fn next_available_index_fills_a_gap_left_by_scale_down() {
        let existing = vec![named_agent("demo-agent-1"), named_agent("demo-agent-2")];
        assert_eq!(next_available_index("demo", &existing), 0);
    }

    #[test]
    fn next_available_index_is_contiguous_with_no_gaps() {
        let existing = vec![named_agent("demo-agent-0"), named_agent("demo-agent-1")];
        assert_eq!(next_available_index("demo", &existing), 2);
    }

    #[test]
    fn next_available_index_with_no_agents_is_zero() {
        assert_eq!(next_available_index("demo", &[]), 0);
    }

    #[test]
    fn agent_name_is_stable_for_the_same_index() {
        assert_eq!(agent_name("demo", 2), agent_name("demo", 2));
        assert_ne!(agent_name("demo", 1), agent_name("demo", 2));
    }
}
