//! Agent reconciler (C3, spec.md §4.3).
//!
//! Materializes a `SwarmAgent` record into one Deployment replica — the
//! agent *is* the unit, horizontal scaling happens at the cluster layer by
//! adding/removing `SwarmAgent` records, never by touching `replicas` here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::{Api, ResourceExt};

use crate::crd::agent::{SwarmAgent, SwarmAgentStatus};
use crate::crd::qualified_key;
use crate::domain::error::ReconcileError;
use crate::domain::models::AgentPhase;
use crate::manager::ReconcilerContext;

const FIELD_MANAGER: &str = "swarm-operator";

fn finalizer_id() -> String {
    crate::crd::finalizer_name("SwarmAgent")
}

/// Resource limits/requests map as Kubernetes expects them, built from the
/// domain-level `ResourceSpec` (which is just optional quantity strings).
fn resource_requirements(spec: &crate::domain::models::ResourceSpec) -> ResourceRequirements {
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();
    if let Some(v) = &spec.cpu_request {
        requests.insert("cpu".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &spec.memory_request {
        requests.insert("memory".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &spec.cpu_limit {
        limits.insert("cpu".to_string(), Quantity(v.clone()));
    }
    if let Some(v) = &spec.memory_limit {
        limits.insert("memory".to_string(), Quantity(v.clone()));
    }

    ResourceRequirements {
        requests: (!requests.is_empty()).then_some(requests),
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    }
}

/// Labels written by the controller on every agent workload (§6).
pub fn labels(agent: &SwarmAgent, topology: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(qualified_key("cluster"), agent.spec.cluster_ref.clone());
    labels.insert(qualified_key("agent-type"), agent.spec.agent_type.as_str().to_string());
    labels.insert(qualified_key("topology"), topology.to_string());
    labels.insert(qualified_key("managed"), "true".to_string());
    labels
}

/// Environment injected into the agent workload (§4.3): cognitive pattern,
/// parent cluster, and the peer list serialized as a comma-separated string.
fn env_vars(agent: &SwarmAgent) -> Vec<EnvVar> {
    let peers = agent.spec.communication.peers.join(",");
    vec![
        EnvVar {
            name: "COGNITIVE_PATTERN".to_string(),
            value: Some(agent.spec.cognitive_pattern.as_str().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "SWARM_CLUSTER".to_string(),
            value: Some(agent.spec.cluster_ref.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "SWARM_AGENT_TYPE".to_string(),
            value: Some(agent.spec.agent_type.as_str().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "SWARM_PEERS".to_string(),
            value: Some(peers),
            ..Default::default()
        },
    ]
}

/// Builds the one-replica Deployment representing this agent (§4.3).
///
/// Peer-list changes only touch `spec.template.metadata.annotations` and the
/// `SWARM_PEERS` env value — no replica-count mutation, since scaling lives
/// at the cluster layer (§4.3 "Key decisions").
pub fn desired_deployment(agent: &SwarmAgent, image: &str, topology: &str) -> Deployment {
    let name = agent.name_any();
    let namespace = agent.namespace();
    let mut selector_labels = BTreeMap::new();
    selector_labels.insert("swarmops.io/agent".to_string(), name.clone());
    let mut pod_labels = labels(agent, topology);
    pod_labels.extend(selector_labels.clone());

    let container = Container {
        name: "agent".to_string(),
        image: Some(image.to_string()),
        env: Some(env_vars(agent)),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(agent.spec.communication.port),
            name: Some(agent.spec.communication.protocol.clone()),
            ..Default::default()
        }]),
        resources: Some(resource_requirements(&agent.spec.resources)),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace,
            labels: Some(labels(agent, topology)),
            owner_references: Some(vec![agent.controller_owner_ref(&()).expect("agent has no uid")]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Derives the agent phase from a Deployment's observed status (§4.3 state
/// machine). `in_flight` is the last self-reported in-flight task count,
/// already resident on `status.counters` — not recomputed here.
pub fn phase_from_deployment(deployment: &Deployment, in_flight: u32, previous: AgentPhase) -> AgentPhase {
    if previous == AgentPhase::Terminating || previous == AgentPhase::Failed {
        return previous;
    }
    let status = match &deployment.status {
        Some(s) => s,
        None => return AgentPhase::Initializing,
    };
    let ready = status.ready_replicas.unwrap_or(0);
    if ready < 1 {
        return AgentPhase::Initializing;
    }
    if in_flight > 0 {
        AgentPhase::Busy
    } else {
        AgentPhase::Ready
    }
}

async fn reconcile_inner(agent: Arc<SwarmAgent>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let namespace = agent.namespace().ok_or_else(|| {
        ReconcileError::Configuration("SwarmAgent must be namespaced".to_string())
    })?;
    let agents: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), &namespace);

    let finalizer_id = finalizer_id();
    finalizer(&agents, &finalizer_id, agent, |event| async {
        match event {
            FinalizerEvent::Apply(agent) => apply(agent, &ctx, &namespace).await,
            FinalizerEvent::Cleanup(agent) => cleanup(agent, &ctx, &namespace).await,
        }
    })
    .await
    .map_err(|e| ReconcileError::Finalizer(e.to_string()))
}

async fn apply(agent: Arc<SwarmAgent>, ctx: &ReconcilerContext, namespace: &str) -> Result<Action, ReconcileError> {
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    let name = agent.name_any();

    let image = ctx
        .cluster_agent_image(namespace, &agent.spec.cluster_ref)
        .await
        .unwrap_or_else(|| "ghcr.io/swarmops/agent:latest".to_string());
    let topology = ctx
        .cluster_topology(namespace, &agent.spec.cluster_ref)
        .await
        .unwrap_or_default();
    let desired = desired_deployment(&agent, &image, topology.as_str());

    deployments
        .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&desired))
        .await?;

    let deployment = deployments.get(&name).await?;
    let previous_phase = agent.status.as_ref().map(|s| s.phase).unwrap_or_default();
    let in_flight = agent.status.as_ref().map(|s| s.counters.in_flight_tasks).unwrap_or(0);
    let phase = phase_from_deployment(&deployment, in_flight, previous_phase);

    let mut status = agent.status.clone().unwrap_or_default();
    status.phase = phase;
    status.observed_generation = agent.meta().generation.unwrap_or(0);
    if phase == AgentPhase::Ready || phase == AgentPhase::Busy {
        status.last_heartbeat = Some(chrono::Utc::now());
    }
    patch_status(ctx, namespace, &name, status).await?;

    let requeue = match phase {
        AgentPhase::Ready | AgentPhase::Busy => Duration::from_secs(30),
        _ => Duration::from_secs(5),
    };
    Ok(Action::requeue(requeue))
}

async fn cleanup(agent: Arc<SwarmAgent>, ctx: &ReconcilerContext, namespace: &str) -> Result<Action, ReconcileError> {
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    let name = agent.name_any();
    let _ = deployments.delete(&name, &Default::default()).await;
    Ok(Action::await_change())
}

async fn patch_status(
    ctx: &ReconcilerContext,
    namespace: &str,
    name: &str,
    status: SwarmAgentStatus,
) -> Result<(), ReconcileError> {
    let agents: Api<SwarmAgent> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    agents
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

#[tracing::instrument(skip_all, fields(name = %agent.name_any(), namespace = agent.namespace()))]
pub async fn reconcile(agent: Arc<SwarmAgent>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let started = std::time::Instant::now();
    let result = reconcile_inner(agent, ctx.clone()).await;
    ctx.record_reconcile("agent", started.elapsed(), &result);
    result
}

pub fn on_error(agent: Arc<SwarmAgent>, error: &ReconcileError, _ctx: Arc<ReconcilerContext>) -> Action {
    tracing::warn!(name = %agent.name_any(), %error, "agent reconcile failed");
    Action::requeue(super::ERROR_REQUEUE)
}
