//! Task reconciler (C5, spec.md §4.5).
//!
//! Places a task's job in the right namespace, acquires/rotates scoped
//! credentials through the broker (§4.2), and rolls the job's observed
//! status back onto the task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Namespace, PodSpec, PodTemplateSpec, ResourceRequirements, Secret,
};
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::{Api, ResourceExt};

use crate::credentials::{CredentialBroker, HttpTokenExchange, MintedToken, ProviderConfig, SecretStore, StoredSecret};
use crate::crd::cluster::{CredentialProviderBinding, SwarmCluster};
use crate::crd::qualified_key;
use crate::crd::task::{SwarmTask, SwarmTaskStatus};
use crate::domain::error::ReconcileError;
use crate::domain::models::{RetryPolicy, TaskPhase};
use crate::manager::ReconcilerContext;

const FIELD_MANAGER: &str = "swarm-operator";

fn finalizer_id() -> String {
    crate::crd::finalizer_name("SwarmTask")
}

fn secret_name(task: &SwarmTask) -> String {
    format!("{}-github-token", task.name_any())
}

/// Persists credential secrets as native `Secret` objects, annotated per §6.
pub struct KubeSecretStore {
    client: kube::Client,
    namespace: String,
    owner: ObjectMeta,
}

impl KubeSecretStore {
    pub fn new(client: kube::Client, namespace: impl Into<String>, owner: ObjectMeta) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            owner,
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, crate::domain::error::CredentialError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let secret = match secrets.get_opt(name).await.map_err(|e| {
            crate::domain::error::CredentialError::ProviderError(e.to_string())
        })? {
            Some(s) => s,
            None => return Ok(None),
        };

        let material = secret
            .data
            .as_ref()
            .and_then(|d| d.get("token"))
            .map(|b| String::from_utf8_lossy(&b.0).to_string())
            .unwrap_or_default();
        let annotations = secret.annotations();
        let expires_at = annotations
            .get(&qualified_key("expires-at"))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let repositories = annotations
            .get(&qualified_key("repositories"))
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let rotated_at = annotations
            .get(&qualified_key("rotated-at"))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(StoredSecret {
            name: name.to_string(),
            material,
            repositories,
            expires_at,
            rotated_at,
        }))
    }

    async fn put(&self, secret: StoredSecret) -> Result<(), crate::domain::error::CredentialError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let mut annotations = BTreeMap::new();
        annotations.insert(qualified_key("expires-at"), secret.expires_at.to_rfc3339());
        annotations.insert(qualified_key("repositories"), secret.repositories.join(","));
        if let Some(rotated_at) = secret.rotated_at {
            annotations.insert(qualified_key("rotated-at"), rotated_at.to_rfc3339());
        }

        let mut data = BTreeMap::new();
        data.insert("token".to_string(), ByteString(secret.material.into_bytes()));

        let object = Secret {
            metadata: ObjectMeta {
                name: Some(secret.name.clone()),
                namespace: Some(self.namespace.clone()),
                annotations: Some(annotations),
                owner_references: self.owner.owner_references.clone(),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        secrets
            .patch(&secret.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&object))
            .await
            .map_err(crate::domain::error::CredentialError::Api)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), crate::domain::error::CredentialError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        match secrets.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(crate::domain::error::CredentialError::Api(e)),
        }
    }
}

fn target_namespace(cluster: &SwarmCluster, task: &SwarmTask, operator_namespace: &str) -> String {
    if let Some(ns) = &task.spec.namespace {
        return ns.clone();
    }
    let placement = &cluster.spec.namespace_placement;
    match task.spec.task_type.as_str() {
        "hivemind" | "consensus" => placement
            .hive_mind_namespace
            .clone()
            .unwrap_or_else(|| operator_namespace.to_string()),
        _ => placement
            .default_namespace
            .clone()
            .unwrap_or_else(|| operator_namespace.to_string()),
    }
}

async fn ensure_namespace(ctx: &ReconcilerContext, namespace: &str) -> Result<(), ReconcileError> {
    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    if namespaces.get_opt(namespace).await?.is_some() {
        return Ok(());
    }
    let mut labels = BTreeMap::new();
    labels.insert(qualified_key("managed"), "true".to_string());
    let object = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces.create(&PostParams::default(), &object).await?;
    Ok(())
}

async fn resolve_cluster(ctx: &ReconcilerContext, namespace: &str, cluster_ref: &str) -> Result<SwarmCluster, ReconcileError> {
    let clusters: Api<SwarmCluster> = Api::namespaced(ctx.client.clone(), namespace);
    clusters
        .get(cluster_ref)
        .await
        .map_err(|_| ReconcileError::ClusterNotFound(cluster_ref.to_string()))
}

async fn acquire_credential(
    ctx: &ReconcilerContext,
    task_namespace: &str,
    task: &SwarmTask,
    binding: &CredentialProviderBinding,
) -> Result<MintedToken, ReconcileError> {
    let secrets: Api<k8s_openapi::api::core::v1::Secret> = Api::namespaced(ctx.client.clone(), task_namespace);
    let key_secret = secrets
        .get(&binding.private_key_secret_name)
        .await
        .map_err(|e| ReconcileError::Configuration(format!("private key secret unreadable: {e}")))?;
    let private_key_pem = key_secret
        .data
        .as_ref()
        .and_then(|d| d.get(&binding.private_key_secret_key))
        .map(|b| b.0.clone())
        .ok_or_else(|| ReconcileError::Configuration("private key secret missing expected key".to_string()))?;

    let provider = ProviderConfig {
        app_id: binding.app_id.clone(),
        private_key_pem,
        token_exchange_url: binding.token_exchange_url.clone(),
    };
    let exchange = HttpTokenExchange::new(&binding.token_exchange_url);
    let store = KubeSecretStore::new(
        ctx.client.clone(),
        task_namespace,
        ObjectMeta {
            owner_references: Some(vec![task.controller_owner_ref(&()).expect("task has no uid")]),
            ..Default::default()
        },
    );
    let broker = CredentialBroker::new(exchange, store);
    let name = secret_name(task);
    let now = Utc::now();

    let needs_rotation = broker.is_expired(&name, now).await.map_err(ReconcileError::Credential)?;
    let minted = if needs_rotation {
        let minted = broker
            .mint(&provider, &task.spec.repositories, now)
            .await
            .map_err(ReconcileError::Credential)?;
        broker
            .store(&name, &minted, &task.spec.repositories, now)
            .await
            .map_err(ReconcileError::Credential)?;
        minted
    } else {
        let stored = broker.get(&name).await.map_err(ReconcileError::Credential)?;
        let stored = stored.expect("isExpired=false implies the secret exists");
        MintedToken {
            material: stored.material,
            expiry: stored.expires_at,
        }
    };
    Ok(minted)
}

fn env_vars(task: &SwarmTask, secret_name: Option<&str>) -> Vec<EnvVar> {
    let mut vars = vec![
        EnvVar {
            name: "SWARM_TASK_NAME".to_string(),
            value: Some(task.name_any()),
            ..Default::default()
        },
        EnvVar {
            name: "SWARM_CLUSTER".to_string(),
            value: Some(task.spec.cluster_ref.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "SWARM_TASK_TYPE".to_string(),
            value: Some(task.spec.task_type.clone()),
            ..Default::default()
        },
    ];
    for (key, value) in &task.spec.parameters {
        vars.push(EnvVar {
            name: format!("PARAM_{}", key.to_uppercase()),
            value: Some(value.clone()),
            ..Default::default()
        });
    }
    if let Some(secret) = secret_name {
        vars.push(EnvVar {
            name: "GITHUB_TOKEN".to_string(),
            value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                secret_key_ref: Some(k8s_openapi::api::core::v1::SecretKeySelector {
                    name: Some(secret.to_string()),
                    key: "token".to_string(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        vars.push(EnvVar {
            name: "GITHUB_REPOSITORIES".to_string(),
            value: Some(task.spec.repositories.join(",")),
            ..Default::default()
        });
    }
    vars
}

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

fn desired_job(task: &SwarmTask, namespace: &str, image: &str, secret_name: Option<&str>) -> Job {
    let name = task.name_any();
    let mut labels = BTreeMap::new();
    labels.insert(qualified_key("task"), name.clone());

    let container = Container {
        name: "task".to_string(),
        image: Some(image.to_string()),
        env: Some(env_vars(task, secret_name)),
        resources: Some(resource_requirements(&task.spec.resources)),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![task.controller_owner_ref(&()).expect("task has no uid")]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// §4.5 step 6: derives the next task phase from the job's observed status.
/// Pure so the rollup rule is unit-testable without a live Job object.
pub fn phase_from_job_counts(succeeded: i32, failed: i32, active: i32, previous: TaskPhase) -> TaskPhase {
    if previous.is_terminal() {
        return previous;
    }
    if succeeded > 0 {
        TaskPhase::Completed
    } else if failed > 0 {
        TaskPhase::Failed
    } else if active > 0 {
        TaskPhase::Running
    } else {
        TaskPhase::Pending
    }
}

async fn patch_status(
    ctx: &ReconcilerContext,
    namespace: &str,
    name: &str,
    status: &SwarmTaskStatus,
) -> Result<(), ReconcileError> {
    let tasks: Api<SwarmTask> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    tasks
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn emit_event(ctx: &ReconcilerContext, task: &SwarmTask, event_type: EventType, reason: &str, note: String) {
    let recorder = ctx.recorder(task);
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

async fn ensure_finalizer(ctx: &ReconcilerContext, namespace: &str, task: &SwarmTask) -> Result<(), ReconcileError> {
    let finalizer = finalizer_id();
    if task.finalizers().iter().any(|f| f == &finalizer) {
        return Ok(());
    }
    let tasks: Api<SwarmTask> = Api::namespaced(ctx.client.clone(), namespace);
    let mut finalizers = task.finalizers().to_vec();
    finalizers.push(finalizer);
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    tasks
        .patch(&task.name_any(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    Ok(())
}

async fn reconcile_deleting(task: Arc<SwarmTask>, ctx: &ReconcilerContext, namespace: &str) -> Result<Action, ReconcileError> {
    let name = secret_name(&task);
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let _ = secrets.delete(&name, &DeleteParams::default()).await;

    let finalizer = finalizer_id();
    let remaining: Vec<String> = task.finalizers().iter().filter(|f| *f != &finalizer).cloned().collect();
    let tasks: Api<SwarmTask> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
    tasks
        .patch(&task.name_any(), &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await?;
    emit_event(ctx, &task, EventType::Normal, "Finalized", "credential secret removed".to_string()).await;
    Ok(Action::await_change())
}

async fn reconcile_cancelled(task: Arc<SwarmTask>, ctx: &ReconcilerContext, namespace: &str) -> Result<Action, ReconcileError> {
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), namespace);
    let _ = jobs.delete(&task.name_any(), &DeleteParams::default()).await;
    Ok(Action::await_change())
}

async fn reconcile_active(task: Arc<SwarmTask>, ctx: &ReconcilerContext, operator_namespace: &str) -> Result<Action, ReconcileError> {
    let cluster_namespace = task.namespace().unwrap_or_else(|| operator_namespace.to_string());
    let cluster = resolve_cluster(ctx, &cluster_namespace, &task.spec.cluster_ref).await?;

    let namespace = target_namespace(&cluster, &task, operator_namespace);
    ensure_namespace(ctx, &namespace).await?;

    let now = Utc::now();
    if let Some(timeout_secs) = task.spec.timeout_secs {
        if let Some(start_time) = task.status.as_ref().and_then(|s| s.start_time) {
            if (now - start_time).num_seconds() > timeout_secs {
                let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &namespace);
                let _ = jobs.delete(&task.name_any(), &DeleteParams::default()).await;
                let mut status = task.status.clone().unwrap_or_default();
                status.phase = TaskPhase::Failed;
                status.completion_time = Some(now);
                status.errors.push("Timeout: task exceeded its declared timeout".to_string());
                patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;
                return Ok(Action::await_change());
            }
        }
    }

    // `credentialProviderOverride` only ever names the cluster's own provider today
    // (there is no registry of alternate providers to switch to); it is accepted
    // on the spec for forward compatibility but does not change which binding is used.
    let credential_provider = cluster.spec.credential_provider.clone();

    let mut secret_name_opt: Option<String> = None;
    if let Some(binding) = credential_provider.as_ref() {
        if !task.spec.repositories.is_empty() {
            match acquire_credential(ctx, &namespace, &task, binding).await {
                Ok(_minted) => {
                    secret_name_opt = Some(secret_name(&task));
                    emit_event(
                        ctx,
                        &task,
                        EventType::Normal,
                        "GitHubTokenCreated",
                        format!("minted installation token for {} repositories", task.spec.repositories.len()),
                    )
                    .await;
                }
                Err(error) if error.is_transient() => return Err(error),
                Err(error) => {
                    let mut status = task.status.clone().unwrap_or_default();
                    status.errors.push(format!("CredentialUnavailable: {error}"));
                    patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;
                    return Ok(Action::requeue(super::ERROR_REQUEUE));
                }
            }
        } else if binding.required {
            let mut status = task.status.clone().unwrap_or_default();
            status.errors.push("repository list empty but provider requires at least one".to_string());
            patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;
            return Ok(Action::requeue(StdDuration::from_secs(30)));
        }
    }

    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &namespace);
    let image = cluster.spec.agent_template.image.clone();
    let desired = desired_job(&task, &namespace, &image, secret_name_opt.as_deref());

    let previous_phase = task.status.as_ref().map(|s| s.phase).unwrap_or_default();
    let existing = jobs.get_opt(&task.name_any()).await?;
    let (succeeded, failed, active) = match &existing {
        Some(job) => {
            let status = job.status.clone().unwrap_or_default();
            (status.succeeded.unwrap_or(0), status.failed.unwrap_or(0), status.active.unwrap_or(0))
        }
        None => (0, 0, 0),
    };

    let mut status = task.status.clone().unwrap_or_default();
    let next_phase = phase_from_job_counts(succeeded, failed, active, previous_phase);

    if next_phase == TaskPhase::Failed && previous_phase != TaskPhase::Failed {
        if !task.spec.retry_policy.exhausted(status.retry_count) {
            status.retry_count += 1;
            let backoff = task.spec.retry_policy.backoff_seconds(status.retry_count);
            status.phase = TaskPhase::Pending;
            patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;
            let _ = jobs.delete(&task.name_any(), &DeleteParams::default()).await;
            return Ok(Action::requeue(StdDuration::from_secs_f64(backoff.max(1.0))));
        }
        status.phase = TaskPhase::Failed;
        status.completion_time = Some(now);
        status.errors.push("job failed and retry budget is exhausted".to_string());
        patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;
        return Ok(Action::await_change());
    }

    if existing.is_none() {
        jobs.create(&PostParams::default(), &desired).await?;
    }

    status.phase = next_phase;
    if next_phase == TaskPhase::Running && status.start_time.is_none() {
        status.start_time = Some(now);
    }
    if next_phase.is_terminal() && status.completion_time.is_none() {
        status.completion_time = Some(now);
    }
    status.observed_generation = task.meta().generation.unwrap_or(0);
    patch_status(ctx, &cluster_namespace, &task.name_any(), &status).await?;

    let requeue = if next_phase.is_terminal() {
        StdDuration::from_secs(300)
    } else {
        StdDuration::from_secs(15)
    };
    Ok(Action::requeue(requeue))
}

async fn reconcile_inner(task: Arc<SwarmTask>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let namespace = task
        .namespace()
        .ok_or_else(|| ReconcileError::Configuration("SwarmTask must be namespaced".to_string()))?;

    if task.meta().deletion_timestamp.is_some() {
        return reconcile_deleting(task, &ctx, &namespace).await;
    }

    ensure_finalizer(&ctx, &namespace, &task).await?;

    if task.status.as_ref().map(|s| s.phase) == Some(TaskPhase::Cancelled) {
        return reconcile_cancelled(task, &ctx, &namespace).await;
    }

    reconcile_active(task, &ctx, &namespace).await
}

#[tracing::instrument(skip_all, fields(name = %task.name_any(), namespace = task.namespace()))]
pub async fn reconcile(task: Arc<SwarmTask>, ctx: Arc<ReconcilerContext>) -> Result<Action, ReconcileError> {
    let started = std::time::Instant::now();
    let result = reconcile_inner(task, ctx.clone()).await;
    ctx.record_reconcile("task", started.elapsed(), &result);
    result
}

pub fn on_error(task: Arc<SwarmTask>, error: &ReconcileError, _ctx: Arc<ReconcilerContext>) -> Action {
    tracing::warn!(name = %task.name_any(), %error, "task reconcile failed");
    Action::requeue(super::ERROR_REQUEUE)
}
