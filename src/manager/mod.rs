//! Manager shell (C6, SPEC_FULL.md §A.2) — leader election, the three
//! `Controller` loops, and the shared `ReconcilerContext`.
//!
//! Structurally grounded on a leader-election-guarded controller task:
//! the whole `kube::runtime::Controller` run loop is spawned only while
//! this replica holds the lease, and aborted the moment it loses it.

mod metrics;
mod metrics_server;

pub use metrics::ControllerMetrics;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::StreamExt;
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::Action;
use kube::runtime::events::{Recorder, Reporter};
use kube::runtime::{watcher, Controller};
use kube::Resource;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::crd::agent::SwarmAgent;
use crate::crd::cluster::SwarmCluster;
use crate::crd::task::SwarmTask;
use crate::domain::error::ReconcileError;
use crate::metrics_source::MetricsSource;
use crate::reconcile::{agent, cluster, task};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;

/// Shared dependencies injected into every reconcile/on_error call.
pub struct ReconcilerContext {
    pub client: Client,
    pub config: OperatorConfig,
    pub metrics_source: Arc<dyn MetricsSource>,
    pub metrics: Arc<ControllerMetrics>,
    reporter: Reporter,
    /// Per-object single-flight guard against redundant parent-image lookups
    /// across agents reconciling concurrently for the same cluster.
    image_cache: Mutex<std::collections::HashMap<String, String>>,
    topology_cache: Mutex<std::collections::HashMap<String, crate::domain::models::TopologyKind>>,
}

impl ReconcilerContext {
    pub fn new(client: Client, config: OperatorConfig, metrics_source: Arc<dyn MetricsSource>) -> Self {
        let reporter = Reporter {
            controller: "swarm-operator".to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            client,
            config,
            metrics_source,
            metrics: Arc::new(ControllerMetrics::new()),
            reporter,
            image_cache: Mutex::new(std::collections::HashMap::new()),
            topology_cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Binds an event recorder to a specific object so reconcilers never
    /// construct `ObjectReference`s by hand.
    pub fn recorder<K>(&self, obj: &K) -> Recorder
    where
        K: Resource<DynamicType = ()>,
    {
        Recorder::new(self.client.clone(), self.reporter.clone(), obj.object_ref(&()))
    }

    /// Looks up the parent cluster's declared agent image (§4.3 "Key
    /// decisions"): the agent reconciler never owns an image field itself.
    pub async fn cluster_agent_image(&self, namespace: &str, cluster_ref: &str) -> Option<String> {
        let key = format!("{namespace}/{cluster_ref}");
        if let Some(cached) = self.image_cache.lock().await.get(&key) {
            return Some(cached.clone());
        }
        let clusters: Api<SwarmCluster> = Api::namespaced(self.client.clone(), namespace);
        let image = clusters.get(cluster_ref).await.ok()?.spec.agent_template.image;
        self.image_cache.lock().await.insert(key, image.clone());
        Some(image)
    }

    /// Looks up the parent cluster's declared topology (§4.3 labeling, §6):
    /// the agent reconciler never owns a topology field itself, mirroring
    /// `cluster_agent_image` above.
    pub async fn cluster_topology(&self, namespace: &str, cluster_ref: &str) -> Option<crate::domain::models::TopologyKind> {
        let key = format!("{namespace}/{cluster_ref}");
        if let Some(cached) = self.topology_cache.lock().await.get(&key) {
            return Some(*cached);
        }
        let clusters: Api<SwarmCluster> = Api::namespaced(self.client.clone(), namespace);
        let topology = clusters.get(cluster_ref).await.ok()?.spec.topology;
        self.topology_cache.lock().await.insert(key, topology);
        Some(topology)
    }

    /// Records one reconcile attempt against the shared metrics registry:
    /// increments the per-kind counter, observes elapsed duration, and on
    /// error increments the per-kind/class error counter (SPEC_FULL.md §A.4).
    pub fn record_reconcile(&self, kind: &str, elapsed: std::time::Duration, result: &Result<Action, ReconcileError>) {
        self.metrics.reconcile_total.with_label_values(&[kind]).inc();
        self.metrics
            .reconcile_duration_seconds
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
        if let Err(error) = result {
            self.metrics
                .reconcile_errors_total
                .with_label_values(&[kind, error.class()])
                .inc();
        }
    }
}

fn holder_id() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("swarm-operator-{}", uuid::Uuid::new_v4()))
}

/// Runs all three controllers under a single leader-election guard: only
/// the elected replica ever touches the cluster, standbys just poll the
/// lease. Returns once `shutdown` is cancelled.
pub async fn run(
    client: Client,
    config: OperatorConfig,
    metrics_source: Arc<dyn MetricsSource>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let context = Arc::new(ReconcilerContext::new(client.clone(), config.clone(), metrics_source));

    let metrics_addr = config.metrics_addr.clone();
    let metrics_shutdown = shutdown.clone();
    let controller_metrics = context.metrics.clone();
    tokio::spawn(async move {
        if let Err(error) = metrics_server::serve(&metrics_addr, metrics_shutdown, controller_metrics).await {
            tracing::error!(%error, "metrics/health server exited");
        }
    });

    let lease_namespace = config.namespace.clone();
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id: holder_id(),
            lease_name: "swarm-operator-lock".to_string(),
            lease_ttl: std::time::Duration::from_secs(config.lease_duration_secs),
        },
    );

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(config.lease_renew_secs));
    let mut last_acquired_log = Instant::now();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    let _ = task.await;
                }
                return Ok(());
            }
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(error) => {
                tracing::warn!(%error, "leader election renew/acquire failed");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    tracing::warn!("controller aborted after losing the ability to renew the lease");
                }
                continue;
            }
        };

        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                tracing::info!("acquired leadership, starting controllers");
                controller_task = Some(tokio::spawn(spawn_controllers(client.clone(), context.clone(), lease_namespace.clone())));
            } else if last_acquired_log.elapsed() > std::time::Duration::from_secs(300) {
                tracing::debug!("still leader");
                last_acquired_log = Instant::now();
            }
        } else if let Some(task) = controller_task.take() {
            tracing::warn!("lost leadership, stopping controllers");
            task.abort();
        }
    }
}

async fn spawn_controllers(client: Client, context: Arc<ReconcilerContext>, namespace: String) {
    let clusters: Api<SwarmCluster> = Api::namespaced(client.clone(), &namespace);
    let agents_owned: Api<SwarmAgent> = Api::namespaced(client.clone(), &namespace);
    let cluster_ctx = context.clone();
    let cluster_controller = Controller::new(clusters, watcher::Config::default())
        .owns(agents_owned, watcher::Config::default())
        .run(cluster::reconcile, cluster::on_error, cluster_ctx)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(%error, "cluster reconcile produced an error result");
            }
        });

    let agents: Api<SwarmAgent> = Api::namespaced(client.clone(), &namespace);
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let agent_ctx = context.clone();
    let agent_controller = Controller::new(agents, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .run(agent::reconcile, agent::on_error, agent_ctx)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(%error, "agent reconcile produced an error result");
            }
        });

    let tasks: Api<SwarmTask> = Api::namespaced(client.clone(), &namespace);
    let jobs: Api<Job> = Api::namespaced(client, &namespace);
    let task_ctx = context.clone();
    let task_controller = Controller::new(tasks, watcher::Config::default())
        .owns(jobs, watcher::Config::default())
        .run(task::reconcile, task::on_error, task_ctx)
        .for_each(|result| async move {
            if let Err(error) = result {
                tracing::warn!(%error, "task reconcile produced an error result");
            }
        });

    tokio::join!(cluster_controller, agent_controller, task_controller);
}
