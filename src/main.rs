//! swarm-operator entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::CustomResourceExt;
use tokio_util::sync::CancellationToken;

use swarm_operator::crd::{SwarmAgent, SwarmCluster, SwarmTask};
use swarm_operator::metrics_source::PodMetricsSource;
use swarm_operator::telemetry::{LogFormat, LogLevel};
use swarm_operator::{config, manager, telemetry};

/// Kubernetes operator for `SwarmCluster`/`SwarmAgent`/`SwarmTask`.
#[derive(Debug, Parser)]
#[command(name = "swarm-operator", version, about)]
struct Cli {
    /// Optional YAML config file, merged under `SWARM_OPERATOR_*` env vars.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Namespace leader election and the controllers run in; overrides config/env.
    #[arg(long = "leader-election-namespace")]
    namespace: Option<String>,

    /// `host:port` the `/healthz` and `/metrics` endpoints bind to.
    #[arg(long)]
    metrics_addr: Option<String>,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Print the generated `CustomResourceDefinition` YAML for all three kinds
    /// and exit, for `kubectl apply -f -` pipelines.
    #[arg(long)]
    print_crds: bool,
}

fn print_crds() -> Result<()> {
    for crd in [SwarmCluster::crd(), SwarmAgent::crd(), SwarmTask::crd()] {
        println!("---");
        println!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_crds {
        return print_crds();
    }

    let mut config = config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics_addr = addr;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    let _telemetry_guard = telemetry::init(config.log_level, config.log_format)?;

    let client = kube::Client::try_default()
        .await
        .context("failed to build a Kubernetes client from the in-cluster or kubeconfig context")?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            signal_shutdown.cancel();
        }
    });

    let metrics_source = Arc::new(PodMetricsSource {
        namespace: config.namespace.clone(),
    });
    manager::run(client, config, metrics_source, shutdown)
        .await
        .context("manager exited with an error")
}
