//! Operator configuration (SPEC_FULL.md §A.3).
//!
//! Layered precedence, lowest to highest: programmatic defaults, an optional
//! YAML file, then `SWARM_OPERATOR_*` environment variables. Validated once,
//! eagerly, right after merging — nothing downstream re-checks these values.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::telemetry::{LogFormat, LogLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Namespace leader election and the controller run in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: u64,
    #[serde(default = "default_lease_renew_secs")]
    pub lease_renew_secs: u64,
    /// Per-reconcile deadline (§5): "no reconcile may block indefinitely".
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,
    #[serde(default = "default_requeue_secs")]
    pub requeue_secs: u64,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_format: LogFormat,
    /// `host:port` the `/metrics` and `/healthz` endpoints bind to.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_lease_duration_secs() -> u64 {
    15
}

fn default_lease_renew_secs() -> u64 {
    5
}

fn default_reconcile_timeout_secs() -> u64 {
    60
}

fn default_requeue_secs() -> u64 {
    30
}

fn default_metrics_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            lease_duration_secs: default_lease_duration_secs(),
            lease_renew_secs: default_lease_renew_secs(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            requeue_secs: default_requeue_secs(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

/// Loads and validates configuration, merging an optional file over defaults
/// and `SWARM_OPERATOR_*` environment variables over both.
pub fn load(config_file: Option<&std::path::Path>) -> Result<OperatorConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(OperatorConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Yaml::file(path));
    }
    let config: OperatorConfig = figment
        .merge(Env::prefixed("SWARM_OPERATOR_").split("__"))
        .extract()
        .context("failed to extract operator configuration")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &OperatorConfig) -> Result<(), ConfigError> {
    if config.lease_duration_secs == 0 || config.lease_duration_secs <= config.lease_renew_secs {
        return Err(ConfigError::InvalidLeaseDuration(config.lease_duration_secs));
    }
    if config.reconcile_timeout_secs == 0 {
        return Err(ConfigError::InvalidReconcileTimeout(config.reconcile_timeout_secs));
    }
    if config.namespace.is_empty() {
        return Err(ConfigError::EmptyNamespace);
    }
    if config.metrics_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::InvalidMetricsAddr(config.metrics_addr.clone()));
    }
    Ok(())
}
