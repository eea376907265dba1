//! Kubernetes operator managing fleets of cooperating AI agents via the
//! `SwarmCluster`/`SwarmAgent`/`SwarmTask` CRDs.

pub mod conditions;
pub mod config;
pub mod credentials;
pub mod crd;
pub mod domain;
pub mod manager;
pub mod metrics_source;
pub mod reconcile;
pub mod telemetry;
pub mod topology;

pub use domain::error::{ConfigError, CredentialError, MetricsError, ReconcileError};
