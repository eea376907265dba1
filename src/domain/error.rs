//! Domain error types for the swarm operator.
//!
//! Mirrors the taxonomy in spec.md §7: transient errors are retried with
//! backoff, configuration errors are surfaced on status and not retried
//! until the spec changes, permanent errors record a terminal failure.
//! Each enum exposes `is_transient()`/`is_permanent()` so reconcilers can
//! decide between `Action::requeue` and a status-only update without a
//! match on every variant at every call site.

use thiserror::Error;

/// Errors from the credential broker (C2, §4.2).
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("signing key unreadable: {0}")]
    SigningKeyUnreadable(String),

    #[error("credential provider returned an error: {0}")]
    ProviderError(String),

    #[error("clock skew detected: issued-at is not before expiry")]
    ClockSkew,

    #[error("provider request timed out after {0}s")]
    Timeout(u64),

    #[error("no repositories requested but the provider requires at least one")]
    EmptyRepositoryList,

    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl CredentialError {
    /// Surfaced as `CredentialUnavailable` on the task status (§7); the
    /// caller retries with backoff and never creates the job in this state.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderError(_) | Self::Timeout(_) | Self::Api(_))
    }

    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Errors surfaced by the three reconcilers.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("finalizer error: {0}")]
    Finalizer(String),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("parent cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("task exceeded its timeout")]
    Timeout,

    #[error("retry budget exhausted")]
    RetryBudgetExhausted,
}

impl ReconcileError {
    /// Transient errors are retried with backoff and do not change `phase`.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Finalizer(_))
            || matches!(self, Self::Credential(e) if e.is_transient())
    }

    /// Configuration errors are surfaced on status conditions but the
    /// controller does not retry until the spec's generation changes.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Permanent errors record a terminal failure.
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RetryBudgetExhausted | Self::ClusterNotFound(_)
        )
    }

    /// Coarse label value for the `swarm_operator_reconcile_errors_total`
    /// metric — cardinality stays at three regardless of variant count.
    pub const fn class(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else if self.is_configuration() {
            "configuration"
        } else {
            "permanent"
        }
    }
}

/// Errors from configuration loading and validation (SPEC_FULL.md §A.3).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid lease duration: {0}s, must be positive")]
    InvalidLeaseDuration(u64),

    #[error("invalid reconcile timeout: {0}s, must be positive")]
    InvalidReconcileTimeout(u64),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("leader election namespace cannot be empty")]
    EmptyNamespace,

    #[error("metrics bind address is invalid: {0}")]
    InvalidMetricsAddr(String),
}

/// Errors from the pluggable metrics source (SPEC_FULL.md §B.2).
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),

    #[error("metric sample missing for agent '{0}'")]
    MissingSample(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_provider_error_is_transient() {
        let err = CredentialError::ProviderError("rate limited".to_string());
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn credential_clock_skew_is_permanent() {
        let err = CredentialError::ClockSkew;
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn reconcile_error_wraps_credential_transience() {
        let err = ReconcileError::Credential(CredentialError::Timeout(30));
        assert!(err.is_transient());
    }

    #[test]
    fn reconcile_timeout_is_permanent() {
        assert!(ReconcileError::Timeout.is_permanent());
        assert!(!ReconcileError::Timeout.is_transient());
    }

    #[test]
    fn configuration_errors_are_not_transient() {
        let err = ReconcileError::Configuration("minAgents > maxAgents".to_string());
        assert!(err.is_configuration());
        assert!(!err.is_transient());
        assert!(!err.is_permanent());
    }
}
