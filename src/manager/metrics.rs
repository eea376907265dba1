//! Reconcile counters and histograms (SPEC_FULL.md §A.4), modeled on the
//! storage-operator reference's per-kind/action `ControllerMetrics`: a
//! counter for attempts, a counter for errors by class, and a duration
//! histogram, each labeled by resource kind rather than split into one
//! registry per controller.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct ControllerMetrics {
    registry: Registry,
    pub reconcile_total: IntCounterVec,
    pub reconcile_errors_total: IntCounterVec,
    pub reconcile_duration_seconds: HistogramVec,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "swarm_operator_reconcile_total",
                "Total reconcile invocations, per resource kind",
            ),
            &["kind"],
        )
        .expect("reconcile_total metric is well-formed");

        let reconcile_errors_total = IntCounterVec::new(
            Opts::new(
                "swarm_operator_reconcile_errors_total",
                "Reconcile invocations that returned an error, per kind and error class",
            ),
            &["kind", "error_class"],
        )
        .expect("reconcile_errors_total metric is well-formed");

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "swarm_operator_reconcile_duration_seconds",
                "Reconcile wall-clock duration, per resource kind",
            ),
            &["kind"],
        )
        .expect("reconcile_duration_seconds metric is well-formed");

        registry
            .register(Box::new(reconcile_total.clone()))
            .expect("reconcile_total registers once");
        registry
            .register(Box::new(reconcile_errors_total.clone()))
            .expect("reconcile_errors_total registers once");
        registry
            .register(Box::new(reconcile_duration_seconds.clone()))
            .expect("reconcile_duration_seconds registers once");

        Self {
            registry,
            reconcile_total,
            reconcile_errors_total,
            reconcile_duration_seconds,
        }
    }

    /// Renders the registry in Prometheus text exposition format for the
    /// `/metrics` handler.
    pub fn encode(&self) -> String {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buf).expect("prometheus text encoder emits valid utf8")
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_reflects_recorded_samples() {
        let metrics = ControllerMetrics::new();
        metrics.reconcile_total.with_label_values(&["cluster"]).inc();
        metrics
            .reconcile_errors_total
            .with_label_values(&["cluster", "transient"])
            .inc();
        metrics
            .reconcile_duration_seconds
            .with_label_values(&["cluster"])
            .observe(0.25);

        let output = metrics.encode();
        assert!(output.contains("swarm_operator_reconcile_total"));
        assert!(output.contains("kind=\"cluster\""));
        assert!(output.contains("swarm_operator_reconcile_errors_total"));
        assert!(output.contains("error_class=\"transient\""));
        assert!(output.contains("swarm_operator_reconcile_duration_seconds"));
    }

    #[test]
    fn distinct_kinds_stay_independent() {
        let metrics = ControllerMetrics::new();
        metrics.reconcile_total.with_label_values(&["agent"]).inc();
        metrics.reconcile_total.with_label_values(&["agent"]).inc();
        metrics.reconcile_total.with_label_values(&["task"]).inc();

        assert_eq!(metrics.reconcile_total.with_label_values(&["agent"]).get(), 2);
        assert_eq!(metrics.reconcile_total.with_label_values(&["task"]).get(), 1);
    }
}
