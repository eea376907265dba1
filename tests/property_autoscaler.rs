//! Property tests for the autoscaler evaluator (spec.md §8, P7-P8).

use chrono::{Duration, Utc};
use proptest::prelude::*;
use swarm_operator::domain::models::AutoscalingConfig;
use swarm_operator::metrics_source::ClusterMetrics;
use swarm_operator::reconcile::autoscaler::{evaluate, ScaleDecision};

fn config(window_secs: i64) -> AutoscalingConfig {
    AutoscalingConfig {
        enabled: true,
        scale_up_threshold: 80.0,
        scale_down_threshold: 20.0,
        stabilization_window_secs: window_secs,
        ..Default::default()
    }
}

proptest! {
    /// P8: no two scaling decisions occur within `stabilizationWindow` of each
    /// other — a decision taken `elapsed` seconds after the last one is only
    /// ever non-`None` when `elapsed > stabilizationWindow`.
    #[test]
    fn prop_stabilization_window_blocks_back_to_back_decisions(
        window_secs in 1i64..600,
        elapsed_secs in 0i64..600,
        cpu in 0.0f64..100.0,
    ) {
        let now = Utc::now();
        let last_scale = now - Duration::seconds(elapsed_secs);
        let decision = evaluate(
            ClusterMetrics { avg_cpu_percent: cpu, avg_tasks_per_agent: 0.0 },
            5, 1, 10,
            &config(window_secs),
            Some(last_scale),
            now,
        );
        if elapsed_secs <= window_secs {
            prop_assert_eq!(decision, ScaleDecision::None);
        }
    }

    /// P5/P7 combined: `evaluate` never recommends crossing either bound, and
    /// its output is one of exactly three single-step decisions — callers
    /// that apply a decision change the agent count by at most one agent.
    #[test]
    fn prop_evaluate_never_breaches_agent_bounds(
        current in 0usize..20,
        min_agents in 0usize..20,
        max_agents in 0usize..20,
        cpu in 0.0f64..100.0,
        tasks in 0.0f64..10.0,
    ) {
        prop_assume!(min_agents <= max_agents);
        let decision = evaluate(
            ClusterMetrics { avg_cpu_percent: cpu, avg_tasks_per_agent: tasks },
            current, min_agents, max_agents,
            &config(0),
            None,
            Utc::now(),
        );
        match decision {
            ScaleDecision::ScaleUp => prop_assert!(current < max_agents),
            ScaleDecision::ScaleDown => prop_assert!(current > min_agents),
            ScaleDecision::None => {}
        }
    }

    /// Disabled autoscaling never produces a decision, regardless of inputs.
    #[test]
    fn prop_disabled_autoscaling_is_always_none(
        current in 0usize..20,
        cpu in 0.0f64..100.0,
        tasks in 0.0f64..10.0,
    ) {
        let mut cfg = config(0);
        cfg.enabled = false;
        let decision = evaluate(
            ClusterMetrics { avg_cpu_percent: cpu, avg_tasks_per_agent: tasks },
            current, 0, 20,
            &cfg,
            None,
            Utc::now(),
        );
        prop_assert_eq!(decision, ScaleDecision::None);
    }
}
