//! Benchmarks the autoscaler's evaluate/select path across population sizes (§4.4.2).

use std::collections::HashMap;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swarm_operator::domain::models::{AgentPhase, AgentType, AutoscalingConfig, Strategy};
use swarm_operator::metrics_source::ClusterMetrics;
use swarm_operator::reconcile::autoscaler::{evaluate, select_scale_down_victim, select_scale_up_type, AgentRecord};

fn population(n: usize) -> Vec<AgentRecord> {
    let now = Utc::now();
    (0..n)
        .map(|i| AgentRecord {
            name: format!("agent-{i:04}"),
            agent_type: if i % 3 == 0 { AgentType::Coordinator } else { AgentType::Coder },
            phase: AgentPhase::Ready,
            in_flight_tasks: 0,
            created_at: now - Duration::seconds(i as i64),
        })
        .collect()
}

fn ratios() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("coordinator".to_string(), 0.3);
    m.insert("coder".to_string(), 0.7);
    m
}

fn bench_evaluate(c: &mut Criterion) {
    let config = AutoscalingConfig {
        enabled: true,
        ..Default::default()
    };
    c.bench_function("evaluate", |b| {
        b.iter(|| {
            evaluate(
                black_box(ClusterMetrics {
                    avg_cpu_percent: 85.0,
                    avg_tasks_per_agent: 2.0,
                }),
                black_box(10),
                2,
                50,
                &config,
                None,
                Utc::now(),
            )
        });
    });
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");
    let ratios = ratios();
    for size in [8usize, 32, 128] {
        let roster = population(size);
        group.bench_with_input(BenchmarkId::new("select_scale_up_type", size), &roster, |b, roster| {
            b.iter(|| select_scale_up_type(black_box(roster), &ratios, Strategy::Balanced));
        });
        group.bench_with_input(BenchmarkId::new("select_scale_down_victim", size), &roster, |b, roster| {
            b.iter(|| select_scale_down_victim(black_box(roster), &ratios));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_selection);
criterion_main!(benches);
