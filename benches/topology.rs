//! Benchmarks the topology engine across population sizes and shapes (§4.1).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swarm_operator::domain::models::{AgentType, TopologyKind};
use swarm_operator::topology::{compute_peers, TopologyAgent};

fn agents(n: usize) -> Vec<TopologyAgent> {
    (0..n)
        .map(|i| {
            let agent_type = if i == 0 { AgentType::Coordinator } else { AgentType::Coder };
            TopologyAgent::new(format!("agent-{i:04}"), agent_type)
        })
        .collect()
}

fn bench_compute_peers(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_peers");
    for size in [4usize, 16, 64, 256] {
        let roster = agents(size);
        for topology in [
            TopologyKind::Mesh,
            TopologyKind::Ring,
            TopologyKind::Star,
            TopologyKind::Hierarchical,
        ] {
            group.bench_with_input(
                BenchmarkId::new(format!("{topology:?}"), size),
                &roster,
                |b, roster| {
                    b.iter(|| compute_peers(black_box(roster), black_box(topology)));
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_compute_peers);
criterion_main!(benches);
