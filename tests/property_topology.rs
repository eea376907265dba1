//! Property tests for the topology engine (spec.md §8, P1-P4).

use std::collections::HashSet;

use proptest::prelude::*;
use swarm_operator::domain::models::{AgentType, TopologyKind};
use swarm_operator::topology::{compute_peers, TopologyAgent};

fn roster(size: usize) -> Vec<TopologyAgent> {
    (0..size)
        .map(|i| TopologyAgent::new(format!("agent-{i:04}"), AgentType::Coder))
        .collect()
}

fn shuffled(size: usize, seed: usize) -> Vec<TopologyAgent> {
    let mut a = roster(size);
    // Deterministic "shuffle": rotate by `seed` instead of pulling in a
    // randomness dependency just for a permutation.
    a.rotate_left(seed % a.len().max(1));
    a
}

proptest! {
    /// P1: for mesh topology with |A| >= 2, peering is symmetric.
    #[test]
    fn prop_mesh_is_symmetric(size in 2usize..40) {
        let agents = roster(size);
        let peers = compute_peers(&agents, TopologyKind::Mesh);
        for (name, list) in &peers {
            for other in list {
                prop_assert!(peers[other].contains(name));
            }
        }
    }

    /// P2: in ring topology with |A| >= 3, every agent has exactly two peers
    /// and the peer relation forms a single cycle covering all agents.
    #[test]
    fn prop_ring_forms_single_cycle(size in 3usize..40) {
        let agents = roster(size);
        let peers = compute_peers(&agents, TopologyKind::Ring);
        for list in peers.values() {
            prop_assert_eq!(list.len(), 2);
        }

        let start = agents[0].name.clone();
        let mut visited = vec![start.clone()];
        let mut prev = start.clone();
        let mut current = peers[&start][1].clone();
        while current != start {
            visited.push(current.clone());
            let next = peers[&current].iter().find(|n| **n != prev).unwrap().clone();
            prev = current;
            current = next;
        }
        let visited_set: HashSet<String> = visited.into_iter().collect();
        let all: HashSet<String> = agents.iter().map(|a| a.name.clone()).collect();
        prop_assert_eq!(visited_set, all);
    }

    /// P3: in star topology, exactly one hub has |A|-1 peers; everyone else has 1.
    /// Requires |A| >= 3: at exactly 2 agents the hub and its one spoke both
    /// have degree 1, so "degree == |A|-1" cannot distinguish them.
    #[test]
    fn prop_star_has_exactly_one_hub(size in 3usize..40) {
        let agents = roster(size);
        let peers = compute_peers(&agents, TopologyKind::Star);
        let hubs: Vec<_> = peers.iter().filter(|(_, list)| list.len() == size - 1).collect();
        prop_assert_eq!(hubs.len(), 1);
        let spokes = peers.iter().filter(|(_, list)| list.len() == 1).count();
        prop_assert_eq!(spokes, size - 1);
    }

    /// P4: computePeers is independent of input ordering.
    #[test]
    fn prop_compute_peers_is_order_independent(size in 1usize..40, seed in 0usize..50) {
        let ordered = roster(size);
        let reordered = shuffled(size, seed);
        for topology in [
            TopologyKind::Mesh,
            TopologyKind::Ring,
            TopologyKind::Star,
            TopologyKind::Hierarchical,
        ] {
            prop_assert_eq!(
                compute_peers(&ordered, topology),
                compute_peers(&reordered, topology)
            );
        }
    }

    /// No agent ever appears in its own peer list, across every topology and size.
    #[test]
    fn prop_no_self_peering(size in 1usize..40) {
        let agents = roster(size);
        for topology in [
            TopologyKind::Mesh,
            TopologyKind::Ring,
            TopologyKind::Star,
            TopologyKind::Hierarchical,
        ] {
            let peers = compute_peers(&agents, topology);
            for (name, list) in &peers {
                prop_assert!(!list.contains(name));
            }
        }
    }
}
