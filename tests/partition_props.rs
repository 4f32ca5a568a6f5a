//! Property tests for island partitioning
//!
//! The island builder must produce exactly the connected components of the
//! graph whose nodes are awake, collidable, non-static bodies and whose edges
//! are solid touching contacts. The oracle is an independent union-find over
//! the same graph; static bodies never union, matching the non-propagation
//! rule.

use alice_islands::prelude::*;
use glam::Vec2;
use proptest::prelude::*;

// ============================================================================
// Union-Find Oracle
// ============================================================================

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Reference partition: sorted component body lists (dynamic bodies only),
/// plus the sorted lone set. A dynamic body is "connected" if it has at
/// least one solid edge, even when that edge only reaches a static body.
fn reference_partition(
    statics: &[bool],
    edges: &[(usize, usize)],
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let n = statics.len();
    let mut uf = UnionFind::new(n);
    let mut has_edge = vec![false; n];

    for &(a, b) in edges {
        has_edge[a] = true;
        has_edge[b] = true;
        if !statics[a] && !statics[b] {
            uf.union(a, b);
        }
    }

    let mut components: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    let mut lone = Vec::new();
    for body in 0..n {
        if statics[body] {
            continue;
        }
        if !has_edge[body] {
            lone.push(body);
            continue;
        }
        components.entry(uf.find(body)).or_default().push(body);
    }

    let mut components: Vec<Vec<usize>> = components.into_values().collect();
    for component in &mut components {
        component.sort_unstable();
    }
    components.sort();
    (components, lone)
}

fn solver_partition(
    statics: &[bool],
    edges: &[(usize, usize)],
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut world = WorldState::new();
    for (i, &is_static) in statics.iter().enumerate() {
        let position = Vec2::new(i as f32, 0.0);
        if is_static {
            world.add_body(Body::fixed(position));
        } else {
            world.add_body(Body::dynamic(position, 1.0, 1.0));
        }
    }
    for &(a, b) in edges {
        world
            .add_contact(Contact::new(a, b, Vec2::Y).with_point(Vec2::ZERO, Vec2::ZERO))
            .unwrap();
    }

    let config = StepConfig {
        gravity: Vec2::ZERO,
        sleep_allowed: false,
        ..StepConfig::default()
    };
    let mut stepper = Stepper::new();
    let report = stepper
        .step(&mut world, &NoHierarchy, &config, 1.0 / 60.0, false)
        .unwrap();

    let mut components = Vec::new();
    let mut lone = Vec::new();
    for summary in &report.island_summaries {
        let mut dynamics: Vec<usize> = summary
            .bodies
            .iter()
            .copied()
            .filter(|&id| !statics[id])
            .collect();
        dynamics.sort_unstable();
        if summary.lone {
            lone = dynamics;
        } else {
            components.push(dynamics);
        }
    }
    components.sort();
    lone.sort_unstable();
    (components, lone)
}

// ============================================================================
// Properties
// ============================================================================

fn graph_strategy() -> impl Strategy<Value = (Vec<bool>, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| {
        let statics = proptest::collection::vec(any::<bool>(), n);
        let edges = proptest::collection::vec((0..n, 0..n), 0..20).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|&(a, b)| a != b)
                .collect::<Vec<_>>()
        });
        (statics, edges)
    })
}

proptest! {
    /// Non-lone islands are exactly the oracle's connected components, and
    /// the lone bucket is exactly the edge-free dynamic set.
    #[test]
    fn islands_match_reference_components((statics, edges) in graph_strategy()) {
        // At least one dynamic body, or there is nothing to partition.
        prop_assume!(statics.iter().any(|&s| !s));

        let expected = reference_partition(&statics, &edges);
        let actual = solver_partition(&statics, &edges);
        prop_assert_eq!(expected, actual);
    }

    /// Building twice from an unchanged world yields the same partition.
    #[test]
    fn partition_is_stable_across_rebuilds((statics, edges) in graph_strategy()) {
        prop_assume!(statics.iter().any(|&s| !s));

        let first = solver_partition(&statics, &edges);
        let second = solver_partition(&statics, &edges);
        prop_assert_eq!(first, second);
    }
}
