// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Ordering and Idempotence
//!
//! Proves the structural guarantees over generated resource sets: every
//! acyclic set orders dependencies before dependents, rebuilding is
//! deterministic, cycles are always caught with their full path, and a
//! second apply pass over an unchanged set never touches the provider.

use proptest::prelude::*;
use proptest::sample::Index;
use std::sync::Arc;

use stackplan::{
    ApplyConfig, ApplyEngine, AppliedSet, AttrValue, Deployment, DependencyGraph,
    DeploymentError, InMemoryProvisioner, ResourceKind,
};

/// Dependency shape: for node i, a set of dependency picks among 0..i
fn dag_shape() -> impl Strategy<Value = Vec<Vec<Index>>> {
    prop::collection::vec(prop::collection::vec(any::<Index>(), 0..3), 1..12)
}

/// Materialize a shape as a deployment: roots become network segments,
/// everything else becomes outputs referencing earlier nodes
fn deployment_from(shape: &[Vec<Index>]) -> (Deployment, Vec<Vec<usize>>) {
    let mut deployment = Deployment::new();
    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(shape.len());
    let mut kinds: Vec<ResourceKind> = Vec::with_capacity(shape.len());

    for (i, picks) in shape.iter().enumerate() {
        let mut deps: Vec<usize> = if i == 0 {
            Vec::new()
        } else {
            picks.iter().map(|pick| pick.index(i)).collect()
        };
        deps.sort_unstable();
        deps.dedup();

        if deps.is_empty() {
            deployment
                .declare(
                    format!("r{i}"),
                    ResourceKind::NetworkSegment,
                    vec![
                        ("network", AttrValue::literal(format!("net{i}"))),
                        ("cidr", AttrValue::literal(format!("10.{}.0.0/24", i % 250))),
                        ("tier", AttrValue::literal("private")),
                        ("availability_zone", AttrValue::literal("us-east-1a")),
                    ],
                )
                .unwrap();
            kinds.push(ResourceKind::NetworkSegment);
        } else {
            let path_for = |dep: usize| match kinds[dep] {
                ResourceKind::NetworkSegment => "segment_id",
                _ => "value",
            };
            let mut attrs = vec![
                ("name".to_string(), AttrValue::literal(format!("O{i}"))),
                (
                    "value".to_string(),
                    AttrValue::reference(format!("r{}", deps[0]), path_for(deps[0])),
                ),
            ];
            for (k, &dep) in deps.iter().enumerate().skip(1) {
                attrs.push((
                    format!("extra{k}"),
                    AttrValue::reference(format!("r{dep}"), path_for(dep)),
                ));
            }
            deployment
                .declare(format!("r{i}"), ResourceKind::Output, attrs)
                .unwrap();
            kinds.push(ResourceKind::Output);
        }

        edges.push(deps);
    }

    (deployment, edges)
}

proptest! {
    /// Every resource appears after everything it references
    #[test]
    fn ordering_respects_every_edge(shape in dag_shape()) {
        let (deployment, edges) = deployment_from(&shape);
        let graph = DependencyGraph::build(&deployment).unwrap();

        let order = graph.order();
        let mut position = vec![0usize; order.len()];
        for (pos, &node) in order.iter().enumerate() {
            position[node] = pos;
        }

        for (node, deps) in edges.iter().enumerate() {
            for &dep in deps {
                prop_assert!(
                    position[dep] < position[node],
                    "r{} must precede r{}",
                    dep,
                    node
                );
            }
        }
    }

    /// Rebuilding an unchanged set yields the same ordering
    #[test]
    fn rebuild_is_deterministic(shape in dag_shape()) {
        let (deployment, _) = deployment_from(&shape);
        let first = DependencyGraph::build(&deployment).unwrap();
        let second = DependencyGraph::build(&deployment).unwrap();
        prop_assert_eq!(first.order(), second.order());
    }

    /// Closing any chain into a ring is reported with the whole cycle
    #[test]
    fn cycles_name_every_member(len in 2usize..8) {
        let mut deployment = Deployment::new();
        for i in 0..len {
            // Forward references are legal at declare time; only build
            // resolves them
            deployment
                .declare(
                    format!("r{i}"),
                    ResourceKind::Output,
                    vec![
                        ("name".to_string(), AttrValue::literal(format!("O{i}"))),
                        (
                            "value".to_string(),
                            AttrValue::reference(format!("r{}", (i + len - 1) % len), "value"),
                        ),
                    ],
                )
                .unwrap();
        }

        let err = DependencyGraph::build(&deployment).unwrap_err();
        let DeploymentError::CyclicDependency { path } = err else {
            return Err(TestCaseError::fail(format!("expected cycle, got {err:?}")));
        };
        prop_assert_eq!(path.len(), len);
        let mut names: Vec<String> = path.iter().map(|id| id.as_str().to_string()).collect();
        names.sort();
        let mut expected: Vec<String> = (0..len).map(|i| format!("r{i}")).collect();
        expected.sort();
        prop_assert_eq!(names, expected);
    }

    /// A second pass over an unchanged set makes zero provider calls and
    /// reproduces the applied attributes bit for bit
    #[test]
    fn unchanged_sets_apply_as_pure_noops(shape in dag_shape()) {
        let (deployment, _) = deployment_from(&shape);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (first, second, creates_first, creates_second, updates) = runtime.block_on(async {
            let provisioner = Arc::new(InMemoryProvisioner::new());
            let graph = DependencyGraph::build(&deployment).unwrap();
            let engine = ApplyEngine::new(provisioner.clone(), ApplyConfig::default());

            let first = engine
                .apply(&deployment, &graph, &AppliedSet::new(), None)
                .await
                .unwrap();
            let creates_first = provisioner.create_calls();
            let second = engine
                .apply(&deployment, &graph, &first.state, None)
                .await
                .unwrap();
            (
                first,
                second,
                creates_first,
                provisioner.create_calls(),
                provisioner.update_calls(),
            )
        });

        prop_assert!(first.is_complete());
        prop_assert!(second.is_complete());
        prop_assert_eq!(second.changed_count(), 0);
        prop_assert_eq!(creates_first, creates_second);
        prop_assert_eq!(updates, 0);
        prop_assert_eq!(first.state, second.state);
    }
}
