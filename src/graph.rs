// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency Graph Builder
//!
//! Walks every attribute of every declared resource; each reference
//! expression adds a directed edge from the referencing resource to the
//! referenced one. Produces a topological ordering via depth-first
//! traversal with three-color marking, failing with the full cycle path
//! when a resource is re-entered while still being visited.
//!
//! Ordering is deterministic: resources and their dependency lists are
//! walked in declaration order, so rebuilding an unchanged deployment
//! always yields the same ordering. Unrelated resources order by
//! declaration as the tie-break; nothing downstream may rely on more than
//! that.

use std::collections::HashMap;

use crate::domain::{Deployment, ResourceId, ResourceKind};
use crate::errors::{DeploymentError, DeploymentResult};

/// Directed acyclic dependency graph over a deployment's resources
///
/// Nodes are arena indices into the deployment; edges point from a
/// resource to the resources it references.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    order: Vec<usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

impl DependencyGraph {
    /// Build the graph and its topological ordering
    ///
    /// Fails with `UnknownReference` for references to undeclared
    /// resources, `CyclicDependency` when the references form a cycle, and
    /// `DuplicateOutput` when two outputs export the same name. All three
    /// are structural: they abort the pass before any resource is touched.
    pub fn build(deployment: &Deployment) -> DeploymentResult<Self> {
        let resources = deployment.resources();
        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(resources.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];

        for resource in resources {
            let mut deps = Vec::new();
            for target in resource.depends_on() {
                let target_idx =
                    deployment
                        .index_of(&target)
                        .ok_or_else(|| DeploymentError::UnknownReference {
                            resource: resource.id.clone(),
                            target: target.clone(),
                        })?;
                deps.push(target_idx);
            }
            deps.sort_unstable();
            deps.dedup();
            for &dep in &deps {
                dependents[dep].push(resource.index);
            }
            dependencies.push(deps);
        }

        check_output_names(deployment)?;

        let order = topological_order(deployment, &dependencies)?;

        Ok(Self {
            order,
            dependencies,
            dependents,
        })
    }

    /// Arena indices in dependency-first order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Direct dependencies of a resource (arena indices, ascending)
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Direct dependents of a resource (arena indices, ascending)
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Depth-first post-order over every node, dependencies before dependents.
///
/// Three-color marking: white = untouched, grey = on the current DFS path,
/// black = done. Meeting a grey node again closes a cycle; the reported
/// path is the stack slice from that node to the current one.
fn topological_order(
    deployment: &Deployment,
    dependencies: &[Vec<usize>],
) -> DeploymentResult<Vec<usize>> {
    let mut marks = vec![Mark::White; dependencies.len()];
    let mut order = Vec::with_capacity(dependencies.len());
    let mut path = Vec::new();

    for start in 0..dependencies.len() {
        if marks[start] == Mark::White {
            visit(start, deployment, dependencies, &mut marks, &mut path, &mut order)?;
        }
    }
    Ok(order)
}

fn visit(
    node: usize,
    deployment: &Deployment,
    dependencies: &[Vec<usize>],
    marks: &mut Vec<Mark>,
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> DeploymentResult<()> {
    marks[node] = Mark::Grey;
    path.push(node);

    for &dep in &dependencies[node] {
        match marks[dep] {
            Mark::Black => {}
            Mark::White => visit(dep, deployment, dependencies, marks, path, order)?,
            Mark::Grey => {
                let start = path
                    .iter()
                    .position(|&n| n == dep)
                    .unwrap_or_default();
                let cycle = path[start..]
                    .iter()
                    .map(|&n| deployment.resources()[n].id.clone())
                    .collect();
                return Err(DeploymentError::CyclicDependency { path: cycle });
            }
        }
    }

    path.pop();
    marks[node] = Mark::Black;
    order.push(node);
    Ok(())
}

/// Exported output names must be unique across the deployment. Outputs are
/// consumed by other systems, so a collision fails the whole pass up front.
fn check_output_names(deployment: &Deployment) -> DeploymentResult<()> {
    let mut seen: HashMap<&str, &ResourceId> = HashMap::new();
    for output in deployment.of_kind(ResourceKind::Output) {
        // Declare-time validation guarantees a literal name
        let Some(name) = output.literal_str("name") else {
            continue;
        };
        if let Some(first) = seen.insert(name, &output.id) {
            return Err(DeploymentError::DuplicateOutput {
                name: name.to_string(),
                first: first.clone(),
                second: output.id.clone(),
            });
        }
    }
    Ok(())
}
