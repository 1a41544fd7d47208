//! Acyclicity check run on a candidate graph before anything is persisted.
//!
//! Edges are resolved against the node set first, then an iterative
//! depth-first search with three marks per node looks for a back edge. The
//! search keeps its own stack, so input size never translates into call
//! depth. Roots are visited in the order nodes were supplied, which keeps the
//! outcome reproducible for identical input.

use ahash::AHashMap;

use crate::{
    errors::{EdgeRole, ValidationFailure},
    model::EdgeSpec,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    Unvisited,
    /// On the current search path.
    InProgress,
    Done,
}

/// Accepts the candidate only if every edge endpoint is a known node and the
/// edges form a directed acyclic graph.
pub fn check<S: AsRef<str>>(nodes: &[S], edges: &[EdgeSpec]) -> Result<(), ValidationFailure> {
    let adjacency = resolve_adjacency(nodes, edges)?;
    ensure_acyclic(&adjacency)
}

pub fn is_dag<S: AsRef<str>>(nodes: &[S], edges: &[EdgeSpec]) -> bool {
    check(nodes, edges).is_ok()
}

/// Outgoing neighbour indices per node, in edge input order.
fn resolve_adjacency<S: AsRef<str>>(
    nodes: &[S],
    edges: &[EdgeSpec],
) -> Result<Vec<Vec<usize>>, ValidationFailure> {
    let mut index: AHashMap<&str, usize> = AHashMap::with_capacity(nodes.len());
    for (position, name) in nodes.iter().enumerate() {
        index.entry(name.as_ref()).or_insert(position);
    }

    let mut adjacency = vec![Vec::new(); nodes.len()];
    for (edge_index, edge) in edges.iter().enumerate() {
        let source = lookup(&index, &edge.source, EdgeRole::Source, edge_index)?;
        let target = lookup(&index, &edge.target, EdgeRole::Target, edge_index)?;
        adjacency[source].push(target);
    }
    Ok(adjacency)
}

fn lookup(
    index: &AHashMap<&str, usize>,
    name: &str,
    role: EdgeRole,
    edge_index: usize,
) -> Result<usize, ValidationFailure> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| ValidationFailure::UnknownNode {
            role,
            name: name.to_string(),
            edge_index,
        })
}

fn ensure_acyclic(adjacency: &[Vec<usize>]) -> Result<(), ValidationFailure> {
    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    // (node, position of the next neighbour to explore)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..adjacency.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            match adjacency[node].get(next) {
                Some(&neighbour) => {
                    frame.1 += 1;
                    match marks[neighbour] {
                        Mark::InProgress => return Err(ValidationFailure::NotADag),
                        Mark::Done => {}
                        Mark::Unvisited => {
                            marks[neighbour] = Mark::InProgress;
                            stack.push((neighbour, 0));
                        }
                    }
                }
                None => {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}
