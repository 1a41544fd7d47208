//! Deterministic graph payloads for benchmarks and large tests.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::model::{EdgeSpec, GraphCreate};

#[derive(Clone, Debug)]
pub enum GraphShape {
    /// `n0 -> n1 -> ... -> nk`
    Chain,
    /// One hub pointing at every other node.
    Star,
    /// Every pair `i < j` joined by `i -> j`; the densest acyclic shape.
    Complete,
    /// `edges` distinct forward pairs `i < j` picked at random.
    RandomForward { edges: usize },
    /// A chain closed by an edge from the last node back to the first.
    Cycle,
}

/// Alphabetic node names in sequence: `a`..`z`, `aa`, `ab`, ...
pub fn node_names(count: usize) -> Vec<String> {
    (0..count).map(node_name).collect()
}

/// The `index`-th name of [`node_names`].
pub fn node_name(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    letters.into_iter().map(char::from).collect()
}

pub fn generate_graph(shape: GraphShape, node_count: usize, seed: u64) -> GraphCreate {
    assert!(node_count > 1, "node_count must exceed 1");
    let nodes = node_names(node_count);
    let pairs: Vec<(usize, usize)> = match shape {
        GraphShape::Chain => (0..node_count - 1).map(|idx| (idx, idx + 1)).collect(),
        GraphShape::Star => (1..node_count).map(|leaf| (0, leaf)).collect(),
        GraphShape::Complete => complete_pairs(node_count),
        GraphShape::RandomForward { edges } => random_forward_pairs(node_count, edges, seed),
        GraphShape::Cycle => {
            let mut pairs: Vec<_> = (0..node_count - 1).map(|idx| (idx, idx + 1)).collect();
            pairs.push((node_count - 1, 0));
            pairs
        }
    };
    let edges = pairs
        .into_iter()
        .map(|(from, to)| EdgeSpec::new(nodes[from].clone(), nodes[to].clone()))
        .collect();
    GraphCreate { nodes, edges }
}

fn complete_pairs(count: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(pair_count(count) as usize);
    for from in 0..count {
        for to in (from + 1)..count {
            pairs.push((from, to));
        }
    }
    pairs
}

fn random_forward_pairs(node_count: usize, edge_count: usize, seed: u64) -> Vec<(usize, usize)> {
    let total_pairs = pair_count(node_count);
    assert!(
        edge_count as u128 <= total_pairs,
        "edge_count exceeds possible pairs"
    );
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = Vec::with_capacity(edge_count);
    let mut idx = 0u64;
    let mut remaining_edges = edge_count as u64;
    while remaining_edges > 0 && idx < total_pairs as u64 {
        let remaining_pairs = total_pairs as u64 - idx;
        let p = remaining_edges as f64 / remaining_pairs as f64;
        idx += sample_geometric(&mut rng, p);
        if idx >= total_pairs as u64 {
            break;
        }
        let (from, to) = pair_from_index(idx, node_count as u64);
        pairs.push((from as usize, to as usize));
        idx += 1;
        remaining_edges -= 1;
    }
    pairs
}

fn pair_count(nodes: usize) -> u128 {
    let n = nodes as u128;
    n * (n - 1) / 2
}

fn sample_geometric(rng: &mut StdRng, p: f64) -> u64 {
    if p >= 1.0 {
        return 0;
    }
    let u = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    ((u.ln() / (1.0 - p).ln()).floor().max(0.0)) as u64
}

fn pair_from_index(idx: u64, nodes: u64) -> (u64, u64) {
    let mut left = 0;
    let mut start = 0u64;
    while left < nodes - 1 {
        let remaining = nodes - left - 1;
        if idx < start + remaining {
            return (left, left + 1 + (idx - start));
        }
        start += remaining;
        left += 1;
    }
    (nodes - 2, nodes - 1)
}
