// ============================================================
// Random Expander Edges
// ============================================================
// Adds a sparse random "shortcut" graph on top of each input
// graph. Each round draws degree/2 random permutations; every
// permutation π contributes the edges (i, π(i)) and (π(i), i).
// A permutation with fixed points is redrawn, up to
// max_num_iters times, and any fixed points that survive are
// simply skipped. Self loops, duplicates and pairs already
// present in the graph are removed.

use anyhow::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::{BTreeSet, HashSet};

use crate::domain::graph::Graph;
use crate::domain::traits::GraphTransform;

pub struct ExpanderTransform {
    degree: usize,
    count: usize,
    max_num_iters: usize,
    rng: StdRng,
}

impl ExpanderTransform {
    pub fn new(degree: usize, count: usize, max_num_iters: usize, seed: u64) -> Self {
        Self { degree, count, max_num_iters, rng: StdRng::seed_from_u64(seed) }
    }

    fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..n).collect();
        for _ in 0..self.max_num_iters.max(1) {
            perm.shuffle(&mut self.rng);
            if perm.iter().enumerate().all(|(i, &p)| i != p) {
                break;
            }
        }
        perm
    }

    /// Expander pairs for a graph with `n` nodes, both directions.
    pub fn sample_edges(&mut self, graph: &Graph) -> Vec<(usize, usize)> {
        let n = graph.num_nodes;
        if n < 2 {
            return Vec::new();
        }
        let existing: HashSet<(usize, usize)> = graph.src.iter().copied().zip(graph.dst.iter().copied()).collect();
        let mut pairs = BTreeSet::new();
        for _ in 0..self.count {
            for _ in 0..self.degree / 2 {
                let perm = self.permutation(n);
                for (i, &p) in perm.iter().enumerate() {
                    if i == p {
                        continue;
                    }
                    for pair in [(i, p), (p, i)] {
                        if !existing.contains(&pair) {
                            pairs.insert(pair);
                        }
                    }
                }
            }
        }
        pairs.into_iter().collect()
    }
}

impl GraphTransform for ExpanderTransform {
    fn name(&self) -> &'static str {
        "ExpanderEdges"
    }

    fn apply(&mut self, graph: &mut Graph) -> Result<()> {
        let edges = self.sample_edges(graph);
        graph.pe.expander_edges = Some(edges);
        Ok(())
    }
}
