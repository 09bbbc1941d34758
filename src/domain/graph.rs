// ============================================================
// Layer 3 — Graph Domain Type
// ============================================================
// One graph sample as loaded from disk, plus whatever positional
// encodings have been precomputed for it.
//
// Layout conventions (all row-major, all plain Vecs):
//   x          num_nodes × node_dim
//   src, dst   one entry per directed edge (message flows src → dst)
//   edge_attr  num_edges × edge_dim   (empty when edge_dim == 0)
//   y          graph-level: target_width values
//              node-level:  num_nodes × target_width values
//
// Undirected datasets store both directions of every edge.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::task::Split;

/// Precomputed structural encodings for one graph.
/// Every field is optional; only the enabled encoders fill theirs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionalEncodings {
    /// Laplacian eigenvectors, num_nodes × lap_k (zero padded)
    pub lap_eigvec: Option<Vec<f32>>,
    /// Laplacian eigenvalues, lap_k (zero padded)
    pub lap_eigval: Option<Vec<f32>>,
    /// Number of real (non-padding) eigenpairs
    pub lap_valid: usize,
    pub lap_k: usize,

    /// Random-walk return probabilities, num_nodes × rwse_steps
    pub rwse: Option<Vec<f32>>,
    pub rwse_steps: usize,

    /// Effective-resistance node embedding, num_nodes × ern_dim
    pub ern: Option<Vec<f32>>,
    pub ern_dim: usize,

    /// Effective resistance per edge: the real edges first,
    /// then the expander edges in the same order as `expander_edges`
    pub ere: Option<Vec<f32>>,

    /// Extra (src, dst) pairs from the random expander transform
    pub expander_edges: Option<Vec<(usize, usize)>>,

    /// All-pairs hop distances, num_nodes × num_nodes, clamped
    pub spd: Option<Vec<u16>>,
}

/// Per-node split membership for node-level datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMasks {
    pub train: Vec<bool>,
    pub val: Vec<bool>,
    pub test: Vec<bool>,
}

impl NodeMasks {
    pub fn mask(&self, split: Split) -> &[bool] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn count(&self, split: Split) -> usize {
        self.mask(split).iter().filter(|&&m| m).count()
    }
}

/// A single graph sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub num_nodes: usize,
    pub node_dim: usize,
    pub x: Vec<f32>,

    pub src: Vec<usize>,
    pub dst: Vec<usize>,

    pub edge_dim: usize,
    pub edge_attr: Vec<f32>,

    pub y: Vec<f32>,

    /// Only present on node-level datasets
    pub node_masks: Option<NodeMasks>,

    #[serde(default)]
    pub pe: PositionalEncodings,
}

impl Graph {
    /// Create a graph without edge features or masks.
    pub fn new(
        num_nodes: usize,
        node_dim: usize,
        x: Vec<f32>,
        edges: &[(usize, usize)],
        y: Vec<f32>,
    ) -> Self {
        let (src, dst) = edges.iter().copied().unzip();
        Self {
            num_nodes,
            node_dim,
            x,
            src,
            dst,
            edge_dim: 0,
            edge_attr: Vec::new(),
            y,
            node_masks: None,
            pe: PositionalEncodings::default(),
        }
    }

    /// Attach edge features (num_edges × edge_dim, row-major).
    pub fn with_edge_attr(mut self, edge_dim: usize, edge_attr: Vec<f32>) -> Self {
        self.edge_dim = edge_dim;
        self.edge_attr = edge_attr;
        self
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    /// Feature row of node `i`.
    pub fn node_row(&self, i: usize) -> &[f32] {
        &self.x[i * self.node_dim..(i + 1) * self.node_dim]
    }

    /// Feature row of edge `e`, empty when the graph has no edge features.
    pub fn edge_row(&self, e: usize) -> &[f32] {
        &self.edge_attr[e * self.edge_dim..(e + 1) * self.edge_dim]
    }

    /// Number of incoming edges per node.
    pub fn in_degree(&self) -> Vec<usize> {
        let mut deg = vec![0usize; self.num_nodes];
        for &d in &self.dst {
            deg[d] += 1;
        }
        deg
    }

    /// In-neighbour lists: for each node, the (source, edge id) pairs
    /// whose messages it receives.
    pub fn in_neighbours(&self) -> Vec<Vec<(usize, usize)>> {
        let mut nbrs = vec![Vec::new(); self.num_nodes];
        for (e, (&s, &d)) in self.src.iter().zip(&self.dst).enumerate() {
            nbrs[d].push((s, e));
        }
        nbrs
    }

    /// Undirected adjacency lists without duplicates or self loops.
    pub fn undirected_neighbours(&self) -> Vec<Vec<usize>> {
        let mut seen: Vec<HashSet<usize>> = vec![HashSet::new(); self.num_nodes];
        for (&s, &d) in self.src.iter().zip(&self.dst) {
            if s != d {
                seen[s].insert(d);
                seen[d].insert(s);
            }
        }
        seen.into_iter()
            .map(|set| {
                let mut v: Vec<usize> = set.into_iter().collect();
                v.sort_unstable();
                v
            })
            .collect()
    }

    /// True when every edge (u, v) has its reverse (v, u).
    pub fn is_undirected(&self) -> bool {
        let edges: HashSet<(usize, usize)> =
            self.src.iter().copied().zip(self.dst.iter().copied()).collect();
        edges.iter().all(|&(s, d)| edges.contains(&(d, s)))
    }

    /// Dense 0/1 adjacency, row = destination, column = source.
    /// Parallel edges collapse to a single 1.
    pub fn dense_adjacency(&self) -> Vec<f64> {
        let n = self.num_nodes;
        let mut a = vec![0.0f64; n * n];
        for (&s, &d) in self.src.iter().zip(&self.dst) {
            a[d * n + s] = 1.0;
        }
        a
    }

    /// Check every field against num_nodes / num_edges.
    pub fn validate(&self, target_width: usize, node_level: bool) -> Result<()> {
        let n = self.num_nodes;
        ensure!(n > 0, "graph has no nodes");
        ensure!(
            self.x.len() == n * self.node_dim,
            "node features have {} values, expected {} × {}",
            self.x.len(), n, self.node_dim
        );
        ensure!(self.src.len() == self.dst.len(), "src/dst edge lists differ in length");
        if let Some(bad) = self.src.iter().chain(&self.dst).find(|&&v| v >= n) {
            anyhow::bail!("edge endpoint {bad} out of range for {n} nodes");
        }
        ensure!(
            self.edge_attr.len() == self.num_edges() * self.edge_dim,
            "edge features have {} values, expected {} × {}",
            self.edge_attr.len(), self.num_edges(), self.edge_dim
        );
        let expected_y = if node_level { n * target_width } else { target_width };
        ensure!(
            self.y.len() == expected_y,
            "target has {} values, expected {}",
            self.y.len(), expected_y
        );
        if let Some(masks) = &self.node_masks {
            ensure!(
                masks.train.len() == n && masks.val.len() == n && masks.test.len() == n,
                "node masks must have one entry per node"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Graph {
        let edges = [(0, 1), (1, 0), (1, 2), (2, 1), (2, 0), (0, 2)];
        Graph::new(3, 1, vec![1.0, 2.0, 3.0], &edges, vec![0.5])
    }

    #[test]
    fn test_degree_and_neighbours() {
        let g = triangle();
        assert_eq!(g.in_degree(), vec![2, 2, 2]);
        let nbrs = g.in_neighbours();
        let sources: Vec<usize> = nbrs[0].iter().map(|&(s, _)| s).collect();
        assert_eq!(sources, vec![1, 2]);
    }

    #[test]
    fn test_is_undirected() {
        assert!(triangle().is_undirected());
        let g = Graph::new(2, 1, vec![0.0, 0.0], &[(0, 1)], vec![1.0]);
        assert!(!g.is_undirected());
    }

    #[test]
    fn test_validate_catches_bad_edge() {
        let g = Graph::new(2, 1, vec![0.0, 0.0], &[(0, 5)], vec![1.0]);
        let err = g.validate(1, false).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_validate_node_level_targets() {
        let mut g = triangle();
        assert!(g.validate(1, true).is_err());
        g.y = vec![0.0, 1.0, 2.0];
        assert!(g.validate(1, true).is_ok());
    }

    #[test]
    fn test_dense_adjacency_is_dst_major() {
        let g = Graph::new(2, 1, vec![0.0, 0.0], &[(0, 1)], vec![1.0]);
        // row = dst 1, column = src 0
        assert_eq!(g.dense_adjacency(), vec![0.0, 0.0, 1.0, 0.0]);
    }
}
