// ============================================================
// Effective-Resistance Encodings
// ============================================================
// With the combinatorial Laplacian L = D − A = U Λ Uᵀ, the rows of
//
//     Z = U Λ⁺^{-1/2}
//
// embed the nodes so that ‖z_u − z_v‖² is exactly the effective
// resistance between u and v.
//
//   ERE  per-edge resistance, computed from the exact embedding
//   ERN  node embedding, Z projected to MaxK dimensions with a
//        seeded Johnson–Lindenstrauss matrix so every graph in
//        the dataset shares one width:
//          MaxK = max over graphs of
//                 min(ceil(n / 2), ceil(8 ln m / accuracy²))

use anyhow::Result;
use nalgebra::{DMatrix, SymmetricEigen};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use crate::domain::graph::Graph;
use crate::domain::traits::GraphTransform;
use crate::pe::symmetric_adjacency;

/// Eigenvalues below this count as the null space.
const ZERO_EIGENVALUE: f64 = 1e-9;

pub struct ResistanceTransform {
    node: bool,
    edge: bool,
    accuracy: f64,
    max_k: usize,
    rng: StdRng,
}

impl ResistanceTransform {
    pub fn new(node: bool, edge: bool, accuracy: f64, seed: u64) -> Self {
        Self { node, edge, accuracy, max_k: 1, rng: StdRng::seed_from_u64(seed) }
    }

    pub fn max_k(&self) -> usize {
        self.max_k
    }
}

/// Projection width for one graph.
pub fn projection_dim(num_nodes: usize, num_undirected_edges: usize, accuracy: f64) -> usize {
    let half = num_nodes.div_ceil(2);
    let m = num_undirected_edges.max(1) as f64;
    let jl = (8.0 * m.ln() / (accuracy * accuracy)).ceil() as usize;
    half.min(jl).max(1)
}

/// Exact resistance embedding, n × n (null-space columns are zero).
pub fn resistance_embedding(g: &Graph) -> DMatrix<f64> {
    let n = g.num_nodes;
    let a = symmetric_adjacency(g);
    let mut l = -a.clone();
    for i in 0..n {
        l[(i, i)] = a.row(i).sum();
    }
    let eigen = SymmetricEigen::new(l);
    let mut z = eigen.eigenvectors;
    for (c, &lambda) in eigen.eigenvalues.iter().enumerate() {
        let scale = if lambda > ZERO_EIGENVALUE { 1.0 / lambda.sqrt() } else { 0.0 };
        z.column_mut(c).scale_mut(scale);
    }
    z
}

pub fn resistance(z: &DMatrix<f64>, u: usize, v: usize) -> f64 {
    (z.row(u) - z.row(v)).norm_squared()
}

impl GraphTransform for ResistanceTransform {
    fn name(&self) -> &'static str {
        "EffectiveResistance"
    }

    fn fit(&mut self, graphs: &[Graph]) -> Result<()> {
        self.max_k = graphs
            .iter()
            .map(|g| {
                let m = g.undirected_neighbours().iter().map(Vec::len).sum::<usize>() / 2;
                projection_dim(g.num_nodes, m, self.accuracy)
            })
            .max()
            .unwrap_or(1);
        tracing::debug!("Effective-resistance embedding width {}", self.max_k);
        Ok(())
    }

    fn apply(&mut self, graph: &mut Graph) -> Result<()> {
        let n = graph.num_nodes;
        let z = resistance_embedding(graph);

        if self.edge {
            let mut ere: Vec<f32> = graph
                .src
                .iter()
                .zip(&graph.dst)
                .map(|(&s, &d)| resistance(&z, s, d) as f32)
                .collect();
            if let Some(extra) = &graph.pe.expander_edges {
                ere.extend(extra.iter().map(|&(s, d)| resistance(&z, s, d) as f32));
            }
            graph.pe.ere = Some(ere);
        }

        if self.node {
            let k = self.max_k;
            let scale = 1.0 / (k as f64).sqrt();
            let q = DMatrix::<f64>::from_fn(n, k, |_, _| {
                let s: f64 = StandardNormal.sample(&mut self.rng);
                s * scale
            });
            let projected = &z * q;
            let mut ern = Vec::with_capacity(n * k);
            for i in 0..n {
                ern.extend(projected.row(i).iter().map(|&v| v as f32));
            }
            graph.pe.ern = Some(ern);
            graph.pe.ern_dim = k;
        }
        Ok(())
    }
}
