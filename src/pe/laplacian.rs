// ============================================================
// Laplacian Eigenvector Positional Encoding
// ============================================================
// L = I − D^{-1/2} A D^{-1/2} on the symmetrised adjacency,
// degrees clipped at 1 so isolated nodes do not divide by zero.
// The k eigenvectors with the smallest eigenvalues become node
// features. Graphs with fewer than k nodes are zero-padded and
// `lap_valid` records how many columns are real.

use anyhow::Result;
use nalgebra::{DMatrix, SymmetricEigen};

use crate::domain::graph::Graph;
use crate::domain::traits::GraphTransform;
use crate::pe::symmetric_adjacency;

pub struct LapPeTransform {
    k: usize,
}

impl LapPeTransform {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

/// Eigenpairs of the normalised Laplacian, eigenvalues ascending.
/// Returns (eigenvalues, eigenvectors as columns).
pub fn normalized_laplacian_eigen(g: &Graph) -> (Vec<f64>, DMatrix<f64>) {
    let n = g.num_nodes;
    let a = symmetric_adjacency(g);
    let inv_sqrt: Vec<f64> = (0..n)
        .map(|i| 1.0 / a.row(i).sum().max(1.0).sqrt())
        .collect();
    let mut l = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        for j in 0..n {
            if a[(i, j)] != 0.0 {
                l[(i, j)] -= inv_sqrt[i] * a[(i, j)] * inv_sqrt[j];
            }
        }
    }

    let eigen = SymmetricEigen::new(l);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| eigen.eigenvalues[x].total_cmp(&eigen.eigenvalues[y]));

    let values = order.iter().map(|&c| eigen.eigenvalues[c].abs()).collect();
    let vectors = DMatrix::from_fn(n, n, |r, c| eigen.eigenvectors[(r, order[c])]);
    (values, vectors)
}

impl GraphTransform for LapPeTransform {
    fn name(&self) -> &'static str {
        "LapPE"
    }

    fn apply(&mut self, graph: &mut Graph) -> Result<()> {
        let n = graph.num_nodes;
        let k = self.k;
        let (values, vectors) = normalized_laplacian_eigen(graph);
        let valid = k.min(n);

        let mut eigvec = vec![0.0f32; n * k];
        for i in 0..n {
            for j in 0..valid {
                eigvec[i * k + j] = vectors[(i, j)] as f32;
            }
        }
        let mut eigval = vec![0.0f32; k];
        for j in 0..valid {
            eigval[j] = values[j] as f32;
        }

        graph.pe.lap_eigvec = Some(eigvec);
        graph.pe.lap_eigval = Some(eigval);
        graph.pe.lap_valid = valid;
        graph.pe.lap_k = k;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cycle(n: usize) -> Graph {
        let edges: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| [(i, (i + 1) % n), ((i + 1) % n, i)])
            .collect();
        Graph::new(n, 1, vec![1.0; n], &edges, vec![0.0])
    }

    #[test]
    fn test_spectrum_range_and_zero_mode() {
        let (values, _) = normalized_laplacian_eigen(&cycle(6));
        assert_abs_diff_eq!(values[0], 0.0, epsilon = 1e-9);
        for w in values.windows(2) {
            assert!(w[0] <= w[1] + 1e-12);
        }
        for v in &values {
            assert!(*v >= 0.0 && *v <= 2.0 + 1e-9);
        }
        // even cycle is bipartite: largest eigenvalue is exactly 2
        assert_abs_diff_eq!(values[5], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_padding_for_small_graphs() {
        let mut g = cycle(3);
        LapPeTransform::new(5).apply(&mut g).unwrap();
        assert_eq!(g.pe.lap_valid, 3);
        assert_eq!(g.pe.lap_k, 5);
        let vecs = g.pe.lap_eigvec.unwrap();
        assert_eq!(vecs.len(), 15);
        // columns 3 and 4 are padding
        assert_eq!(vecs[3], 0.0);
        assert_eq!(vecs[4], 0.0);
        assert_eq!(g.pe.lap_eigval.unwrap()[4], 0.0);
    }

    #[test]
    fn test_eigenvectors_are_unit_norm() {
        let mut g = cycle(5);
        LapPeTransform::new(2).apply(&mut g).unwrap();
        let v = g.pe.lap_eigvec.unwrap();
        let norm: f32 = (0..5).map(|i| v[i * 2 + 1] * v[i * 2 + 1]).sum();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);
    }
}
