// ============================================================
// Random-Walk Structural Encoding
// ============================================================
// For t = 1..=steps, the probability that a random walk started
// at node i is back at i after t steps: diag((D^{-1} A)^t).
//
// P is applied as a sparse operator (out-neighbour lists), so
// one step costs O(E · n) instead of a dense n³ product.

use anyhow::Result;

use crate::domain::graph::Graph;
use crate::domain::traits::GraphTransform;

pub struct RwseTransform {
    steps: usize,
}

impl RwseTransform {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }
}

/// Return probabilities, row-major num_nodes × steps.
pub fn return_probabilities(g: &Graph, steps: usize) -> Vec<f32> {
    let n = g.num_nodes;
    let mut out_lists = vec![Vec::new(); n];
    for (&s, &d) in g.src.iter().zip(&g.dst) {
        out_lists[s].push(d);
    }

    // M_0 = I, M_t = P · M_{t-1}
    let mut m = vec![0.0f64; n * n];
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
    let mut out = vec![0.0f32; n * steps];
    let mut next = vec![0.0f64; n * n];
    for t in 0..steps {
        next.iter_mut().for_each(|v| *v = 0.0);
        for (i, nbrs) in out_lists.iter().enumerate() {
            if nbrs.is_empty() {
                continue;
            }
            let w = 1.0 / nbrs.len() as f64;
            for &j in nbrs {
                let (row_i, row_j) = (i * n, j * n);
                for c in 0..n {
                    next[row_i + c] += w * m[row_j + c];
                }
            }
        }
        std::mem::swap(&mut m, &mut next);
        for i in 0..n {
            out[i * steps + t] = m[i * n + i] as f32;
        }
    }
    out
}

impl GraphTransform for RwseTransform {
    fn name(&self) -> &'static str {
        "RWSE"
    }

    fn apply(&mut self, graph: &mut Graph) -> Result<()> {
        graph.pe.rwse = Some(return_probabilities(graph, self.steps));
        graph.pe.rwse_steps = self.steps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_edge_alternates() {
        let g = Graph::new(2, 1, vec![0.0, 0.0], &[(0, 1), (1, 0)], vec![0.0]);
        let p = return_probabilities(&g, 4);
        // can only be home after an even number of steps
        assert_eq!(&p[0..4], &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_triangle_return_probabilities() {
        let edges = [(0, 1), (1, 0), (1, 2), (2, 1), (2, 0), (0, 2)];
        let g = Graph::new(3, 1, vec![0.0; 3], &edges, vec![0.0]);
        let p = return_probabilities(&g, 3);
        assert_abs_diff_eq!(p[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(p[2], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_isolated_node_is_zero() {
        let g = Graph::new(1, 1, vec![0.0], &[], vec![0.0]);
        assert_eq!(return_probabilities(&g, 2), vec![0.0, 0.0]);
    }
}
