// ============================================================
// Layer 5 — Shared Tensor Helpers
// ============================================================
// Gathers between the sparse (one row per node) and dense
// (graphs × slots) layouts of a GraphBatch, masked reductions,
// and the two-layer MLP used by several blocks.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::data::batcher::GraphBatch;

/// Large negative logit for masked attention slots.
pub const MASK_LOGIT: f32 = -1e9;

/// Rows of `h` [N, d] for every neighbour slot → [N, K, d].
pub fn gather_neighbours<B: Backend>(h: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 3> {
    let [n, d] = h.dims();
    h.select(0, batch.nbr_index.clone()).reshape([n, batch.max_degree, d])
}

/// Edge rows [E + 1, d] for every neighbour slot → [N, K, d].
pub fn gather_edges<B: Backend>(e: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 3> {
    let [_, d] = e.dims();
    e.select(0, batch.nbr_edge.clone()).reshape([batch.num_nodes, batch.max_degree, d])
}

/// Node states [N, d] → padded per-graph layout [G, M, d].
pub fn to_dense<B: Backend>(h: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 3> {
    let [_, d] = h.dims();
    let zero = Tensor::zeros([1, d], &h.device());
    Tensor::cat(vec![h, zero], 0)
        .select(0, batch.dense_index.clone())
        .reshape([batch.num_graphs, batch.max_nodes, d])
}

/// Padded layout [G, M, d] → node states [N, d].
pub fn from_dense<B: Backend>(dense: Tensor<B, 3>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
    let [g, m, d] = dense.dims();
    dense.reshape([g * m, d]).select(0, batch.node_slot.clone())
}

/// Sum over dim 1 of `x` [R, S, d] where `mask` [R, S] is 1.
pub fn masked_sum<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [r, s, d] = x.dims();
    (x * mask.reshape([r, s, 1])).sum_dim(1).reshape([r, d])
}

/// Mean over dim 1, empty rows give zero.
pub fn masked_mean<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let count = mask.clone().sum_dim(1).clamp_min(1.0);
    masked_sum(x, mask) / count
}

/// Max over dim 1, empty rows give zero.
pub fn masked_max<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [r, s, d] = x.dims();
    let any = mask.clone().sum_dim(1).clamp_max(1.0);
    let off = mask.reshape([r, s, 1]).equal_elem(0.0).repeat_dim(2, d);
    x.mask_fill(off, MASK_LOGIT).max_dim(1).reshape([r, d]) * any
}

/// Min over dim 1, empty rows give zero.
pub fn masked_min<B: Backend>(x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [r, s, d] = x.dims();
    let any = mask.clone().sum_dim(1).clamp_max(1.0);
    let off = mask.reshape([r, s, 1]).equal_elem(0.0).repeat_dim(2, d);
    x.mask_fill(off, -MASK_LOGIT).min_dim(1).reshape([r, d]) * any
}

// ─── Mlp ─────────────────────────────────────────────────────────────────────
/// Linear → ReLU → Dropout → Linear.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Mlp<B> {
    pub fn new(d_in: usize, d_hidden: usize, d_out: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(d_in, d_hidden).init(device),
            fc2: LinearConfig::new(d_hidden, d_out).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        self.fc2.forward(self.dropout.forward(relu(self.fc1.forward(x))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{BatchContext, GraphBatcher};
    use crate::domain::graph::Graph;
    use crate::domain::task::{TaskLevel, TaskType};
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TB = NdArray<f32>;

    fn batch() -> GraphBatch<TB> {
        let ctx = BatchContext {
            task: TaskType::Regression { num_targets: 1 },
            level: TaskLevel::Graph,
            split: None,
            tokens: false,
        };
        let a = Graph::new(2, 1, vec![1.0, 2.0], &[(0, 1), (1, 0)], vec![0.0]);
        let b = Graph::new(3, 1, vec![3.0, 4.0, 5.0], &[(0, 1), (2, 1)], vec![0.0]);
        GraphBatcher::<TB>::new(Default::default(), ctx).batch(vec![a, b])
    }

    fn values<const D: usize>(t: Tensor<TB, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_dense_round_trip() {
        let b = batch();
        let dense = to_dense(b.x.clone(), &b);
        assert_eq!(dense.dims(), [2, 3, 1]);
        assert_eq!(values(dense.clone()), vec![1.0, 2.0, 0.0, 3.0, 4.0, 5.0]);
        assert_eq!(values(from_dense(dense, &b)), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_masked_reductions() {
        let b = batch();
        let nbrs = gather_neighbours(b.x.clone(), &b);
        // node 3 (middle of second graph) hears nodes 2 and 4
        let sum = values(masked_sum(nbrs.clone(), b.nbr_mask.clone()));
        assert_eq!(sum, vec![2.0, 1.0, 0.0, 8.0, 0.0]);
        let max = values(masked_max(nbrs.clone(), b.nbr_mask.clone()));
        assert_eq!(max, vec![2.0, 1.0, 0.0, 5.0, 0.0]);
        let min = values(masked_min(nbrs.clone(), b.nbr_mask.clone()));
        assert_eq!(min, vec![2.0, 1.0, 0.0, 3.0, 0.0]);
        let mean = values(masked_mean(nbrs, b.nbr_mask.clone()));
        assert_eq!(mean, vec![2.0, 1.0, 0.0, 4.0, 0.0]);
    }
}
