// ============================================================
// Layer 5 — Input Encoders
// ============================================================
// Node encoder: raw node features are projected to
//   hidden_dim − Σ dim_pe
// and the enabled positional encodings fill the remaining
// columns, so the concatenated embedding is exactly hidden_dim.
//
//   LapPE  DeepSet over the eigenpairs of each node:
//          [eigvec_j, eigval_j] → Linear(2, 2·dim_pe) → ReLU
//          → Linear(2·dim_pe, dim_pe) → ReLU, masked sum over j.
//          While training, each eigenvector's sign is flipped at
//          random per batch (eigenvectors are only defined up to
//          sign).
//   RWSE   Linear(steps, dim_pe)
//   ERN    Linear(ern_dim, dim_pe)
//
// Edge encoder: edge rows (base features + ERE column + expander
// flag) projected to hidden_dim.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{activation::relu, Distribution},
};

use crate::data::batcher::GraphBatch;
use crate::ml::layers::masked_sum;

// ─── LapPE ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LapPeEncoder<B: Backend> {
    pub linear_a: Linear<B>,
    pub linear_b: Linear<B>,
}

impl<B: Backend> LapPeEncoder<B> {
    pub fn new(dim_pe: usize, device: &B::Device) -> Self {
        Self {
            linear_a: LinearConfig::new(2, 2 * dim_pe).init(device),
            linear_b: LinearConfig::new(2 * dim_pe, dim_pe).init(device),
        }
    }

    /// eigvec, eigval, valid: [N, k] → [N, dim_pe]
    pub fn forward(&self, eigvec: Tensor<B, 2>, eigval: Tensor<B, 2>, valid: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, k] = eigvec.dims();
        let eigvec = if B::ad_enabled() {
            let flip = Tensor::<B, 2>::random([1, k], Distribution::Bernoulli(0.5), &eigvec.device());
            eigvec * (flip * 2.0 - 1.0)
        } else {
            eigvec
        };
        let pairs = Tensor::cat(vec![eigvec.reshape([n, k, 1]), eigval.reshape([n, k, 1])], 2);
        let h = relu(self.linear_b.forward(relu(self.linear_a.forward(pairs))));
        masked_sum(h, valid)
    }
}

// ─── Node encoder ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct NodeEncoder<B: Backend> {
    pub feature: Linear<B>,
    pub lap: Option<LapPeEncoder<B>>,
    pub rwse: Option<Linear<B>>,
    pub ern: Option<Linear<B>>,
}

/// Input widths of the positional encodings, 0 = disabled.
#[derive(Config, Debug)]
pub struct PeDims {
    #[config(default = 0)]
    pub lap_dim_pe: usize,
    #[config(default = 0)]
    pub rwse_steps: usize,
    #[config(default = 0)]
    pub rwse_dim_pe: usize,
    #[config(default = 0)]
    pub ern_dim: usize,
    #[config(default = 0)]
    pub ern_dim_pe: usize,
}

impl PeDims {
    pub fn total(&self) -> usize {
        self.lap_dim_pe + self.rwse_dim_pe + self.ern_dim_pe
    }
}

impl<B: Backend> NodeEncoder<B> {
    pub fn new(node_dim: usize, hidden: usize, pe: &PeDims, device: &B::Device) -> Self {
        let feature_dim = hidden - pe.total();
        Self {
            feature: LinearConfig::new(node_dim, feature_dim).init(device),
            lap: (pe.lap_dim_pe > 0).then(|| LapPeEncoder::new(pe.lap_dim_pe, device)),
            rwse: (pe.rwse_dim_pe > 0).then(|| LinearConfig::new(pe.rwse_steps, pe.rwse_dim_pe).init(device)),
            ern: (pe.ern_dim_pe > 0).then(|| LinearConfig::new(pe.ern_dim, pe.ern_dim_pe).init(device)),
        }
    }

    /// [N, node_dim] → [N, hidden]
    pub fn forward(&self, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let mut parts = vec![self.feature.forward(batch.x.clone())];
        if let (Some(enc), Some(vec), Some(val), Some(valid)) =
            (&self.lap, &batch.lap_eigvec, &batch.lap_eigval, &batch.lap_valid)
        {
            parts.push(enc.forward(vec.clone(), val.clone(), valid.clone()));
        }
        if let (Some(enc), Some(rwse)) = (&self.rwse, &batch.rwse) {
            parts.push(enc.forward(rwse.clone()));
        }
        if let (Some(enc), Some(ern)) = (&self.ern, &batch.ern) {
            parts.push(enc.forward(ern.clone()));
        }
        Tensor::cat(parts, 1)
    }
}

// ─── Edge encoder ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EdgeEncoder<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> EdgeEncoder<B> {
    pub fn new(edge_dim: usize, hidden: usize, device: &B::Device) -> Self {
        Self { linear: LinearConfig::new(edge_dim, hidden).init(device) }
    }

    /// [E + 1, edge_dim] → [E + 1, hidden]. The trailing dummy row
    /// only ever feeds masked slots.
    pub fn forward(&self, edge_attr: Tensor<B, 2>) -> Tensor<B, 2> {
        self.linear.forward(edge_attr)
    }
}
