// ============================================================
// Layer 5 — Message-Passing Convolutions
// ============================================================
// Every convolution reads the padded in-neighbour table of a
// GraphBatch:  h[nbr_index] → [N, K, d], masked by nbr_mask.
//
//   GCN     Σ_j  h_j W / sqrt((d_i+1)(d_j+1))  + h_i W / (d_i+1)
//   GIN     MLP(h_i + Σ_j h_j)                  (ε = 0)
//   GINE    MLP(h_i + Σ_j ReLU(h_j + e_ij))     when edges have features
//   GAT     softmax_j LeakyReLU(aₛ·W h_j + a_d·W h_i + aₑ·W e_ij)
//           over N(i) ∪ {i}, one softmax per head, heads concatenated
//   GATv2   softmax_j a · LeakyReLU(W_s h_j + W_d h_i + W_e e_ij)
//   PNA     mean / min / max / std of M([h_i‖h_j‖e_ij]), each scaled
//           by identity, log(d+1)/δ and δ/log(d+1); U([h_i‖aggs])
//
// All layers keep the hidden width: [N, d] → [N, d].

use burn::{
    module::Param,
    nn::{
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{leaky_relu, relu, softmax},
};

use crate::application::config::ConvType;
use crate::data::batcher::GraphBatch;
use crate::ml::layers::{
    gather_edges, gather_neighbours, masked_max, masked_mean, masked_min, masked_sum, Mlp, MASK_LOGIT,
};

const GAT_NEGATIVE_SLOPE: f64 = 0.2;
const PNA_STD_EPS: f64 = 1e-5;

fn zeros_param<B: Backend>(d: usize, device: &B::Device) -> Param<Tensor<B, 1>> {
    Initializer::Zeros.init([d], device)
}

/// Glorot-uniform attention vector, one row per head.
fn attention_param<B: Backend>(heads: usize, head_dim: usize, device: &B::Device) -> Param<Tensor<B, 2>> {
    let bound = (6.0 / (1 + head_dim) as f64).sqrt();
    Initializer::Uniform { min: -bound, max: bound }.init([heads, head_dim], device)
}

// ─── GCN ─────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GcnConv<B: Backend> {
    pub linear: Linear<B>,
    pub bias: Param<Tensor<B, 1>>,
}

impl<B: Backend> GcnConv<B> {
    pub fn new(d: usize, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(d, d).with_bias(false).init(device),
            bias: zeros_param(d, device),
        }
    }

    pub fn forward(&self, h: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let [n, d] = h.dims();
        let xw = self.linear.forward(h);
        let nbrs = gather_neighbours(xw.clone(), batch);
        let agg = (nbrs * batch.gcn_norm.clone().reshape([n, batch.max_degree, 1]))
            .sum_dim(1)
            .reshape([n, d]);
        agg + xw * batch.self_norm.clone() + self.bias.val().unsqueeze::<2>()
    }
}

// ─── GIN / GINE ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GinConv<B: Backend> {
    pub mlp: Mlp<B>,
}

impl<B: Backend> GinConv<B> {
    pub fn new(d: usize, device: &B::Device) -> Self {
        Self { mlp: Mlp::new(d, d, d, 0.0, device) }
    }

    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let nbrs = gather_neighbours(h.clone(), batch);
        let messages = match edge {
            Some(e) => relu(nbrs + gather_edges(e, batch)),
            None => nbrs,
        };
        self.mlp.forward(h + masked_sum(messages, batch.nbr_mask.clone()))
    }
}

// ─── GAT / GATv2 ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GatConv<B: Backend> {
    /// Source projection (the message)
    pub linear: Linear<B>,
    /// GATv2 only: destination projection
    pub linear_dst: Option<Linear<B>>,
    pub linear_edge: Linear<B>,
    /// GAT: aₛ; GATv2: a
    pub att_src: Param<Tensor<B, 2>>,
    /// GAT only
    pub att_dst: Param<Tensor<B, 2>>,
    pub att_edge: Param<Tensor<B, 2>>,
    pub bias: Param<Tensor<B, 1>>,
    pub dropout: Dropout,
    pub heads: usize,
    pub v2: bool,
}

impl<B: Backend> GatConv<B> {
    pub fn new(d: usize, heads: usize, v2: bool, attn_dropout: f64, device: &B::Device) -> Self {
        let head_dim = d / heads;
        Self {
            linear: LinearConfig::new(d, d).with_bias(false).init(device),
            linear_dst: v2.then(|| LinearConfig::new(d, d).with_bias(false).init(device)),
            linear_edge: LinearConfig::new(d, d).with_bias(false).init(device),
            att_src: attention_param(heads, head_dim, device),
            att_dst: attention_param(heads, head_dim, device),
            att_edge: attention_param(heads, head_dim, device),
            bias: zeros_param(d, device),
            dropout: DropoutConfig::new(attn_dropout).init(),
            heads,
            v2,
        }
    }

    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let [n, d] = h.dims();
        let device = h.device();
        let (heads, head_dim) = (self.heads, d / self.heads);
        let slots = batch.max_degree + 1;

        // Neighbours plus a self slot at the end
        let wh = self.linear.forward(h.clone());
        let nbrs = Tensor::cat(vec![gather_neighbours(wh.clone(), batch), wh.clone().reshape([n, 1, d])], 1)
            .reshape([n, slots, heads, head_dim]);
        let mask = Tensor::cat(vec![batch.nbr_mask.clone(), Tensor::ones([n, 1], &device)], 1);
        let edge = edge.map(|e| {
            let e = gather_edges(self.linear_edge.forward(e), batch);
            Tensor::cat(vec![e, Tensor::zeros([n, 1, d], &device)], 1).reshape([n, slots, heads, head_dim])
        });

        let att = |p: &Param<Tensor<B, 2>>| p.val().reshape([1, 1, heads, head_dim]);
        let scores = match &self.linear_dst {
            None => {
                let dst = (wh.reshape([n, 1, heads, head_dim]) * att(&self.att_dst)).sum_dim(3);
                let mut s = (nbrs.clone() * att(&self.att_src)).sum_dim(3) + dst;
                if let Some(e) = edge {
                    s = s + (e * att(&self.att_edge)).sum_dim(3);
                }
                leaky_relu(s, GAT_NEGATIVE_SLOPE)
            }
            Some(lin_dst) => {
                let dst = lin_dst.forward(h).reshape([n, 1, heads, head_dim]);
                let mut z = nbrs.clone() + dst;
                if let Some(e) = edge {
                    z = z + e;
                }
                (leaky_relu(z, GAT_NEGATIVE_SLOPE) * att(&self.att_src)).sum_dim(3)
            }
        };

        // scores: [N, slots, heads, 1]
        let off = mask.reshape([n, slots, 1, 1]).equal_elem(0.0).repeat_dim(2, heads);
        let alpha = self.dropout.forward(softmax(scores.mask_fill(off, MASK_LOGIT), 1));
        (alpha * nbrs).sum_dim(1).reshape([n, d]) + self.bias.val().unsqueeze::<2>()
    }
}

// ─── PNA ─────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct PnaConv<B: Backend> {
    pub pre: Linear<B>,
    pub post: Linear<B>,
    /// Mean of log(d + 1) over training nodes
    pub delta: f64,
}

impl<B: Backend> PnaConv<B> {
    pub fn new(d: usize, with_edges: bool, delta: f64, device: &B::Device) -> Self {
        let msg_in = if with_edges { 3 * d } else { 2 * d };
        Self {
            pre: LinearConfig::new(msg_in, d).init(device),
            // 4 aggregators × 3 scalers, plus the node itself
            post: LinearConfig::new(13 * d, d).init(device),
            delta: delta.max(1e-6),
        }
    }

    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let [n, d] = h.dims();
        let k = batch.max_degree;
        let mask = batch.nbr_mask.clone();

        let mut parts = vec![h.clone().reshape([n, 1, d]).repeat_dim(1, k), gather_neighbours(h.clone(), batch)];
        if let Some(e) = edge {
            parts.push(gather_edges(e, batch));
        }
        let m = self.pre.forward(Tensor::cat(parts, 2));

        let mean = masked_mean(m.clone(), mask.clone());
        let sq_mean = masked_mean(m.clone() * m.clone(), mask.clone());
        let std = (relu(sq_mean - mean.clone() * mean.clone()) + PNA_STD_EPS).sqrt();
        let aggs = Tensor::cat(
            vec![mean, masked_min(m.clone(), mask.clone()), masked_max(m, mask), std],
            1,
        );

        let log_deg = (batch.degree.clone().clamp_min(1.0) + 1.0).log();
        let amplification = log_deg.clone() / self.delta;
        let attenuation = log_deg.recip() * self.delta;
        let scaled = Tensor::cat(vec![aggs.clone(), aggs.clone() * amplification, aggs * attenuation], 1);

        self.post.forward(Tensor::cat(vec![h, scaled], 1))
    }
}

/// Mean log(d + 1) over the nodes of the given in-degrees.
pub fn pna_delta(degrees: impl IntoIterator<Item = usize>) -> f64 {
    let (sum, count) = degrees
        .into_iter()
        .fold((0.0f64, 0usize), |(s, c), d| (s + (d as f64 + 1.0).ln(), c + 1));
    if count == 0 {
        1.0
    } else {
        sum / count as f64
    }
}

// ─── GraphConv ───────────────────────────────────────────────────────────────
/// One of the convolutions above, picked by ConvType.
#[derive(Module, Debug)]
pub enum GraphConv<B: Backend> {
    Gcn(GcnConv<B>),
    Gin(GinConv<B>),
    Gat(GatConv<B>),
    Pna(PnaConv<B>),
}

impl<B: Backend> GraphConv<B> {
    pub fn new(
        conv: ConvType,
        d: usize,
        heads: usize,
        with_edges: bool,
        attn_dropout: f64,
        pna_delta: f64,
        device: &B::Device,
    ) -> Self {
        match conv {
            ConvType::Gcn => Self::Gcn(GcnConv::new(d, device)),
            ConvType::Gin => Self::Gin(GinConv::new(d, device)),
            ConvType::Gat => Self::Gat(GatConv::new(d, heads, false, attn_dropout, device)),
            ConvType::GatV2 => Self::Gat(GatConv::new(d, heads, true, attn_dropout, device)),
            ConvType::Pna => Self::Pna(PnaConv::new(d, with_edges, pna_delta, device)),
        }
    }

    /// `edge` is the encoded edge table [E + 1, d]; GCN ignores it.
    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        match self {
            Self::Gcn(c) => c.forward(h, batch),
            Self::Gin(c) => c.forward(h, edge, batch),
            Self::Gat(c) => c.forward(h, edge, batch),
            Self::Pna(c) => c.forward(h, edge, batch),
        }
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

    fn batch(d: usize) -> GraphBatch<TB> {
        let ctx = BatchContext {
            task: TaskType::Regression { num_targets: 1 },
            level: TaskLevel::Graph,
            split: None,
            tokens: false,
        };
        let tri = Graph::new(3, d, vec![0.5; 3 * d], &[(0, 1), (1, 0), (1, 2), (2, 1), (2, 0), (0, 2)], vec![0.0]);
        let lone = Graph::new(1, d, vec![1.0; d], &[], vec![0.0]);
        GraphBatcher::<TB>::new(Default::default(), ctx).batch(vec![tri, lone])
    }

    #[test]
    fn test_every_conv_keeps_shape() {
        let device = Default::default();
        let d = 8;
        let b = batch(d);
        // 6 real edges plus the dummy row
        let edge = Some(Tensor::<TB, 2>::ones([7, d], &device));
        for conv in [ConvType::Gcn, ConvType::Gin, ConvType::Gat, ConvType::GatV2, ConvType::Pna] {
            let layer = GraphConv::<TB>::new(conv, d, 2, true, 0.0, 1.0, &device);
            let out = layer.forward(b.x.clone(), edge.clone(), &b);
            assert_eq!(out.dims(), [4, d], "{conv:?}");
            let v = out.into_data().to_vec::<f32>().unwrap();
            assert!(v.iter().all(|x| x.is_finite()), "{conv:?} produced non-finite values");
        }
    }

    #[test]
    fn test_conv_type_selects_layer() {
        let device = Default::default();
        let make = |conv| GraphConv::<TB>::new(conv, 4, 2, false, 0.0, 1.0, &device);
        assert!(matches!(make(ConvType::Gcn), GraphConv::Gcn(_)));
        assert!(matches!(make(ConvType::Gin), GraphConv::Gin(_)));
        assert!(matches!(make(ConvType::Gat), GraphConv::Gat(_)));
        assert!(matches!(make(ConvType::GatV2), GraphConv::Gat(c) if c.v2));
        assert!(matches!(make(ConvType::Pna), GraphConv::Pna(_)));
    }

    #[test]
    fn test_gcn_on_isolated_node_is_self_term() {
        let device = Default::default();
        let b = batch(2);
        let conv = GcnConv::<TB>::new(2, &device);
        let out = conv.forward(b.x.clone(), &b).into_data().to_vec::<f32>().unwrap();
        let xw = conv.linear.forward(b.x.clone()).into_data().to_vec::<f32>().unwrap();
        // node 3 has no neighbours: output = xW / (0 + 1)
        assert!((out[6] - xw[6]).abs() < 1e-6);
        assert!((out[7] - xw[7]).abs() < 1e-6);
    }

    #[test]
    fn test_pna_delta() {
        let delta = pna_delta([0, 1, 1]);
        let expected = (1f64.ln() + 2f64.ln() * 2.0) / 3.0;
        assert!((delta - expected).abs() < 1e-12);
        assert_eq!(pna_delta(Vec::<usize>::new()), 1.0);
    }
}
