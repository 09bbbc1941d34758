// ============================================================
// Layer 5 — Global Attention and the GPS Layer
// ============================================================
// Dense multi-head self-attention over the nodes of each graph,
// with an optional learned bias per hop distance:
//
//   scores[g, h, i, j] = q_i · k_j / sqrt(d_head) + b_h(spd(i, j))
//
// Padding slots are removed from the keys with MASK_LOGIT.
//
// GPS layer (Rampášek et al. 2022):
//
//   local  = Norm(h + Dropout(Conv(h)))
//   global = Norm(h + Dropout(Attn(h)))
//   h'     = Norm(local + global + FFN(local + global))

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::application::config::ConvType;
use crate::data::batcher::GraphBatch;
use crate::ml::conv::GraphConv;
use crate::ml::layers::{from_dense, to_dense, Mlp, MASK_LOGIT};

// ─── Biased attention ────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BiasedAttention<B: Backend> {
    pub query: Linear<B>,
    pub key: Linear<B>,
    pub value: Linear<B>,
    pub output: Linear<B>,
    /// One bias per head for each distance 0..=cutoff+1
    pub spd_bias: Option<Embedding<B>>,
    pub dropout: Dropout,
    pub heads: usize,
}

impl<B: Backend> BiasedAttention<B> {
    pub fn new(d: usize, heads: usize, spd_cutoff: Option<usize>, dropout: f64, device: &B::Device) -> Self {
        Self {
            query: LinearConfig::new(d, d).init(device),
            key: LinearConfig::new(d, d).init(device),
            value: LinearConfig::new(d, d).init(device),
            output: LinearConfig::new(d, d).init(device),
            spd_bias: spd_cutoff.map(|c| EmbeddingConfig::new(c + 2, heads).init(device)),
            dropout: DropoutConfig::new(dropout).init(),
            heads,
        }
    }

    /// x: [G, M, d], key_mask: [G, M] → [G, M, d]
    pub fn forward(&self, x: Tensor<B, 3>, key_mask: Tensor<B, 2>, spd: Option<Tensor<B, 1, Int>>) -> Tensor<B, 3> {
        let [g, m, d] = x.dims();
        let (h, dh) = (self.heads, d / self.heads);

        let split = |t: Tensor<B, 3>| t.reshape([g, m, h, dh]).swap_dims(1, 2);
        let q = split(self.query.forward(x.clone()));
        let k = split(self.key.forward(x.clone()));
        let v = split(self.value.forward(x));

        let mut scores = q.matmul(k.transpose()) / (dh as f64).sqrt();
        if let (Some(table), Some(spd)) = (&self.spd_bias, spd) {
            let bias = table
                .forward(spd.reshape([g, m * m]))
                .reshape([g, m, m, h])
                .permute([0, 3, 1, 2]);
            scores = scores + bias;
        }

        let off = key_mask.reshape([g, 1, 1, m]).equal_elem(0.0).repeat_dim(1, h).repeat_dim(2, m);
        let attn = self.dropout.forward(softmax(scores.mask_fill(off, MASK_LOGIT), 3));
        let context = attn.matmul(v).swap_dims(1, 2).reshape([g, m, d]);
        self.output.forward(context)
    }
}

// ─── GPS layer ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GpsLayer<B: Backend> {
    pub local: GraphConv<B>,
    pub local_norm: LayerNorm<B>,
    pub attention: BiasedAttention<B>,
    pub attention_norm: LayerNorm<B>,
    pub ffn: Mlp<B>,
    pub ffn_norm: LayerNorm<B>,
    pub dropout: Dropout,
}

pub struct GpsLayerOptions {
    pub conv: ConvType,
    pub hidden: usize,
    pub heads: usize,
    pub with_edges: bool,
    pub dropout: f64,
    pub attn_dropout: f64,
    pub pna_delta: f64,
    pub spd_cutoff: Option<usize>,
}

impl<B: Backend> GpsLayer<B> {
    pub fn new(o: &GpsLayerOptions, device: &B::Device) -> Self {
        let d = o.hidden;
        Self {
            local: GraphConv::new(o.conv, d, o.heads, o.with_edges, o.attn_dropout, o.pna_delta, device),
            local_norm: LayerNormConfig::new(d).init(device),
            attention: BiasedAttention::new(d, o.heads, o.spd_cutoff, o.attn_dropout, device),
            attention_norm: LayerNormConfig::new(d).init(device),
            ffn: Mlp::new(d, 2 * d, d, o.dropout, device),
            ffn_norm: LayerNormConfig::new(d).init(device),
            dropout: DropoutConfig::new(o.dropout).init(),
        }
    }

    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let local = self.local.forward(h.clone(), edge, batch);
        let local = self.local_norm.forward(h.clone() + self.dropout.forward(local));

        let dense = to_dense(h.clone(), batch);
        let global = self.attention.forward(dense, batch.dense_mask.clone(), batch.spd.clone());
        let global = from_dense(global, batch);
        let global = self.attention_norm.forward(h + self.dropout.forward(global));

        let h = local + global;
        self.ffn_norm.forward(h.clone() + self.dropout.forward(self.ffn.forward(h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{BatchContext, GraphBatcher};
    use crate::domain::graph::Graph;
    use crate::domain::task::{TaskLevel, TaskType};
    use crate::pe::distance::shortest_paths;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TB = NdArray<f32>;

    fn graphs() -> Vec<Graph> {
        let mut a = Graph::new(3, 2, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], &[(0, 1), (1, 0), (1, 2), (2, 1)], vec![0.0]);
        let mut b = Graph::new(2, 2, vec![1.0, 0.0, 0.0, 1.0], &[(0, 1), (1, 0)], vec![1.0]);
        a.pe.spd = Some(shortest_paths(&a, 4));
        b.pe.spd = Some(shortest_paths(&b, 4));
        vec![a, b]
    }

    fn batch(items: Vec<Graph>) -> GraphBatch<TB> {
        let ctx = BatchContext {
            task: TaskType::Regression { num_targets: 1 },
            level: TaskLevel::Graph,
            split: None,
            tokens: false,
        };
        GraphBatcher::<TB>::new(Default::default(), ctx).batch(items)
    }

    #[test]
    fn test_padding_does_not_leak_into_attention() {
        let device = Default::default();
        let attn = BiasedAttention::<TB>::new(2, 1, Some(4), 0.0, &device);
        let b = batch(graphs());
        let out = attn.forward(to_dense(b.x.clone(), &b), b.dense_mask.clone(), b.spd.clone());
        assert_eq!(out.dims(), [2, 3, 2]);

        // the second graph alone must give the same node outputs
        let single = batch(graphs().split_off(1));
        let alone = attn.forward(to_dense(single.x.clone(), &single), single.dense_mask.clone(), single.spd.clone());
        let together: Vec<f32> = out.into_data().to_vec::<f32>().unwrap();
        let alone: Vec<f32> = alone.into_data().to_vec::<f32>().unwrap();
        for i in 0..4 {
            assert!((together[6 + i] - alone[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gps_layer_shape() {
        let device = Default::default();
        let options = GpsLayerOptions {
            conv: ConvType::Gin,
            hidden: 4,
            heads: 2,
            with_edges: false,
            dropout: 0.0,
            attn_dropout: 0.0,
            pna_delta: 1.0,
            spd_cutoff: Some(4),
        };
        let layer = GpsLayer::<TB>::new(&options, &device);
        let b = batch(graphs());
        let h = Tensor::<TB, 2>::ones([5, 4], &device);
        assert_eq!(layer.forward(h, None, &b).dims(), [5, 4]);
    }
}
