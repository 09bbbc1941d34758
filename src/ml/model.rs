// ============================================================
// Layer 5 — Graph Model
// ============================================================
// ModelConfig (a burn Config, saved next to every checkpoint)
// builds one of three architectures behind a single GraphModel:
//
//   mpnn     NodeEncoder → L × MpnnLayer → readout → head
//   gps      NodeEncoder → L × GpsLayer  → readout → head
//   tokengt  TokenGt (graph token)                  → head
//
// Node-level tasks skip the readout: the head runs on every node.
// The head is Linear → ReLU → Linear to `out_dim` logits or values.

use anyhow::Result;
use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::application::config::{ConvType, ExperimentConfig, ModelKind, Readout};
use crate::data::batcher::{edge_input_dim, GraphBatch};
use crate::domain::collection::GraphCollection;
use crate::domain::task::{Split, TaskLevel};
use crate::ml::attention::{GpsLayer, GpsLayerOptions};
use crate::ml::conv::{pna_delta, GraphConv};
use crate::ml::encoders::{EdgeEncoder, NodeEncoder, PeDims};
use crate::ml::layers::{masked_max, masked_mean, masked_sum, to_dense, Mlp};
use crate::ml::tokengt::{TokenGt, TokenGtOptions};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub conv: ConvType,
    pub level: TaskLevel,
    pub node_dim: usize,
    /// Edge input width, 0 when edges carry no features
    pub edge_dim: usize,
    pub out_dim: usize,
    pub pe: PeDims,
    #[config(default = 0)]
    pub lap_k: usize,
    /// Hop-distance attention bias (GPS only)
    pub spd_cutoff: Option<usize>,
    #[config(default = 1.0)]
    pub pna_delta: f64,
    #[config(default = 4)]
    pub num_layers: usize,
    #[config(default = 256)]
    pub hidden_dim: usize,
    #[config(default = 256)]
    pub head_dim: usize,
    #[config(default = 4)]
    pub heads: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
    #[config(default = 0.0)]
    pub attn_dropout: f64,
    #[config(default = "Readout::Mean")]
    pub readout: Readout,
}

impl ModelConfig {
    /// Derive the model shape from an experiment and its (precomputed) data.
    pub fn for_experiment(cfg: &ExperimentConfig, data: &GraphCollection) -> Self {
        let m = &cfg.model;
        let p = &cfg.posenc;
        let first = &data.graphs[0];
        let pe = PeDims::new()
            .with_lap_dim_pe(if first.pe.lap_eigvec.is_some() && m.kind != ModelKind::TokenGt { p.lap.dim_pe } else { 0 })
            .with_rwse_steps(first.pe.rwse_steps)
            .with_rwse_dim_pe(if first.pe.rwse.is_some() { p.rwse.dim_pe } else { 0 })
            .with_ern_dim(first.pe.ern_dim)
            .with_ern_dim_pe(if first.pe.ern.is_some() { p.resistance.dim_pe } else { 0 });

        let spd_cutoff = (m.kind == ModelKind::Gps && first.pe.spd.is_some()).then_some(p.spd.cutoff);
        let delta = if m.conv == ConvType::Pna { training_delta(data) } else { 1.0 };

        ModelConfig::new(m.kind, m.conv, data.level, data.node_dim(), edge_input_dim(first), data.task.output_dim(), pe)
            .with_lap_k(first.pe.lap_k)
            .with_spd_cutoff(spd_cutoff)
            .with_pna_delta(delta)
            .with_num_layers(m.num_layers)
            .with_hidden_dim(m.hidden_dim)
            .with_head_dim(m.head_dim)
            .with_heads(m.heads)
            .with_dropout(m.dropout)
            .with_attn_dropout(m.attn_dropout)
            .with_readout(m.readout)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GraphModel<B> {
        let d = self.hidden_dim;
        let with_edges = self.edge_dim > 0;
        let message_passing = self.kind != ModelKind::TokenGt;

        let node_encoder = message_passing.then(|| NodeEncoder::new(self.node_dim, d, &self.pe, device));
        let edge_encoder = (message_passing && with_edges).then(|| EdgeEncoder::new(self.edge_dim, d, device));

        let mpnn = match self.kind {
            ModelKind::Mpnn => (0..self.num_layers).map(|_| self.build_mpnn_layer(device)).collect(),
            _ => Vec::new(),
        };
        let gps = match self.kind {
            ModelKind::Gps => {
                let options = GpsLayerOptions {
                    conv: self.conv,
                    hidden: d,
                    heads: self.heads,
                    with_edges,
                    dropout: self.dropout,
                    attn_dropout: self.attn_dropout,
                    pna_delta: self.pna_delta,
                    spd_cutoff: self.spd_cutoff,
                };
                (0..self.num_layers).map(|_| GpsLayer::new(&options, device)).collect()
            }
            _ => Vec::new(),
        };
        let tokengt = (self.kind == ModelKind::TokenGt).then(|| {
            TokenGt::new(
                &TokenGtOptions {
                    node_dim: self.node_dim,
                    edge_dim: self.edge_dim,
                    lap_k: self.lap_k,
                    hidden: d,
                    heads: self.heads,
                    num_layers: self.num_layers,
                    dropout: self.dropout,
                    attn_dropout: self.attn_dropout,
                },
                device,
            )
        });

        GraphModel {
            node_encoder,
            edge_encoder,
            mpnn,
            gps,
            tokengt,
            head: Mlp::new(d, self.head_dim, self.out_dim, self.dropout, device),
            node_level: self.level == TaskLevel::Node,
            sum_readout: self.readout == Readout::Sum,
            max_readout: self.readout == Readout::Max,
        }
    }

    fn build_mpnn_layer<B: Backend>(&self, device: &B::Device) -> MpnnLayer<B> {
        let d = self.hidden_dim;
        MpnnLayer {
            conv: GraphConv::new(self.conv, d, self.heads, self.edge_dim > 0, self.attn_dropout, self.pna_delta, device),
            norm: LayerNormConfig::new(d).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Mean log(d + 1) over the in-degrees seen in training, expander
/// edges included.
pub fn training_delta(data: &GraphCollection) -> f64 {
    let graphs: Vec<_> = match data.level {
        TaskLevel::Node => data.graphs.iter().collect(),
        TaskLevel::Graph => data.splits.get(Split::Train).iter().filter_map(|&i| data.graphs.get(i)).collect(),
    };
    pna_delta(graphs.into_iter().flat_map(|g| {
        let mut deg = g.in_degree();
        for &(_, d) in g.pe.expander_edges.as_deref().unwrap_or(&[]) {
            deg[d] += 1;
        }
        deg
    }))
}

// ─── MPNN layer ──────────────────────────────────────────────────────────────
/// h + Dropout(ReLU(Norm(Conv(h))))
#[derive(Module, Debug)]
pub struct MpnnLayer<B: Backend> {
    pub conv: GraphConv<B>,
    pub norm: LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> MpnnLayer<B> {
    pub fn forward(&self, h: Tensor<B, 2>, edge: Option<Tensor<B, 2>>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let update = self.conv.forward(h.clone(), edge, batch);
        h + self.dropout.forward(relu(self.norm.forward(update)))
    }
}

// ─── GraphModel ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GraphModel<B: Backend> {
    pub node_encoder: Option<NodeEncoder<B>>,
    pub edge_encoder: Option<EdgeEncoder<B>>,
    pub mpnn: Vec<MpnnLayer<B>>,
    pub gps: Vec<GpsLayer<B>>,
    pub tokengt: Option<TokenGt<B>>,
    pub head: Mlp<B>,
    pub node_level: bool,
    pub sum_readout: bool,
    pub max_readout: bool,
}

impl<B: Backend> GraphModel<B> {
    /// Predictions [rows, out_dim]: one row per graph, or per node for
    /// node-level tasks.
    pub fn forward(&self, batch: &GraphBatch<B>) -> Result<Tensor<B, 2>> {
        if let Some(tokengt) = &self.tokengt {
            return Ok(self.head.forward(tokengt.forward(batch)?));
        }

        let mut h = match &self.node_encoder {
            Some(enc) => enc.forward(batch),
            None => batch.x.clone(),
        };
        let edge = match (&self.edge_encoder, &batch.edge_attr) {
            (Some(enc), Some(attr)) => Some(enc.forward(attr.clone())),
            _ => None,
        };
        for layer in &self.mpnn {
            h = layer.forward(h, edge.clone(), batch);
        }
        for layer in &self.gps {
            h = layer.forward(h, edge.clone(), batch);
        }

        Ok(if self.node_level {
            self.head.forward(h)
        } else {
            self.head.forward(self.readout(h, batch))
        })
    }

    fn readout(&self, h: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let dense = to_dense(h, batch);
        let mask = batch.dense_mask.clone();
        if self.sum_readout {
            masked_sum(dense, mask)
        } else if self.max_readout {
            masked_max(dense, mask)
        } else {
            masked_mean(dense, mask)
        }
    }
}
