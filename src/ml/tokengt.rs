// ============================================================
// Layer 5 — Tokenized Graph Transformer
// ============================================================
// Every node and every edge becomes one token (Kim et al. 2022):
//
//   node u    : W_n x_u      + W_p [P_u ‖ P_u] + E_type(node)
//   edge u→v  : W_e e_uv     + W_p [P_u ‖ P_v] + E_type(edge)
//   graph     :                                  E_type(graph)
//
// P are the Laplacian eigenvectors used as orthonormal node
// identifiers. A plain pre-LN transformer encoder then runs over
// [graph, nodes.., edges.., padding] and the graph token's final
// state is the graph representation.

use anyhow::{Context, Result};
use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
};

use crate::data::batcher::{GraphBatch, TokenBatch, TOKEN_EDGE, TOKEN_PAD};

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn: MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1: LayerNorm<B>,
    pub norm2: LayerNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn new(d_model: usize, num_heads: usize, dropout: f64, attn_dropout: f64, device: &B::Device) -> Self {
        Self {
            self_attn: MultiHeadAttentionConfig::new(d_model, num_heads).with_dropout(attn_dropout).init(device),
            ffn_linear1: LinearConfig::new(d_model, 2 * d_model).init(device),
            ffn_linear2: LinearConfig::new(2 * d_model, d_model).init(device),
            norm1: LayerNormConfig::new(d_model).init(device),
            norm2: LayerNormConfig::new(d_model).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// Pre-LN block. `pad`: [G, T], true on padding tokens.
    pub fn forward(&self, x: Tensor<B, 3>, pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let normed = self.norm1.forward(x.clone());
        let attn_output = self.self_attn.forward(MhaInput::self_attn(normed).mask_pad(pad)).context;
        let x = x + self.dropout.forward(attn_output);
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(self.norm2.forward(x.clone())))
        );
        x + self.dropout.forward(ffn_out)
    }
}

#[derive(Module, Debug)]
pub struct TokenGt<B: Backend> {
    pub node_proj: Linear<B>,
    pub edge_proj: Option<Linear<B>>,
    pub id_proj: Linear<B>,
    pub type_embedding: Embedding<B>,
    pub layers: Vec<EncoderBlock<B>>,
    pub final_norm: LayerNorm<B>,
    pub dropout: Dropout,
}

pub struct TokenGtOptions {
    pub node_dim: usize,
    /// 0 when edges carry no features
    pub edge_dim: usize,
    /// Eigenvectors per node identifier
    pub lap_k: usize,
    pub hidden: usize,
    pub heads: usize,
    pub num_layers: usize,
    pub dropout: f64,
    pub attn_dropout: f64,
}

impl<B: Backend> TokenGt<B> {
    pub fn new(o: &TokenGtOptions, device: &B::Device) -> Self {
        Self {
            node_proj: LinearConfig::new(o.node_dim, o.hidden).init(device),
            edge_proj: (o.edge_dim > 0).then(|| LinearConfig::new(o.edge_dim, o.hidden).init(device)),
            id_proj: LinearConfig::new(2 * o.lap_k, o.hidden).with_bias(false).init(device),
            type_embedding: EmbeddingConfig::new(TOKEN_PAD as usize + 1, o.hidden).init(device),
            layers: (0..o.num_layers)
                .map(|_| EncoderBlock::new(o.hidden, o.heads, o.dropout, o.attn_dropout, device))
                .collect(),
            final_norm: LayerNormConfig::new(o.hidden).init(device),
            dropout: DropoutConfig::new(o.dropout).init(),
        }
    }

    fn embed(&self, batch: &GraphBatch<B>, tokens: &TokenBatch<B>) -> Tensor<B, 3> {
        let device = batch.x.device();
        let (g, t) = (batch.num_graphs, tokens.max_tokens);

        // Node features with a zero row for non-node tokens
        let nodes = self.node_proj.forward(batch.x.clone());
        let [_, d] = nodes.dims();
        let mut content = Tensor::cat(vec![nodes, Tensor::zeros([1, d], &device)], 0).select(0, tokens.node.clone());

        if let (Some(proj), Some(edges)) = (&self.edge_proj, &batch.edge_attr) {
            // the dummy edge row projects to the bias only; zero it out
            let is_edge = tokens.kind.clone().equal_elem(TOKEN_EDGE).float().reshape([g * t, 1]);
            content = content + proj.forward(edges.clone()).select(0, tokens.edge.clone()) * is_edge;
        }

        let identifiers = batch.lap_eigvec.clone().map(|p| {
            let [_, k] = p.dims();
            let p = Tensor::cat(vec![p, Tensor::zeros([1, k], &device)], 0);
            let pair = Tensor::cat(vec![p.clone().select(0, tokens.id_u.clone()), p.select(0, tokens.id_v.clone())], 1);
            self.id_proj.forward(pair)
        });
        if let Some(ids) = identifiers {
            content = content + ids;
        }

        let types = self.type_embedding.forward(tokens.kind.clone().reshape([g, t]));
        content.reshape([g, t, d]) + types
    }

    /// Graph representations [G, hidden]. Fails on a batch collated
    /// without token tables.
    pub fn forward(&self, batch: &GraphBatch<B>) -> Result<Tensor<B, 2>> {
        let tokens = batch
            .tokens
            .as_ref()
            .context("TokenGT needs a batch collated with token tables")?;
        let pad = tokens.mask.clone().equal_elem(0.0);
        let mut x = self.dropout.forward(self.embed(batch, tokens));
        for layer in &self.layers {
            x = layer.forward(x, pad.clone());
        }
        let x = self.final_norm.forward(x);
        let [g, _, d] = x.dims();
        Ok(x.slice([0..g, 0..1, 0..d]).reshape([g, d]))
    }
}
