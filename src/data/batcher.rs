// ============================================================
// Layer 4 — Graph Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<Graph> into one
// disjoint-union batch of tensors.
//
// How batching works here:
//   Graphs of different sizes cannot simply be stacked, so each
//   batch is built twice over:
//
//   1. Sparse view (message passing)
//      All nodes concatenated → x [N, F]. Every node gets a padded
//      row of in-neighbours:  nbr_index [N·K]  nbr_mask [N, K]
//      where K is the largest in-degree in the batch. Padding
//      slots point at node 0 / the dummy edge row and have mask 0.
//
//   2. Dense view (attention, readout)
//      Graphs laid out as [G, M] slots, M = largest graph.
//      dense_index [G·M] points at a node or at row N, which is
//      an all-zero row the model appends to its node states.
//
//   Tokenized transformers additionally get a token table per
//   graph: [graph token, node tokens.., edge tokens.., padding].
//
// Collation runs on the host into `CollatedGraphs` first, which
// is plain data and easy to test; `batch()` then moves it onto
// the device.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::domain::graph::Graph;
use crate::domain::task::{Split, TaskLevel, TaskType};

// ─── Host-side collation ─────────────────────────────────────────────────────

/// Token tables for the tokenized transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTables {
    /// Tokens per graph (max over the batch)
    pub max_tokens: usize,
    /// Node row per token, N for non-node tokens
    pub node: Vec<i32>,
    /// Edge row per token, the dummy edge row for non-edge tokens
    pub edge: Vec<i32>,
    /// 0 = graph token, 1 = node, 2 = edge, 3 = padding
    pub kind: Vec<i32>,
    /// Identifier endpoints (u, v); N selects the zero row
    pub id_u: Vec<i32>,
    pub id_v: Vec<i32>,
    /// [G, T] 1 for real tokens
    pub mask: Vec<f32>,
}

pub const TOKEN_GRAPH: i32 = 0;
pub const TOKEN_NODE: i32 = 1;
pub const TOKEN_EDGE: i32 = 2;
pub const TOKEN_PAD: i32 = 3;

/// Eigen-decomposition inputs of the LapPE encoder, one row per node.
#[derive(Debug, Clone, PartialEq)]
pub struct LapTables {
    pub k: usize,
    pub eigvec: Vec<f32>,
    /// The graph's eigenvalues repeated on every node row
    pub eigval: Vec<f32>,
    /// 1 where the eigenpair is real, 0 where it is padding
    pub valid: Vec<f32>,
}

/// A whole batch as plain host vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct CollatedGraphs {
    pub num_graphs: usize,
    pub num_nodes: usize,
    pub node_dim: usize,
    pub x: Vec<f32>,

    pub max_degree: usize,
    pub nbr_index: Vec<i32>,
    pub nbr_edge: Vec<i32>,
    pub nbr_mask: Vec<f32>,
    pub gcn_norm: Vec<f32>,
    pub self_norm: Vec<f32>,
    pub degree: Vec<f32>,

    /// Real + expander edges; the edge table has one extra zero row
    pub num_edges: usize,
    pub edge_dim: usize,
    pub edge_attr: Vec<f32>,

    pub max_nodes: usize,
    pub dense_index: Vec<i32>,
    pub dense_mask: Vec<f32>,
    pub node_slot: Vec<i32>,

    pub lap: Option<LapTables>,
    pub rwse: Option<(usize, Vec<f32>)>,
    pub ern: Option<(usize, Vec<f32>)>,
    pub spd: Option<Vec<i32>>,
    pub tokens: Option<TokenTables>,

    /// Prediction rows: graphs or nodes
    pub rows: usize,
    pub out_dim: usize,
    /// [rows, out_dim]; NaN → 0, class index → one-hot
    pub target: Vec<f32>,
    pub mask_width: usize,
    /// [rows, mask_width]; 0 for missing labels and out-of-split rows
    pub target_mask: Vec<f32>,
    /// [rows, target_width] as stored, NaN kept
    pub raw_targets: Vec<f32>,
    /// Rows that count towards this split's metrics
    pub row_mask: Vec<bool>,
}

/// What the batcher needs to know beyond the graphs themselves.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext {
    pub task: TaskType,
    pub level: TaskLevel,
    /// Node-level datasets: which mask selects the labelled rows
    pub split: Option<Split>,
    /// Build tokenized-transformer tables
    pub tokens: bool,
}

/// Width of the edge rows after the precomputed columns are appended.
pub fn edge_input_dim(g: &Graph) -> usize {
    g.edge_dim + usize::from(g.pe.ere.is_some()) + usize::from(g.pe.expander_edges.is_some())
}

pub fn collate(items: &[Graph], ctx: &BatchContext) -> CollatedGraphs {
    let first = &items[0];
    let num_graphs = items.len();
    let node_dim = first.node_dim;
    let base_edge_dim = first.edge_dim;
    let has_ere = first.pe.ere.is_some();
    let has_exp = first.pe.expander_edges.is_some();
    let edge_dim = edge_input_dim(first);

    let num_nodes: usize = items.iter().map(|g| g.num_nodes).sum();
    let max_nodes = items.iter().map(|g| g.num_nodes).max().unwrap_or(0);

    // ── Nodes, edges and neighbour lists ─────────────────────────────────────
    let mut x = Vec::with_capacity(num_nodes * node_dim);
    let mut edge_attr = Vec::new();
    let mut in_lists: Vec<Vec<(usize, usize)>> = Vec::with_capacity(num_nodes);
    let mut node_offset = 0;
    let mut edge_offset = 0;
    let mut graph_edge_offsets = Vec::with_capacity(num_graphs);

    for g in items {
        x.extend_from_slice(&g.x);
        let mut lists = vec![Vec::new(); g.num_nodes];
        let expander = g.pe.expander_edges.as_deref().unwrap_or(&[]);
        let real = g.num_edges();

        for e in 0..real {
            edge_attr.extend_from_slice(g.edge_row(e));
            if has_ere {
                edge_attr.push(ere_value(g, e));
            }
            if has_exp {
                edge_attr.push(0.0);
            }
            lists[g.dst[e]].push((node_offset + g.src[e], edge_offset + e));
        }
        for (j, &(s, d)) in expander.iter().enumerate() {
            edge_attr.extend(std::iter::repeat(0.0).take(base_edge_dim));
            if has_ere {
                edge_attr.push(ere_value(g, real + j));
            }
            edge_attr.push(1.0);
            lists[d].push((node_offset + s, edge_offset + real + j));
        }

        graph_edge_offsets.push(edge_offset);
        in_lists.extend(lists);
        node_offset += g.num_nodes;
        edge_offset += real + expander.len();
    }
    let num_edges = edge_offset;
    // Dummy row targeted by padding slots
    edge_attr.extend(std::iter::repeat(0.0).take(edge_dim));

    let max_degree = in_lists.iter().map(|l| l.len()).max().unwrap_or(0).max(1);
    let degree: Vec<f32> = in_lists.iter().map(|l| l.len() as f32).collect();
    let mut nbr_index = vec![0i32; num_nodes * max_degree];
    let mut nbr_edge = vec![num_edges as i32; num_nodes * max_degree];
    let mut nbr_mask = vec![0.0f32; num_nodes * max_degree];
    let mut gcn_norm = vec![0.0f32; num_nodes * max_degree];
    for (i, list) in in_lists.iter().enumerate() {
        for (slot, &(s, e)) in list.iter().enumerate() {
            let at = i * max_degree + slot;
            nbr_index[at] = s as i32;
            nbr_edge[at] = e as i32;
            nbr_mask[at] = 1.0;
            gcn_norm[at] = 1.0 / ((degree[i] + 1.0) * (degree[s] + 1.0)).sqrt();
        }
    }
    let self_norm = degree.iter().map(|d| 1.0 / (d + 1.0)).collect();

    // ── Dense view ───────────────────────────────────────────────────────────
    let mut dense_index = vec![num_nodes as i32; num_graphs * max_nodes];
    let mut dense_mask = vec![0.0f32; num_graphs * max_nodes];
    let mut node_slot = Vec::with_capacity(num_nodes);
    let mut offset = 0;
    for (gi, g) in items.iter().enumerate() {
        for local in 0..g.num_nodes {
            let slot = gi * max_nodes + local;
            dense_index[slot] = (offset + local) as i32;
            dense_mask[slot] = 1.0;
            node_slot.push(slot as i32);
        }
        offset += g.num_nodes;
    }

    // ── Positional encodings ─────────────────────────────────────────────────
    let lap = first.pe.lap_eigvec.as_ref().map(|_| {
        let k = first.pe.lap_k;
        let mut t = LapTables {
            k,
            eigvec: Vec::with_capacity(num_nodes * k),
            eigval: Vec::with_capacity(num_nodes * k),
            valid: Vec::with_capacity(num_nodes * k),
        };
        for g in items {
            let vecs = g.pe.lap_eigvec.as_deref().unwrap_or(&[]);
            let vals = g.pe.lap_eigval.as_deref().unwrap_or(&[]);
            for i in 0..g.num_nodes {
                t.eigvec.extend(row_or_zeros(vecs, i, k));
                t.eigval.extend(row_or_zeros(vals, 0, k));
                t.valid.extend((0..k).map(|j| if j < g.pe.lap_valid { 1.0 } else { 0.0 }));
            }
        }
        t
    });
    let rwse = first.pe.rwse.as_ref().map(|_| {
        let steps = first.pe.rwse_steps;
        let v = items
            .iter()
            .flat_map(|g| (0..g.num_nodes).flat_map(move |i| row_or_zeros(g.pe.rwse.as_deref().unwrap_or(&[]), i, steps)))
            .collect();
        (steps, v)
    });
    let ern = first.pe.ern.as_ref().map(|_| {
        let dim = first.pe.ern_dim;
        let v = items
            .iter()
            .flat_map(|g| (0..g.num_nodes).flat_map(move |i| row_or_zeros(g.pe.ern.as_deref().unwrap_or(&[]), i, dim)))
            .collect();
        (dim, v)
    });
    let spd = first.pe.spd.as_ref().map(|_| {
        let m = max_nodes;
        let mut out = vec![0i32; num_graphs * m * m];
        for (gi, g) in items.iter().enumerate() {
            if let Some(d) = &g.pe.spd {
                let n = g.num_nodes;
                for a in 0..n {
                    for b in 0..n {
                        out[gi * m * m + a * m + b] = d[a * n + b] as i32;
                    }
                }
            }
        }
        out
    });

    let tokens = ctx.tokens.then(|| token_tables(items, &graph_edge_offsets, num_nodes, num_edges));

    // ── Targets ──────────────────────────────────────────────────────────────
    let width = ctx.task.target_width();
    let out_dim = ctx.task.output_dim();
    let (rows, raw_targets, row_mask) = match ctx.level {
        TaskLevel::Graph => (
            num_graphs,
            items.iter().flat_map(|g| g.y.iter().copied()).collect::<Vec<f32>>(),
            vec![true; num_graphs],
        ),
        TaskLevel::Node => {
            let mut mask = Vec::with_capacity(num_nodes);
            for g in items {
                match (ctx.split, &g.node_masks) {
                    (Some(split), Some(m)) => mask.extend_from_slice(m.mask(split)),
                    _ => mask.extend(std::iter::repeat(true).take(g.num_nodes)),
                }
            }
            (num_nodes, items.iter().flat_map(|g| g.y.iter().copied()).collect(), mask)
        }
    };

    let (target, mask_width, target_mask) = match ctx.task {
        TaskType::MultiClass { num_classes } => {
            let mut t = vec![0.0f32; rows * num_classes];
            let mut m = vec![0.0f32; rows];
            for r in 0..rows {
                let c = raw_targets[r];
                if c.is_finite() && row_mask[r] {
                    t[r * num_classes + c as usize] = 1.0;
                    m[r] = 1.0;
                }
            }
            (t, 1, m)
        }
        _ => {
            let mut t = Vec::with_capacity(rows * width);
            let mut m = Vec::with_capacity(rows * width);
            for (i, &v) in raw_targets.iter().enumerate() {
                let valid = v.is_finite() && row_mask[i / width];
                t.push(if valid { v } else { 0.0 });
                m.push(if valid { 1.0 } else { 0.0 });
            }
            (t, width, m)
        }
    };

    CollatedGraphs {
        num_graphs,
        num_nodes,
        node_dim,
        x,
        max_degree,
        nbr_index,
        nbr_edge,
        nbr_mask,
        gcn_norm,
        self_norm,
        degree,
        num_edges,
        edge_dim,
        edge_attr,
        max_nodes,
        dense_index,
        dense_mask,
        node_slot,
        lap,
        rwse,
        ern,
        spd,
        tokens,
        rows,
        out_dim,
        target,
        mask_width,
        target_mask,
        raw_targets,
        row_mask,
    }
}

fn ere_value(g: &Graph, e: usize) -> f32 {
    g.pe.ere.as_ref().and_then(|v| v.get(e).copied()).unwrap_or(0.0)
}

/// Row `i` of a row-major table with `width` columns, zeros if absent.
fn row_or_zeros(table: &[f32], i: usize, width: usize) -> Vec<f32> {
    table
        .get(i * width..(i + 1) * width)
        .map(<[f32]>::to_vec)
        .unwrap_or_else(|| vec![0.0; width])
}

fn token_tables(items: &[Graph], edge_offsets: &[usize], num_nodes: usize, num_edges: usize) -> TokenTables {
    let max_tokens = items.iter().map(|g| 1 + g.num_nodes + g.num_edges()).max().unwrap_or(1);
    let total = items.len() * max_tokens;
    let pad_node = num_nodes as i32;
    let mut t = TokenTables {
        max_tokens,
        node: vec![pad_node; total],
        edge: vec![num_edges as i32; total],
        kind: vec![TOKEN_PAD; total],
        id_u: vec![pad_node; total],
        id_v: vec![pad_node; total],
        mask: vec![0.0; total],
    };
    let mut node_offset = 0;
    for (gi, g) in items.iter().enumerate() {
        let base = gi * max_tokens;
        t.kind[base] = TOKEN_GRAPH;
        t.mask[base] = 1.0;
        for i in 0..g.num_nodes {
            let at = base + 1 + i;
            let node = (node_offset + i) as i32;
            t.kind[at] = TOKEN_NODE;
            t.node[at] = node;
            t.id_u[at] = node;
            t.id_v[at] = node;
            t.mask[at] = 1.0;
        }
        for e in 0..g.num_edges() {
            let at = base + 1 + g.num_nodes + e;
            t.kind[at] = TOKEN_EDGE;
            t.edge[at] = (edge_offsets[gi] + e) as i32;
            t.id_u[at] = (node_offset + g.src[e]) as i32;
            t.id_v[at] = (node_offset + g.dst[e]) as i32;
            t.mask[at] = 1.0;
        }
        node_offset += g.num_nodes;
    }
    t
}

// ─── GraphBatch ──────────────────────────────────────────────────────────────
/// Token tables on the device.
#[derive(Debug, Clone)]
pub struct TokenBatch<B: Backend> {
    pub max_tokens: usize,
    pub node: Tensor<B, 1, Int>,
    pub edge: Tensor<B, 1, Int>,
    pub kind: Tensor<B, 1, Int>,
    pub id_u: Tensor<B, 1, Int>,
    pub id_v: Tensor<B, 1, Int>,
    pub mask: Tensor<B, 2>,
}

/// A batch of graphs ready for the model forward pass.
///
/// B is the Burn Backend (e.g. Wgpu, NdArray),
/// generic so the same batcher works on any device.
#[derive(Debug, Clone)]
pub struct GraphBatch<B: Backend> {
    pub num_graphs: usize,
    pub num_nodes: usize,
    pub max_nodes: usize,
    pub max_degree: usize,

    /// [N, node_dim]
    pub x: Tensor<B, 2>,
    /// [N·K] source node of each neighbour slot
    pub nbr_index: Tensor<B, 1, Int>,
    /// [N·K] edge row of each neighbour slot
    pub nbr_edge: Tensor<B, 1, Int>,
    /// [N, K]
    pub nbr_mask: Tensor<B, 2>,
    /// [N, K] symmetric GCN weights
    pub gcn_norm: Tensor<B, 2>,
    /// [N, 1]
    pub self_norm: Tensor<B, 2>,
    /// [N, 1] in-degree
    pub degree: Tensor<B, 2>,
    /// [E + 1, edge_dim], None when edges carry no features
    pub edge_attr: Option<Tensor<B, 2>>,

    /// [G·M] node row per dense slot, N for empty slots
    pub dense_index: Tensor<B, 1, Int>,
    /// [G, M]
    pub dense_mask: Tensor<B, 2>,
    /// [N] dense slot of each node
    pub node_slot: Tensor<B, 1, Int>,

    pub lap_eigvec: Option<Tensor<B, 2>>,
    pub lap_eigval: Option<Tensor<B, 2>>,
    pub lap_valid: Option<Tensor<B, 2>>,
    pub rwse: Option<Tensor<B, 2>>,
    pub ern: Option<Tensor<B, 2>>,
    /// [G·M·M] clamped hop distances
    pub spd: Option<Tensor<B, 1, Int>>,
    pub tokens: Option<TokenBatch<B>>,

    /// [rows, out_dim]
    pub target: Tensor<B, 2>,
    /// [rows, mask_width]
    pub target_mask: Tensor<B, 2>,

    /// Host copies used by the metric logger
    pub raw_targets: Vec<f32>,
    pub row_mask: Vec<bool>,
}

fn floats<B: Backend>(v: &[f32], shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_floats(v, device).reshape(shape)
}

fn ints<B: Backend>(v: &[i32], device: &B::Device) -> Tensor<B, 1, Int> {
    Tensor::<B, 1, Int>::from_ints(v, device)
}

// ─── GraphBatcher ────────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the correct
/// GPU/CPU, plus the task context needed to encode targets.
#[derive(Clone, Debug)]
pub struct GraphBatcher<B: Backend> {
    pub device: B::Device,
    pub context: BatchContext,
}

impl<B: Backend> GraphBatcher<B> {
    pub fn new(device: B::Device, context: BatchContext) -> Self {
        Self { device, context }
    }

    pub fn to_device(&self, c: CollatedGraphs) -> GraphBatch<B> {
        let d = &self.device;
        let (n, k, g, m) = (c.num_nodes, c.max_degree, c.num_graphs, c.max_nodes);

        let (lap_eigvec, lap_eigval, lap_valid) = match &c.lap {
            Some(l) => (
                Some(floats(&l.eigvec, [n, l.k], d)),
                Some(floats(&l.eigval, [n, l.k], d)),
                Some(floats(&l.valid, [n, l.k], d)),
            ),
            None => (None, None, None),
        };

        let tokens = c.tokens.as_ref().map(|t| TokenBatch {
            max_tokens: t.max_tokens,
            node: ints(&t.node, d),
            edge: ints(&t.edge, d),
            kind: ints(&t.kind, d),
            id_u: ints(&t.id_u, d),
            id_v: ints(&t.id_v, d),
            mask: floats(&t.mask, [g, t.max_tokens], d),
        });

        GraphBatch {
            num_graphs: g,
            num_nodes: n,
            max_nodes: m,
            max_degree: k,
            x: floats(&c.x, [n, c.node_dim], d),
            nbr_index: ints(&c.nbr_index, d),
            nbr_edge: ints(&c.nbr_edge, d),
            nbr_mask: floats(&c.nbr_mask, [n, k], d),
            gcn_norm: floats(&c.gcn_norm, [n, k], d),
            self_norm: floats(&c.self_norm, [n, 1], d),
            degree: floats(&c.degree, [n, 1], d),
            edge_attr: (c.edge_dim > 0).then(|| floats(&c.edge_attr, [c.num_edges + 1, c.edge_dim], d)),
            dense_index: ints(&c.dense_index, d),
            dense_mask: floats(&c.dense_mask, [g, m], d),
            node_slot: ints(&c.node_slot, d),
            lap_eigvec,
            lap_eigval,
            lap_valid,
            rwse: c.rwse.as_ref().map(|(w, v)| floats(v, [n, *w], d)),
            ern: c.ern.as_ref().map(|(w, v)| floats(v, [n, *w], d)),
            spd: c.spd.as_ref().map(|v| ints(v, d)),
            tokens,
            target: floats(&c.target, [c.rows, c.out_dim], d),
            target_mask: floats(&c.target_mask, [c.rows, c.mask_width], d),
            raw_targets: c.raw_targets,
            row_mask: c.row_mask,
        }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<Graph, GraphBatch<B>> for GraphBatcher<B> {
    fn batch(&self, items: Vec<Graph>) -> GraphBatch<B> {
        self.to_device(collate(&items, &self.context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::NodeMasks;

    fn ctx(task: TaskType) -> BatchContext {
        BatchContext { task, level: TaskLevel::Graph, split: None, tokens: false }
    }

    fn path(n: usize, y: f32) -> Graph {
        let mut edges = Vec::new();
        for i in 0..n - 1 {
            edges.push((i, i + 1));
            edges.push((i + 1, i));
        }
        Graph::new(n, 1, vec![1.0; n], &edges, vec![y])
    }

    #[test]
    fn test_union_offsets_and_neighbours() {
        let c = collate(&[path(2, 0.0), path(3, 1.0)], &ctx(TaskType::Regression { num_targets: 1 }));
        assert_eq!(c.num_nodes, 5);
        assert_eq!(c.max_degree, 2);
        // node 3 is the middle of the second path: neighbours 2 and 4
        let slots = &c.nbr_index[3 * 2..4 * 2];
        let mut got = slots.to_vec();
        got.sort();
        assert_eq!(got, vec![2, 4]);
        assert_eq!(&c.nbr_mask[0..2], &[1.0, 0.0]);
        // padding slots point at the dummy edge row
        assert_eq!(c.nbr_edge[1], c.num_edges as i32);
    }

    #[test]
    fn test_gcn_norm_values() {
        let c = collate(&[path(2, 0.0)], &ctx(TaskType::Regression { num_targets: 1 }));
        // both endpoints have degree 1: 1/sqrt(2·2)
        assert!((c.gcn_norm[0] - 0.5).abs() < 1e-6);
        assert!((c.self_norm[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_dense_layout() {
        let c = collate(&[path(2, 0.0), path(3, 1.0)], &ctx(TaskType::Regression { num_targets: 1 }));
        assert_eq!(c.max_nodes, 3);
        assert_eq!(c.dense_index, vec![0, 1, 5, 2, 3, 4]);
        assert_eq!(c.dense_mask, vec![1.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(c.node_slot, vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn test_multiclass_targets_are_one_hot() {
        let c = collate(&[path(2, 2.0), path(2, 0.0)], &ctx(TaskType::MultiClass { num_classes: 3 }));
        assert_eq!(c.target, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(c.target_mask, vec![1.0, 1.0]);
    }

    #[test]
    fn test_missing_binary_label_is_masked() {
        let mut g = path(2, 0.0);
        g.y = vec![1.0, f32::NAN];
        let c = collate(&[g], &ctx(TaskType::Binary { num_tasks: 2 }));
        assert_eq!(c.target, vec![1.0, 0.0]);
        assert_eq!(c.target_mask, vec![1.0, 0.0]);
        assert!(c.raw_targets[1].is_nan());
    }

    #[test]
    fn test_node_split_mask() {
        let mut g = path(3, 0.0);
        g.y = vec![0.0, 1.0, 0.0];
        g.node_masks = Some(NodeMasks {
            train: vec![true, false, false],
            val: vec![false, true, false],
            test: vec![false, false, true],
        });
        let context = BatchContext {
            task: TaskType::MultiClass { num_classes: 2 },
            level: TaskLevel::Node,
            split: Some(Split::Val),
            tokens: false,
        };
        let c = collate(&[g], &context);
        assert_eq!(c.rows, 3);
        assert_eq!(c.row_mask, vec![false, true, false]);
        assert_eq!(c.target_mask, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_expander_and_ere_columns() {
        let mut g = path(3, 0.0).with_edge_attr(1, vec![5.0; 4]);
        g.pe.expander_edges = Some(vec![(0, 2), (2, 0)]);
        g.pe.ere = Some(vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
        let c = collate(&[g], &ctx(TaskType::Regression { num_targets: 1 }));
        assert_eq!(c.edge_dim, 3);
        assert_eq!(c.num_edges, 6);
        // first real edge: [attr, ere, flag]
        assert_eq!(&c.edge_attr[0..3], &[5.0, 1.0, 0.0]);
        // first expander edge
        assert_eq!(&c.edge_attr[12..15], &[0.0, 2.0, 1.0]);
        // dummy row
        assert_eq!(c.edge_attr.len(), 7 * 3);
        // node 2 now also hears node 0
        assert_eq!(c.degree[2], 2.0);
    }

    #[test]
    fn test_token_tables() {
        let context = BatchContext { tokens: true, ..ctx(TaskType::Regression { num_targets: 1 }) };
        let c = collate(&[path(2, 0.0), path(3, 1.0)], &context);
        let t = c.tokens.unwrap();
        // second graph: 1 + 3 nodes + 4 edges
        assert_eq!(t.max_tokens, 8);
        assert_eq!(&t.kind[0..5], &[TOKEN_GRAPH, TOKEN_NODE, TOKEN_NODE, TOKEN_EDGE, TOKEN_EDGE]);
        assert_eq!(t.kind[5], TOKEN_PAD);
        // first edge token of graph 2 is 2→3 in union numbering
        assert_eq!((t.id_u[8 + 4], t.id_v[8 + 4]), (2, 3));
        assert_eq!(t.edge[8 + 4], 2);
    }
}
