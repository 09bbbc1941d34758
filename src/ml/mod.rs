// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches tensors lives here: the graph
// networks, losses, metrics, the optimisation loop and
// evaluation.
//
// Batches arrive from data::batcher as flat tensors of a
// disjoint-union graph (padded neighbour lists, dense index
// tables, optional token tables). Layers never see Graph
// structs.
//
// What's in this layer:
//
//   layers.rs      gathers, dense <-> sparse, masked pooling, MLP
//   encoders.rs    node features + PEs, edge features
//   conv.rs        GCN / GIN / GAT / GATv2 / PNA
//   attention.rs   biased multi-head attention and the GPS layer
//   tokengt.rs     tokenized graph transformer (pre-LN encoder)
//   model.rs       ModelConfig, GraphModel (MPNN / GPS / TokenGT)
//   loss.rs        masked task losses
//   metrics.rs     regression / binary / multi-class metrics
//   scheduler.rs   learning-rate schedules
//   grad_scaler.rs dynamic loss scaling for gpu-mixed
//   trainer.rs     the epoch loop
//   inferencer.rs  evaluation and checkpoint-restored models
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Rampášek et al. (2022) Recipe for a General,
//            Powerful, Scalable Graph Transformer
//            Kim et al. (2022) Pure Transformers are Powerful
//            Graph Learners

pub mod layers;

pub mod encoders;

/// Message-passing convolutions
pub mod conv;

pub mod attention;

pub mod tokengt;

/// Model configuration and architecture dispatch
pub mod model;

pub mod loss;

pub mod metrics;

pub mod scheduler;

pub mod grad_scaler;

/// Full training loop with evaluation, early stopping and checkpointing
pub mod trainer;

/// Evaluation and checkpoint loading
pub mod inferencer;
