// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns of a training run:
//
//   checkpoint.rs      model / optimiser / trainer state per
//                      epoch via Burn's CompactRecorder, plus
//                      the ModelConfig as JSON so evaluation
//                      can rebuild the model
//
//   early_stopping.rs  monitored quantity, best epoch,
//                      patience
//
//   metrics.rs         per-epoch records and metrics.csv
//
//   tracker.rs         experiment trackers (JSONL file, no-op)
//
//   npy.rs             NumPy .npy output of final test
//                      predictions and metrics
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

pub mod early_stopping;

/// Training metrics CSV logger
pub mod metrics;

pub mod npy;

pub mod tracker;
