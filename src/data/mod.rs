// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from dataset files on disk all
// the way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   {name}.json / TU text files / synthetic generator
//       │
//       ▼
//   DatasetLoader     → picks a source, validates, splits
//       │
//       ▼
//   StandardScaler    → standardises regression targets
//       │
//       ▼
//   (pe module)       → precomputed positional encodings
//       │
//       ▼
//   GraphDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   GraphBatcher      → disjoint-union batches of tensors
//       │
//       ▼
//   GraphLoader       → seeded per-epoch batching
//
// Each module is responsible for exactly one step.

/// Known benchmark names and their task families
pub mod catalog;

/// `{name}.json` graph-list files
pub mod json_source;

/// TU plain-text benchmark directories
pub mod tu_source;

/// Generated `infected-<n>` / `cycles-<n>` datasets
pub mod synthetic;

/// Format dispatch, validation, partitioning
pub mod loader;

/// Seeded train/val/test partitions
pub mod splitter;

/// Target standardisation for regression
pub mod scaler;

/// Implements Burn's Dataset trait for graphs
pub mod dataset;

/// Implements Burn's Batcher trait to create graph batches
pub mod batcher;

/// Epoch iteration over batches
pub mod dataloader;
