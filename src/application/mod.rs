// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one command: train, evaluate, precompute or inspect.
//
// Rules for this layer:
//   - No tensor code here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Experiment configuration shared by every command
pub mod config;

// Load → encode → scale, shared by train and evaluate
pub mod prepare;

// The training workflow
pub mod train_use_case;

// Inference over a finished run
pub mod evaluate_use_case;

// precompute / inspect
pub mod dataset_use_case;
