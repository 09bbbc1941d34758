// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the system works with:
// graphs, their precomputed positional encodings, and the
// learning task attached to a dataset.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits
//
// Everything above this layer (data, pe, ml, infra) speaks in
// these types, so they are cheap to test without a device.

// A single graph sample and its positional encodings
pub mod graph;

// Task level / task type / split enums
pub mod task;

// A whole loaded dataset with its partitions
pub mod collection;

// Core abstractions (traits) that other layers implement
pub mod traits;
