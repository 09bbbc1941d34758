// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between layers. The application layer only sees
// these traits, so a new dataset format or a new tracker
// backend plugs in without touching the workflow code.
//
//   GraphSource         — JsonGraphSource, TuGraphSource, SyntheticSource
//   GraphTransform      — the positional-encoding precomputers
//   ExperimentTracker   — JsonlTracker, NoopTracker

use anyhow::Result;
use serde_json::Value;

use crate::domain::collection::GraphCollection;
use crate::domain::graph::Graph;

// ─── GraphSource ─────────────────────────────────────────────────────────────
/// Any component that can produce a dataset of graphs.
pub trait GraphSource {
    /// Load every graph together with its task and partition.
    fn load(&self) -> Result<GraphCollection>;
}

// ─── GraphTransform ──────────────────────────────────────────────────────────
/// A one-time, per-graph precomputation.
/// Applied in memory over a whole dataset before training.
pub trait GraphTransform {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Look at the whole dataset once before any graph is transformed.
    fn fit(&mut self, _graphs: &[Graph]) -> Result<()> {
        Ok(())
    }

    /// Mutate `graph` in place (usually filling a `pe` field).
    fn apply(&mut self, graph: &mut Graph) -> Result<()>;
}

// ─── ExperimentTracker ───────────────────────────────────────────────────────
/// Receives epoch-level records as training progresses.
pub trait ExperimentTracker {
    /// Record one flat map of values at a given epoch.
    fn log(&mut self, epoch: usize, values: &Value) -> Result<()>;

    /// Record run-level summary values (best epoch, final test metrics).
    fn summary(&mut self, values: &Value) -> Result<()>;

    /// Flush and close the run.
    fn finish(&mut self) -> Result<()>;
}
