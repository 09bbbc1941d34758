// ============================================================
// Positional-Encoding Precomputer
// ============================================================
// One-time, per-graph structural transforms, run over the whole
// dataset before training:
//
//   expander     → random shortcut edges (Exphormer-style)
//   resistance   → ERN node embedding / ERE edge feature
//   laplacian    → LapPE eigenvectors and eigenvalues
//   random_walk  → RWSE return probabilities
//   distance     → all-pairs hop distances for attention bias
//
// Order matters: resistance needs the expander edges to give
// them an ERE value as well.
//
// Results are cached next to the dataset in
//   {dir}/{name}_precomputed_posenc.bin
// (bincode), tagged with a fingerprint of the settings that
// produced them. A cache with another fingerprint or another
// graph count is ignored and overwritten.

pub mod distance;
pub mod expander;
pub mod laplacian;
pub mod random_walk;
pub mod resistance;

use anyhow::{Context, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Instant,
};

use crate::application::config::PosEncConfig;
use crate::domain::collection::GraphCollection;
use crate::domain::graph::{Graph, PositionalEncodings};
use crate::domain::traits::GraphTransform;

/// Graphs inspected when guessing whether a dataset is directed.
const DIRECTEDNESS_SAMPLE: usize = 10;

/// Dense symmetric 0/1 adjacency without self loops.
pub fn symmetric_adjacency(g: &Graph) -> DMatrix<f64> {
    let n = g.num_nodes;
    let a = DMatrix::from_row_slice(n, n, &g.dense_adjacency());
    DMatrix::from_fn(n, n, |r, c| {
        if r != c && (a[(r, c)] > 0.0 || a[(c, r)] > 0.0) {
            1.0
        } else {
            0.0
        }
    })
}

/// True when every sampled graph stores both directions of its edges.
pub fn estimate_undirected(graphs: &[Graph]) -> bool {
    graphs.iter().take(DIRECTEDNESS_SAMPLE).all(Graph::is_undirected)
}

#[derive(Serialize, Deserialize)]
struct PosEncCache {
    fingerprint: String,
    num_graphs: usize,
    encodings: Vec<PositionalEncodings>,
}

/// Builds the transforms for a configuration and runs them.
pub struct PosEncPipeline {
    config: PosEncConfig,
    seed: u64,
}

impl PosEncPipeline {
    pub fn new(config: &PosEncConfig, seed: u64) -> Self {
        Self { config: config.clone(), seed }
    }

    /// Identifies the settings a cache was produced with.
    pub fn fingerprint(&self) -> String {
        let settings = serde_json::to_string(&self.config).unwrap_or_default();
        format!("{settings}|seed={}", self.seed)
    }

    pub fn cache_path(dir: impl AsRef<Path>, dataset: &str) -> PathBuf {
        dir.as_ref().join(format!("{dataset}_precomputed_posenc.bin"))
    }

    fn transforms(&self) -> Vec<Box<dyn GraphTransform>> {
        let c = &self.config;
        let mut t: Vec<Box<dyn GraphTransform>> = Vec::new();
        if c.expander.enable {
            t.push(Box::new(expander::ExpanderTransform::new(
                c.expander.degree,
                c.expander.count,
                c.expander.max_num_iters,
                self.seed,
            )));
        }
        if c.resistance.node || c.resistance.edge {
            t.push(Box::new(resistance::ResistanceTransform::new(
                c.resistance.node,
                c.resistance.edge,
                c.resistance.accuracy,
                self.seed.wrapping_add(1),
            )));
        }
        if c.lap.enable {
            t.push(Box::new(laplacian::LapPeTransform::new(c.lap.k)));
        }
        if c.rwse.enable {
            t.push(Box::new(random_walk::RwseTransform::new(c.rwse.steps)));
        }
        if c.spd.enable {
            t.push(Box::new(distance::SpdTransform::new(c.spd.cutoff)));
        }
        t
    }

    /// Run every enabled transform over `graphs`, in memory.
    pub fn apply(&self, graphs: &mut [Graph]) -> Result<()> {
        for mut transform in self.transforms() {
            let started = Instant::now();
            transform.fit(graphs)?;
            for (i, g) in graphs.iter_mut().enumerate() {
                transform
                    .apply(g)
                    .with_context(|| format!("{} failed on graph {i}", transform.name()))?;
            }
            tracing::info!("{} done in {:.1?}", transform.name(), started.elapsed());
        }
        Ok(())
    }

    /// Fill `collection` with encodings, from the cache when it matches.
    ///
    /// Returns true when the cache was used.
    pub fn precompute(&self, collection: &mut GraphCollection, cache_dir: impl AsRef<Path>) -> Result<bool> {
        if !self.config.any_enabled() {
            return Ok(false);
        }
        let path = Self::cache_path(&cache_dir, &collection.name);
        let fingerprint = self.fingerprint();

        if let Some(cache) = read_cache(&path) {
            if cache.fingerprint == fingerprint && cache.num_graphs == collection.graphs.len() {
                for (g, pe) in collection.graphs.iter_mut().zip(cache.encodings) {
                    g.pe = pe;
                }
                tracing::info!("Loaded precomputed encodings from '{}'", path.display());
                return Ok(true);
            }
            tracing::info!("Cached encodings at '{}' are stale, recomputing", path.display());
        }

        let undirected = estimate_undirected(&collection.graphs);
        tracing::info!(
            "Precomputing encodings for {} graphs ({})",
            collection.graphs.len(),
            if undirected { "undirected" } else { "directed" }
        );
        self.apply(&mut collection.graphs)?;

        let cache = PosEncCache {
            fingerprint,
            num_graphs: collection.graphs.len(),
            encodings: collection.graphs.iter().map(|g| g.pe.clone()).collect(),
        };
        write_cache(&path, &cache)?;
        Ok(false)
    }
}

fn read_cache(path: &Path) -> Option<PosEncCache> {
    let file = File::open(path).ok()?;
    match bincode::deserialize_from(BufReader::new(file)) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("Ignoring unreadable cache '{}': {}", path.display(), e);
            None
        }
    }
}

fn write_cache(path: &Path, cache: &PosEncCache) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create cache '{}'", path.display()))?;
    bincode::serialize_into(BufWriter::new(file), cache)
        .with_context(|| format!("Cannot write cache '{}'", path.display()))?;
    tracing::debug!("Wrote encoding cache '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::SplitIndices;
    use crate::domain::task::{TaskLevel, TaskType};

    fn collection() -> GraphCollection {
        let ring = |n: usize| {
            let edges: Vec<(usize, usize)> = (0..n).flat_map(|i| [(i, (i + 1) % n), ((i + 1) % n, i)]).collect();
            Graph::new(n, 1, vec![1.0; n], &edges, vec![0.0])
        };
        GraphCollection {
            name: "rings".into(),
            level: TaskLevel::Graph,
            task: TaskType::Regression { num_targets: 1 },
            graphs: vec![ring(4), ring(6), ring(5)],
            splits: SplitIndices::default(),
            target_names: Vec::new(),
        }
    }

    fn all_enabled() -> PosEncConfig {
        let mut c = PosEncConfig::default();
        c.lap.enable = true;
        c.lap.k = 3;
        c.rwse.enable = true;
        c.rwse.steps = 4;
        c.resistance.node = true;
        c.resistance.edge = true;
        c.expander.enable = true;
        c.spd.enable = true;
        c
    }

    #[test]
    fn test_symmetric_adjacency_drops_direction_and_loops() {
        let g = Graph::new(3, 1, vec![1.0; 3], &[(0, 1), (1, 1), (2, 0), (0, 2)], vec![0.0]);
        let a = symmetric_adjacency(&g);
        assert_eq!(a[(0, 1)], 1.0);
        assert_eq!(a[(1, 0)], 1.0);
        assert_eq!(a[(1, 1)], 0.0);
        assert_eq!(a[(0, 2)], 1.0);
        assert_eq!(a[(1, 2)], 0.0);
    }

    #[test]
    fn test_every_encoding_is_filled() {
        let mut c = collection();
        PosEncPipeline::new(&all_enabled(), 0).apply(&mut c.graphs).unwrap();
        for g in &c.graphs {
            let pe = &g.pe;
            assert_eq!(pe.lap_eigvec.as_ref().unwrap().len(), g.num_nodes * 3);
            assert_eq!(pe.rwse.as_ref().unwrap().len(), g.num_nodes * 4);
            let extra = pe.expander_edges.as_ref().unwrap().len();
            assert_eq!(pe.ere.as_ref().unwrap().len(), g.num_edges() + extra);
            assert_eq!(pe.spd.as_ref().unwrap().len(), g.num_nodes * g.num_nodes);
            assert_eq!(pe.ern_dim, 3);
        }
    }

    #[test]
    fn test_cache_roundtrip_and_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PosEncPipeline::new(&all_enabled(), 0);

        let mut first = collection();
        assert!(!pipeline.precompute(&mut first, dir.path()).unwrap());
        assert!(PosEncPipeline::cache_path(dir.path(), "rings").exists());

        let mut second = collection();
        assert!(pipeline.precompute(&mut second, dir.path()).unwrap());
        assert_eq!(first.graphs, second.graphs);

        // another seed means another fingerprint
        let mut third = collection();
        assert!(!PosEncPipeline::new(&all_enabled(), 1).precompute(&mut third, dir.path()).unwrap());
    }

    #[test]
    fn test_disabled_pipeline_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = collection();
        assert!(!PosEncPipeline::new(&PosEncConfig::default(), 0).precompute(&mut c, dir.path()).unwrap());
        assert!(!PosEncPipeline::cache_path(dir.path(), "rings").exists());
    }

    #[test]
    fn test_directedness_estimate() {
        let c = collection();
        assert!(estimate_undirected(&c.graphs));
        let g = Graph::new(2, 1, vec![0.0; 2], &[(0, 1)], vec![0.0]);
        assert!(!estimate_undirected(&[g]));
    }
}
