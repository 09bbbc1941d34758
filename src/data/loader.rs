// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Picks the right source for a dataset name, loads it, and turns
// the raw result into a collection every later stage can trust:
//
//   1. dispatch   json / tu / synthetic (or auto-detect)
//   2. validate   every graph's shapes against the task
//   3. partition  file split if present, else a seeded split;
//                 a lone node-level graph gets seeded masks if it
//                 arrived without any, several unmasked node-level
//                 graphs are split by graph
//
// A graph that fails validation aborts loading with its index
// in the error message.

use anyhow::{bail, ensure, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::application::config::{DatasetConfig, DatasetFormat};
use crate::data::{
    json_source::JsonGraphSource, splitter, synthetic::SyntheticSource, tu_source::TuGraphSource,
};
use crate::domain::collection::{GraphCollection, SplitIndices};
use crate::domain::task::{Split, TaskLevel, TaskType};
use crate::domain::traits::GraphSource;

/// Loads any supported dataset from a `DatasetConfig`.
/// Implements the GraphSource trait from Layer 3.
pub struct DatasetLoader {
    config: DatasetConfig,
    seed: u64,
}

impl DatasetLoader {
    pub fn new(config: &DatasetConfig, seed: u64) -> Self {
        Self { config: config.clone(), seed }
    }

    fn json_path(&self) -> PathBuf {
        Path::new(&self.config.dir).join(format!("{}.json", self.config.name))
    }

    fn resolve_format(&self) -> Result<DatasetFormat> {
        let name = &self.config.name;
        Ok(match self.config.format {
            DatasetFormat::Auto => {
                if SyntheticSource::recognises(name) {
                    DatasetFormat::Synthetic
                } else if self.json_path().exists() {
                    DatasetFormat::Json
                } else if TuGraphSource::exists(Path::new(&self.config.dir), name) {
                    DatasetFormat::Tu
                } else {
                    bail!(
                        "Cannot find dataset '{name}' in '{}' (looked for {name}.json and {name}/{name}_A.txt)",
                        self.config.dir
                    );
                }
            }
            explicit => explicit,
        })
    }
}

impl GraphSource for DatasetLoader {
    fn load(&self) -> Result<GraphCollection> {
        let cfg = &self.config;
        ensure!(!cfg.name.is_empty(), "No dataset name given");

        let format = self.resolve_format()?;
        tracing::info!("Loading dataset '{}' ({:?} format)", cfg.name, format);

        let mut collection = match format {
            DatasetFormat::Json => {
                JsonGraphSource::new(self.json_path(), &cfg.name, cfg.one_hot, cfg.target_name.clone()).load()?
            }
            DatasetFormat::Tu => TuGraphSource::new(&cfg.dir, &cfg.name, cfg.one_hot).load()?,
            DatasetFormat::Synthetic => SyntheticSource::new(&cfg.name, self.seed)?.load()?,
            DatasetFormat::Auto => bail!("dataset format could not be resolved"),
        };

        validate_collection(&collection)?;
        assign_splits(&mut collection, cfg.train_fraction, cfg.val_fraction, self.seed)?;

        tracing::info!(
            "Loaded {} graphs: {} train / {} val / {} test",
            collection.graphs.len(),
            collection.split_size(Split::Train),
            collection.split_size(Split::Val),
            collection.split_size(Split::Test)
        );
        Ok(collection)
    }
}

fn validate_collection(c: &GraphCollection) -> Result<()> {
    ensure!(!c.graphs.is_empty(), "Dataset '{}' contains no graphs", c.name);
    let width = c.task.target_width();
    let node_level = c.is_node_level();
    let (node_dim, edge_dim) = (c.node_dim(), c.edge_dim());
    for (i, g) in c.graphs.iter().enumerate() {
        g.validate(width, node_level)
            .with_context(|| format!("Graph {i} of '{}' is malformed", c.name))?;
        ensure!(g.node_dim == node_dim, "Graph {i} has node dim {}, expected {node_dim}", g.node_dim);
        ensure!(g.edge_dim == edge_dim, "Graph {i} has edge dim {}, expected {edge_dim}", g.edge_dim);
    }
    if let TaskType::MultiClass { num_classes } = c.task {
        let bad = c
            .graphs
            .iter()
            .flat_map(|g| g.y.iter())
            .find(|v| v.is_finite() && (**v < 0.0 || **v as usize >= num_classes));
        if let Some(v) = bad {
            bail!("class label {v} out of range for {num_classes} classes");
        }
    }
    Ok(())
}

fn assign_splits(c: &mut GraphCollection, train_fraction: f64, val_fraction: f64, seed: u64) -> Result<()> {
    match c.level {
        TaskLevel::Node if c.graphs.len() == 1 => {
            c.splits = SplitIndices::single_graph();
            let g = &mut c.graphs[0];
            if g.node_masks.is_none() {
                tracing::debug!("No node masks in '{}', generating a seeded split", c.name);
                g.node_masks = Some(splitter::split_nodes(g.num_nodes, train_fraction, val_fraction, seed));
            }
        }
        TaskLevel::Node => {
            let total = c.graphs.len();
            let masked = c.graphs.iter().filter(|g| g.node_masks.is_some()).count();
            if masked == total {
                // Masks pick the nodes, so every split visits every graph
                let all: Vec<usize> = (0..total).collect();
                c.splits = SplitIndices { train: all.clone(), val: all.clone(), test: all };
            } else {
                ensure!(
                    masked == 0,
                    "Node-level dataset '{}' has node masks on {masked} of {total} graphs",
                    c.name
                );
                tracing::debug!("'{}': {total} unmasked graphs, splitting by graph", c.name);
                partition_graphs(c, train_fraction, val_fraction, seed)?;
            }
        }
        TaskLevel::Graph => partition_graphs(c, train_fraction, val_fraction, seed)?,
    }
    ensure!(c.split_size(Split::Train) > 0, "Training split of '{}' is empty", c.name);
    Ok(())
}

/// File split if one was given, else a seeded split of graph indices.
fn partition_graphs(c: &mut GraphCollection, train_fraction: f64, val_fraction: f64, seed: u64) -> Result<()> {
    let total = c.graphs.len();
    let s = &c.splits;
    if s.train.is_empty() && s.val.is_empty() && s.test.is_empty() {
        c.splits = splitter::split_indices(total, train_fraction, val_fraction, seed);
    } else if let Some(bad) = s.train.iter().chain(&s.val).chain(&s.test).find(|&&i| i >= total) {
        bail!("split index {bad} out of range for {total} graphs");
    }
    Ok(())
}

// ─── Inspection ──────────────────────────────────────────────────────────────

/// Summary numbers printed by the `inspect` command.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub name: String,
    pub level: TaskLevel,
    pub task: String,
    pub num_graphs: usize,
    pub avg_nodes: f64,
    pub avg_edges: f64,
    pub max_nodes: usize,
    pub node_dim: usize,
    pub edge_dim: usize,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

pub fn inspect(c: &GraphCollection) -> DatasetStats {
    let n = c.graphs.len().max(1) as f64;
    let task = match c.task {
        TaskType::Regression { .. } => "regression".to_string(),
        TaskType::Binary { num_tasks } => format!("{num_tasks} binary task(s)"),
        TaskType::MultiClass { num_classes } => format!("{num_classes} classes"),
    };
    let stats = DatasetStats {
        name: c.name.clone(),
        level: c.level,
        task,
        num_graphs: c.graphs.len(),
        avg_nodes: c.graphs.iter().map(|g| g.num_nodes).sum::<usize>() as f64 / n,
        avg_edges: c.graphs.iter().map(|g| g.num_edges()).sum::<usize>() as f64 / n,
        max_nodes: c.max_nodes(),
        node_dim: c.node_dim(),
        edge_dim: c.edge_dim(),
        train: c.split_size(Split::Train),
        val: c.split_size(Split::Val),
        test: c.split_size(Split::Test),
    };
    tracing::info!(
        "{}: {} graphs, {:.1} avg nodes, {:.1} avg edges, node dim {}, edge dim {}, {}",
        stats.name, stats.num_graphs, stats.avg_nodes, stats.avg_edges, stats.node_dim, stats.edge_dim, stats.task
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(dir: &Path, name: &str) -> DatasetConfig {
        DatasetConfig { name: name.into(), dir: dir.to_string_lossy().into_owned(), ..Default::default() }
    }

    #[test]
    fn test_auto_detects_synthetic_and_splits() {
        let dir = tempfile::tempdir().unwrap();
        let c = DatasetLoader::new(&config(dir.path(), "cycles-50"), 0).load().unwrap();
        assert_eq!(c.splits.train.len(), 40);
        assert_eq!(c.splits.val.len(), 5);
        assert_eq!(c.splits.test.len(), 5);
    }

    #[test]
    fn test_node_level_gets_masks() {
        let dir = tempfile::tempdir().unwrap();
        let c = DatasetLoader::new(&config(dir.path(), "infected-60"), 2).load().unwrap();
        assert!(c.is_node_level());
        assert_eq!(c.split_size(Split::Train), 48);
        assert_eq!(c.splits, SplitIndices::single_graph());
    }

    const TWO_PROTEINS: &str = r#"{"split": {"train": [0], "val": [], "test": [1]}, "graphs": [
        {"num_nodes": 2, "x": [[1.0],[0.0]], "edge_index": [[0,1],[1,0]], "y": [[1, 0], [0, 1]]},
        {"num_nodes": 3, "x": [[0.0],[1.0],[1.0]], "edge_index": [[0,1],[1,2]], "y": [[0, 0], [1, 1], [1, 0]]}
    ]}"#;

    #[test]
    fn test_multi_graph_node_level_splits_by_graph() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("PPI.json"), TWO_PROTEINS).unwrap();
        let c = DatasetLoader::new(&config(dir.path(), "PPI"), 0).load().unwrap();
        assert!(c.is_node_level());
        assert_eq!(c.splits.train, vec![0]);
        assert_eq!(c.split_size(Split::Train), 2);
        assert_eq!(c.split_size(Split::Val), 0);
        assert_eq!(c.split_size(Split::Test), 3);
    }

    #[test]
    fn test_multi_graph_node_level_with_masks_uses_every_graph() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("PPI.json"),
            r#"{"graphs": [
                {"num_nodes": 2, "edge_index": [[0],[1]], "y": [[1], [0]],
                 "train_mask": [true, false], "val_mask": [false, true], "test_mask": [false, false]},
                {"num_nodes": 2, "edge_index": [[0],[1]], "y": [[0], [1]],
                 "train_mask": [true, true], "val_mask": [false, false], "test_mask": [false, false]}
            ]}"#,
        )
        .unwrap();
        let c = DatasetLoader::new(&config(dir.path(), "PPI"), 0).load().unwrap();
        assert_eq!(c.splits.train, vec![0, 1]);
        assert_eq!(c.split_size(Split::Train), 3);
        assert_eq!(c.split_size(Split::Val), 1);
    }

    #[test]
    fn test_partially_masked_node_level_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("PPI.json"),
            r#"{"graphs": [
                {"num_nodes": 1, "edge_index": [[],[]], "y": [[1]],
                 "train_mask": [true], "val_mask": [false], "test_mask": [false]},
                {"num_nodes": 1, "edge_index": [[],[]], "y": [[0]]}
            ]}"#,
        )
        .unwrap();
        let err = DatasetLoader::new(&config(dir.path(), "PPI"), 0).load().unwrap_err();
        assert!(err.to_string().contains("node masks on 1 of 2 graphs"));
    }

    #[test]
    fn test_missing_dataset_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetLoader::new(&config(dir.path(), "ZINC"), 0).load().unwrap_err();
        assert!(err.to_string().contains("Cannot find dataset"));
    }

    #[test]
    fn test_invalid_graph_names_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("broken.json"),
            r#"{"task": {"kind": "regression", "num_targets": 1}, "graphs": [
                {"num_nodes": 2, "edge_index": [[0],[1]], "y": 1.0},
                {"num_nodes": 2, "edge_index": [[0],[7]], "y": 1.0}
            ]}"#,
        )
        .unwrap();
        let err = DatasetLoader::new(&config(dir.path(), "broken"), 0).load().unwrap_err();
        assert!(err.to_string().contains("Graph 1"));
    }

    #[test]
    fn test_file_split_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("s.json"),
            r#"{"split": {"train": [0], "val": [], "test": [3]}, "graphs": [
                {"num_nodes": 1, "edge_index": [[],[]], "y": 0.5}
            ]}"#,
        )
        .unwrap();
        assert!(DatasetLoader::new(&config(dir.path(), "s"), 0).load().is_err());
    }

    #[test]
    fn test_inspect_counts() {
        let dir = tempfile::tempdir().unwrap();
        let c = DatasetLoader::new(&config(dir.path(), "cycles-10"), 0).load().unwrap();
        let s = inspect(&c);
        assert_eq!(s.num_graphs, 10);
        assert_eq!(s.node_dim, 1);
        assert!(s.avg_nodes >= 6.0);
    }
}
