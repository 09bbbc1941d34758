// ============================================================
// Layer 2 — Data Preparation
// ============================================================
// The steps shared by `train` and `evaluate`, in order:
//
//   Step 1: Load and partition the dataset   (Layer 4 - data)
//   Step 2: Precompute positional encodings  (pe)
//   Step 3: Standardise regression targets   (Layer 4 - data)
//
// `evaluate` repeats exactly these steps from the saved
// config.json, so it sees the same splits, encodings and
// target scaling the model was trained with.

use anyhow::Result;

use crate::application::config::ExperimentConfig;
use crate::data::loader::DatasetLoader;
use crate::data::scaler::StandardScaler;
use crate::domain::collection::GraphCollection;
use crate::domain::task::{Split, TaskLevel};
use crate::domain::traits::GraphSource;
use crate::pe::PosEncPipeline;

/// A dataset ready for batching, and the scaler of its targets.
pub struct PreparedData {
    pub collection: GraphCollection,
    pub targets: StandardScaler,
}

pub fn load_dataset(cfg: &ExperimentConfig) -> Result<GraphCollection> {
    DatasetLoader::new(&cfg.dataset, cfg.seed).load()
}

pub fn prepare(cfg: &ExperimentConfig) -> Result<PreparedData> {
    // ── Step 1: Load ─────────────────────────────────────────────────────────
    let mut collection = load_dataset(cfg)?;

    // ── Step 2: Positional encodings (cached next to the dataset) ────────────
    let pipeline = PosEncPipeline::new(&cfg.posenc, cfg.seed);
    pipeline.precompute(&mut collection, &cfg.dataset.dir)?;

    // ── Step 3: Target scaling ───────────────────────────────────────────────
    let targets = fit_target_scaler(&collection);
    scale_targets(&mut collection, &targets);

    Ok(PreparedData { collection, targets })
}

/// Train-split statistics for regression, identity otherwise.
pub fn fit_target_scaler(c: &GraphCollection) -> StandardScaler {
    let width = c.task.target_width();
    if !c.task.is_regression() {
        return StandardScaler::identity(width);
    }
    let mut values = Vec::new();
    match c.level {
        TaskLevel::Graph => {
            for &i in c.splits.get(Split::Train) {
                values.extend_from_slice(&c.graphs[i].y);
            }
        }
        TaskLevel::Node => {
            for &i in c.splits.get(Split::Train) {
                let g = &c.graphs[i];
                match &g.node_masks {
                    Some(masks) => {
                        for (node, _) in masks.mask(Split::Train).iter().enumerate().filter(|(_, &m)| m) {
                            values.extend_from_slice(&g.y[node * width..(node + 1) * width]);
                        }
                    }
                    None => values.extend_from_slice(&g.y),
                }
            }
        }
    }
    let scaler = StandardScaler::fit(&values, width);
    tracing::info!("Target scaler: mean {:?}, std {:?}", scaler.mean, scaler.std);
    scaler
}

pub fn scale_targets(c: &mut GraphCollection, scaler: &StandardScaler) {
    if !c.task.is_regression() {
        return;
    }
    for g in &mut c.graphs {
        scaler.transform(&mut g.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::SplitIndices;
    use crate::domain::graph::Graph;
    use crate::domain::task::TaskType;
    use approx::assert_relative_eq;

    fn regression(ys: &[f32]) -> GraphCollection {
        GraphCollection {
            name: "toy".into(),
            level: TaskLevel::Graph,
            task: TaskType::Regression { num_targets: 1 },
            graphs: ys.iter().map(|&y| Graph::new(1, 1, vec![1.0], &[], vec![y])).collect(),
            splits: SplitIndices { train: vec![0, 1], val: vec![2], test: vec![] },
            target_names: Vec::new(),
        }
    }

    #[test]
    fn test_scaler_fits_train_split_only() {
        let mut c = regression(&[1.0, 3.0, 100.0]);
        let s = fit_target_scaler(&c);
        assert_relative_eq!(s.mean[0], 2.0);
        assert_relative_eq!(s.std[0], 1.0);
        scale_targets(&mut c, &s);
        assert_eq!(c.graphs[0].y, vec![-1.0]);
        assert_eq!(c.graphs[2].y, vec![98.0]);
    }

    #[test]
    fn test_node_level_scaler_uses_train_graphs_without_masks() {
        let c = GraphCollection {
            name: "PPI".into(),
            level: TaskLevel::Node,
            task: TaskType::Regression { num_targets: 1 },
            graphs: vec![
                Graph::new(2, 1, vec![1.0; 2], &[], vec![1.0, 3.0]),
                Graph::new(1, 1, vec![1.0], &[], vec![100.0]),
            ],
            splits: SplitIndices { train: vec![0], val: vec![], test: vec![1] },
            target_names: Vec::new(),
        };
        let s = fit_target_scaler(&c);
        assert_relative_eq!(s.mean[0], 2.0);
        assert_relative_eq!(s.std[0], 1.0);
    }

    #[test]
    fn test_classification_targets_untouched() {
        let mut c = regression(&[0.0, 1.0, 1.0]);
        c.task = TaskType::Binary { num_tasks: 1 };
        let s = fit_target_scaler(&c);
        scale_targets(&mut c, &s);
        assert_eq!(c.graphs[1].y, vec![1.0]);
        assert_eq!(s, StandardScaler::identity(1));
    }
}
