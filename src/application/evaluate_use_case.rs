// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Inference only: restores a finished run and reports loss and
// metrics on every split.
//
//   Step 1: Read {run_dir}/config.json
//   Step 2: Rebuild data exactly as training did   (prepare)
//   Step 3: Restore the best checkpoint            (Layer 5 - ml)
//   Step 4: Evaluate train / val / test
//   Step 5: Write {run_dir}/eval_metrics.json
//
// The backend follows the run's regime: cpu → NdArray,
// otherwise Wgpu. No autodiff is involved.

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};
use serde_json::{json, Map, Value};
use std::{fs, path::PathBuf};

use crate::application::config::{ExperimentConfig, ModelKind, TrainRegime};
use crate::application::prepare::{prepare, PreparedData};
use crate::data::batcher::GraphBatcher;
use crate::data::dataloader::GraphLoader;
use crate::data::dataset::GraphDataset;
use crate::domain::task::Split;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::SplitStats;
use crate::ml::inferencer::Inferencer;
use crate::ml::loss::TaskLoss;
use crate::ml::trainer::batch_context;

pub struct EvaluateUseCase {
    run_dir: PathBuf,
}

impl EvaluateUseCase {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self { run_dir: run_dir.into() }
    }

    pub fn execute(&self) -> Result<Vec<(Split, SplitStats)>> {
        // ── Step 1: Saved configuration ──────────────────────────────────────
        let cfg = ExperimentConfig::from_file(self.run_dir.join("config.json"))
            .context("Evaluation needs the config.json written by `train`")?;

        // ── Step 2: Data ─────────────────────────────────────────────────────
        let data = prepare(&cfg)?;
        let ckpt = CheckpointManager::open(self.run_dir.join("ckpt"))?;

        // ── Steps 3-4: Restore and evaluate ──────────────────────────────────
        let results = match cfg.train.regime {
            TrainRegime::Cpu => evaluate_splits::<NdArray>(&cfg, &data, &ckpt, NdArrayDevice::Cpu)?,
            TrainRegime::Gpu32 | TrainRegime::GpuMixed => {
                evaluate_splits::<Wgpu>(&cfg, &data, &ckpt, WgpuDevice::default())?
            }
        };

        // ── Step 5: Report ───────────────────────────────────────────────────
        let mut report = Map::new();
        for (split, stats) in &results {
            report.insert(split.name().to_string(), json!({ "loss": stats.loss, "metrics": stats.metrics }));
        }
        let path = self.run_dir.join("eval_metrics.json");
        fs::write(&path, serde_json::to_string_pretty(&Value::Object(report))?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        Ok(results)
    }
}

fn evaluate_splits<B: Backend>(
    cfg: &ExperimentConfig,
    data: &PreparedData,
    ckpt: &CheckpointManager,
    device: B::Device,
) -> Result<Vec<(Split, SplitStats)>> {
    let inferencer = Inferencer::<B>::from_checkpoint(ckpt, &device)?;
    let c = &data.collection;
    let loss_fn = TaskLoss::for_task(c.task, cfg.optim.regression_loss_fn)?;
    let tokens = inferencer.config.kind == ModelKind::TokenGt;

    let mut results = Vec::new();
    for split in Split::ALL {
        let loader = GraphLoader::<B>::eval(
            GraphDataset::from_split(c, split),
            GraphBatcher::new(device.clone(), batch_context(c, split, tokens)),
            cfg.optim.batch_size,
        );
        let (stats, _) = inferencer.evaluate(&loader, loss_fn, c.task, &data.targets)?;
        tracing::info!("{split}: loss={:.4} {:?}", stats.loss, stats.metrics);
        results.push((split, stats));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::TrackerKind;
    use crate::application::train_use_case::TrainUseCase;

    #[test]
    fn test_evaluate_restores_trained_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ExperimentConfig::default();
        cfg.dataset.name = "cycles-16".into();
        cfg.dataset.dir = dir.path().join("datasets").to_string_lossy().into_owned();
        cfg.output.out_path = dir.path().join("runs").to_string_lossy().into_owned();
        cfg.output.tracker = TrackerKind::None;
        cfg.model.hidden_dim = 8;
        cfg.model.head_dim = 8;
        cfg.model.num_layers = 1;
        cfg.optim.max_epochs = 2;
        cfg.optim.min_epochs = 1;

        let report = TrainUseCase::new(cfg).execute().unwrap();
        let results = EvaluateUseCase::new(&report.run_dir).execute().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, Split::Train);
        assert!(report.run_dir.join("eval_metrics.json").exists());

        // The restored model reproduces the final test loss
        let test = &results[2].1;
        assert!((test.loss - report.test.loss).abs() < 1e-4);
    }

    #[test]
    fn test_missing_run_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EvaluateUseCase::new(dir.path().join("nope")).execute().is_err());
    }
}
