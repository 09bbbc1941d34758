// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load, encode and scale the dataset   (prepare)
//   Step 3: Derive the model configuration       (Layer 5 - ml)
//   Step 4: Create the run directory             (Layer 6 - infra)
//           config.json, ckpt/, metrics.csv, tracker
//   Step 5: Run the training loop                (Layer 5 - ml)
//   Step 6: Save final test outputs              (Layer 6 - infra)
//           test_y_pred.npy, test_y_true.npy,
//           test_metrics.npy, test_metrics.json
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::ExperimentConfig;
use crate::application::prepare::prepare;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, SplitStats},
    npy,
    tracker::open_tracker,
};
use crate::ml::inferencer::Predictions;
use crate::ml::metrics::metric_names;
use crate::ml::model::ModelConfig;
use crate::ml::trainer::{run_training, TrainingContext};

/// What a finished run reports back to the CLI.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub run_dir: PathBuf,
    pub best_epoch: Option<usize>,
    pub test: SplitStats,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: ExperimentConfig,
}

impl TrainUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Data ─────────────────────────────────────────────────────
        let data = prepare(cfg)?;
        let collection = &data.collection;
        crate::data::loader::inspect(collection);

        // ── Step 3: Model configuration ──────────────────────────────────────
        let model_cfg = ModelConfig::for_experiment(cfg, collection);

        // ── Step 4: Run directory ────────────────────────────────────────────
        let run_name = cfg.run_name();
        let run_dir = Path::new(&cfg.output.out_path).join(&run_name);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Cannot create run directory '{}'", run_dir.display()))?;
        cfg.save_json(&run_dir)?;
        tracing::info!("Run directory: '{}'", run_dir.display());

        let ckpt = CheckpointManager::new(run_dir.join("ckpt"))?;
        ckpt.save_model_config(&model_cfg)?;
        let columns = metric_names(collection.task).iter().map(|s| s.to_string()).collect();
        let logger = MetricsLogger::new(&run_dir, columns)?;
        let mut tracker = open_tracker(cfg.output.tracker, &run_dir, &run_name, &serde_json::to_value(cfg)?)?;

        // ── Step 5: Train ────────────────────────────────────────────────────
        let outcome = run_training(TrainingContext {
            cfg,
            data: collection,
            targets: &data.targets,
            model_cfg: &model_cfg,
            ckpt: &ckpt,
            logger: &logger,
            tracker: tracker.as_mut(),
        })?;

        // ── Step 6: Final test outputs ───────────────────────────────────────
        write_test_outputs(&run_dir, outcome.best_epoch, &outcome.test, &outcome.test_predictions)?;
        let mut summary = serde_json::Map::new();
        summary.insert("test/loss".into(), json!(outcome.test.loss));
        for (name, v) in &outcome.test.metrics {
            summary.insert(format!("test/{name}"), json!(v));
        }
        tracker.summary(&serde_json::Value::Object(summary))?;
        tracker.finish()?;

        Ok(TrainReport { run_dir, best_epoch: outcome.best_epoch, test: outcome.test })
    }
}

/// The `.npy` arrays and a JSON copy of the final test metrics.
///
/// `test_metrics.npy` holds the metric values in the sorted order
/// of their names, the same order as `test_metrics.json`.
pub fn write_test_outputs(
    run_dir: &Path,
    best_epoch: Option<usize>,
    test: &SplitStats,
    preds: &Predictions,
) -> Result<()> {
    npy::write_f32(run_dir.join("test_y_pred.npy"), &[preds.rows, preds.out_dim], &preds.pred)?;
    npy::write_f32(run_dir.join("test_y_true.npy"), &[preds.rows, preds.target_width], &preds.target)?;
    let values: Vec<f64> = test.metrics.values().copied().collect();
    npy::write_f64(run_dir.join("test_metrics.npy"), &[values.len()], &values)?;

    let path = run_dir.join("test_metrics.json");
    let report = json!({
        "best_epoch": best_epoch,
        "loss": test.loss,
        "metrics": test.metrics,
    });
    fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::info!("Saved test predictions and metrics to '{}'", run_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::TrackerKind;

    #[test]
    fn test_end_to_end_on_synthetic_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ExperimentConfig::default();
        cfg.dataset.name = "cycles-24".into();
        cfg.dataset.dir = dir.path().join("datasets").to_string_lossy().into_owned();
        cfg.output.out_path = dir.path().join("runs").to_string_lossy().into_owned();
        cfg.output.tracker = TrackerKind::Jsonl;
        cfg.posenc.rwse.enable = true;
        cfg.posenc.rwse.steps = 4;
        cfg.posenc.rwse.dim_pe = 4;
        cfg.model.hidden_dim = 16;
        cfg.model.head_dim = 8;
        cfg.model.num_layers = 2;
        cfg.optim.batch_size = 8;
        cfg.optim.max_epochs = 3;
        cfg.optim.min_epochs = 1;

        let report = TrainUseCase::new(cfg).execute().unwrap();
        for file in [
            "config.json",
            "metrics.csv",
            "tracker.jsonl",
            "test_y_pred.npy",
            "test_y_true.npy",
            "test_metrics.npy",
            "test_metrics.json",
            "ckpt/model_config.json",
        ] {
            assert!(report.run_dir.join(file).exists(), "missing {file}");
        }
        assert!(report.test.metrics.contains_key("auroc"));

        // header + 3 splits per epoch
        let csv = fs::read_to_string(report.run_dir.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 3 * 3);
    }
}
