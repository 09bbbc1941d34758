// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training runs using Burn's CompactRecorder.
//
// What gets saved per checkpoint:
//   1. Model weights        model_epoch_{e}.mpk
//   2. Optimiser moments    optim_epoch_{e}.mpk
//   3. latest_epoch.json    which epoch is being saved
//   4. Trainer state        state_epoch_{e}.json
//      (epoch, best epoch/value, scheduler + loss-scaler state,
//       the per-epoch history)
//
// Once per run:
//   model_config.json       ModelConfig, so evaluation can rebuild
//                           the exact architecture
//
// File naming convention:
//   {run_dir}/ckpt/
//     model_epoch_12.mpk
//     optim_epoch_12.mpk
//     state_epoch_12.json
//     latest_epoch.json
//     model_config.json
//
// The state file is written last: an epoch counts as saved only
// when its state_epoch file exists. Resume scans for state files;
// latest_epoch.json is a marker for external tooling.

use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::infra::early_stopping::BestState;
use crate::infra::metrics::EpochRecord;
use crate::ml::grad_scaler::ScalerState;
use crate::ml::model::{GraphModel, ModelConfig};
use crate::ml::scheduler::SchedulerState;

/// Everything besides tensors needed to resume a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Last completed epoch
    pub epoch: usize,
    pub best: BestState,
    pub scheduler: Option<SchedulerState>,
    pub scaler: Option<ScalerState>,
    pub history: Vec<EpochRecord>,
}

/// Manages the checkpoints of one run directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        anyhow::ensure!(dir.is_dir(), "Checkpoint directory '{}' does not exist", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, kind: &str, epoch: usize) -> PathBuf {
        self.dir.join(format!("{kind}_epoch_{epoch}"))
    }

    // ── Model architecture ──────────────────────────────────────────────────

    pub fn save_model_config(&self, cfg: &ModelConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<ModelConfig> {
        let path = self.dir.join("model_config.json");
        ModelConfig::load(&path).map_err(|e| {
            anyhow::anyhow!(
                "Cannot read model config from '{}': {e}. Make sure the run was trained first.",
                path.display()
            )
        })
    }

    // ── Saving ──────────────────────────────────────────────────────────────

    /// Save model, optimiser and trainer state for `state.epoch`.
    pub fn save<B, O>(&self, model: &GraphModel<B>, optim: &O, state: &TrainerState) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<GraphModel<B>, B>,
    {
        let epoch = state.epoch;
        let recorder = CompactRecorder::new();

        let path = self.file("model", epoch);
        <CompactRecorder as Recorder<B>>::record(&recorder, model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let path = self.file("optim", epoch);
        <CompactRecorder as Recorder<B>>::record(&recorder, optim.to_record(), path.clone())
            .with_context(|| format!("Failed to save optimiser state to '{}'", path.display()))?;

        fs::write(self.dir.join("latest_epoch.json"), serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        let path = self.dir.join(format!("state_epoch_{epoch}.json"));
        fs::write(&path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Delete every checkpoint except the one of `keep`.
    pub fn clean_except(&self, keep: usize) -> Result<()> {
        for epoch in self.epochs()? {
            if epoch == keep {
                continue;
            }
            let prefixes = [format!("model_epoch_{epoch}."), format!("optim_epoch_{epoch}."), format!("state_epoch_{epoch}.")];
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                    fs::remove_file(entry.path())
                        .with_context(|| format!("Cannot remove '{}'", entry.path().display()))?;
                }
            }
            tracing::debug!("Removed checkpoint of epoch {}", epoch);
        }
        Ok(())
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Epochs with a complete checkpoint, ascending.
    pub fn epochs(&self) -> Result<Vec<usize>> {
        let mut epochs = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("Cannot list '{}'", self.dir.display()))? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some(e) = name
                .strip_prefix("state_epoch_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|e| e.parse::<usize>().ok())
            {
                epochs.push(e);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }

    pub fn latest_epoch(&self) -> Result<Option<usize>> {
        Ok(self.epochs()?.last().copied())
    }

    pub fn load_state(&self, epoch: usize) -> Result<TrainerState> {
        let path = self.dir.join(format!("state_epoch_{epoch}.json"));
        let text = fs::read_to_string(&path).with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Corrupt trainer state '{}'", path.display()))
    }

    /// Restore weights into `model`, which must have the saved architecture.
    pub fn load_model<B: Backend>(&self, model: GraphModel<B>, epoch: usize, device: &B::Device) -> Result<GraphModel<B>> {
        let path = self.file("model", epoch);
        tracing::info!("Loading checkpoint from epoch {}", epoch);
        let record = CompactRecorder::new().load(path.clone(), device).with_context(|| {
            format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
        })?;
        Ok(model.load_record(record))
    }

    pub fn load_optimizer<B, O>(&self, optim: O, epoch: usize, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<GraphModel<B>, B>,
    {
        let path = self.file("optim", epoch);
        let record = <CompactRecorder as Recorder<B>>::load::<O::Record>(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load optimiser state '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::{ConvType, ModelKind};
    use crate::domain::task::TaskLevel;
    use crate::ml::encoders::PeDims;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamWConfig;

    type AB = Autodiff<NdArray<f32>>;

    fn model_config() -> ModelConfig {
        ModelConfig::new(ModelKind::Mpnn, ConvType::Gin, TaskLevel::Graph, 2, 0, 1, PeDims::new())
            .with_hidden_dim(8)
            .with_head_dim(4)
            .with_num_layers(1)
    }

    #[test]
    fn test_save_load_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let device = Default::default();
        let cfg = model_config();
        ckpt.save_model_config(&cfg).unwrap();
        assert_eq!(ckpt.load_model_config().unwrap().hidden_dim, 8);

        let model = cfg.init::<AB>(&device);
        let optim = AdamWConfig::new().init::<AB, GraphModel<AB>>();
        for epoch in [0, 3] {
            let state = TrainerState { epoch, ..Default::default() };
            ckpt.save(&model, &optim, &state).unwrap();
        }
        assert_eq!(ckpt.epochs().unwrap(), vec![0, 3]);
        assert_eq!(ckpt.latest_epoch().unwrap(), Some(3));
        assert_eq!(ckpt.load_state(3).unwrap().epoch, 3);

        let restored = ckpt.load_model(cfg.init::<NdArray<f32>>(&device), 3, &device);
        assert!(restored.is_ok());
        let optim = ckpt.load_optimizer::<AB, _>(AdamWConfig::new().init::<AB, GraphModel<AB>>(), 3, &device);
        assert!(optim.is_ok());

        ckpt.clean_except(3).unwrap();
        assert_eq!(ckpt.epochs().unwrap(), vec![3]);
        let leftovers = fs::read_dir(ckpt.dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains("_epoch_0"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_epoch_without_state_file_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let model = model_config().init::<AB>(&Default::default());
        let optim = AdamWConfig::new().init::<AB, GraphModel<AB>>();
        for epoch in [1, 2] {
            ckpt.save(&model, &optim, &TrainerState { epoch, ..Default::default() }).unwrap();
        }
        let marker: usize =
            serde_json::from_str(&fs::read_to_string(ckpt.dir().join("latest_epoch.json")).unwrap()).unwrap();
        assert_eq!(marker, 2);

        // Weights and marker of epoch 2 are on disk, its state file is not
        fs::remove_file(ckpt.dir().join("state_epoch_2.json")).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), Some(1));
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(dir.path().join("nope")).is_err());
    }
}
