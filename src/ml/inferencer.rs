// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Runs a model over one split without gradients and turns the
// outputs into a loss, metrics and host-side predictions.
//
// Only rows that belong to the split are kept (all graphs of a
// graph-level split, the masked nodes of a node-level one).
// Regression outputs and targets are mapped back through the
// target scaler before metrics are computed.

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;

use crate::data::dataloader::GraphLoader;
use crate::data::scaler::StandardScaler;
use crate::domain::task::TaskType;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::SplitStats;
use crate::ml::loss::TaskLoss;
use crate::ml::metrics;
use crate::ml::model::{GraphModel, ModelConfig};

/// Host copy of the labelled rows of one split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub rows: usize,
    pub out_dim: usize,
    pub target_width: usize,
    /// [rows, out_dim] raw outputs (logits / values)
    pub pred: Vec<f32>,
    /// [rows, target_width] as stored, NaN for missing labels
    pub target: Vec<f32>,
}

/// Accumulates per-batch outputs; shared by training and evaluation.
pub struct PredictionSink {
    task: TaskType,
    loss_sum: f64,
    loss_rows: usize,
    out: Predictions,
}

impl PredictionSink {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            loss_sum: 0.0,
            loss_rows: 0,
            out: Predictions {
                out_dim: task.output_dim(),
                target_width: task.target_width(),
                ..Default::default()
            },
        }
    }

    /// `pred`: [rows, out_dim] host values of one batch.
    pub fn push(&mut self, loss: f64, pred: &[f32], raw_targets: &[f32], row_mask: &[bool]) {
        let (o, w) = (self.out.out_dim, self.out.target_width);
        let mut rows = 0;
        for (r, &keep) in row_mask.iter().enumerate() {
            if keep {
                self.out.pred.extend_from_slice(&pred[r * o..(r + 1) * o]);
                self.out.target.extend_from_slice(&raw_targets[r * w..(r + 1) * w]);
                rows += 1;
            }
        }
        self.out.rows += rows;
        self.loss_sum += loss * rows as f64;
        self.loss_rows += rows;
    }

    /// Mean loss and metrics in original target units.
    pub fn finish(mut self, scaler: &StandardScaler) -> (SplitStats, Predictions) {
        if self.task.is_regression() {
            scaler.inverse_transform(&mut self.out.pred);
            scaler.inverse_transform(&mut self.out.target);
        }
        let loss = if self.loss_rows > 0 { self.loss_sum / self.loss_rows as f64 } else { f64::NAN };
        let metrics = metrics::compute(self.task, &self.out.pred, &self.out.target);
        (SplitStats { loss, metrics }, self.out)
    }
}

/// Evaluate `model` over every batch of `loader`.
pub fn evaluate<B: Backend>(
    model: &GraphModel<B>,
    loader: &GraphLoader<B>,
    loss_fn: TaskLoss,
    task: TaskType,
    scaler: &StandardScaler,
) -> Result<(SplitStats, Predictions)> {
    let mut sink = PredictionSink::new(task);
    for batch in loader.iter(0) {
        let out = model.forward(&batch)?;
        let loss: f64 = loss_fn.forward(out.clone(), &batch).into_scalar().elem::<f64>();
        let pred = out.into_data().to_vec::<f32>().map_err(|e| anyhow!("Cannot read predictions: {e:?}"))?;
        sink.push(loss, &pred, &batch.raw_targets, &batch.row_mask);
    }
    Ok(sink.finish(scaler))
}

/// Epoch whose weights represent the run: the best one when it was
/// kept on disk, otherwise the latest checkpoint.
pub fn best_checkpoint_epoch(ckpt: &CheckpointManager) -> Result<usize> {
    let epochs = ckpt.epochs()?;
    let Some(&latest) = epochs.last() else {
        bail!("No checkpoint found in '{}'", ckpt.dir().display());
    };
    let best = ckpt.load_state(latest)?.best.best_epoch;
    match best {
        Some(b) if epochs.contains(&b) => Ok(b),
        _ => {
            tracing::warn!("Best epoch has no checkpoint, using epoch {latest}");
            Ok(latest)
        }
    }
}

/// A trained model restored from a checkpoint directory.
pub struct Inferencer<B: Backend> {
    pub model: GraphModel<B>,
    pub config: ModelConfig,
    pub epoch: usize,
}

impl<B: Backend> Inferencer<B> {
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: &B::Device) -> Result<Self> {
        let config = ckpt.load_model_config()?;
        let epoch = best_checkpoint_epoch(ckpt)?;
        let model = ckpt.load_model(config.init::<B>(device), epoch, device)?;
        tracing::info!("Model loaded from checkpoint of epoch {epoch}");
        Ok(Self { model, config, epoch })
    }

    pub fn evaluate(
        &self,
        loader: &GraphLoader<B>,
        loss_fn: TaskLoss,
        task: TaskType,
        scaler: &StandardScaler,
    ) -> Result<(SplitStats, Predictions)> {
        evaluate(&self.model, loader, loss_fn, task, scaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sink_keeps_split_rows_and_weights_loss() {
        let mut sink = PredictionSink::new(TaskType::Regression { num_targets: 1 });
        sink.push(1.0, &[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], &[true, false, true]);
        sink.push(4.0, &[3.0], &[1.0], &[true]);
        let scaler = StandardScaler { mean: vec![10.0], std: vec![2.0] };
        let (stats, preds) = sink.finish(&scaler);
        assert_eq!(preds.rows, 3);
        assert_eq!(preds.pred, vec![10.0, 14.0, 16.0]);
        assert_eq!(preds.target, vec![10.0, 14.0, 12.0]);
        assert_relative_eq!(stats.loss, (1.0 * 2.0 + 4.0) / 3.0);
        assert_relative_eq!(stats.metrics["mae"], 4.0 / 3.0);
    }

    #[test]
    fn test_empty_split_has_nan_loss() {
        let sink = PredictionSink::new(TaskType::Binary { num_tasks: 1 });
        let (stats, preds) = sink.finish(&StandardScaler::identity(1));
        assert!(stats.loss.is_nan());
        assert_eq!(preds.rows, 0);
    }
}
