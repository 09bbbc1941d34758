// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Custom epoch loop over a GraphLoader with AdamW.
//
// Backends per regime:
//   cpu        Autodiff<NdArray>
//   gpu-32     Autodiff<Wgpu>
//   gpu-mixed  Autodiff<Wgpu> + dynamic loss scaling
//
// Key Burn insight:
//   - Training uses B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend, which
//     also switches dropout and the LapPE sign flip off
//   - Evaluation loaders therefore batch onto B::InnerBackend
//
// Per epoch:
//   1. train    gradient accumulation over `batch_accumulation`
//               batches (a trailing partial group still steps),
//               norm clipping inside AdamW, overflow skip
//   2. eval     val + test on eval epochs; otherwise the last
//               values are repeated
//   3. log      CSV row per split, tracker record, epoch line
//   4. monitor  early stopping, scheduler, checkpoint policy
//
// After the loop the best checkpoint is reloaded for the final
// test predictions.

use anyhow::{anyhow, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde_json::{json, Map, Value};
use std::time::Instant;

use crate::application::config::{ExperimentConfig, ModelKind, TrainRegime};
use crate::data::batcher::{BatchContext, GraphBatcher};
use crate::data::dataloader::GraphLoader;
use crate::data::dataset::GraphDataset;
use crate::data::scaler::StandardScaler;
use crate::domain::collection::GraphCollection;
use crate::domain::task::{Split, TaskLevel, TaskType};
use crate::domain::traits::ExperimentTracker;
use crate::infra::checkpoint::{CheckpointManager, TrainerState};
use crate::infra::early_stopping::{EarlyStopping, Monitor};
use crate::infra::metrics::{best_so_far_line, EpochRecord, MetricsLogger, SplitStats};
use crate::ml::grad_scaler::GradScaler;
use crate::ml::inferencer::{evaluate, PredictionSink, Predictions};
use crate::ml::loss::TaskLoss;
use crate::ml::model::{GraphModel, ModelConfig};
use crate::ml::scheduler::LrScheduler;

type CpuBackend = Autodiff<NdArray>;
type GpuBackend = Autodiff<Wgpu>;

/// Everything the loop needs that is not a tensor.
pub struct TrainingContext<'a> {
    pub cfg: &'a ExperimentConfig,
    pub data: &'a GraphCollection,
    pub targets: &'a StandardScaler,
    pub model_cfg: &'a ModelConfig,
    pub ckpt: &'a CheckpointManager,
    pub logger: &'a MetricsLogger,
    pub tracker: &'a mut dyn ExperimentTracker,
}

pub struct TrainingOutcome {
    pub history: Vec<EpochRecord>,
    pub best_epoch: Option<usize>,
    /// Training was skipped because the checkpoint already reached max_epochs
    pub already_done: bool,
    /// Final test of the reloaded best model
    pub test: SplitStats,
    pub test_predictions: Predictions,
}

pub fn run_training(ctx: TrainingContext<'_>) -> Result<TrainingOutcome> {
    let cfg = ctx.cfg;
    let t = &cfg.train;
    match t.regime {
        TrainRegime::Cpu => {
            tracing::info!("Using NdArray CPU backend");
            train_loop::<CpuBackend>(ctx, NdArrayDevice::Cpu, GradScaler::disabled())
        }
        TrainRegime::Gpu32 => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<GpuBackend>(ctx, device, GradScaler::disabled())
        }
        TrainRegime::GpuMixed => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?} with loss scaling", device);
            let scaler = GradScaler::new(true, t.init_loss_scale);
            train_loop::<GpuBackend>(ctx, device, scaler)
        }
    }
}

/// Batch context for one split of the collection.
pub fn batch_context(data: &GraphCollection, split: Split, tokens: bool) -> BatchContext {
    BatchContext {
        task: data.task,
        level: data.level,
        split: (data.level == TaskLevel::Node).then_some(split),
        tokens,
    }
}

/// GraphGym's rule: the first, the last and every `period`-th epoch.
pub fn is_eval_epoch(epoch: usize, period: usize, max_epochs: usize) -> bool {
    epoch == 0 || (epoch + 1) % period.max(1) == 0 || epoch + 1 == max_epochs
}

/// Flat `split/name` map for trackers.
pub fn record_values(r: &EpochRecord) -> Value {
    let mut map = Map::new();
    map.insert("lr".into(), json!(r.lr));
    map.insert("train/time_epoch".into(), json!(r.train_time));
    for split in Split::ALL {
        let s = r.split(split);
        map.insert(format!("{split}/loss"), json!(s.loss));
        for (name, v) in &s.metrics {
            map.insert(format!("{split}/{name}"), json!(v));
        }
    }
    Value::Object(map)
}

fn train_loop<B: AutodiffBackend>(
    ctx: TrainingContext<'_>,
    device: B::Device,
    mut grad_scaler: GradScaler,
) -> Result<TrainingOutcome> {
    let TrainingContext { cfg, data, targets, model_cfg, ckpt, logger, tracker } = ctx;
    let o = &cfg.optim;
    B::seed(cfg.seed);

    let loss_fn = TaskLoss::for_task(data.task, o.regression_loss_fn)?;
    let tokens = model_cfg.kind == ModelKind::TokenGt;

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: GraphModel<B> = model_cfg.init(&device);
    tracing::info!("Model ready: {:?}, {} parameters", model_cfg.kind, model.num_params());

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let clipping = (o.gradient_clip_val > 0.0).then(|| GradientClippingConfig::Norm(o.gradient_clip_val as f32));
    let mut optim = AdamWConfig::new()
        .with_weight_decay(o.weight_decay as f32)
        .with_grad_clipping(clipping)
        .init::<B, GraphModel<B>>();
    let mut scheduler = LrScheduler::new(&o.scheduler, o.lr, o.max_epochs);
    let monitor = Monitor::new(cfg.monitor_name());
    let mut stopper = EarlyStopping::new(monitor.clone(), o.early_stopping_patience, o.min_epochs);
    tracing::info!("Monitoring val {} ({})", monitor.name, monitor.mode());
    if grad_scaler.is_enabled() {
        tracing::info!("Dynamic loss scaling from {}", grad_scaler.scale());
    }

    // ── Loaders: training on B, evaluation on B::InnerBackend ────────────────
    let train_loader = GraphLoader::<B>::train(
        GraphDataset::from_split(data, Split::Train),
        GraphBatcher::new(device.clone(), batch_context(data, Split::Train, tokens)),
        o.batch_size,
        cfg.seed,
    );
    let eval_loader = |split: Split| {
        GraphLoader::<B::InnerBackend>::eval(
            GraphDataset::from_split(data, split),
            GraphBatcher::new(device.clone(), batch_context(data, split, tokens)),
            o.batch_size,
        )
    };
    tracing::info!(
        "{} training graphs in batches of {}",
        train_loader.len(),
        train_loader.batch_size()
    );
    let val_loader = eval_loader(Split::Val);
    let test_loader = eval_loader(Split::Test);
    if data.split_size(Split::Val) == 0 {
        tracing::warn!("Validation split is empty; nothing will be monitored");
    }

    // ── Resume ────────────────────────────────────────────────────────────────
    let mut history: Vec<EpochRecord> = Vec::new();
    let mut start_epoch = 0;
    if cfg.train.auto_resume {
        if let Some(epoch) = ckpt.latest_epoch()? {
            let state = ckpt.load_state(epoch)?;
            model = ckpt.load_model(model, epoch, &device)?;
            optim = ckpt.load_optimizer::<B, _>(optim, epoch, &device)?;
            if let Some(s) = state.scheduler {
                scheduler.restore(s);
            }
            if let Some(s) = state.scaler {
                grad_scaler.restore(s);
            }
            stopper.restore(state.best);
            history = state.history;
            start_epoch = epoch + 1;
        }
    }
    let already_done = start_epoch >= o.max_epochs;
    if already_done {
        tracing::info!("Checkpoint found, Task already done");
    } else {
        tracing::info!("Start from epoch {start_epoch}");
    }

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in start_epoch..o.max_epochs {
        let lr = scheduler.lr(epoch);
        let started = Instant::now();
        let (trained, train) = train_epoch(
            model,
            &mut optim,
            &train_loader,
            epoch,
            lr,
            o.batch_accumulation.max(1),
            loss_fn,
            &mut grad_scaler,
            data.task,
            targets,
        )?;
        model = trained;
        let train_time = started.elapsed().as_secs_f64();

        let eval_epoch = is_eval_epoch(epoch, cfg.train.eval_period, o.max_epochs);
        let (val, test) = if eval_epoch {
            // dropout disabled for deterministic evaluation
            let model_valid = model.valid();
            let (val, _) = evaluate(&model_valid, &val_loader, loss_fn, data.task, targets)?;
            let (test, _) = evaluate(&model_valid, &test_loader, loss_fn, data.task, targets)?;
            (val, test)
        } else {
            history.last().map(|r| (r.val.clone(), r.test.clone())).unwrap_or_default()
        };

        let record = EpochRecord { epoch, lr, train_time, train, val, test };
        logger.log(&record)?;
        tracker.log(epoch, &record_values(&record))?;
        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | test_loss={:.4} | lr={:.2e} | {:.1}s",
            epoch,
            o.max_epochs,
            record.train.loss,
            record.val.loss,
            record.test.loss,
            lr,
            train_time,
        );

        let improved = eval_epoch && stopper.observe(&record);
        if eval_epoch {
            scheduler.step(Some(record.val.loss));
        }
        history.push(record);

        // ── Checkpoint policy ────────────────────────────────────────────────
        let save = if cfg.train.ckpt_best {
            improved
        } else {
            (epoch + 1) % cfg.train.ckpt_period.max(1) == 0
        };
        if save {
            let state = TrainerState {
                epoch,
                best: stopper.state().clone(),
                scheduler: Some(scheduler.state().clone()),
                scaler: Some(grad_scaler.state().clone()),
                history: history.clone(),
            };
            ckpt.save(&model, &optim, &state)?;
            if cfg.train.ckpt_clean {
                ckpt.clean_except(epoch)?;
            }
        }

        // ── Best so far ──────────────────────────────────────────────────────
        if let Some(best) = stopper.best_epoch().and_then(|b| history.iter().find(|r| r.epoch == b)) {
            tracing::info!("{}", best_so_far_line(best, &monitor.name));
            let mut summary = Map::new();
            summary.insert("best/epoch".into(), json!(best.epoch));
            for split in Split::ALL {
                summary.insert(format!("best/{split}_loss"), json!(best.split(split).loss));
                if let Some(v) = best.split(split).value(&monitor.name) {
                    summary.insert(format!("best/{split}_{}", monitor.name), json!(v));
                }
            }
            tracker.summary(&Value::Object(summary))?;
        }

        if stopper.should_stop(epoch) {
            tracing::info!("Early stopping at epoch {epoch}");
            break;
        }
    }

    // ── Final test with the best weights ─────────────────────────────────────
    let best_epoch = stopper.best_epoch();
    let saved = ckpt.epochs()?;
    let final_model: GraphModel<B::InnerBackend> = match best_epoch.filter(|e| saved.contains(e)) {
        Some(epoch) => ckpt.load_model(model_cfg.init(&device), epoch, &device)?,
        None => {
            tracing::warn!("No checkpoint of the best epoch, testing the last weights");
            model.valid()
        }
    };
    let (test, test_predictions) = evaluate(&final_model, &test_loader, loss_fn, data.task, targets)?;
    tracing::info!("Final test: loss={:.4} {:?}", test.loss, test.metrics);

    Ok(TrainingOutcome { history, best_epoch, already_done, test, test_predictions })
}

#[allow(clippy::too_many_arguments)]
fn train_epoch<B, O>(
    mut model: GraphModel<B>,
    optim: &mut O,
    loader: &GraphLoader<B>,
    epoch: usize,
    lr: f64,
    accumulation: usize,
    loss_fn: TaskLoss,
    grad_scaler: &mut GradScaler,
    task: TaskType,
    targets: &StandardScaler,
) -> Result<(GraphModel<B>, SplitStats)>
where
    B: AutodiffBackend,
    O: Optimizer<GraphModel<B>, B>,
{
    let num_batches = loader.num_batches();
    let mut sink = PredictionSink::new(task);
    let mut accumulator = GradientsAccumulator::new();
    let mut pending = 0;
    let mut skipped = 0;

    for (i, batch) in loader.iter(epoch).enumerate() {
        let group_start = (i / accumulation) * accumulation;
        let group_size = accumulation.min(num_batches - group_start);

        let out = model.forward(&batch)?;
        let loss = loss_fn.forward(out.clone(), &batch);
        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        let pred = out.into_data().to_vec::<f32>().map_err(|e| anyhow!("Cannot read predictions: {e:?}"))?;
        sink.push(loss_val, &pred, &batch.raw_targets, &batch.row_mask);

        // Backward pass, averaged over the accumulation group
        let scaled = grad_scaler.scale_loss(loss / group_size as f64);
        let grads = GradientsParams::from_grads(scaled.backward(), &model);
        accumulator.accumulate(&model, grads);
        pending += 1;

        if pending == group_size {
            let mut grads = accumulator.grads();
            let finite = grad_scaler.unscale::<B, _>(&model, &mut grads);
            if finite {
                model = optim.step(lr, model, grads);
            } else {
                skipped += 1;
            }
            grad_scaler.update(finite);
            pending = 0;
        }
    }
    if skipped > 0 {
        tracing::warn!("Epoch {epoch}: skipped {skipped} steps after gradient overflow");
    }

    Ok((model, sink.finish(targets).0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::{ConvType, RegressionLoss};
    use crate::domain::collection::SplitIndices;
    use crate::domain::graph::Graph;
    use crate::infra::tracker::NoopTracker;

    type AB = Autodiff<NdArray<f32>>;

    #[test]
    fn test_eval_epoch_rule() {
        assert!(is_eval_epoch(0, 5, 20));
        assert!(!is_eval_epoch(1, 5, 20));
        assert!(is_eval_epoch(4, 5, 20));
        assert!(is_eval_epoch(19, 7, 20));
    }

    #[test]
    fn test_record_values_are_flat() {
        let mut r = EpochRecord { epoch: 2, lr: 0.1, ..Default::default() };
        r.val.metrics.insert("mae".into(), 0.5);
        let v = record_values(&r);
        assert_eq!(v["val/mae"], 0.5);
        assert_eq!(v["lr"], 0.1);
        assert!(v.get("test/loss").is_some());
    }

    /// Graphs whose target is their node count; sum readout learns it.
    fn counting_data() -> GraphCollection {
        let graphs = (0..12)
            .map(|i| {
                let n = 2 + i % 4;
                let edges: Vec<(usize, usize)> = (0..n - 1).flat_map(|j| [(j, j + 1), (j + 1, j)]).collect();
                Graph::new(n, 1, vec![1.0; n], &edges, vec![n as f32])
            })
            .collect();
        GraphCollection {
            name: "counting".into(),
            level: TaskLevel::Graph,
            task: TaskType::Regression { num_targets: 1 },
            graphs,
            splits: SplitIndices { train: (0..8).collect(), val: vec![8, 9], test: vec![10, 11] },
            target_names: Vec::new(),
        }
    }

    fn tiny_config(epochs: usize) -> ExperimentConfig {
        let mut cfg = ExperimentConfig::default();
        cfg.dataset.name = "counting".into();
        cfg.model.conv = ConvType::Gin;
        cfg.model.hidden_dim = 8;
        cfg.model.head_dim = 8;
        cfg.model.num_layers = 1;
        cfg.model.readout = crate::application::config::Readout::Sum;
        cfg.optim.lr = 0.01;
        cfg.optim.batch_size = 4;
        cfg.optim.max_epochs = epochs;
        cfg.optim.min_epochs = epochs;
        cfg.optim.regression_loss_fn = Some(RegressionLoss::Mse);
        cfg
    }

    #[test]
    fn test_training_loss_decreases() {
        let data = counting_data();
        let cfg = tiny_config(30);
        let scaler = StandardScaler::identity(1);
        let model_cfg = ModelConfig::for_experiment(&cfg, &data);
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let logger = MetricsLogger::new(dir.path(), vec!["mae".into()]).unwrap();
        let mut tracker = NoopTracker;
        let ctx = TrainingContext {
            cfg: &cfg,
            data: &data,
            targets: &scaler,
            model_cfg: &model_cfg,
            ckpt: &ckpt,
            logger: &logger,
            tracker: &mut tracker,
        };
        let outcome = train_loop::<AB>(ctx, NdArrayDevice::Cpu, GradScaler::disabled()).unwrap();
        let first = outcome.history.first().unwrap().train.loss;
        let last = outcome.history.last().unwrap().train.loss;
        assert!(last < first, "loss went from {first} to {last}");
        assert_eq!(outcome.test_predictions.rows, 2);
        assert!(outcome.best_epoch.is_some());
        // ckpt_clean keeps a single checkpoint
        assert_eq!(ckpt.epochs().unwrap().len(), 1);
    }

    #[test]
    fn test_resume_after_completion_skips_training() {
        let data = counting_data();
        let mut cfg = tiny_config(2);
        cfg.train.auto_resume = true;
        cfg.train.ckpt_best = false;
        let scaler = StandardScaler::identity(1);
        let model_cfg = ModelConfig::for_experiment(&cfg, &data);
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let logger = MetricsLogger::new(dir.path(), vec![]).unwrap();

        for expect_done in [false, true] {
            let mut tracker = NoopTracker;
            let ctx = TrainingContext {
                cfg: &cfg,
                data: &data,
                targets: &scaler,
                model_cfg: &model_cfg,
                ckpt: &ckpt,
                logger: &logger,
                tracker: &mut tracker,
            };
            let outcome = train_loop::<AB>(ctx, NdArrayDevice::Cpu, GradScaler::disabled()).unwrap();
            assert_eq!(outcome.already_done, expect_done);
            assert_eq!(outcome.history.len(), 2);
        }
    }
}
