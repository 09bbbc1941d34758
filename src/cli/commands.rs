// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Subcommands: train, evaluate, precompute, inspect.
//
// Flags are grouped the way ExperimentConfig is sectioned and
// shared between commands with #[command(flatten)]. When
// --config is given the file is the whole configuration and
// the other flags are ignored.
//
// Enum-valued flags reuse the config enums' serde names, so
// `--conv GATv2` and `"conv": "GATv2"` mean the same thing.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::de::DeserializeOwned;

use crate::application::config::{
    ConvType, DatasetFormat, ExperimentConfig, ModelKind, Readout, RegressionLoss, SchedulerKind,
    TrackerKind, TrainRegime,
};

/// Parse a flag value through the serde name of a config enum.
fn serde_enum<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and save checkpoints, metrics and test outputs
    Train(TrainArgs),

    /// Evaluate a finished run on train/val/test
    Evaluate(EvaluateArgs),

    /// Compute and cache positional encodings for a dataset
    Precompute(DatasetArgs),

    /// Print dataset statistics
    Inspect(DatasetArgs),
}

// ─── Shared groups ───────────────────────────────────────────────────────────

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Dataset name (ZINC, MUTAG, Cora, cycles-200, ...)
    #[arg(long, default_value = "")]
    pub dataset: String,

    /// Directory holding dataset files and encoding caches
    #[arg(long, default_value = "datasets")]
    pub dataset_dir: String,

    /// auto | json | tu | synthetic
    #[arg(long, default_value = "auto", value_parser = serde_enum::<DatasetFormat>)]
    pub format: DatasetFormat,

    /// Target of a multi-target dataset (QM9, DOCKSTRING)
    #[arg(long)]
    pub target: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PosEncArgs {
    /// Laplacian eigenvector encoding
    #[arg(long)]
    pub lap: bool,

    #[arg(long, default_value_t = 8)]
    pub lap_k: usize,

    /// Random-walk structural encoding
    #[arg(long)]
    pub rwse: bool,

    #[arg(long, default_value_t = 16)]
    pub rwse_steps: usize,

    /// Effective-resistance node embedding
    #[arg(long)]
    pub ern: bool,

    /// Effective-resistance edge feature
    #[arg(long)]
    pub ere: bool,

    /// Random expander edges
    #[arg(long)]
    pub expander: bool,

    /// Shortest-path-distance attention bias (GPS)
    #[arg(long)]
    pub spd: bool,

    #[arg(long, default_value_t = 5)]
    pub spd_cutoff: usize,
}

impl DataArgs {
    fn apply(self, cfg: &mut ExperimentConfig) {
        cfg.seed = self.seed;
        cfg.dataset.name = self.dataset;
        cfg.dataset.dir = self.dataset_dir;
        cfg.dataset.format = self.format;
        cfg.dataset.target_name = self.target;
    }
}

impl PosEncArgs {
    fn apply(self, cfg: &mut ExperimentConfig) {
        let p = &mut cfg.posenc;
        p.lap.enable = self.lap;
        p.lap.k = self.lap_k;
        p.rwse.enable = self.rwse;
        p.rwse.steps = self.rwse_steps;
        p.resistance.node = self.ern;
        p.resistance.edge = self.ere;
        p.expander.enable = self.expander;
        p.spd.enable = self.spd;
        p.spd.cutoff = self.spd_cutoff;
    }
}

fn from_file_or(config: Option<String>, build: impl FnOnce() -> ExperimentConfig) -> Result<ExperimentConfig> {
    match config {
        Some(path) => {
            tracing::info!("Reading configuration from '{path}', other flags are ignored");
            ExperimentConfig::from_file(path)
        }
        None => Ok(build()),
    }
}

// ─── train ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON or TOML experiment file; replaces all other flags
    #[arg(long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub posenc: PosEncArgs,

    /// mpnn | gps | tokengt
    #[arg(long, default_value = "mpnn", value_parser = serde_enum::<ModelKind>)]
    pub model: ModelKind,

    /// GCN | GIN | GAT | GATv2 | PNA
    #[arg(long, default_value = "GIN", value_parser = serde_enum::<ConvType>)]
    pub conv: ConvType,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 4)]
    pub heads: usize,

    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    #[arg(long, default_value_t = 0.0)]
    pub attn_dropout: f64,

    /// mean | sum | max
    #[arg(long, default_value = "mean", value_parser = serde_enum::<Readout>)]
    pub readout: Readout,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 1e-3)]
    pub weight_decay: f64,

    /// Gradient-norm clip threshold, 0 disables
    #[arg(long, default_value_t = 0.5)]
    pub gradient_clip_val: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1)]
    pub batch_accumulation: usize,

    #[arg(long, default_value_t = 300)]
    pub max_epochs: usize,

    #[arg(long, default_value_t = 10)]
    pub min_epochs: usize,

    #[arg(long, default_value_t = 30)]
    pub patience: usize,

    /// Regression loss: mae | mse
    #[arg(long, value_parser = serde_enum::<RegressionLoss>)]
    pub loss: Option<RegressionLoss>,

    /// none | step | cosine_with_warmup | reduce_on_plateau
    #[arg(long, default_value = "none", value_parser = serde_enum::<SchedulerKind>)]
    pub scheduler: SchedulerKind,

    /// cpu | gpu-32 | gpu-mixed
    #[arg(long, default_value = "cpu", value_parser = serde_enum::<TrainRegime>)]
    pub regime: TrainRegime,

    /// loss or a metric name (mae, mcc, auroc, ...)
    #[arg(long, default_value = "loss")]
    pub monitor: String,

    #[arg(long, default_value_t = 1)]
    pub eval_period: usize,

    /// Checkpoint every epoch instead of only on improvement
    #[arg(long)]
    pub ckpt_every_epoch: bool,

    /// Continue from the latest checkpoint of the run
    #[arg(long)]
    pub auto_resume: bool,

    #[arg(long, default_value = "runs")]
    pub out_path: String,

    #[arg(long)]
    pub run_name: Option<String>,

    /// jsonl | none
    #[arg(long, default_value = "jsonl", value_parser = serde_enum::<TrackerKind>)]
    pub tracker: TrackerKind,
}

impl TrainArgs {
    pub fn into_config(self) -> Result<ExperimentConfig> {
        let config = self.config.clone();
        from_file_or(config, || self.into())
    }
}

/// Boundary between Layer 1 and Layer 2: the application layer
/// never sees clap types.
impl From<TrainArgs> for ExperimentConfig {
    fn from(a: TrainArgs) -> Self {
        let mut cfg = ExperimentConfig::default();
        a.data.apply(&mut cfg);
        a.posenc.apply(&mut cfg);

        let m = &mut cfg.model;
        m.kind = a.model;
        m.conv = a.conv;
        m.num_layers = a.num_layers;
        m.hidden_dim = a.hidden_dim;
        m.heads = a.heads;
        m.dropout = a.dropout;
        m.attn_dropout = a.attn_dropout;
        m.readout = a.readout;

        let o = &mut cfg.optim;
        o.lr = a.lr;
        o.weight_decay = a.weight_decay;
        o.gradient_clip_val = a.gradient_clip_val;
        o.batch_size = a.batch_size;
        o.batch_accumulation = a.batch_accumulation;
        o.max_epochs = a.max_epochs;
        o.min_epochs = a.min_epochs;
        o.early_stopping_patience = a.patience;
        o.regression_loss_fn = a.loss;
        o.scheduler.kind = a.scheduler;

        let t = &mut cfg.train;
        t.regime = a.regime;
        t.monitor = a.monitor;
        t.eval_period = a.eval_period;
        t.ckpt_best = !a.ckpt_every_epoch;
        t.ckpt_clean = !a.ckpt_every_epoch;
        t.auto_resume = a.auto_resume;

        cfg.output.out_path = a.out_path;
        cfg.output.run_name = a.run_name;
        cfg.output.tracker = a.tracker;
        cfg
    }
}

// ─── evaluate ────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Run directory written by `train` ({out_path}/{run_name})
    #[arg(long)]
    pub run_dir: String,
}

// ─── precompute / inspect ────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// JSON or TOML experiment file; replaces all other flags
    #[arg(long)]
    pub config: Option<String>,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub posenc: PosEncArgs,
}

impl DatasetArgs {
    pub fn into_config(self) -> Result<ExperimentConfig> {
        let Self { config, data, posenc } = self;
        from_file_or(config, || {
            let mut cfg = ExperimentConfig::default();
            data.apply(&mut cfg);
            posenc.apply(&mut cfg);
            cfg
        })
    }
}
