// ============================================================
// Layer 2 — Experiment Configuration
// ============================================================
// Every knob of a run lives in one serialisable struct so it can
// be read from a JSON / TOML file, built from CLI flags, saved
// next to the checkpoints, and reloaded for evaluation.
//
// Sections:
//   dataset  — which data, where, how to split it
//   posenc   — which positional encodings to precompute
//   model    — architecture
//   optim    — optimiser, schedule, batch and stopping settings
//   train    — device regime, monitoring, checkpoint policy
//   output   — run directory and experiment tracker
//
// validate() enforces the cross-field rules; it runs on every
// config regardless of where it came from.

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::catalog;

// ─── Dataset ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// Pick json / tu / synthetic from the name and directory contents
    #[default]
    Auto,
    Json,
    Tu,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub name: String,
    pub dir: String,
    pub format: DatasetFormat,
    /// Integer node labels become one-hot vectors
    pub one_hot: bool,
    /// Selects one named target of a multi-target dataset
    pub target_name: Option<String>,
    pub train_fraction: f64,
    pub val_fraction: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            dir: "datasets".to_string(),
            format: DatasetFormat::Auto,
            one_hot: true,
            target_name: None,
            train_fraction: 0.8,
            val_fraction: 0.1,
        }
    }
}

// ─── Positional encodings ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapPeConfig {
    pub enable: bool,
    /// Number of eigenvectors kept per graph
    pub k: usize,
    pub dim_pe: usize,
}

impl Default for LapPeConfig {
    fn default() -> Self {
        Self { enable: false, k: 8, dim_pe: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RwseConfig {
    pub enable: bool,
    pub steps: usize,
    pub dim_pe: usize,
}

impl Default for RwseConfig {
    fn default() -> Self {
        Self { enable: false, steps: 16, dim_pe: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResistanceConfig {
    /// Effective-resistance node embedding (ERN)
    pub node: bool,
    /// Effective resistance as an extra edge feature (ERE)
    pub edge: bool,
    /// JL accuracy; smaller means a wider embedding
    pub accuracy: f64,
    pub dim_pe: usize,
}

impl Default for ResistanceConfig {
    fn default() -> Self {
        Self { node: false, edge: false, accuracy: 0.1, dim_pe: 16 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpanderConfig {
    pub enable: bool,
    /// Expander degree; degree / 2 permutations per round
    pub degree: usize,
    /// Number of independent expander rounds
    pub count: usize,
    pub max_num_iters: usize,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self { enable: false, degree: 4, count: 1, max_num_iters: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpdConfig {
    pub enable: bool,
    pub cutoff: usize,
}

impl Default for SpdConfig {
    fn default() -> Self {
        Self { enable: false, cutoff: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PosEncConfig {
    pub lap: LapPeConfig,
    pub rwse: RwseConfig,
    pub resistance: ResistanceConfig,
    pub expander: ExpanderConfig,
    pub spd: SpdConfig,
}

impl PosEncConfig {
    pub fn any_enabled(&self) -> bool {
        self.lap.enable
            || self.rwse.enable
            || self.resistance.node
            || self.resistance.edge
            || self.expander.enable
            || self.spd.enable
    }

    /// Node-embedding width taken up by positional encodings.
    pub fn node_pe_dim(&self) -> usize {
        let mut dim = 0;
        if self.lap.enable {
            dim += self.lap.dim_pe;
        }
        if self.rwse.enable {
            dim += self.rwse.dim_pe;
        }
        if self.resistance.node {
            dim += self.resistance.dim_pe;
        }
        dim
    }

    /// Extra edge-feature columns appended by the precomputers.
    pub fn extra_edge_columns(&self) -> usize {
        usize::from(self.resistance.edge) + usize::from(self.expander.enable)
    }
}

// ─── Model ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Stack of message-passing layers
    #[default]
    Mpnn,
    /// Local message passing + global attention per layer
    Gps,
    /// Tokenized graph transformer (nodes and edges as tokens)
    TokenGt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConvType {
    #[serde(rename = "GCN")]
    Gcn,
    #[default]
    #[serde(rename = "GIN")]
    Gin,
    #[serde(rename = "GAT")]
    Gat,
    #[serde(rename = "GATv2")]
    GatV2,
    #[serde(rename = "PNA")]
    Pna,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Readout {
    #[default]
    Mean,
    Sum,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub kind: ModelKind,
    pub conv: ConvType,
    pub num_layers: usize,
    pub hidden_dim: usize,
    /// Width of the hidden layer of the prediction head
    pub head_dim: usize,
    pub heads: usize,
    pub dropout: f64,
    pub attn_dropout: f64,
    pub readout: Readout,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelKind::Mpnn,
            conv: ConvType::Gin,
            num_layers: 4,
            hidden_dim: 256,
            head_dim: 256,
            heads: 4,
            dropout: 0.0,
            attn_dropout: 0.0,
            readout: Readout::Mean,
        }
    }
}

// ─── Optimisation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionLoss {
    Mae,
    Mse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    #[default]
    None,
    Step,
    CosineWithWarmup,
    ReduceOnPlateau,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
    /// Epoch milestones for the step schedule
    pub steps: Vec<usize>,
    pub lr_decay: f64,
    pub num_warmup_epochs: usize,
    pub reduce_factor: f64,
    pub schedule_patience: usize,
    pub min_lr: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::None,
            steps: vec![30, 60, 90],
            lr_decay: 0.1,
            num_warmup_epochs: 5,
            reduce_factor: 0.5,
            schedule_patience: 10,
            min_lr: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimConfig {
    pub lr: f64,
    pub weight_decay: f64,
    /// Gradient-norm clip threshold; 0 disables clipping
    pub gradient_clip_val: f64,
    pub batch_size: usize,
    /// Optimiser steps once every this many batches
    pub batch_accumulation: usize,
    pub max_epochs: usize,
    pub min_epochs: usize,
    pub early_stopping_patience: usize,
    pub regression_loss_fn: Option<RegressionLoss>,
    pub scheduler: SchedulerConfig,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            weight_decay: 1e-3,
            gradient_clip_val: 0.5,
            batch_size: 32,
            batch_accumulation: 1,
            max_epochs: 300,
            min_epochs: 10,
            early_stopping_patience: 30,
            regression_loss_fn: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

// ─── Training regime / checkpoints ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrainRegime {
    #[default]
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "gpu-32")]
    Gpu32,
    /// GPU with dynamic loss scaling
    #[serde(rename = "gpu-mixed")]
    GpuMixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    pub regime: TrainRegime,
    /// "loss" or a metric name (mae, mcc, auroc, ...)
    pub monitor: String,
    /// Evaluate val/test every this many epochs
    pub eval_period: usize,
    /// Checkpoint only on improvement of the monitored value
    pub ckpt_best: bool,
    /// Checkpoint period when ckpt_best is off
    pub ckpt_period: usize,
    /// Keep only the newest checkpoint on disk
    pub ckpt_clean: bool,
    pub auto_resume: bool,
    /// Initial loss scale for the gpu-mixed regime
    pub init_loss_scale: f64,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            regime: TrainRegime::Cpu,
            monitor: "loss".to_string(),
            eval_period: 1,
            ckpt_best: true,
            ckpt_period: 1,
            ckpt_clean: true,
            auto_resume: false,
            init_loss_scale: 65536.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    #[default]
    Jsonl,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub out_path: String,
    /// Overrides the generated run name
    pub run_name: Option<String>,
    pub tracker: TrackerKind,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { out_path: "runs".to_string(), run_name: None, tracker: TrackerKind::Jsonl }
    }
}

// ─── ExperimentConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub seed: u64,
    pub dataset: DatasetConfig,
    pub posenc: PosEncConfig,
    pub model: ModelSettings,
    pub optim: OptimConfig,
    pub train: TrainSettings,
    pub output: OutputConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            dataset: DatasetConfig::default(),
            posenc: PosEncConfig::default(),
            model: ModelSettings::default(),
            optim: OptimConfig::default(),
            train: TrainSettings::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Read a config file; the format follows the extension
    /// (`.toml` → TOML, anything else → JSON).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let cfg = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("Invalid TOML config '{}'", path.display()))?,
            _ => serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON config '{}'", path.display()))?,
        };
        Ok(cfg)
    }

    /// Write `config.json` into `dir` and return its path.
    pub fn save_json(&self, dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
        let path = dir.as_ref().join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(path)
    }

    /// Cross-field checks. Messages name the offending option.
    pub fn validate(&self) -> Result<()> {
        let name = self.dataset.name.as_str();
        ensure!(!name.is_empty(), "A dataset name must be given (--dataset)");

        if catalog::is_regression(name) {
            ensure!(
                self.optim.regression_loss_fn.is_some(),
                "A loss functions must be specified for regression tasks!"
            );
        }
        if catalog::needs_target(name) {
            ensure!(
                self.dataset.target_name.is_some(),
                "A target must be specified for QM9 and DOCKSTRING!"
            );
        }

        let d = &self.dataset;
        ensure!(
            d.train_fraction > 0.0 && d.val_fraction >= 0.0 && d.train_fraction + d.val_fraction <= 1.0,
            "train_fraction + val_fraction must lie in (0, 1], got {} + {}",
            d.train_fraction, d.val_fraction
        );

        let m = &self.model;
        ensure!(m.num_layers > 0, "num_layers must be at least 1");
        ensure!(m.hidden_dim > 0, "hidden_dim must be positive");
        let uses_heads = matches!(m.kind, ModelKind::Gps | ModelKind::TokenGt)
            || matches!(m.conv, ConvType::Gat | ConvType::GatV2);
        if uses_heads {
            ensure!(m.heads > 0, "heads must be positive for attention layers");
            ensure!(
                m.hidden_dim % m.heads == 0,
                "hidden_dim ({}) must be divisible by heads ({})",
                m.hidden_dim, m.heads
            );
        }

        let pe_dim = self.posenc.node_pe_dim();
        ensure!(
            pe_dim < m.hidden_dim,
            "positional encodings take {} dims, which leaves nothing of hidden_dim {}",
            pe_dim, m.hidden_dim
        );

        if m.kind == ModelKind::TokenGt {
            ensure!(
                !catalog::is_node_level(name),
                "TokenGT predicts from a graph token and only supports graph-level datasets"
            );
            ensure!(
                self.posenc.lap.enable,
                "TokenGT needs Laplacian eigenvectors as node identifiers (posenc.lap.enable)"
            );
        }

        if self.posenc.expander.enable {
            ensure!(
                self.posenc.expander.degree >= 2 && self.posenc.expander.degree % 2 == 0,
                "expander degree must be an even number >= 2, got {}",
                self.posenc.expander.degree
            );
        }

        let o = &self.optim;
        ensure!(o.batch_size > 0, "batch_size must be positive");
        ensure!(o.batch_accumulation > 0, "batch_accumulation must be at least 1");
        ensure!(o.lr > 0.0, "lr must be positive");
        ensure!(o.max_epochs > 0, "max_epochs must be positive");
        if o.scheduler.kind == SchedulerKind::ReduceOnPlateau {
            ensure!(
                o.scheduler.reduce_factor > 0.0 && o.scheduler.reduce_factor < 1.0,
                "reduce_factor must lie in (0, 1)"
            );
        }
        if self.train.eval_period == 0 || self.train.ckpt_period == 0 {
            bail!("eval_period and ckpt_period must be at least 1");
        }
        Ok(())
    }

    /// Monitored quantity, normalised: any spelling of MCC → "mcc".
    pub fn monitor_name(&self) -> String {
        let m = self.train.monitor.trim().to_lowercase();
        if m.contains("mcc") {
            "mcc".to_string()
        } else if m.is_empty() {
            "loss".to_string()
        } else {
            m
        }
    }

    /// Directory name for this run, unless one was set explicitly.
    pub fn run_name(&self) -> String {
        if let Some(name) = &self.output.run_name {
            return name.clone();
        }
        let mut parts = vec![self.dataset.name.clone()];
        if let Some(t) = &self.dataset.target_name {
            parts.push(t.clone());
        }
        let kind = match self.model.kind {
            ModelKind::Mpnn => format!("{:?}", self.model.conv).to_uppercase(),
            ModelKind::Gps => format!("GPS-{:?}", self.model.conv).to_uppercase(),
            ModelKind::TokenGt => "TOKENGT".to_string(),
        };
        parts.push(kind);
        parts.push(format!("L{}", self.model.num_layers));
        parts.push(format!("D{}", self.model.hidden_dim));
        let p = &self.posenc;
        let mut pe = Vec::new();
        if p.lap.enable { pe.push("lap"); }
        if p.rwse.enable { pe.push("rwse"); }
        if p.resistance.node { pe.push("ern"); }
        if p.resistance.edge { pe.push("ere"); }
        if p.expander.enable { pe.push("exp"); }
        if p.spd.enable { pe.push("spd"); }
        if !pe.is_empty() {
            parts.push(pe.join("+"));
        }
        parts.push(format!("seed{}", self.seed));
        parts.join("_").replace(['/', ' '], "-")
    }
}
