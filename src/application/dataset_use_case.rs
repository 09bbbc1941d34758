// ============================================================
// Layer 2 — DatasetUseCase
// ============================================================
// The two dataset-only commands:
//
//   precompute  load the dataset and fill the encoding cache,
//               so later `train` runs start from the cache
//   inspect     load the dataset and report its statistics

use anyhow::Result;

use crate::application::config::ExperimentConfig;
use crate::application::prepare::load_dataset;
use crate::data::loader::{inspect, DatasetStats};
use crate::pe::PosEncPipeline;

pub struct DatasetUseCase {
    config: ExperimentConfig,
}

impl DatasetUseCase {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Returns true when a matching cache already existed.
    pub fn precompute(&self) -> Result<bool> {
        let cfg = &self.config;
        if !cfg.posenc.any_enabled() {
            tracing::warn!("No positional encoding enabled, nothing to precompute");
            return Ok(false);
        }
        let mut collection = load_dataset(cfg)?;
        let cached = PosEncPipeline::new(&cfg.posenc, cfg.seed).precompute(&mut collection, &cfg.dataset.dir)?;
        tracing::info!(
            "Encodings for '{}' {}",
            collection.name,
            if cached { "were already cached" } else { "computed and cached" }
        );
        Ok(cached)
    }

    pub fn inspect(&self) -> Result<DatasetStats> {
        Ok(inspect(&load_dataset(&self.config)?))
    }
}
