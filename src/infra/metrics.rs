// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records per-split results to a CSV file after each epoch.
//
// One row per (epoch, split). The metric columns depend on the
// task, so they are fixed when the file is created:
//
//   epoch,split,loss,lr,accuracy,ap,auroc,mcc
//   0,train,0.693100,0.001000,0.512000,...
//   0,val,0.688000,0.001000,0.530000,...
//   0,test,0.690200,0.001000,0.521000,...
//
// A resumed run appends to the existing file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::task::Split;
use crate::ml::metrics::MetricMap;

/// Loss and metrics of one split in one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitStats {
    pub loss: f64,
    pub metrics: MetricMap,
}

impl SplitStats {
    /// "loss" or a metric name.
    pub fn value(&self, name: &str) -> Option<f64> {
        if name == "loss" {
            Some(self.loss)
        } else {
            self.metrics.get(name).copied()
        }
    }
}

/// Everything measured in one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub lr: f64,
    /// Seconds spent in the training pass
    pub train_time: f64,
    pub train: SplitStats,
    pub val: SplitStats,
    pub test: SplitStats,
}

impl EpochRecord {
    pub fn split(&self, split: Split) -> &SplitStats {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

/// Logs epoch records to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
    columns: Vec<String>,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>, columns: Vec<String>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("Cannot create '{}'", dir.display()))?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            let mut header = vec!["epoch".to_string(), "split".into(), "loss".into(), "lr".into()];
            header.extend(columns.iter().cloned());
            writeln!(f, "{}", header.join(","))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, columns })
    }

    /// Append the three rows of one epoch.
    pub fn log(&self, r: &EpochRecord) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        for split in Split::ALL {
            let stats = r.split(split);
            let mut row = vec![r.epoch.to_string(), split.name().to_string(), format!("{:.6}", stats.loss), format!("{:.6}", r.lr)];
            row.extend(
                self.columns
                    .iter()
                    .map(|c| stats.metrics.get(c).map(|v| format!("{v:.6}")).unwrap_or_default()),
            );
            writeln!(f, "{}", row.join(","))?;
        }

        tracing::debug!("Logged epoch {} metrics to '{}'", r.epoch, self.csv_path.display());
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

/// "Best so far" line over the history, for a chosen epoch and monitor.
pub fn best_so_far_line(best: &EpochRecord, monitor: &str) -> String {
    let part = |split: Split| {
        let s = best.split(split);
        let mut out = format!("{split}_loss: {:.4}", s.loss);
        if monitor != "loss" {
            out.push_str(&format!(" {split}_{monitor}: {:.4}", s.value(monitor).unwrap_or(0.0)));
        }
        out
    };
    format!(
        "> Best so far: epoch {}\t{}\t{}\t{}",
        best.epoch,
        part(Split::Train),
        part(Split::Val),
        part(Split::Test)
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        let mut r = EpochRecord { epoch, lr: 0.01, ..Default::default() };
        r.train.loss = 1.0;
        r.val.loss = val_loss;
        r.val.metrics.insert("mae".into(), 0.25);
        r
    }

    #[test]
    fn test_csv_rows_per_split() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path(), vec!["mae".into(), "r2".into()]).unwrap();
        logger.log(&record(0, 0.5)).unwrap();
        logger.log(&record(1, 0.4)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,split,loss,lr,mae,r2");
        assert_eq!(lines.len(), 1 + 2 * 3);
        assert_eq!(lines[2], "0,val,0.500000,0.010000,0.250000,");

        // reopening appends instead of rewriting the header
        let again = MetricsLogger::new(dir.path(), vec!["mae".into()]).unwrap();
        again.log(&record(2, 0.3)).unwrap();
        assert_eq!(fs::read_to_string(again.csv_path()).unwrap().lines().count(), 10);
    }

    #[test]
    fn test_best_line_mentions_monitor() {
        let line = best_so_far_line(&record(3, 0.5), "mae");
        assert!(line.contains("epoch 3"));
        assert!(line.contains("val_mae: 0.2500"));
        assert!(line.contains("train_mae: 0.0000"));
    }
}
