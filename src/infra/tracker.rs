// ============================================================
// Layer 6 — Experiment Trackers
// ============================================================
// Implementations of the ExperimentTracker trait.
//
//   JsonlTracker  appends one JSON object per line to
//                 {run_dir}/tracker.jsonl:
//                   {"type":"start","run":..,"time":..,"config":{..}}
//                   {"type":"epoch","epoch":3,"values":{..}}
//                   {"type":"summary","values":{..}}
//                   {"type":"finish","time":..}
//   NoopTracker   discards everything

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::application::config::TrackerKind;
use crate::domain::traits::ExperimentTracker;

pub struct JsonlTracker {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlTracker {
    pub fn open(run_dir: impl AsRef<Path>, run_name: &str, config: &Value) -> Result<Self> {
        let path = run_dir.as_ref().join("tracker.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open tracker file '{}'", path.display()))?;
        let mut tracker = Self { path, writer: BufWriter::new(file) };
        tracker.write(&json!({
            "type": "start",
            "run": run_name,
            "time": Utc::now().to_rfc3339(),
            "config": config,
        }))?;
        Ok(tracker)
    }

    fn write(&mut self, record: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        // One flush per record so a crashed run keeps its history
        self.writer
            .flush()
            .with_context(|| format!("Cannot write '{}'", self.path.display()))
    }
}

impl ExperimentTracker for JsonlTracker {
    fn log(&mut self, epoch: usize, values: &Value) -> Result<()> {
        self.write(&json!({ "type": "epoch", "epoch": epoch, "values": values }))
    }

    fn summary(&mut self, values: &Value) -> Result<()> {
        self.write(&json!({ "type": "summary", "values": values }))
    }

    fn finish(&mut self) -> Result<()> {
        self.write(&json!({ "type": "finish", "time": Utc::now().to_rfc3339() }))
    }
}

pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn log(&mut self, _epoch: usize, _values: &Value) -> Result<()> {
        Ok(())
    }

    fn summary(&mut self, _values: &Value) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Tracker selected by the output configuration.
pub fn open_tracker(
    kind: TrackerKind,
    run_dir: impl AsRef<Path>,
    run_name: &str,
    config: &Value,
) -> Result<Box<dyn ExperimentTracker>> {
    Ok(match kind {
        TrackerKind::Jsonl => Box::new(JsonlTracker::open(run_dir, run_name, config)?),
        TrackerKind::None => Box::new(NoopTracker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = open_tracker(TrackerKind::Jsonl, dir.path(), "run", &json!({"seed": 1})).unwrap();
        t.log(0, &json!({"train/loss": 0.5})).unwrap();
        t.summary(&json!({"best/epoch": 0})).unwrap();
        t.finish().unwrap();

        let text = std::fs::read_to_string(dir.path().join("tracker.jsonl")).unwrap();
        let records: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["type"], "start");
        assert_eq!(records[0]["config"]["seed"], 1);
        assert_eq!(records[1]["values"]["train/loss"], 0.5);
        assert_eq!(records[3]["type"], "finish");
    }

    #[test]
    fn test_noop_tracker_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = open_tracker(TrackerKind::None, dir.path(), "run", &Value::Null).unwrap();
        t.log(0, &json!({})).unwrap();
        assert!(!dir.path().join("tracker.jsonl").exists());
    }
}
