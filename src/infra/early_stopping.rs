// ============================================================
// Layer 6 — Early Stopping
// ============================================================
// Tracks the best validation value of the monitored quantity.
//
//   mode      min for loss / mae / mse / rmse, max otherwise
//   improved  strictly better than the best so far
//   stop      epoch − best_epoch > patience  and  epoch + 1 ≥ min_epochs
//
// Non-finite values never count as an improvement.

use serde::{Deserialize, Serialize};

use crate::infra::metrics::EpochRecord;
use crate::ml::metrics::lower_is_better;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub name: String,
    pub lower_is_better: bool,
}

impl Monitor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let lower_is_better = lower_is_better(&name);
        Self { name, lower_is_better }
    }

    pub fn is_better(&self, candidate: f64, best: Option<f64>) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        match best {
            None => true,
            Some(b) if self.lower_is_better => candidate < b,
            Some(b) => candidate > b,
        }
    }

    pub fn mode(&self) -> &'static str {
        if self.lower_is_better {
            "min"
        } else {
            "max"
        }
    }
}

/// Best-so-far bookkeeping, saved with every checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestState {
    pub best_epoch: Option<usize>,
    pub best_value: Option<f64>,
}

pub struct EarlyStopping {
    pub monitor: Monitor,
    patience: usize,
    min_epochs: usize,
    state: BestState,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, patience: usize, min_epochs: usize) -> Self {
        Self { monitor, patience, min_epochs, state: BestState::default() }
    }

    /// Look at the validation result of `record`; true on improvement.
    pub fn observe(&mut self, record: &EpochRecord) -> bool {
        let Some(value) = record.val.value(&self.monitor.name) else {
            return false;
        };
        if self.monitor.is_better(value, self.state.best_value) {
            self.state = BestState { best_epoch: Some(record.epoch), best_value: Some(value) };
            true
        } else {
            false
        }
    }

    pub fn should_stop(&self, epoch: usize) -> bool {
        let stale = self
            .state
            .best_epoch
            .is_some_and(|best| epoch.saturating_sub(best) > self.patience);
        stale && epoch + 1 >= self.min_epochs
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.state.best_epoch
    }

    pub fn state(&self) -> &BestState {
        &self.state
    }

    pub fn restore(&mut self, state: BestState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_loss: f64) -> EpochRecord {
        let mut r = EpochRecord { epoch, ..Default::default() };
        r.val.loss = val_loss;
        r
    }

    #[test]
    fn test_mode_per_metric() {
        assert_eq!(Monitor::new("loss").mode(), "min");
        assert_eq!(Monitor::new("mae").mode(), "min");
        assert_eq!(Monitor::new("mcc").mode(), "max");
        assert_eq!(Monitor::new("auroc").mode(), "max");
    }

    #[test]
    fn test_stops_exactly_after_patience() {
        let mut es = EarlyStopping::new(Monitor::new("loss"), 2, 0);
        assert!(es.observe(&record(0, 1.0)));
        for epoch in 1..=2 {
            assert!(!es.observe(&record(epoch, 1.5)));
            assert!(!es.should_stop(epoch));
        }
        assert!(!es.observe(&record(3, 1.5)));
        assert!(es.should_stop(3));
        assert_eq!(es.best_epoch(), Some(0));
    }

    #[test]
    fn test_min_epochs_delays_stop() {
        let mut es = EarlyStopping::new(Monitor::new("loss"), 0, 5);
        es.observe(&record(0, 1.0));
        assert!(!es.should_stop(2));
        assert!(es.should_stop(4));
    }

    #[test]
    fn test_nan_is_never_best() {
        let mut es = EarlyStopping::new(Monitor::new("loss"), 1, 0);
        assert!(!es.observe(&record(0, f64::NAN)));
        assert!(!es.should_stop(10));
        assert!(es.observe(&record(1, 3.0)));
    }
}
