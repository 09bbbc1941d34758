// ============================================================
// Layer 5 — Learning-Rate Schedules
// ============================================================
// Epoch-level schedules. The trainer asks for the rate of the
// current epoch and reports the validation loss afterwards.
//
//   none                constant
//   step                lr · decay^(milestones passed)
//   cosine_with_warmup  linear warm-up, then half a cosine to 0
//   reduce_on_plateau   × factor after `patience` epochs without
//                       a relative val-loss improvement of 1e-4,
//                       never below min_lr
//
// Only the plateau schedule carries state; it is saved in the
// trainer state of every checkpoint.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::application::config::{SchedulerConfig, SchedulerKind};

const PLATEAU_THRESHOLD: f64 = 1e-4;
const WARMUP_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub lr: f64,
    pub best: Option<f64>,
    pub bad_epochs: usize,
}

#[derive(Debug, Clone)]
pub struct LrScheduler {
    config: SchedulerConfig,
    base_lr: f64,
    max_epochs: usize,
    state: SchedulerState,
}

impl LrScheduler {
    pub fn new(config: &SchedulerConfig, base_lr: f64, max_epochs: usize) -> Self {
        Self {
            config: config.clone(),
            base_lr,
            max_epochs,
            state: SchedulerState { lr: base_lr, best: None, bad_epochs: 0 },
        }
    }

    /// Learning rate to train `epoch` with.
    pub fn lr(&self, epoch: usize) -> f64 {
        let c = &self.config;
        match c.kind {
            SchedulerKind::None => self.base_lr,
            SchedulerKind::Step => {
                let passed = c.steps.iter().filter(|&&m| m <= epoch).count() as i32;
                self.base_lr * c.lr_decay.powi(passed)
            }
            SchedulerKind::CosineWithWarmup => {
                let warmup = c.num_warmup_epochs;
                if epoch < warmup {
                    return self.base_lr * (epoch as f64 / warmup as f64).max(WARMUP_FLOOR);
                }
                let span = self.max_epochs.saturating_sub(warmup).max(1) as f64;
                let progress = (epoch - warmup) as f64 / span;
                self.base_lr * (0.5 * (1.0 + (PI * progress).cos())).max(0.0)
            }
            SchedulerKind::ReduceOnPlateau => self.state.lr,
        }
    }

    /// Report the end of an epoch. Only the plateau schedule reacts.
    pub fn step(&mut self, val_loss: Option<f64>) {
        if self.config.kind != SchedulerKind::ReduceOnPlateau {
            return;
        }
        let Some(loss) = val_loss.filter(|l| l.is_finite()) else {
            return;
        };
        let improved = match self.state.best {
            None => true,
            Some(best) => loss < best * (1.0 - PLATEAU_THRESHOLD),
        };
        if improved {
            self.state.best = Some(loss);
            self.state.bad_epochs = 0;
            return;
        }
        self.state.bad_epochs += 1;
        if self.state.bad_epochs > self.config.schedule_patience {
            let reduced = (self.state.lr * self.config.reduce_factor).max(self.config.min_lr);
            if reduced < self.state.lr {
                tracing::info!("Reducing learning rate to {reduced:.2e}");
            }
            self.state.lr = reduced;
            self.state.bad_epochs = 0;
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn restore(&mut self, state: SchedulerState) {
        self.state = state;
    }
}
