// ============================================================
// Layer 5 — Dynamic Loss Scaling
// ============================================================
// Used by the gpu-mixed regime. The loss is multiplied by `scale`
// before backward, and the gradients are divided by it again
// before the optimiser sees them. A non-finite gradient skips the
// step and halves the scale; `growth_interval` clean steps in a
// row double it.
//
// Disabled, the scaler is a pass-through that never skips.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

const GROWTH_INTERVAL: usize = 2000;
const MIN_SCALE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub scale: f64,
    pub good_steps: usize,
}

#[derive(Debug, Clone)]
pub struct GradScaler {
    enabled: bool,
    growth_interval: usize,
    state: ScalerState,
}

impl GradScaler {
    pub fn new(enabled: bool, init_scale: f64) -> Self {
        Self {
            enabled,
            growth_interval: GROWTH_INTERVAL,
            state: ScalerState { scale: init_scale.max(MIN_SCALE), good_steps: 0 },
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1.0)
    }

    pub fn with_growth_interval(mut self, interval: usize) -> Self {
        self.growth_interval = interval.max(1);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn scale(&self) -> f64 {
        if self.enabled {
            self.state.scale
        } else {
            1.0
        }
    }

    pub fn scale_loss<B: Backend>(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        if self.enabled {
            loss * self.state.scale
        } else {
            loss
        }
    }

    /// Divide every gradient of `module` by the scale. Returns false
    /// when any of them is not finite.
    pub fn unscale<B, M>(&self, module: &M, grads: &mut GradientsParams) -> bool
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        if !self.enabled {
            return true;
        }
        let mut visitor = Unscale::<B> {
            grads,
            inv_scale: 1.0 / self.state.scale,
            finite: true,
            backend: PhantomData,
        };
        module.visit(&mut visitor);
        visitor.finite
    }

    /// Record the outcome of one optimiser step.
    pub fn update(&mut self, finite: bool) {
        if !self.enabled {
            return;
        }
        if finite {
            self.state.good_steps += 1;
            if self.state.good_steps >= self.growth_interval {
                self.state.scale *= 2.0;
                self.state.good_steps = 0;
            }
        } else {
            self.state.scale = (self.state.scale / 2.0).max(MIN_SCALE);
            self.state.good_steps = 0;
            tracing::debug!("Gradient overflow, loss scale now {}", self.state.scale);
        }
    }

    pub fn state(&self) -> &ScalerState {
        &self.state
    }

    pub fn restore(&mut self, state: ScalerState) {
        self.state = state;
    }
}

struct Unscale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    inv_scale: f64,
    finite: bool,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Unscale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            let grad = grad * self.inv_scale;
            let total: f64 = grad.clone().sum().into_scalar().elem();
            if !total.is_finite() {
                self.finite = false;
            }
            self.grads.register::<B::InnerBackend, D>(id, grad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type AB = Autodiff<NdArray<f32>>;

    fn grads(model: &Linear<AB>, scaler: &GradScaler) -> GradientsParams {
        let device = Default::default();
        let x = Tensor::<AB, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let loss = scaler.scale_loss(model.forward(x).sum());
        GradientsParams::from_grads(loss.backward(), model)
    }

    fn weight_grad(model: &Linear<AB>, g: &GradientsParams) -> Vec<f32> {
        g.get::<NdArray<f32>, 2>(model.weight.id).unwrap().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_unscale_recovers_plain_gradients() {
        let model = LinearConfig::new(2, 3).init::<AB>(&Default::default());
        let plain = grads(&model, &GradScaler::disabled());

        let scaler = GradScaler::new(true, 1024.0);
        let mut scaled = grads(&model, &scaler);
        assert!(scaler.unscale::<AB, _>(&model, &mut scaled));
        for (a, b) in weight_grad(&model, &plain).iter().zip(weight_grad(&model, &scaled)) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_overflow_halves_and_growth_doubles() {
        let mut s = GradScaler::new(true, 8.0).with_growth_interval(2);
        s.update(false);
        assert_eq!(s.scale(), 4.0);
        s.update(true);
        s.update(true);
        assert_eq!(s.scale(), 8.0);
        assert_eq!(s.state().good_steps, 0);
    }

    #[test]
    fn test_disabled_is_identity() {
        let mut s = GradScaler::disabled();
        s.update(false);
        assert_eq!(s.scale(), 1.0);
        assert!(!s.is_enabled());
    }
}
