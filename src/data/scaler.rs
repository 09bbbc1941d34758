// ============================================================
// Layer 4 — Target Standardisation
// ============================================================
// Regression targets are standardised per target column with
// statistics from the training split only. The model learns on
// the standardised scale; predictions are mapped back before
// metrics are computed, so MAE / RMSE are in original units.
//
// NaN targets (missing labels) are skipped when fitting and
// stay NaN after transforming.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl StandardScaler {
    /// Identity scaler with `width` columns.
    pub fn identity(width: usize) -> Self {
        Self { mean: vec![0.0; width], std: vec![1.0; width] }
    }

    /// Fit on row-major values with `width` columns.
    pub fn fit(values: &[f32], width: usize) -> Self {
        let mut sum = vec![0.0f64; width];
        let mut sq = vec![0.0f64; width];
        let mut count = vec![0usize; width];
        for row in values.chunks(width) {
            for (c, &v) in row.iter().enumerate() {
                if v.is_finite() {
                    sum[c] += v as f64;
                    sq[c] += (v as f64) * (v as f64);
                    count[c] += 1;
                }
            }
        }
        let mut mean = vec![0.0; width];
        let mut std = vec![1.0; width];
        for c in 0..width {
            if count[c] > 0 {
                let n = count[c] as f64;
                mean[c] = sum[c] / n;
                let var = (sq[c] / n - mean[c] * mean[c]).max(0.0);
                // A constant column keeps unit scale
                std[c] = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
            }
        }
        Self { mean, std }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, values: &mut [f32]) {
        let w = self.width();
        for row in values.chunks_mut(w) {
            for (c, v) in row.iter_mut().enumerate() {
                *v = ((*v as f64 - self.mean[c]) / self.std[c]) as f32;
            }
        }
    }

    pub fn inverse_transform(&self, values: &mut [f32]) {
        let w = self.width();
        for row in values.chunks_mut(w) {
            for (c, v) in row.iter_mut().enumerate() {
                *v = (*v as f64 * self.std[c] + self.mean[c]) as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fit_transform_inverse() {
        let train = [1.0f32, 2.0, 3.0, 4.0];
        let scaler = StandardScaler::fit(&train, 1);
        assert_abs_diff_eq!(scaler.mean[0], 2.5, epsilon = 1e-9);

        let mut v = train.to_vec();
        scaler.transform(&mut v);
        let mean: f32 = v.iter().sum::<f32>() / 4.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-6);

        scaler.inverse_transform(&mut v);
        for (a, b) in v.iter().zip(train.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_nan_is_ignored_and_kept() {
        let scaler = StandardScaler::fit(&[1.0, f32::NAN, 3.0, 5.0], 2);
        assert_abs_diff_eq!(scaler.mean[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(scaler.mean[1], 5.0, epsilon = 1e-9);
        // single value column → std falls back to 1
        assert_abs_diff_eq!(scaler.std[1], 1.0, epsilon = 1e-9);

        let mut v = vec![f32::NAN, 5.0];
        scaler.transform(&mut v);
        assert!(v[0].is_nan());
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-6);
    }
}
