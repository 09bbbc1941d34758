// ============================================================
// Layer 5 — Task Losses
// ============================================================
// Every loss is a masked mean: rows (or individual labels) whose
// target_mask is 0 contribute nothing, and the mean is taken over
// the labels that remain.
//
//   regression   MAE or MSE on standardised targets
//   binary       BCE with logits, per label (NaN labels masked)
//   multi-class  cross-entropy against the one-hot target rows

use anyhow::{bail, Result};
use burn::{
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::application::config::RegressionLoss;
use crate::data::batcher::GraphBatch;
use crate::domain::task::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLoss {
    Mae,
    Mse,
    BinaryCrossEntropy,
    CrossEntropy,
}

impl TaskLoss {
    pub fn for_task(task: TaskType, regression: Option<RegressionLoss>) -> Result<Self> {
        Ok(match task {
            TaskType::Regression { .. } => match regression {
                Some(RegressionLoss::Mae) => TaskLoss::Mae,
                Some(RegressionLoss::Mse) => TaskLoss::Mse,
                None => bail!("A loss functions must be specified for regression tasks!"),
            },
            TaskType::Binary { .. } => TaskLoss::BinaryCrossEntropy,
            TaskType::MultiClass { .. } => TaskLoss::CrossEntropy,
        })
    }

    /// pred: [rows, out_dim] → scalar loss [1]
    pub fn forward<B: Backend>(&self, pred: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 1> {
        let target = batch.target.clone();
        let mask = batch.target_mask.clone();
        let per_label = match self {
            TaskLoss::Mae => (pred - target).abs(),
            TaskLoss::Mse => (pred.clone() - target).powf_scalar(2.0),
            TaskLoss::BinaryCrossEntropy => {
                // max(x, 0) − x·y + log(1 + e^{−|x|})
                relu(pred.clone()) - pred.clone() * target + pred.abs().neg().exp().log1p()
            }
            TaskLoss::CrossEntropy => (log_softmax(pred, 1) * target).sum_dim(1).neg(),
        };
        masked_mean(per_label, mask)
    }
}

fn masked_mean<B: Backend>(values: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
    let count = mask.clone().sum().clamp_min(1.0);
    (values * mask).sum() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{BatchContext, GraphBatcher};
    use crate::domain::graph::Graph;
    use crate::domain::task::TaskLevel;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TB = NdArray<f32>;

    fn batch(task: TaskType, ys: Vec<Vec<f32>>) -> GraphBatch<TB> {
        let ctx = BatchContext { task, level: TaskLevel::Graph, split: None, tokens: false };
        let graphs = ys.into_iter().map(|y| Graph::new(1, 1, vec![1.0], &[], y)).collect();
        GraphBatcher::<TB>::new(Default::default(), ctx).batch(graphs)
    }

    fn scalar(t: Tensor<TB, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_mae_and_mse() {
        let b = batch(TaskType::Regression { num_targets: 1 }, vec![vec![1.0], vec![3.0]]);
        let pred = Tensor::<TB, 2>::from_floats([[2.0], [1.0]], &Default::default());
        assert_relative_eq!(scalar(TaskLoss::Mae.forward(pred.clone(), &b)), 1.5);
        assert_relative_eq!(scalar(TaskLoss::Mse.forward(pred, &b)), 2.5);
    }

    #[test]
    fn test_bce_skips_missing_labels() {
        let b = batch(TaskType::Binary { num_tasks: 2 }, vec![vec![1.0, f32::NAN]]);
        let pred = Tensor::<TB, 2>::from_floats([[0.0, 100.0]], &Default::default());
        // only the first label counts: −log σ(0) = ln 2
        assert_relative_eq!(scalar(TaskLoss::BinaryCrossEntropy.forward(pred, &b)), 2f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let b = batch(TaskType::MultiClass { num_classes: 4 }, vec![vec![2.0], vec![0.0]]);
        let pred = Tensor::<TB, 2>::zeros([2, 4], &Default::default());
        assert_relative_eq!(scalar(TaskLoss::CrossEntropy.forward(pred, &b)), 4f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_regression_requires_loss_choice() {
        let err = TaskLoss::for_task(TaskType::Regression { num_targets: 1 }, None).unwrap_err();
        assert!(err.to_string().contains("must be specified"));
        assert_eq!(
            TaskLoss::for_task(TaskType::Binary { num_tasks: 1 }, None).unwrap(),
            TaskLoss::BinaryCrossEntropy
        );
    }
}
