// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Plain-Rust metrics over host predictions. Inputs are row-major
// [rows, out_dim] model outputs (already inverse-transformed for
// regression) and [rows, target_width] stored targets with NaN
// for missing labels.
//
//   regression   mae, mse, rmse, r2 (r2 averaged over targets)
//   binary       auroc, ap (averaged over labels with both
//                classes present), accuracy, mcc (pooled)
//   multi-class  accuracy, mcc, f1 (macro)

use std::collections::BTreeMap;

use crate::domain::task::TaskType;

pub type MetricMap = BTreeMap<String, f64>;

/// Metric names where a lower value is better.
pub fn lower_is_better(name: &str) -> bool {
    matches!(name, "loss" | "mae" | "mse" | "rmse")
}

/// Metric columns produced by `compute` for a task, in sorted order.
pub fn metric_names(task: TaskType) -> &'static [&'static str] {
    match task {
        TaskType::Regression { .. } => &["mae", "mse", "r2", "rmse"],
        TaskType::Binary { .. } => &["accuracy", "ap", "auroc", "mcc"],
        TaskType::MultiClass { .. } => &["accuracy", "f1", "mcc"],
    }
}

pub fn compute(task: TaskType, pred: &[f32], target: &[f32]) -> MetricMap {
    match task {
        TaskType::Regression { num_targets } => regression(pred, target, num_targets),
        TaskType::Binary { num_tasks } => binary(pred, target, num_tasks),
        TaskType::MultiClass { num_classes } => multiclass(pred, target, num_classes),
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Regression ──────────────────────────────────────────────────────────────

fn regression(pred: &[f32], target: &[f32], width: usize) -> MetricMap {
    let mut abs = 0.0;
    let mut sq = 0.0;
    let mut count = 0usize;
    let mut r2_sum = 0.0;
    let mut r2_count = 0usize;

    for col in 0..width {
        let pairs: Vec<(f64, f64)> = pred
            .iter()
            .skip(col)
            .step_by(width)
            .zip(target.iter().skip(col).step_by(width))
            .filter(|(_, y)| y.is_finite())
            .map(|(&p, &y)| (p as f64, y as f64))
            .collect();
        if pairs.is_empty() {
            continue;
        }
        let mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / pairs.len() as f64;
        let ss_tot: f64 = pairs.iter().map(|(_, y)| (y - mean).powi(2)).sum();
        let ss_res: f64 = pairs.iter().map(|(p, y)| (y - p).powi(2)).sum();
        abs += pairs.iter().map(|(p, y)| (y - p).abs()).sum::<f64>();
        sq += ss_res;
        count += pairs.len();
        if ss_tot > 0.0 {
            r2_sum += 1.0 - ss_res / ss_tot;
            r2_count += 1;
        }
    }

    let n = count.max(1) as f64;
    let mut m = MetricMap::new();
    m.insert("mae".into(), abs / n);
    m.insert("mse".into(), sq / n);
    m.insert("rmse".into(), (sq / n).sqrt());
    m.insert("r2".into(), if r2_count > 0 { r2_sum / r2_count as f64 } else { f64::NAN });
    m
}

// ─── Binary ──────────────────────────────────────────────────────────────────

/// Area under the ROC curve with tied scores given their average rank.
/// None when only one class is present.
pub fn auroc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let pos = labels.iter().filter(|&&l| l).count();
    let neg = labels.len() - pos;
    if pos == 0 || neg == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks i+1 ..= j+1 share their mean
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum_pos += order[i..=j].iter().filter(|&&k| labels[k]).count() as f64 * avg_rank;
        i = j + 1;
    }
    let pos = pos as f64;
    Some((rank_sum_pos - pos * (pos + 1.0) / 2.0) / (pos * neg as f64))
}

/// Average precision: Σ (R_k − R_{k−1}) P_k over distinct thresholds.
/// None when there are no positives.
pub fn average_precision(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let total_pos = labels.iter().filter(|&&l| l).count();
    if total_pos == 0 {
        return None;
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut tp, mut seen, mut ap, mut prev_recall) = (0usize, 0usize, 0.0, 0.0);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            tp += usize::from(labels[order[i]]);
            seen += 1;
            i += 1;
        }
        let recall = tp as f64 / total_pos as f64;
        ap += (recall - prev_recall) * (tp as f64 / seen as f64);
        prev_recall = recall;
    }
    Some(ap)
}

/// Matthews correlation from a confusion matrix (rows: truth,
/// columns: prediction). Gorodkin's R_K; equals the usual MCC for
/// two classes. 0 when undefined.
pub fn mcc(confusion: &[Vec<usize>]) -> f64 {
    let k = confusion.len();
    let s: f64 = confusion.iter().flatten().sum::<usize>() as f64;
    let c: f64 = (0..k).map(|i| confusion[i][i] as f64).sum();
    let t: Vec<f64> = (0..k).map(|i| confusion[i].iter().sum::<usize>() as f64).collect();
    let p: Vec<f64> = (0..k).map(|j| confusion.iter().map(|row| row[j]).sum::<usize>() as f64).collect();
    let tp: f64 = t.iter().zip(&p).map(|(a, b)| a * b).sum();
    let denom = ((s * s - p.iter().map(|x| x * x).sum::<f64>()) * (s * s - t.iter().map(|x| x * x).sum::<f64>())).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (c * s - tp) / denom
    }
}

fn binary(pred: &[f32], target: &[f32], width: usize) -> MetricMap {
    let mut confusion = vec![vec![0usize; 2]; 2];
    let (mut auroc_sum, mut auroc_n, mut ap_sum, mut ap_n) = (0.0, 0usize, 0.0, 0usize);

    for col in 0..width {
        let (scores, labels): (Vec<f64>, Vec<bool>) = pred
            .iter()
            .skip(col)
            .step_by(width)
            .zip(target.iter().skip(col).step_by(width))
            .filter(|(_, y)| y.is_finite())
            .map(|(&p, &y)| (sigmoid(p as f64), y > 0.5))
            .unzip();
        for (s, &l) in scores.iter().zip(&labels) {
            confusion[usize::from(l)][usize::from(*s >= 0.5)] += 1;
        }
        if let Some(a) = auroc(&scores, &labels) {
            auroc_sum += a;
            auroc_n += 1;
        }
        if labels.iter().any(|&l| !l) {
            if let Some(a) = average_precision(&scores, &labels) {
                ap_sum += a;
                ap_n += 1;
            }
        }
    }

    let total: usize = confusion.iter().flatten().sum();
    let mean_or_nan = |sum: f64, n: usize| if n > 0 { sum / n as f64 } else { f64::NAN };
    let mut m = MetricMap::new();
    m.insert("accuracy".into(), (confusion[0][0] + confusion[1][1]) as f64 / total.max(1) as f64);
    m.insert("mcc".into(), mcc(&confusion));
    m.insert("auroc".into(), mean_or_nan(auroc_sum, auroc_n));
    m.insert("ap".into(), mean_or_nan(ap_sum, ap_n));
    m
}

// ─── Multi-class ─────────────────────────────────────────────────────────────

fn multiclass(pred: &[f32], target: &[f32], classes: usize) -> MetricMap {
    let mut confusion = vec![vec![0usize; classes]; classes];
    for (row, &y) in pred.chunks(classes).zip(target) {
        if !y.is_finite() {
            continue;
        }
        let guess = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        confusion[(y as usize).min(classes - 1)][guess] += 1;
    }

    let total: usize = confusion.iter().flatten().sum();
    let correct: usize = (0..classes).map(|i| confusion[i][i]).sum();

    // Macro F1 over classes that appear in the labels or the predictions
    let mut f1_sum = 0.0;
    let mut f1_n = 0;
    for c in 0..classes {
        let tp = confusion[c][c] as f64;
        let actual: usize = confusion[c].iter().sum();
        let predicted: usize = confusion.iter().map(|r| r[c]).sum();
        if actual + predicted == 0 {
            continue;
        }
        f1_sum += 2.0 * tp / (actual + predicted) as f64;
        f1_n += 1;
    }

    let mut m = MetricMap::new();
    m.insert("accuracy".into(), correct as f64 / total.max(1) as f64);
    m.insert("mcc".into(), mcc(&confusion));
    m.insert("f1".into(), if f1_n > 0 { f1_sum / f1_n as f64 } else { 0.0 });
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_metric_names_match_compute() {
        let tasks = [
            (TaskType::Regression { num_targets: 1 }, vec![0.5f32, 1.0], vec![0.0f32, 1.0]),
            (TaskType::Binary { num_tasks: 1 }, vec![-1.0, 1.0], vec![0.0, 1.0]),
            (TaskType::MultiClass { num_classes: 2 }, vec![1.0, 0.0, 0.0, 1.0], vec![0.0, 1.0]),
        ];
        for (task, pred, target) in tasks {
            let keys: Vec<String> = compute(task, &pred, &target).into_keys().collect();
            assert_eq!(keys, metric_names(task));
        }
    }

    #[test]
    fn test_auroc_with_ties() {
        // one tie between a positive and a negative counts half
        let scores = [0.1, 0.4, 0.4, 0.8];
        let labels = [false, false, true, true];
        assert_relative_eq!(auroc(&scores, &labels).unwrap(), 0.875);
        assert!(auroc(&scores, &[true; 4]).is_none());
    }

    #[test]
    fn test_average_precision() {
        let scores = [0.9, 0.8, 0.7, 0.6];
        let labels = [true, false, true, false];
        // (1/2)·1 + (1/2)·(2/3)
        assert_relative_eq!(average_precision(&scores, &labels).unwrap(), 0.5 + 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_binary_mcc_hand_computed() {
        // tn = 5, fp = 1, fn = 2, tp = 4
        let confusion = vec![vec![5, 1], vec![2, 4]];
        let expected = (4.0 * 5.0 - 1.0 * 2.0) / ((5.0f64) * 6.0 * 7.0 * 6.0).sqrt();
        assert_relative_eq!(mcc(&confusion), expected, epsilon = 1e-12);
        assert_eq!(mcc(&[vec![3, 0], vec![0, 0]]), 0.0);
    }

    #[test]
    fn test_regression_metrics() {
        let m = compute(TaskType::Regression { num_targets: 1 }, &[1.0, 2.0, 4.0], &[1.0, 3.0, f32::NAN]);
        assert_relative_eq!(m["mae"], 0.5);
        assert_relative_eq!(m["mse"], 0.5);
        // targets 1, 3: ss_tot = 2, ss_res = 1
        assert_relative_eq!(m["r2"], 0.5);
    }

    #[test]
    fn test_multiclass_metrics() {
        let pred = [0.9, 0.1, 0.0, 0.2, 0.7, 0.1, 0.1, 0.8, 0.1];
        let target = [0.0, 1.0, 2.0];
        let m = compute(TaskType::MultiClass { num_classes: 3 }, &pred, &target);
        assert_relative_eq!(m["accuracy"], 2.0 / 3.0);
        // f1: class 0 = 1, class 1 = 2/3, class 2 = 0
        assert_relative_eq!(m["f1"], (1.0 + 2.0 / 3.0) / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_binary_metrics_skip_nan() {
        let m = compute(TaskType::Binary { num_tasks: 1 }, &[3.0, -3.0, 0.0], &[1.0, 0.0, f32::NAN]);
        assert_relative_eq!(m["accuracy"], 1.0);
        assert_relative_eq!(m["auroc"], 1.0);
        assert_relative_eq!(m["mcc"], 1.0);
    }
}
