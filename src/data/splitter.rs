// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Randomly shuffles indices and splits them into three sets:
//   - Training set:   used to update model weights
//   - Validation set: drives checkpointing and early stopping
//   - Test set:       reported once, with the best checkpoint
//
// Every shuffle is driven by an explicit seed so two runs with
// the same seed see exactly the same partition.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::collection::SplitIndices;
use crate::domain::graph::NodeMasks;

/// Shuffle `0..total` with `seed` and split into (train, val, test).
///
/// `train_fraction` and `val_fraction` are rounded to whole items;
/// the test set takes whatever remains.
pub fn split_indices(total: usize, train_fraction: f64, val_fraction: f64, seed: u64) -> SplitIndices {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut idx: Vec<usize> = (0..total).collect();
    idx.shuffle(&mut rng);

    // Clamp to valid range to avoid panics on tiny datasets
    let n_train = ((total as f64) * train_fraction).round() as usize;
    let n_train = n_train.min(total);
    let n_val = ((total as f64) * val_fraction).round() as usize;
    let n_val = n_val.min(total - n_train);

    let test = idx.split_off(n_train + n_val);
    let val = idx.split_off(n_train);

    tracing::debug!(
        "Dataset split: {} train, {} val, {} test",
        idx.len(),
        val.len(),
        test.len()
    );

    SplitIndices { train: idx, val, test }
}

/// Node masks for a node-level graph with no predefined split.
pub fn split_nodes(num_nodes: usize, train_fraction: f64, val_fraction: f64, seed: u64) -> NodeMasks {
    let split = split_indices(num_nodes, train_fraction, val_fraction, seed);
    let to_mask = |ids: &[usize]| {
        let mut m = vec![false; num_nodes];
        for &i in ids {
            m[i] = true;
        }
        m
    };
    NodeMasks {
        train: to_mask(&split.train),
        val: to_mask(&split.val),
        test: to_mask(&split.test),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_correct_split_sizes() {
        let s = split_indices(100, 0.8, 0.1, 0);
        assert_eq!(s.train.len(), 80);
        assert_eq!(s.val.len(), 10);
        assert_eq!(s.test.len(), 10);
    }

    #[test]
    fn test_disjoint_and_complete() {
        let s = split_indices(57, 0.7, 0.15, 3);
        let all: HashSet<usize> = s.train.iter().chain(&s.val).chain(&s.test).copied().collect();
        assert_eq!(all.len(), 57);
        assert_eq!(s.train.len() + s.val.len() + s.test.len(), 57);
    }

    #[test]
    fn test_same_seed_same_split() {
        assert_eq!(split_indices(40, 0.8, 0.1, 11), split_indices(40, 0.8, 0.1, 11));
        assert_ne!(split_indices(40, 0.8, 0.1, 11).train, split_indices(40, 0.8, 0.1, 12).train);
    }

    #[test]
    fn test_empty_dataset() {
        let s = split_indices(0, 0.8, 0.1, 0);
        assert!(s.train.is_empty() && s.val.is_empty() && s.test.is_empty());
    }

    #[test]
    fn test_node_masks_partition_nodes() {
        let m = split_nodes(20, 0.5, 0.25, 1);
        for i in 0..20 {
            let hits = [m.train[i], m.val[i], m.test[i]].iter().filter(|&&b| b).count();
            assert_eq!(hits, 1);
        }
        assert_eq!(m.train.iter().filter(|&&b| b).count(), 10);
    }
}
