// ============================================================
// Layer 4 — Graph Loader
// ============================================================
// Feeds batches to the training loop. Each epoch gets its own
// permutation derived from (seed, epoch), so a resumed run sees
// the same order a straight run would have seen.
//
// Training loaders never emit a single-graph tail batch: when
// len % batch_size == 1 the batch size grows by one.

use burn::{data::dataloader::batcher::Batcher, data::dataset::Dataset, prelude::*};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::batcher::{GraphBatch, GraphBatcher};
use crate::data::dataset::GraphDataset;

pub struct GraphLoader<B: Backend> {
    dataset: GraphDataset,
    batcher: GraphBatcher<B>,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

/// Batch size actually used for a training split of `len` graphs.
pub fn effective_batch_size(len: usize, batch_size: usize) -> usize {
    if batch_size > 1 && len % batch_size == 1 {
        batch_size + 1
    } else {
        batch_size.max(1)
    }
}

impl<B: Backend> GraphLoader<B> {
    /// Shuffled loader for training.
    pub fn train(dataset: GraphDataset, batcher: GraphBatcher<B>, batch_size: usize, seed: u64) -> Self {
        let batch_size = effective_batch_size(dataset.len(), batch_size);
        Self { dataset, batcher, batch_size, shuffle: true, seed }
    }

    /// Fixed-order loader for evaluation.
    pub fn eval(dataset: GraphDataset, batcher: GraphBatcher<B>, batch_size: usize) -> Self {
        Self { dataset, batcher, batch_size: batch_size.max(1), shuffle: false, seed: 0 }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Graph indices of every batch for a given epoch.
    pub fn order(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut idx: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            idx.shuffle(&mut rng);
        }
        idx.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }

    /// Iterate the batches of one epoch.
    pub fn iter(&self, epoch: usize) -> impl Iterator<Item = GraphBatch<B>> + '_ {
        self.order(epoch).into_iter().map(move |chunk| {
            let items = chunk.iter().filter_map(|&i| self.dataset.get(i)).collect();
            self.batcher.batch(items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::BatchContext;
    use crate::domain::graph::Graph;
    use crate::domain::task::{TaskLevel, TaskType};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn loader(n: usize, bs: usize, train: bool) -> GraphLoader<TestBackend> {
        let graphs = (0..n).map(|i| Graph::new(1, 1, vec![1.0], &[], vec![i as f32])).collect();
        let ctx = BatchContext {
            task: TaskType::Regression { num_targets: 1 },
            level: TaskLevel::Graph,
            split: None,
            tokens: false,
        };
        let batcher = GraphBatcher::new(Default::default(), ctx);
        if train {
            GraphLoader::train(GraphDataset::new(graphs), batcher, bs, 7)
        } else {
            GraphLoader::eval(GraphDataset::new(graphs), batcher, bs)
        }
    }

    #[test]
    fn test_no_singleton_batch() {
        assert_eq!(effective_batch_size(33, 32), 33);
        assert_eq!(effective_batch_size(64, 32), 32);
        assert_eq!(effective_batch_size(5, 1), 1);
        let l = loader(9, 4, true);
        assert_eq!(l.batch_size(), 5);
        assert_eq!(l.num_batches(), 2);
    }

    #[test]
    fn test_epoch_orders_are_seeded() {
        let l = loader(20, 4, true);
        assert_eq!(l.order(3), l.order(3));
        assert_ne!(l.order(3), l.order(4));
        let mut all: Vec<usize> = l.order(1).concat();
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_eval_keeps_order() {
        let l = loader(5, 2, false);
        assert_eq!(l.order(9), vec![vec![0, 1], vec![2, 3], vec![4]]);
        let batches: Vec<_> = l.iter(0).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].raw_targets, vec![4.0]);
    }
}
