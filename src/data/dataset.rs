use burn::data::dataset::Dataset;

use crate::domain::collection::GraphCollection;
use crate::domain::graph::Graph;
use crate::domain::task::Split;

/// The graphs of one split, owned.
pub struct GraphDataset {
    graphs: Vec<Graph>,
}

impl GraphDataset {
    pub fn new(graphs: Vec<Graph>) -> Self {
        Self { graphs }
    }

    pub fn from_split(collection: &GraphCollection, split: Split) -> Self {
        Self::new(collection.split_graphs(split))
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }
}

impl Dataset<Graph> for GraphDataset {
    fn get(&self, index: usize) -> Option<Graph> {
        self.graphs.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.graphs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collection::SplitIndices;
    use crate::domain::task::{TaskLevel, TaskType};

    #[test]
    fn test_split_selection() {
        let graphs = (0..4)
            .map(|i| Graph::new(i + 1, 1, vec![0.0; i + 1], &[], vec![i as f32]))
            .collect();
        let c = GraphCollection {
            name: "toy".into(),
            level: TaskLevel::Graph,
            task: TaskType::Regression { num_targets: 1 },
            graphs,
            splits: SplitIndices { train: vec![3, 1], val: vec![0], test: vec![2] },
            target_names: Vec::new(),
        };
        let ds = GraphDataset::from_split(&c, Split::Train);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().y, vec![3.0]);
        assert!(ds.get(2).is_none());
    }
}
