// ============================================================
// Layer 3 — Graph Collection
// ============================================================
// The uniform in-memory shape every dataset adapter produces:
// a list of graphs, the task attached to them, and the
// train/val/test partition.
//
// Graph-level datasets partition graph indices.
// Node-level datasets either hold graphs whose nodes carry split
// masks, in which case every split points at every graph, or
// several unmasked graphs partitioned like a graph-level dataset.

use serde::{Deserialize, Serialize};

use super::graph::Graph;
use super::task::{Split, TaskLevel, TaskType};

/// Graph indices per split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    pub fn get(&self, split: Split) -> &[usize] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    /// Every split points at the lone graph of a node-level dataset.
    pub fn single_graph() -> Self {
        Self { train: vec![0], val: vec![0], test: vec![0] }
    }
}

#[derive(Debug, Clone)]
pub struct GraphCollection {
    pub name: String,
    pub level: TaskLevel,
    pub task: TaskType,
    pub graphs: Vec<Graph>,
    pub splits: SplitIndices,
    /// Names of the stored targets, when the source provides them
    pub target_names: Vec<String>,
}

impl GraphCollection {
    pub fn node_dim(&self) -> usize {
        self.graphs.first().map(|g| g.node_dim).unwrap_or(0)
    }

    pub fn edge_dim(&self) -> usize {
        self.graphs.first().map(|g| g.edge_dim).unwrap_or(0)
    }

    pub fn is_node_level(&self) -> bool {
        self.level == TaskLevel::Node
    }

    pub fn max_nodes(&self) -> usize {
        self.graphs.iter().map(|g| g.num_nodes).max().unwrap_or(0)
    }

    /// Graphs of one split, cloned out of the collection.
    pub fn split_graphs(&self, split: Split) -> Vec<Graph> {
        self.splits
            .get(split)
            .iter()
            .map(|&i| self.graphs[i].clone())
            .collect()
    }

    /// Number of labelled rows in a split: graphs, or masked nodes.
    pub fn split_size(&self, split: Split) -> usize {
        match self.level {
            TaskLevel::Graph => self.splits.get(split).len(),
            TaskLevel::Node => self
                .splits
                .get(split)
                .iter()
                .filter_map(|&i| self.graphs.get(i))
                .map(|g| g.node_masks.as_ref().map(|m| m.count(split)).unwrap_or(g.num_nodes))
                .sum(),
        }
    }
}
