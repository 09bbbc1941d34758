// ============================================================
// Layer 3 — Task Description
// ============================================================
// A dataset is either graph-level (one target row per graph) or
// node-level (one target row per node of a single large graph).
// The task type decides the loss, the metrics and how the model
// head is sized.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether targets are attached to whole graphs or to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Graph,
    Node,
}

/// What kind of prediction the model makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TaskType {
    /// Real-valued targets, `num_targets` per row.
    Regression { num_targets: usize },

    /// One or more independent binary labels per row.
    /// Missing labels are stored as NaN and masked out of the loss.
    Binary { num_tasks: usize },

    /// Exactly one class out of `num_classes` per row.
    /// The class index is stored as an f32 in the target row.
    MultiClass { num_classes: usize },
}

impl TaskType {
    /// Width of the model output layer for this task.
    pub fn output_dim(&self) -> usize {
        match *self {
            TaskType::Regression { num_targets } => num_targets,
            TaskType::Binary { num_tasks } => num_tasks,
            TaskType::MultiClass { num_classes } => num_classes,
        }
    }

    /// Number of stored target values per row.
    /// Multi-class rows store a single class index.
    pub fn target_width(&self) -> usize {
        match *self {
            TaskType::Regression { num_targets } => num_targets,
            TaskType::Binary { num_tasks } => num_tasks,
            TaskType::MultiClass { .. } => 1,
        }
    }

    pub fn is_regression(&self) -> bool {
        matches!(self, TaskType::Regression { .. })
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Regression { num_targets } => write!(f, "regression ({num_targets} targets)"),
            TaskType::Binary { num_tasks } => write!(f, "binary ({num_tasks} tasks)"),
            TaskType::MultiClass { num_classes } => write!(f, "multi-class ({num_classes} classes)"),
        }
    }
}

/// The three data partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dim_vs_target_width() {
        let mc = TaskType::MultiClass { num_classes: 7 };
        assert_eq!(mc.output_dim(), 7);
        assert_eq!(mc.target_width(), 1);

        let bin = TaskType::Binary { num_tasks: 12 };
        assert_eq!(bin.output_dim(), 12);
        assert_eq!(bin.target_width(), 12);
    }

    #[test]
    fn test_task_type_serde_shape() {
        let json = serde_json::to_string(&TaskType::Regression { num_targets: 1 }).unwrap();
        assert_eq!(json, r#"{"kind":"regression","num_targets":1}"#);
    }
}
