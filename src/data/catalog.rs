// ============================================================
// Layer 4 — Benchmark Catalog
// ============================================================
// What we know about well-known benchmark names before opening
// any file: task level, task family, and which extra arguments
// a run on that benchmark needs.
//
// Files may still override the task (JSON sources declare it
// explicitly); the catalog is what config validation checks
// against, so a missing regression loss or target name fails
// before any data is read.

use crate::domain::task::TaskLevel;

/// Coarse task family of a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFamily {
    Regression,
    Binary,
    MultiClass,
}

/// Static facts about one benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkInfo {
    pub name: &'static str,
    pub level: TaskLevel,
    pub family: TaskFamily,
    /// Multi-target datasets where one target must be chosen
    pub needs_target: bool,
}

const fn graph(name: &'static str, family: TaskFamily) -> BenchmarkInfo {
    BenchmarkInfo { name, level: TaskLevel::Graph, family, needs_target: false }
}

const fn node(name: &'static str, family: TaskFamily) -> BenchmarkInfo {
    BenchmarkInfo { name, level: TaskLevel::Node, family, needs_target: false }
}

const fn multi_target(name: &'static str) -> BenchmarkInfo {
    BenchmarkInfo { name, level: TaskLevel::Graph, family: TaskFamily::Regression, needs_target: true }
}

use TaskFamily::{Binary, MultiClass, Regression};

pub const BENCHMARKS: &[BenchmarkInfo] = &[
    // Molecular regression
    graph("ESOL", Regression),
    graph("FreeSolv", Regression),
    graph("Lipo", Regression),
    multi_target("QM9"),
    multi_target("DOCKSTRING"),
    graph("ZINC", Regression),
    graph("PCQM4Mv2", Regression),
    graph("lrgb-pept-struct", Regression),
    // Molecular (multi-task) binary classification
    graph("HIV", Binary),
    graph("BACE", Binary),
    graph("BBBP", Binary),
    graph("Tox21", Binary),
    graph("ToxCast", Binary),
    graph("SIDER", Binary),
    graph("ClinTox", Binary),
    graph("MUV", Binary),
    graph("PCBA", Binary),
    graph("lrgb-pept-func", Binary),
    // Graph classification (TU, superpixels, malware)
    graph("MUTAG", MultiClass),
    graph("PROTEINS", MultiClass),
    graph("NCI1", MultiClass),
    graph("ENZYMES", MultiClass),
    graph("IMDB-BINARY", MultiClass),
    graph("MNIST", MultiClass),
    graph("CIFAR10", MultiClass),
    graph("MalNetTiny", MultiClass),
    // Node level
    node("Cora", MultiClass),
    node("CiteSeer", MultiClass),
    node("PubMed", MultiClass),
    node("ogbn-arxiv", MultiClass),
    node("PPI", Binary),
];

/// Look up a benchmark by exact name.
pub fn lookup(name: &str) -> Option<&'static BenchmarkInfo> {
    BENCHMARKS.iter().find(|b| b.name == name)
}

/// Node-level datasets: the citation / protein graphs plus the
/// synthetic `infected` and `hetero` families.
pub fn is_node_level(name: &str) -> bool {
    if let Some(info) = lookup(name) {
        return info.level == TaskLevel::Node;
    }
    name.contains("infected") || name.contains("hetero") || name.starts_with("ogbn-")
}

/// Regression benchmarks must be given an explicit loss function.
pub fn is_regression(name: &str) -> bool {
    lookup(name).map(|b| b.family == Regression).unwrap_or(false)
}

pub fn needs_target(name: &str) -> bool {
    lookup(name).map(|b| b.needs_target).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_level_rule() {
        assert!(is_node_level("Cora"));
        assert!(is_node_level("PPI"));
        assert!(is_node_level("infected-500"));
        assert!(is_node_level("hetero-roman"));
        assert!(!is_node_level("ZINC"));
        assert!(!is_node_level("cycles-200"));
    }

    #[test]
    fn test_regression_and_targets() {
        assert!(is_regression("ESOL"));
        assert!(is_regression("QM9"));
        assert!(needs_target("QM9"));
        assert!(needs_target("DOCKSTRING"));
        assert!(!needs_target("ZINC"));
        assert!(!is_regression("HIV"));
        assert!(!is_regression("unknown-dataset"));
    }
}
