// ============================================================
// Layer 4 — JSON Graph-List Source
// ============================================================
// Reads `{dir}/{name}.json`, the interchange format datasets are
// exported to from other tooling. One file holds the whole
// dataset:
//
//   {
//     "level": "graph" | "node",               (optional)
//     "task": {"kind": "binary", "num_tasks": 12},   (optional)
//     "target_names": ["homo", "lumo"],        (optional)
//     "num_classes": 7,                        (optional)
//     "split": {"train": [..], "val": [..], "test": [..]},  (optional)
//     "graphs": [
//       {
//         "num_nodes": 3,
//         "x": [[0.1, 0.2], ...]   or   "node_labels": [6, 8, 6],
//         "edge_index": [[0, 1, 1, 2], [1, 0, 2, 1]],
//         "edge_attr": [[1.0], ...],          (optional)
//         "y": 0.5 | [1, null, 0] | [[..], ..] | {"homo": -0.2, ...},
//         "train_mask": [..], "val_mask": [..], "test_mask": [..]
//       }
//     ]
//   }
//
// `null` labels become NaN (missing) and are masked from losses.
// Node-level files hold one graph with masks (Cora) or several
// fully labelled graphs (PPI).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::PathBuf};

use crate::data::catalog::{self, TaskFamily};
use crate::domain::collection::{GraphCollection, SplitIndices};
use crate::domain::graph::{Graph, NodeMasks};
use crate::domain::task::{TaskLevel, TaskType};
use crate::domain::traits::GraphSource;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTarget {
    Scalar(Option<f32>),
    Vector(Vec<Option<f32>>),
    Matrix(Vec<Vec<Option<f32>>>),
    Named(BTreeMap<String, Option<f32>>),
}

#[derive(Debug, Deserialize)]
struct JsonGraph {
    num_nodes: usize,
    #[serde(default)]
    x: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    node_labels: Option<Vec<usize>>,
    edge_index: [Vec<usize>; 2],
    #[serde(default)]
    edge_attr: Option<Vec<Vec<f32>>>,
    y: JsonTarget,
    #[serde(default)]
    train_mask: Option<Vec<bool>>,
    #[serde(default)]
    val_mask: Option<Vec<bool>>,
    #[serde(default)]
    test_mask: Option<Vec<bool>>,
}

#[derive(Debug, Deserialize)]
struct JsonDataset {
    #[serde(default)]
    level: Option<TaskLevel>,
    #[serde(default)]
    task: Option<TaskType>,
    #[serde(default)]
    target_names: Vec<String>,
    #[serde(default)]
    num_classes: Option<usize>,
    #[serde(default)]
    split: Option<SplitIndices>,
    graphs: Vec<JsonGraph>,
}

/// Loads a dataset from a single JSON file.
pub struct JsonGraphSource {
    path: PathBuf,
    name: String,
    one_hot: bool,
    target_name: Option<String>,
}

impl JsonGraphSource {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, one_hot: bool, target_name: Option<String>) -> Self {
        Self { path: path.into(), name: name.into(), one_hot, target_name }
    }
}

impl GraphSource for JsonGraphSource {
    fn load(&self) -> Result<GraphCollection> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read dataset file '{}'", self.path.display()))?;
        let raw: JsonDataset = serde_json::from_str(&text)
            .with_context(|| format!("Malformed dataset JSON '{}'", self.path.display()))?;
        tracing::debug!("Parsed {} graphs from '{}'", raw.graphs.len(), self.path.display());
        build_collection(raw, &self.name, self.one_hot, self.target_name.as_deref())
    }
}

fn build_collection(
    raw: JsonDataset,
    name: &str,
    one_hot: bool,
    target_name: Option<&str>,
) -> Result<GraphCollection> {
    if raw.graphs.is_empty() {
        bail!("dataset '{name}' contains no graphs");
    }
    let level = raw.level.unwrap_or(if catalog::is_node_level(name) {
        TaskLevel::Node
    } else {
        TaskLevel::Graph
    });
    // Categorical node labels share one vocabulary across the dataset
    let num_categories = raw
        .graphs
        .iter()
        .filter_map(|g| g.node_labels.as_ref())
        .flat_map(|l| l.iter().copied())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0);

    let mut target_names = raw.target_names.clone();
    let mut graphs = Vec::with_capacity(raw.graphs.len());
    for (i, jg) in raw.graphs.into_iter().enumerate() {
        let g = convert_graph(jg, level, one_hot, num_categories, target_name, &mut target_names)
            .with_context(|| format!("graph {i} of '{name}'"))?;
        graphs.push(g);
    }

    let task = match raw.task {
        Some(t) => t,
        None => infer_task(name, &graphs, level, raw.num_classes)?,
    };

    if let Some(t) = target_name {
        target_names = vec![t.to_string()];
    }

    Ok(GraphCollection {
        name: name.to_string(),
        level,
        task,
        graphs,
        splits: raw.split.unwrap_or_default(),
        target_names,
    })
}

fn convert_graph(
    jg: JsonGraph,
    level: TaskLevel,
    one_hot: bool,
    num_categories: usize,
    target_name: Option<&str>,
    target_names: &mut Vec<String>,
) -> Result<Graph> {
    let n = jg.num_nodes;

    let (node_dim, x) = match (jg.x, jg.node_labels) {
        (Some(rows), _) => {
            let dim = rows.first().map(|r| r.len()).unwrap_or(0);
            if rows.iter().any(|r| r.len() != dim) {
                bail!("node feature rows have inconsistent widths");
            }
            (dim, rows.into_iter().flatten().collect())
        }
        (None, Some(labels)) => encode_labels(&labels, one_hot, num_categories),
        // Featureless graphs get a constant feature
        (None, None) => (1, vec![1.0; n]),
    };

    let [src, dst] = jg.edge_index;
    if src.len() != dst.len() {
        bail!("edge_index rows differ in length ({} vs {})", src.len(), dst.len());
    }

    let (edge_dim, edge_attr) = match jg.edge_attr {
        Some(rows) => {
            if rows.len() != src.len() {
                bail!("edge_attr has {} rows for {} edges", rows.len(), src.len());
            }
            let dim = rows.first().map(|r| r.len()).unwrap_or(0);
            if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
                bail!("edge_attr row {bad} has {} values, expected {dim}", rows[bad].len());
            }
            (dim, rows.into_iter().flatten().collect())
        }
        None => (0, Vec::new()),
    };

    let y = select_target(jg.y, target_name, target_names)?;

    let node_masks = match (jg.train_mask, jg.val_mask, jg.test_mask) {
        (Some(train), Some(val), Some(test)) if level == TaskLevel::Node => Some(NodeMasks { train, val, test }),
        _ => None,
    };

    Ok(Graph {
        num_nodes: n,
        node_dim,
        x,
        src,
        dst,
        edge_dim,
        edge_attr,
        y,
        node_masks,
        pe: Default::default(),
    })
}

/// Integer labels → one-hot rows, or a single float column.
pub(crate) fn encode_labels(labels: &[usize], one_hot: bool, num_categories: usize) -> (usize, Vec<f32>) {
    if one_hot && num_categories > 0 {
        let mut x = vec![0.0f32; labels.len() * num_categories];
        for (i, &l) in labels.iter().enumerate() {
            x[i * num_categories + l] = 1.0;
        }
        (num_categories, x)
    } else {
        (1, labels.iter().map(|&l| l as f32).collect())
    }
}

fn select_target(y: JsonTarget, target_name: Option<&str>, target_names: &mut Vec<String>) -> Result<Vec<f32>> {
    let nan = |v: Option<f32>| v.unwrap_or(f32::NAN);
    let values = match y {
        JsonTarget::Scalar(v) => vec![nan(v)],
        JsonTarget::Vector(v) => {
            if let Some(t) = target_name {
                let pos = target_names
                    .iter()
                    .position(|n| n == t)
                    .with_context(|| format!("target '{t}' not among {:?}", target_names))?;
                let value = v
                    .get(pos)
                    .with_context(|| format!("target '{t}' missing from y of length {}", v.len()))?;
                vec![nan(*value)]
            } else {
                v.into_iter().map(nan).collect()
            }
        }
        JsonTarget::Matrix(rows) => rows.into_iter().flatten().map(nan).collect(),
        JsonTarget::Named(map) => {
            if target_names.is_empty() {
                *target_names = map.keys().cloned().collect();
            }
            match target_name {
                Some(t) => {
                    let v = map.get(t).with_context(|| format!("graph has no target named '{t}'"))?;
                    vec![nan(*v)]
                }
                None => map.into_values().map(nan).collect(),
            }
        }
    };
    Ok(values)
}

/// Decide the task when the file does not declare one.
fn infer_task(name: &str, graphs: &[Graph], level: TaskLevel, num_classes: Option<usize>) -> Result<TaskType> {
    let width = match level {
        TaskLevel::Graph => graphs[0].y.len(),
        TaskLevel::Node => graphs[0].y.len() / graphs[0].num_nodes.max(1),
    };
    let integral = graphs
        .iter()
        .flat_map(|g| g.y.iter())
        .all(|v| v.is_nan() || v.fract() == 0.0);
    let max_label = graphs
        .iter()
        .flat_map(|g| g.y.iter())
        .filter(|v| v.is_finite())
        .fold(0.0f32, |a, &b| a.max(b));

    let family = catalog::lookup(name).map(|b| b.family);
    let task = match family {
        Some(TaskFamily::Regression) => TaskType::Regression { num_targets: width },
        Some(TaskFamily::Binary) => TaskType::Binary { num_tasks: width },
        Some(TaskFamily::MultiClass) => TaskType::MultiClass {
            num_classes: num_classes.unwrap_or(max_label as usize + 1),
        },
        None if integral && width == 1 && max_label <= 1.0 => TaskType::Binary { num_tasks: 1 },
        None if integral && width == 1 => TaskType::MultiClass {
            num_classes: num_classes.unwrap_or(max_label as usize + 1),
        },
        None if integral => TaskType::Binary { num_tasks: width },
        None => TaskType::Regression { num_targets: width },
    };
    if let TaskType::MultiClass { num_classes } = task {
        if width != 1 {
            bail!("multi-class dataset '{name}' must store one class index per row, found {width}");
        }
        if num_classes < 2 {
            bail!("multi-class dataset '{name}' needs at least two classes");
        }
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(format!("{name}.json"));
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn test_graph_level_regression_with_named_targets() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "QM9",
            r#"{"graphs": [
                {"num_nodes": 2, "node_labels": [0, 2], "edge_index": [[0,1],[1,0]],
                 "y": {"homo": -0.5, "lumo": 0.1}},
                {"num_nodes": 1, "node_labels": [1], "edge_index": [[],[]],
                 "y": {"homo": -0.3, "lumo": null}}
            ]}"#,
        );
        let c = JsonGraphSource::new(p, "QM9", true, Some("homo".into())).load().unwrap();
        assert_eq!(c.task, TaskType::Regression { num_targets: 1 });
        assert_eq!(c.graphs[0].y, vec![-0.5]);
        assert_eq!(c.node_dim(), 3);
        assert_eq!(c.graphs[0].node_row(1), &[0.0, 0.0, 1.0]);
        assert_eq!(c.target_names, vec!["homo".to_string()]);
    }

    #[test]
    fn test_missing_labels_become_nan_and_binary_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "Tox21",
            r#"{"graphs": [
                {"num_nodes": 1, "x": [[1.0]], "edge_index": [[],[]], "y": [1, null, 0]}
            ]}"#,
        );
        let c = JsonGraphSource::new(p, "Tox21", true, None).load().unwrap();
        assert_eq!(c.task, TaskType::Binary { num_tasks: 3 });
        assert!(c.graphs[0].y[1].is_nan());
    }

    #[test]
    fn test_node_level_masks() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "Cora",
            r#"{"num_classes": 3, "graphs": [
                {"num_nodes": 3, "x": [[1.0],[0.0],[1.0]], "edge_index": [[0,1],[1,2]],
                 "y": [0, 2, 1],
                 "train_mask": [true, false, false], "val_mask": [false, true, false],
                 "test_mask": [false, false, true]}
            ]}"#,
        );
        let c = JsonGraphSource::new(p, "Cora", true, None).load().unwrap();
        assert_eq!(c.level, TaskLevel::Node);
        assert_eq!(c.task, TaskType::MultiClass { num_classes: 3 });
        assert!(c.graphs[0].node_masks.is_some());
    }

    #[test]
    fn test_malformed_edges_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "bad",
            r#"{"graphs": [{"num_nodes": 2, "edge_index": [[0, 1],[1]], "y": 1.5}]}"#,
        );
        let err = JsonGraphSource::new(p, "bad", true, None).load().unwrap_err();
        assert!(format!("{err:#}").contains("edge_index rows differ"));
    }

    #[test]
    fn test_short_target_vector_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "short",
            r#"{"target_names": ["a", "b"], "graphs": [
                {"num_nodes": 1, "edge_index": [[],[]], "y": [1.0]}
            ]}"#,
        );
        let err = JsonGraphSource::new(p, "short", true, Some("b".into())).load().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("target 'b' missing from y of length 1"), "{msg}");
        assert!(msg.contains("graph 0 of 'short'"), "{msg}");
    }

    #[test]
    fn test_ragged_edge_attr_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Same total length as three rows of width 1
        let p = write(
            dir.path(),
            "ragged",
            r#"{"graphs": [{"num_nodes": 2, "edge_index": [[0, 1, 1],[1, 0, 0]],
                "edge_attr": [[1.0], [2.0, 3.0], []], "y": 0.5}]}"#,
        );
        let err = JsonGraphSource::new(p, "ragged", true, None).load().unwrap_err();
        assert!(format!("{err:#}").contains("edge_attr row 1 has 2 values, expected 1"));
    }

    #[test]
    fn test_multi_graph_node_level_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            dir.path(),
            "PPI",
            r#"{"graphs": [
                {"num_nodes": 2, "x": [[1.0],[0.0]], "edge_index": [[0,1],[1,0]],
                 "y": [[1, 0], [0, 1]]},
                {"num_nodes": 3, "x": [[0.0],[1.0],[1.0]], "edge_index": [[0,1],[1,2]],
                 "y": [[0, 0], [1, 1], [1, 0]]}
            ]}"#,
        );
        let c = JsonGraphSource::new(p, "PPI", true, None).load().unwrap();
        assert_eq!(c.level, TaskLevel::Node);
        assert_eq!(c.graphs.len(), 2);
        assert_eq!(c.task, TaskType::Binary { num_tasks: 2 });
        assert_eq!(c.graphs[1].y.len(), 6);
    }
}
