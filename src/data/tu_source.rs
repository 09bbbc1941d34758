// ============================================================
// Layer 4 — TU Benchmark Source
// ============================================================
// Reads the plain-text TU graph-classification format:
//
//   {dir}/{name}/{name}_A.txt               "row, col" per edge (1-based)
//   {dir}/{name}/{name}_graph_indicator.txt graph id per node (1-based)
//   {dir}/{name}/{name}_graph_labels.txt    one label per graph
//   {dir}/{name}/{name}_node_labels.txt     (optional) label per node
//   {dir}/{name}/{name}_node_attributes.txt (optional) "a, b, c" per node
//   {dir}/{name}/{name}_edge_labels.txt     (optional) label per edge
//
// Graph labels are remapped to 0..C in sorted order, so {-1, 1}
// and {1, 2, ..} both become class indices.

use anyhow::{bail, ensure, Context, Result};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::data::json_source::encode_labels;
use crate::domain::collection::{GraphCollection, SplitIndices};
use crate::domain::graph::Graph;
use crate::domain::task::{TaskLevel, TaskType};
use crate::domain::traits::GraphSource;

pub struct TuGraphSource {
    dir: PathBuf,
    name: String,
    one_hot: bool,
}

impl TuGraphSource {
    /// `dir` is the dataset root; files live in `dir/name/`.
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, one_hot: bool) -> Self {
        Self { dir: dir.into(), name: name.into(), one_hot }
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(&self.name).join(format!("{}_{suffix}.txt", self.name))
    }

    /// Whether the mandatory adjacency file exists.
    pub fn exists(dir: &Path, name: &str) -> bool {
        dir.join(name).join(format!("{name}_A.txt")).exists()
    }
}

/// Read every non-empty line as a list of comma-separated numbers.
fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, line)| {
            line.split(',')
                .map(|tok| {
                    tok.trim()
                        .parse::<f64>()
                        .with_context(|| format!("{}:{}: bad number '{}'", path.display(), i + 1, tok.trim()))
                })
                .collect()
        })
        .collect()
}

fn read_ints(path: &Path) -> Result<Vec<i64>> {
    first_column(&read_rows(path)?, path).map(|c| c.into_iter().map(|v| v as i64).collect())
}

/// Leading value of every row.
fn first_column(rows: &[Vec<f64>], path: &Path) -> Result<Vec<f64>> {
    rows.iter()
        .enumerate()
        .map(|(i, r)| r.first().copied().with_context(|| format!("{}: row {} is empty", path.display(), i + 1)))
        .collect()
}

/// Optional per-node or per-edge file must have exactly `expected` rows.
fn ensure_rows(rows: &Option<Vec<Vec<f64>>>, expected: usize, what: &str, name: &str) -> Result<()> {
    if let Some(rows) = rows {
        ensure!(
            rows.len() == expected,
            "TU dataset '{name}': {what} has {} rows, expected {expected}",
            rows.len()
        );
    }
    Ok(())
}

fn read_optional_rows(path: &Path) -> Result<Option<Vec<Vec<f64>>>> {
    if path.exists() {
        read_rows(path).map(Some)
    } else {
        Ok(None)
    }
}

impl GraphSource for TuGraphSource {
    fn load(&self) -> Result<GraphCollection> {
        let edges = read_rows(&self.file("A"))?;
        let indicator = read_ints(&self.file("graph_indicator"))?;
        let graph_labels = read_ints(&self.file("graph_labels"))?;
        let node_labels = read_optional_rows(&self.file("node_labels"))?;
        let node_attrs = read_optional_rows(&self.file("node_attributes"))?;
        let edge_labels = read_optional_rows(&self.file("edge_labels"))?;

        let num_graphs = graph_labels.len();
        let total_nodes = indicator.len();
        ensure!(num_graphs > 0, "TU dataset '{}' has no graphs", self.name);
        ensure_rows(&node_labels, total_nodes, "node_labels", &self.name)?;
        ensure_rows(&node_attrs, total_nodes, "node_attributes", &self.name)?;
        ensure_rows(&edge_labels, edges.len(), "edge_labels", &self.name)?;

        // Node → (graph, local index)
        let mut counts = vec![0usize; num_graphs];
        let mut local = Vec::with_capacity(total_nodes);
        for (node, &gid) in indicator.iter().enumerate() {
            if gid < 1 || gid as usize > num_graphs {
                bail!("node {} points at graph {gid}, only {num_graphs} graphs exist", node + 1);
            }
            let g = gid as usize - 1;
            local.push((g, counts[g]));
            counts[g] += 1;
        }

        // Node features: continuous attributes, then label encoding
        let label_ids: Option<Vec<usize>> = match &node_labels {
            Some(rows) => Some(
                first_column(rows, &self.file("node_labels"))?
                    .into_iter()
                    .map(|v| v.max(0.0) as usize)
                    .collect(),
            ),
            None => None,
        };
        let num_categories = label_ids.as_ref().and_then(|l| l.iter().max().copied()).map(|m| m + 1).unwrap_or(0);
        let (label_dim, label_feats) = match &label_ids {
            Some(ids) => encode_labels(ids, self.one_hot, num_categories),
            None => (0, Vec::new()),
        };
        let attr_dim = node_attrs.as_ref().and_then(|a| a.first().map(|r| r.len())).unwrap_or(0);
        if let Some(attrs) = &node_attrs {
            if let Some(bad) = attrs.iter().position(|r| r.len() != attr_dim) {
                bail!("node attribute row {} has {} values, expected {attr_dim}", bad + 1, attrs[bad].len());
            }
        }
        let mut node_dim = attr_dim + label_dim;
        let featureless = node_dim == 0;
        if featureless {
            node_dim = 1;
        }

        // Graph labels → class indices
        let classes: BTreeSet<i64> = graph_labels.iter().copied().collect();
        let class_of = |l: i64| classes.iter().position(|&c| c == l).unwrap_or(0) as f32;

        let mut graphs: Vec<Graph> = counts
            .iter()
            .zip(&graph_labels)
            .map(|(&n, &label)| Graph::new(n, node_dim, Vec::with_capacity(n * node_dim), &[], vec![class_of(label)]))
            .collect();

        for (node, &(g, _)) in local.iter().enumerate() {
            let x = &mut graphs[g].x;
            if featureless {
                x.push(1.0);
                continue;
            }
            if let Some(attrs) = &node_attrs {
                x.extend(attrs[node].iter().map(|&v| v as f32));
            }
            if label_dim > 0 {
                x.extend_from_slice(&label_feats[node * label_dim..(node + 1) * label_dim]);
            }
        }

        let edge_ids: Option<Vec<usize>> = match &edge_labels {
            Some(rows) => Some(
                first_column(rows, &self.file("edge_labels"))?
                    .into_iter()
                    .map(|v| v.max(0.0) as usize)
                    .collect(),
            ),
            None => None,
        };
        let edge_categories = edge_ids.as_ref().and_then(|ids| ids.iter().max().copied()).map(|m| m + 1).unwrap_or(0);
        for (e, row) in edges.iter().enumerate() {
            ensure!(row.len() >= 2, "edge row {} has fewer than two endpoints", e + 1);
            let (s, d) = (row[0] as usize, row[1] as usize);
            ensure!(s >= 1 && s <= total_nodes && d >= 1 && d <= total_nodes, "edge {} out of range", e + 1);
            let (gs, ls) = local[s - 1];
            let (gd, ld) = local[d - 1];
            ensure!(gs == gd, "edge {} crosses graphs {} and {}", e + 1, gs + 1, gd + 1);
            let graph = &mut graphs[gs];
            graph.src.push(ls);
            graph.dst.push(ld);
            if let Some(ids) = &edge_ids {
                let (dim, feat) = encode_labels(&ids[e..=e], self.one_hot, edge_categories);
                graph.edge_dim = dim;
                graph.edge_attr.extend(feat);
            }
        }
        // Graphs without any edge still need a consistent edge_dim
        if edge_ids.is_some() {
            let dim = if self.one_hot { edge_categories } else { 1 };
            for g in &mut graphs {
                g.edge_dim = dim;
            }
        }

        tracing::debug!(
            "TU '{}': {} graphs, {} nodes, {} edges, {} classes",
            self.name, num_graphs, total_nodes, edges.len(), classes.len()
        );

        Ok(GraphCollection {
            name: self.name.clone(),
            level: TaskLevel::Graph,
            task: TaskType::MultiClass { num_classes: classes.len().max(2) },
            graphs,
            splits: SplitIndices::default(),
            target_names: Vec::new(),
        })
    }
}
