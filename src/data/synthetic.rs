// ============================================================
// Layer 4 — Synthetic Benchmarks
// ============================================================
// Generated datasets for smoke tests and sanity runs, with no
// files involved:
//
//   infected-<n>  one random graph of n nodes; a few nodes are
//                 "infected" and every node's label is its hop
//                 distance to the nearest infected node, capped
//                 at MAX_PATH_LENGTH + 1 (node level, multi-class)
//   cycles-<n>    n small random graphs, half trees and half
//                 trees plus one extra edge; label = contains a
//                 cycle (graph level, binary)
//
// Generation is fully determined by the seed.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};

use crate::domain::collection::{GraphCollection, SplitIndices};
use crate::domain::graph::Graph;
use crate::domain::task::{TaskLevel, TaskType};
use crate::domain::traits::GraphSource;

/// Distances beyond this are folded into one "far" class.
pub const MAX_PATH_LENGTH: usize = 3;
const INFECTED_FRACTION: f64 = 0.05;
const INFECTED_AVG_DEGREE: f64 = 3.0;
const CYCLES_MIN_NODES: usize = 6;
const CYCLES_MAX_NODES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Infected(usize),
    Cycles(usize),
}

pub struct SyntheticSource {
    name: String,
    family: Family,
    seed: u64,
}

impl SyntheticSource {
    /// Parse `infected-<n>` or `cycles-<n>`.
    pub fn new(name: &str, seed: u64) -> Result<Self> {
        let (prefix, count) = name
            .rsplit_once('-')
            .with_context(|| format!("synthetic dataset name '{name}' must look like <family>-<size>"))?;
        let count: usize = count
            .parse()
            .with_context(|| format!("bad size in synthetic dataset name '{name}'"))?;
        let family = match prefix {
            "infected" if count >= 2 => Family::Infected(count),
            "cycles" if count >= 2 => Family::Cycles(count),
            "infected" | "cycles" => bail!("synthetic dataset '{name}' is too small"),
            other => bail!("unknown synthetic family '{other}'"),
        };
        Ok(Self { name: name.to_string(), family, seed })
    }

    /// Whether `name` names a synthetic family.
    pub fn recognises(name: &str) -> bool {
        name.starts_with("infected-") || name.starts_with("cycles-")
    }
}

impl GraphSource for SyntheticSource {
    fn load(&self) -> Result<GraphCollection> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let collection = match self.family {
            Family::Infected(n) => GraphCollection {
                name: self.name.clone(),
                level: TaskLevel::Node,
                task: TaskType::MultiClass { num_classes: MAX_PATH_LENGTH + 2 },
                graphs: vec![infected_graph(n, &mut rng)],
                splits: SplitIndices::single_graph(),
                target_names: Vec::new(),
            },
            Family::Cycles(count) => GraphCollection {
                name: self.name.clone(),
                level: TaskLevel::Graph,
                task: TaskType::Binary { num_tasks: 1 },
                graphs: (0..count).map(|i| cycles_graph(i % 2 == 1, &mut rng)).collect(),
                splits: SplitIndices::default(),
                target_names: Vec::new(),
            },
        };
        tracing::debug!("Generated synthetic dataset '{}' ({} graphs)", self.name, collection.graphs.len());
        Ok(collection)
    }
}

fn push_undirected(edges: &mut Vec<(usize, usize)>, a: usize, b: usize) {
    edges.push((a, b));
    edges.push((b, a));
}

/// Erdős–Rényi graph with infected sources and hop-distance labels.
fn infected_graph(n: usize, rng: &mut StdRng) -> Graph {
    let p = (INFECTED_AVG_DEGREE / (n as f64 - 1.0)).min(1.0);
    let mut edges = Vec::new();
    for a in 0..n {
        for b in (a + 1)..n {
            if rng.gen_bool(p) {
                push_undirected(&mut edges, a, b);
            }
        }
    }

    let num_infected = ((n as f64 * INFECTED_FRACTION).ceil() as usize).max(1);
    let mut nodes: Vec<usize> = (0..n).collect();
    nodes.shuffle(rng);
    let infected: HashSet<usize> = nodes[..num_infected].iter().copied().collect();

    // Multi-source BFS from the infected set
    let mut adj = vec![Vec::new(); n];
    for &(a, b) in &edges {
        adj[a].push(b);
    }
    let far = MAX_PATH_LENGTH + 1;
    let mut dist = vec![usize::MAX; n];
    let mut queue = VecDeque::new();
    for &s in &infected {
        dist[s] = 0;
        queue.push_back(s);
    }
    while let Some(u) = queue.pop_front() {
        for &v in &adj[u] {
            if dist[v] == usize::MAX {
                dist[v] = dist[u] + 1;
                queue.push_back(v);
            }
        }
    }

    let x = (0..n)
        .flat_map(|i| if infected.contains(&i) { [0.0, 1.0] } else { [1.0, 0.0] })
        .collect();
    let y = dist.iter().map(|&d| d.min(far) as f32).collect();
    Graph::new(n, 2, x, &edges, y)
}

/// Random tree, optionally closed into a cycle by one extra edge.
fn cycles_graph(with_cycle: bool, rng: &mut StdRng) -> Graph {
    let n = rng.gen_range(CYCLES_MIN_NODES..=CYCLES_MAX_NODES);
    let mut edges = Vec::new();
    let mut parent = vec![0usize; n];
    for v in 1..n {
        let p = rng.gen_range(0..v);
        parent[v] = p;
        push_undirected(&mut edges, p, v);
    }
    if with_cycle {
        // Any non-tree pair closes exactly one cycle
        loop {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            if a != b && parent[a] != b && parent[b] != a {
                push_undirected(&mut edges, a, b);
                break;
            }
        }
    }
    Graph::new(n, 1, vec![1.0; n], &edges, vec![if with_cycle { 1.0 } else { 0.0 }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert!(SyntheticSource::new("infected-100", 0).is_ok());
        assert!(SyntheticSource::new("cycles-10", 0).is_ok());
        assert!(SyntheticSource::new("cycles", 0).is_err());
        assert!(SyntheticSource::new("squares-10", 0).is_err());
        assert!(SyntheticSource::recognises("infected-7"));
        assert!(!SyntheticSource::recognises("ZINC"));
    }

    #[test]
    fn test_infected_labels_are_distances() {
        let c = SyntheticSource::new("infected-200", 4).unwrap().load().unwrap();
        let g = &c.graphs[0];
        g.validate(1, true).unwrap();
        for i in 0..g.num_nodes {
            let infected = g.node_row(i)[1] == 1.0;
            assert_eq!(infected, g.y[i] == 0.0);
            assert!(g.y[i] <= (MAX_PATH_LENGTH + 1) as f32);
        }
    }

    #[test]
    fn test_cycles_edge_count_matches_label() {
        let c = SyntheticSource::new("cycles-20", 9).unwrap().load().unwrap();
        for g in &c.graphs {
            g.validate(1, false).unwrap();
            // a tree has n-1 undirected edges, one cycle adds one more
            let undirected = g.num_edges() / 2;
            assert_eq!(undirected, g.num_nodes - 1 + g.y[0] as usize);
        }
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = SyntheticSource::new("cycles-8", 1).unwrap().load().unwrap();
        let b = SyntheticSource::new("cycles-8", 1).unwrap().load().unwrap();
        assert_eq!(a.graphs, b.graphs);
    }
}
