// ============================================================
// Shortest-Path Distances
// ============================================================
// All-pairs hop distances by one BFS per source node, following
// edge direction. Distances above `cutoff` and unreachable pairs
// both clamp to cutoff + 1, which the attention-bias embedding
// treats as "far".

use anyhow::Result;
use std::collections::VecDeque;

use crate::domain::graph::Graph;
use crate::domain::traits::GraphTransform;

pub struct SpdTransform {
    cutoff: usize,
}

impl SpdTransform {
    pub fn new(cutoff: usize) -> Self {
        Self { cutoff }
    }
}

/// Row-major num_nodes × num_nodes distance table.
pub fn shortest_paths(g: &Graph, cutoff: usize) -> Vec<u16> {
    let n = g.num_nodes;
    let far = (cutoff + 1).min(u16::MAX as usize) as u16;
    let mut out_lists = vec![Vec::new(); n];
    for (&s, &d) in g.src.iter().zip(&g.dst) {
        out_lists[s].push(d);
    }

    let mut table = vec![far; n * n];
    let mut queue = VecDeque::new();
    for source in 0..n {
        let row = &mut table[source * n..(source + 1) * n];
        row[source] = 0;
        queue.clear();
        queue.push_back(source);
        while let Some(u) = queue.pop_front() {
            let du = row[u];
            // Nothing beyond the cutoff is needed
            if du as usize >= cutoff {
                continue;
            }
            for &v in &out_lists[u] {
                if row[v] == far && v != source {
                    row[v] = du + 1;
                    queue.push_back(v);
                }
            }
        }
    }
    table
}

impl GraphTransform for SpdTransform {
    fn name(&self) -> &'static str {
        "ShortestPaths"
    }

    fn apply(&mut self, graph: &mut Graph) -> Result<()> {
        graph.pe.spd = Some(shortest_paths(graph, self.cutoff));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> Graph {
        let edges: Vec<(usize, usize)> = (0..n - 1).flat_map(|i| [(i, i + 1), (i + 1, i)]).collect();
        Graph::new(n, 1, vec![1.0; n], &edges, vec![0.0])
    }

    #[test]
    fn test_path_distances_and_clamp() {
        let d = shortest_paths(&path(6), 3);
        assert_eq!(d[0 * 6 + 3], 3);
        // 5 hops away, clamps to cutoff + 1
        assert_eq!(d[0 * 6 + 5], 4);
        assert_eq!(d[2 * 6 + 2], 0);
    }

    #[test]
    fn test_symmetric_on_undirected() {
        let d = shortest_paths(&path(5), 20);
        for a in 0..5 {
            for b in 0..5 {
                assert_eq!(d[a * 5 + b], d[b * 5 + a]);
            }
        }
    }

    #[test]
    fn test_unreachable_and_directed() {
        let g = Graph::new(3, 1, vec![0.0; 3], &[(0, 1)], vec![0.0]);
        let d = shortest_paths(&g, 5);
        assert_eq!(d[0 * 3 + 1], 1);
        assert_eq!(d[1 * 3 + 0], 6);
        assert_eq!(d[0 * 3 + 2], 6);
    }
}
