//! Graph inputs.
//!
//! Algorithms accept any [`GraphView`] and take an [`IndexedGraph`] snapshot at the start of each
//! run, so the hot loops work on dense `usize` indices instead of caller-supplied identities.

use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

pub use sirenia_graph::{EdgeId, Graph, GraphView};

#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedEdge {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) weight: f64,
}

impl IndexedEdge {
    pub(crate) fn is_loop(&self) -> bool {
        self.source == self.target
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedGraph<V, E> {
    pub(crate) vertices: Vec<V>,
    pub(crate) edge_keys: Vec<E>,
    pub(crate) edges: Vec<IndexedEdge>,
    /// Undirected adjacency without self-loops; parallel edges repeat the neighbour.
    pub(crate) neighbors: Vec<Vec<usize>>,
    vertex_lookup: FxHashMap<V, usize>,
    edge_lookup: FxHashMap<E, usize>,
}

impl<V, E> IndexedGraph<V, E>
where
    V: Clone + Eq + std::hash::Hash,
    E: Clone + Eq + std::hash::Hash,
{
    pub(crate) fn from_view<G>(graph: &G) -> Result<Self>
    where
        G: GraphView<Vertex = V, Edge = E>,
    {
        let mut vertices: Vec<V> = Vec::with_capacity(graph.vertex_count());
        let mut vertex_lookup: FxHashMap<V, usize> = FxHashMap::default();
        vertex_lookup.reserve(graph.vertex_count());
        for v in graph.vertices() {
            if vertex_lookup.contains_key(&v) {
                continue;
            }
            vertex_lookup.insert(v.clone(), vertices.len());
            vertices.push(v);
        }

        let mut edge_lookup: FxHashMap<E, usize> = FxHashMap::default();
        edge_lookup.reserve(graph.edge_count());
        let mut edge_keys: Vec<E> = Vec::with_capacity(graph.edge_count());
        let mut edges: Vec<IndexedEdge> = Vec::with_capacity(graph.edge_count());
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); vertices.len()];
        for (ordinal, e) in graph.edges().enumerate() {
            let (Some(&source), Some(&target)) = (
                vertex_lookup.get(&graph.source(&e)),
                vertex_lookup.get(&graph.target(&e)),
            ) else {
                return Err(Error::MissingEndpoint {
                    edge: format!("#{ordinal}"),
                });
            };
            // Weights are caller data; anything unusable falls back to the unweighted default.
            let weight = graph.weight(&e);
            let weight = if weight.is_finite() && weight > 0.0 {
                weight
            } else {
                1.0
            };
            if source != target {
                neighbors[source].push(target);
                neighbors[target].push(source);
            }
            edges.push(IndexedEdge {
                source,
                target,
                weight,
            });
            edge_lookup.entry(e.clone()).or_insert(edge_keys.len());
            edge_keys.push(e);
        }

        Ok(Self {
            vertices,
            edge_keys,
            edges,
            neighbors,
            vertex_lookup,
            edge_lookup,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.vertices.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub(crate) fn vertex_index(&self, vertex: &V) -> Option<usize> {
        self.vertex_lookup.get(vertex).copied()
    }

    pub(crate) fn edge_index(&self, edge: &E) -> Option<usize> {
        self.edge_lookup.get(edge).copied()
    }
}

/// Breadth-first hop distances from `start`; unreachable vertices stay `None`.
pub(crate) fn bfs_hops(neighbors: &[Vec<usize>], start: usize, out: &mut Vec<Option<usize>>) {
    out.clear();
    out.resize(neighbors.len(), None);
    let mut queue: VecDeque<usize> = VecDeque::new();
    out[start] = Some(0);
    queue.push_back(start);
    while let Some(v) = queue.pop_front() {
        let Some(d) = out[v] else {
            continue;
        };
        for &w in &neighbors[v] {
            if out[w].is_none() {
                out[w] = Some(d + 1);
                queue.push_back(w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_indexes_vertices_in_enumeration_order() {
        let g = Graph::from_edges([("b", "a"), ("a", "c"), ("c", "c")]);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        assert_eq!(ig.vertices, vec!["b", "a", "c"]);
        assert_eq!(ig.vertex_index(&"c"), Some(2));
        assert_eq!(ig.vertex_index(&"z"), None);
        assert_eq!(ig.edges.len(), 3);
        assert!(ig.edges[2].is_loop());
        // Self-loop contributes no adjacency.
        assert_eq!(ig.neighbors[2], vec![1]);
    }

    #[test]
    fn bfs_hops_marks_unreachable_vertices() {
        let mut g: Graph<u8> = Graph::from_edges([(0, 1), (1, 2)]);
        g.add_vertex(3);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        let mut hops = Vec::new();
        bfs_hops(&ig.neighbors, 0, &mut hops);
        assert_eq!(hops, vec![Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn unusable_weights_fall_back_to_one() {
        let mut g: Graph<u8> = Graph::new();
        g.add_weighted_edge(0, 1, f64::NAN);
        g.add_weighted_edge(1, 2, -4.0);
        g.add_weighted_edge(2, 0, 2.5);
        g.add_weighted_edge(0, 2, 0.0);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        let w: Vec<f64> = ig.edges.iter().map(|e| e.weight).collect();
        assert_eq!(w, vec![1.0, 1.0, 2.5, 1.0]);
    }

    #[test]
    fn edges_are_found_by_key() {
        let g = Graph::from_edges([("a", "b"), ("a", "b"), ("b", "c")]);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        for (i, key) in ig.edge_keys.iter().enumerate() {
            assert_eq!(ig.edge_index(key), Some(i));
        }
        let other = Graph::from_edges([("x", "y"), ("y", "z"), ("z", "x"), ("x", "x")]);
        let foreign = other.edges().nth(3).expect("edge");
        assert_eq!(ig.edge_index(&foreign), None);
    }
}
