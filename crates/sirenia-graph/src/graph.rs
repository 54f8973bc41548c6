//! Index-backed directed multigraph.
//!
//! Vertices are stored in insertion order and addressed through an Fx-hashed index; edges are
//! addressed by [`EdgeId`], so parallel edges and self-loops are distinct identities.

use crate::GraphView;
use rustc_hash::FxBuildHasher;
use std::cell::RefCell;
use std::hash::Hash;

mod adj_cache;

use adj_cache::DirectedAdjCache;

type HashMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

/// Stable identity of an edge inside one [`Graph`]. Invalidated by [`Graph::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct EdgeEntry {
    source: usize,
    target: usize,
    weight: f64,
}

#[derive(Debug, Clone)]
pub struct Graph<V> {
    vertices: Vec<V>,
    vertex_index: HashMap<V, usize>,
    edges: Vec<EdgeEntry>,

    // Rebuilt lazily after mutation; queries stay on `&self`.
    generation: u64,
    adj_cache: RefCell<DirectedAdjCache>,
}

impl<V> Default for Graph<V>
where
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Graph<V>
where
    V: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            vertex_index: HashMap::default(),
            edges: Vec::new(),
            generation: 0,
            adj_cache: RefCell::new(DirectedAdjCache::stale()),
        }
    }

    /// Builds a graph from an edge list; endpoints are added as vertices on first sight.
    pub fn from_edges(edges: impl IntoIterator<Item = (V, V)>) -> Self {
        let mut g = Self::new();
        for (s, t) in edges {
            g.add_edge(s, t);
        }
        g
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn ensure_adj(&self) -> std::cell::Ref<'_, DirectedAdjCache> {
        let stale = self.adj_cache.borrow().generation != self.generation;
        if stale {
            *self.adj_cache.borrow_mut() = DirectedAdjCache::build(
                self.generation,
                self.vertices.len(),
                self.edges.iter().map(|e| (e.source, e.target)),
            );
        }
        self.adj_cache.borrow()
    }

    /// Adds `vertex` if it is not present yet. Returns `true` when it was inserted.
    pub fn add_vertex(&mut self, vertex: V) -> bool {
        if self.vertex_index.contains_key(&vertex) {
            return false;
        }
        self.intern(vertex);
        true
    }

    fn intern(&mut self, vertex: V) -> usize {
        if let Some(&ix) = self.vertex_index.get(&vertex) {
            return ix;
        }
        let ix = self.vertices.len();
        self.vertices.push(vertex.clone());
        self.vertex_index.insert(vertex, ix);
        self.touch();
        ix
    }

    pub fn add_edge(&mut self, source: V, target: V) -> EdgeId {
        self.add_weighted_edge(source, target, 1.0)
    }

    pub fn add_weighted_edge(&mut self, source: V, target: V, weight: f64) -> EdgeId {
        let source = self.intern(source);
        let target = self.intern(target);
        let id = EdgeId(self.edges.len());
        self.edges.push(EdgeEntry {
            source,
            target,
            weight,
        });
        self.touch();
        id
    }

    /// Replaces the whole vertex and edge set. Previously issued [`EdgeId`]s become invalid.
    pub fn reset(
        &mut self,
        vertices: impl IntoIterator<Item = V>,
        edges: impl IntoIterator<Item = (V, V)>,
    ) {
        self.clear();
        for v in vertices {
            self.add_vertex(v);
        }
        for (s, t) in edges {
            self.add_edge(s, t);
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.vertex_index.clear();
        self.edges.clear();
        self.touch();
    }

    pub fn has_vertex(&self, vertex: &V) -> bool {
        self.vertex_index.contains_key(vertex)
    }

    pub fn endpoints(&self, edge: EdgeId) -> Option<(&V, &V)> {
        let e = self.edges.get(edge.0)?;
        Some((&self.vertices[e.source], &self.vertices[e.target]))
    }

    pub fn edge_weight(&self, edge: EdgeId) -> Option<f64> {
        self.edges.get(edge.0).map(|e| e.weight)
    }

    /// Undirected neighbours of `vertex`, in edge order. Parallel edges repeat the neighbour.
    pub fn neighbors(&self, vertex: &V) -> Vec<&V> {
        let Some(&ix) = self.vertex_index.get(vertex) else {
            return Vec::new();
        };
        let adj = self.ensure_adj();
        let mut out: Vec<&V> = Vec::with_capacity(adj.out_edges(ix).len() + adj.in_edges(ix).len());
        for &e in adj.out_edges(ix) {
            out.push(&self.vertices[self.edges[e].target]);
        }
        for &e in adj.in_edges(ix) {
            out.push(&self.vertices[self.edges[e].source]);
        }
        out
    }
}

impl<V> GraphView for Graph<V>
where
    V: Clone + Eq + Hash,
{
    type Vertex = V;
    type Edge = EdgeId;

    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn vertices(&self) -> impl Iterator<Item = V> + '_ {
        self.vertices.iter().cloned()
    }

    fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId)
    }

    /// # Panics
    /// Panics if `edge` was not issued by this graph (or was issued before a reset).
    fn source(&self, edge: &EdgeId) -> V {
        self.vertices[self.edges[edge.0].source].clone()
    }

    /// # Panics
    /// Panics if `edge` was not issued by this graph (or was issued before a reset).
    fn target(&self, edge: &EdgeId) -> V {
        self.vertices[self.edges[edge.0].target].clone()
    }

    fn weight(&self, edge: &EdgeId) -> f64 {
        self.edge_weight(*edge).unwrap_or(1.0)
    }

    fn out_edges(&self, vertex: &V) -> Vec<EdgeId> {
        let Some(&ix) = self.vertex_index.get(vertex) else {
            return Vec::new();
        };
        self.ensure_adj()
            .out_edges(ix)
            .iter()
            .copied()
            .map(EdgeId)
            .collect()
    }

    fn in_edges(&self, vertex: &V) -> Vec<EdgeId> {
        let Some(&ix) = self.vertex_index.get(vertex) else {
            return Vec::new();
        };
        self.ensure_adj()
            .in_edges(ix)
            .iter()
            .copied()
            .map(EdgeId)
            .collect()
    }

    fn degree(&self, vertex: &V) -> usize {
        let Some(&ix) = self.vertex_index.get(vertex) else {
            return 0;
        };
        let adj = self.ensure_adj();
        adj.out_edges(ix).len() + adj.in_edges(ix).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_cache_is_rebuilt_after_mutation() {
        let mut g: Graph<&str> = Graph::new();
        g.add_edge("a", "b");
        assert_eq!(g.out_edges(&"a").len(), 1);

        g.add_edge("a", "c");
        assert_eq!(g.out_edges(&"a").len(), 2);
        assert_eq!(g.in_edges(&"c").len(), 1);
    }

    #[test]
    fn csr_offsets_cover_every_edge_once() {
        let g = Graph::from_edges([(0, 1), (1, 2), (2, 0), (0, 2)]);
        let adj = g.ensure_adj();
        assert_eq!(adj.out_offsets, vec![0, 2, 3, 4]);
        assert_eq!(adj.in_offsets, vec![0, 1, 2, 4]);
        let mut seen: Vec<usize> = adj.out_edges.clone();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
