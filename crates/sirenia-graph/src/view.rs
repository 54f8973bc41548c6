use std::hash::Hash;

/// Read-only view over a graph's vertices and edges.
///
/// Vertices and edges are opaque identities: algorithms only clone, compare and hash them.
/// Enumeration order matters, since every algorithm that breaks ties does so by "first in
/// enumeration order".
pub trait GraphView {
    type Vertex: Clone + Eq + Hash;
    type Edge: Clone + Eq + Hash;

    fn vertex_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    fn vertices(&self) -> impl Iterator<Item = Self::Vertex> + '_;

    fn edges(&self) -> impl Iterator<Item = Self::Edge> + '_;

    fn source(&self, edge: &Self::Edge) -> Self::Vertex;

    fn target(&self, edge: &Self::Edge) -> Self::Vertex;

    /// Edge weight; unweighted graphs report `1.0`.
    fn weight(&self, _edge: &Self::Edge) -> f64 {
        1.0
    }

    fn out_edges(&self, vertex: &Self::Vertex) -> Vec<Self::Edge>;

    fn in_edges(&self, vertex: &Self::Vertex) -> Vec<Self::Edge>;

    /// Number of incident edge ends. A self-loop counts twice.
    fn degree(&self, vertex: &Self::Vertex) -> usize {
        self.out_edges(vertex).len() + self.in_edges(vertex).len()
    }
}

impl<T: GraphView> GraphView for &T {
    type Vertex = T::Vertex;
    type Edge = T::Edge;

    fn vertex_count(&self) -> usize {
        (**self).vertex_count()
    }

    fn edge_count(&self) -> usize {
        (**self).edge_count()
    }

    fn vertices(&self) -> impl Iterator<Item = Self::Vertex> + '_ {
        (**self).vertices()
    }

    fn edges(&self) -> impl Iterator<Item = Self::Edge> + '_ {
        (**self).edges()
    }

    fn source(&self, edge: &Self::Edge) -> Self::Vertex {
        (**self).source(edge)
    }

    fn target(&self, edge: &Self::Edge) -> Self::Vertex {
        (**self).target(edge)
    }

    fn weight(&self, edge: &Self::Edge) -> f64 {
        (**self).weight(edge)
    }

    fn out_edges(&self, vertex: &Self::Vertex) -> Vec<Self::Edge> {
        (**self).out_edges(vertex)
    }

    fn in_edges(&self, vertex: &Self::Vertex) -> Vec<Self::Edge> {
        (**self).in_edges(vertex)
    }

    fn degree(&self, vertex: &Self::Vertex) -> usize {
        (**self).degree(vertex)
    }
}
