//! Adjacency cache used by [`Graph`](super::Graph).
//!
//! `in_edges` / `out_edges` are queried once per vertex by every algorithm snapshot; scanning all
//! edges each time is O(E) per query. The cache stores both directions in CSR form.

#[derive(Debug, Clone)]
pub(in crate::graph) struct DirectedAdjCache {
    pub(in crate::graph) generation: u64,
    pub(in crate::graph) out_offsets: Vec<usize>,
    pub(in crate::graph) out_edges: Vec<usize>,
    pub(in crate::graph) in_offsets: Vec<usize>,
    pub(in crate::graph) in_edges: Vec<usize>,
}

impl DirectedAdjCache {
    /// Placeholder that never matches a graph generation, so the first query builds.
    pub(in crate::graph) fn stale() -> Self {
        Self {
            generation: u64::MAX,
            out_offsets: Vec::new(),
            out_edges: Vec::new(),
            in_offsets: Vec::new(),
            in_edges: Vec::new(),
        }
    }

    pub(in crate::graph) fn build(
        generation: u64,
        vertex_count: usize,
        endpoints: impl Iterator<Item = (usize, usize)> + Clone,
    ) -> Self {
        let mut out_offsets = vec![0usize; vertex_count + 1];
        let mut in_offsets = vec![0usize; vertex_count + 1];
        for (s, t) in endpoints.clone() {
            out_offsets[s + 1] += 1;
            in_offsets[t + 1] += 1;
        }
        for i in 0..vertex_count {
            out_offsets[i + 1] += out_offsets[i];
            in_offsets[i + 1] += in_offsets[i];
        }

        let mut out_edges = vec![0usize; out_offsets[vertex_count]];
        let mut in_edges = vec![0usize; in_offsets[vertex_count]];
        let mut out_fill = out_offsets.clone();
        let mut in_fill = in_offsets.clone();
        for (edge_ix, (s, t)) in endpoints.enumerate() {
            out_edges[out_fill[s]] = edge_ix;
            out_fill[s] += 1;
            in_edges[in_fill[t]] = edge_ix;
            in_fill[t] += 1;
        }

        Self {
            generation,
            out_offsets,
            out_edges,
            in_offsets,
            in_edges,
        }
    }

    pub(in crate::graph) fn out_edges(&self, v_ix: usize) -> &[usize] {
        let start = self.out_offsets[v_ix];
        let end = self.out_offsets[v_ix + 1];
        &self.out_edges[start..end]
    }

    pub(in crate::graph) fn in_edges(&self, v_ix: usize) -> &[usize] {
        let start = self.in_offsets[v_ix];
        let end = self.in_offsets[v_ix + 1];
        &self.in_edges[start..end]
    }
}
