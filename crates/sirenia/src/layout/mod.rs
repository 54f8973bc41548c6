//! Force-directed vertex placement.
//!
//! Every algorithm follows the same run shape (see [`LayoutState::run`]):
//!
//! 1. poll the cancel token, resolve options into an immutable per-run value (validation happens
//!    here, before any iteration);
//! 2. snapshot the graph view into dense indices;
//! 3. short-circuit empty and single-vertex graphs;
//! 4. seed positions (caller-supplied first, then randomized from the run-owned generator);
//! 5. iterate, polling the cancel token;
//! 6. verify every coordinate is finite and only then publish the result.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};
use crate::graph::{GraphView, IndexedGraph};
use crate::rng::XorShift64Star;
use indexmap::IndexMap;

pub mod fr;
pub mod isom;
pub mod kk;
pub mod linlog;

pub use fr::{Cooling, FrBounds, FrOptions, FruchtermanReingold};
pub use isom::{Isom, IsomOptions};
pub use kk::{KamadaKawai, KkOptions};
pub use linlog::{LinLog, LinLogOptions};

/// Vertex → centre position, in graph enumeration order.
pub type VertexPositions<V> = IndexMap<V, Point>;

pub trait LayoutAlgorithm<G: GraphView> {
    /// Positions every vertex of the current graph. On error (including cancellation)
    /// [`positions`](Self::positions) is left empty.
    fn compute(&mut self, cancel: &CancelToken) -> Result<&VertexPositions<G::Vertex>>;

    /// Result of the last successful [`compute`](Self::compute).
    fn positions(&self) -> &VertexPositions<G::Vertex>;

    /// Replaces the working graph; takes effect on the next [`compute`](Self::compute).
    fn reset_graph(&mut self, graph: G);
}

/// Algorithm selection for [`layout`].
#[derive(Debug, Clone)]
pub enum Algorithm {
    FruchtermanReingold(FrOptions),
    KamadaKawai(KkOptions),
    Isom(IsomOptions),
    LinLog(LinLogOptions),
}

/// One-shot layout: runs `algorithm` over `graph` and returns the positions.
pub fn layout<G: GraphView>(
    graph: G,
    algorithm: Algorithm,
    cancel: &CancelToken,
) -> Result<VertexPositions<G::Vertex>> {
    fn finish<G: GraphView>(
        mut algo: impl LayoutAlgorithm<G>,
        cancel: &CancelToken,
    ) -> Result<VertexPositions<G::Vertex>> {
        algo.compute(cancel)?;
        Ok(algo.positions().clone())
    }

    match algorithm {
        Algorithm::FruchtermanReingold(opts) => {
            finish(FruchtermanReingold::new(graph, opts), cancel)
        }
        Algorithm::KamadaKawai(opts) => finish(KamadaKawai::new(graph, opts), cancel),
        Algorithm::Isom(opts) => finish(Isom::new(graph, opts), cancel),
        Algorithm::LinLog(opts) => finish(LinLog::new(graph, opts), cancel),
    }
}

/// How vertices without a caller-supplied position are seeded.
#[derive(Debug, Clone)]
pub struct InitialLayout {
    pub seed: u64,
    /// Sampling area; `None` uses the algorithm's own default area.
    pub bounds: Option<Rect>,
    /// Re-sample points that land on top of an already placed vertex.
    pub distinct: bool,
}

impl Default for InitialLayout {
    fn default() -> Self {
        Self {
            seed: 0,
            bounds: None,
            distinct: true,
        }
    }
}

impl InitialLayout {
    const MIN_SEPARATION: f64 = 1e-6;
    const MAX_RESAMPLES: usize = 32;

    pub(crate) fn validate(&self, algorithm: &'static str) -> Result<()> {
        if let Some(b) = self.bounds {
            let ok = b.is_finite() && b.width() >= 0.0 && b.height() >= 0.0;
            if !ok {
                return Err(Error::invalid(
                    algorithm,
                    "initial.bounds",
                    format!("expected a finite, non-negative rectangle, got {b:?}"),
                ));
            }
        }
        Ok(())
    }

    fn seed_positions<V>(
        &self,
        vertices: &[V],
        supplied: Option<&VertexPositions<V>>,
        default_bounds: Rect,
        rng: &mut XorShift64Star,
    ) -> Vec<Point>
    where
        V: Eq + std::hash::Hash,
    {
        let bounds = self.bounds.unwrap_or(default_bounds);
        let mut out: Vec<Point> = Vec::with_capacity(vertices.len());
        for v in vertices {
            if let Some(p) = supplied.and_then(|s| s.get(v)).filter(|p| p.is_finite()) {
                out.push(*p);
                continue;
            }
            let mut p = rng.next_point_in(&bounds);
            if self.distinct {
                for _ in 0..Self::MAX_RESAMPLES {
                    let clash = out
                        .iter()
                        .any(|q| q.distance_to(p) < Self::MIN_SEPARATION);
                    if !clash {
                        break;
                    }
                    p = rng.next_point_in(&bounds);
                }
            }
            out.push(p);
        }
        out
    }
}

/// Graph, caller-supplied seed positions and the published result shared by every layout.
pub(crate) struct LayoutState<G: GraphView> {
    pub(crate) graph: G,
    pub(crate) initial: Option<VertexPositions<G::Vertex>>,
    pub(crate) positions: VertexPositions<G::Vertex>,
}

impl<G: GraphView> LayoutState<G> {
    pub(crate) fn new(graph: G) -> Self {
        Self {
            graph,
            initial: None,
            positions: IndexMap::new(),
        }
    }

    pub(crate) fn reset_graph(&mut self, graph: G) {
        self.graph = graph;
        self.positions.clear();
    }

    /// Shared run harness. `iterate` receives the snapshot and seeded positions (at least two
    /// vertices) and mutates the positions in place.
    pub(crate) fn run<F>(
        &mut self,
        algorithm: &'static str,
        init: &InitialLayout,
        default_bounds: Rect,
        cancel: &CancelToken,
        iterate: F,
    ) -> Result<()>
    where
        F: FnOnce(
            &IndexedGraph<G::Vertex, G::Edge>,
            &mut [Point],
            &mut XorShift64Star,
            &CancelToken,
        ) -> Result<()>,
    {
        self.positions.clear();
        cancel.check()?;
        init.validate(algorithm)?;

        let graph = IndexedGraph::from_view(&self.graph)?;
        let _span = tracing::debug_span!(
            "layout",
            algorithm,
            vertices = graph.len(),
            edges = graph.edges.len()
        )
        .entered();

        if graph.is_empty() {
            return Ok(());
        }
        if graph.len() == 1 {
            let v = &graph.vertices[0];
            let p = self
                .initial
                .as_ref()
                .and_then(|s| s.get(v))
                .copied()
                .filter(|p| p.is_finite())
                .unwrap_or(Point::origin());
            self.positions.insert(v.clone(), p);
            return Ok(());
        }

        let mut rng = XorShift64Star::new(init.seed);
        let mut points =
            init.seed_positions(&graph.vertices, self.initial.as_ref(), default_bounds, &mut rng);

        iterate(&graph, &mut points[..], &mut rng, cancel)?;

        if points.iter().any(|p| !p.is_finite()) {
            tracing::warn!(algorithm, "layout produced a non-finite coordinate");
            return Err(Error::NonFinite { algorithm });
        }

        self.positions = graph.vertices.iter().cloned().zip(points).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{contains_inclusive, rect};

    #[test]
    fn distinct_seeding_resamples_until_points_separate() {
        // A degenerate zero-area sampling rectangle forces every sample onto one point; the
        // resample budget is exhausted and the clash is accepted rather than looping forever.
        let init = InitialLayout {
            seed: 3,
            bounds: Some(rect(1.0, 1.0, 0.0, 0.0)),
            distinct: true,
        };
        let mut rng = XorShift64Star::new(3);
        let pts = init.seed_positions(&[0, 1], None, Rect::default(), &mut rng);
        assert_eq!(pts, vec![Point::new(1.0, 1.0), Point::new(1.0, 1.0)]);

        let init = InitialLayout {
            bounds: Some(rect(0.0, 0.0, 10.0, 10.0)),
            ..init
        };
        let pts = init.seed_positions(&[0, 1, 2, 3], None, Rect::default(), &mut rng);
        for (i, a) in pts.iter().enumerate() {
            for b in &pts[i + 1..] {
                assert!(a.distance_to(*b) >= InitialLayout::MIN_SEPARATION);
            }
        }
    }

    #[test]
    fn supplied_positions_win_over_sampling() {
        let init = InitialLayout::default();
        let mut supplied: VertexPositions<&str> = IndexMap::new();
        supplied.insert("b", Point::new(42.0, -1.0));
        supplied.insert("c", Point::new(f64::NAN, 0.0));
        let mut rng = XorShift64Star::new(1);
        let bounds = rect(0.0, 0.0, 1.0, 1.0);
        let pts = init.seed_positions(&["a", "b", "c"], Some(&supplied), bounds, &mut rng);
        assert_eq!(pts[1], Point::new(42.0, -1.0));
        assert!(contains_inclusive(&bounds, pts[0]));
        assert!(contains_inclusive(&bounds, pts[2]), "non-finite seeds are resampled");
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let init = InitialLayout {
            bounds: Some(rect(0.0, 0.0, -1.0, 5.0)),
            ..Default::default()
        };
        assert!(matches!(
            init.validate("test"),
            Err(Error::InvalidOption { option: "initial.bounds", .. })
        ));
    }
}
