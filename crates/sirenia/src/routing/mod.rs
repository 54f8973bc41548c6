//! Edge routing: polyline waypoints for the edges of an already laid-out graph.
//!
//! A route holds the interior waypoints between the source and target centres; an empty route
//! means "draw a straight line". Routers own their [`RoutingInput`] so positions and sizes can be
//! updated between runs, and publish [`EdgeRouter::routes`] only when a run succeeds.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect, Size, bounding_rects, rect_from_center};
use crate::graph::{GraphView, IndexedGraph};
use crate::layout::VertexPositions;
use indexmap::IndexMap;
use std::hash::Hash;

pub mod bundle;
pub mod pathfinder;
pub mod simple;

pub use bundle::{BundleOptions, BundleRouter};
pub use pathfinder::{Heuristic, PathfinderOptions, PathfinderRouter};
pub use simple::{SimpleOptions, SimpleRouter};

pub type VertexSizes<V> = IndexMap<V, Size>;

/// Edge → interior waypoints, in graph enumeration order.
pub type EdgeRoutes<E> = IndexMap<E, Vec<Point>>;

#[derive(Debug, Clone)]
pub struct RoutingInput<V: Eq + Hash> {
    pub positions: VertexPositions<V>,
    /// Vertices without a size are treated as points.
    pub sizes: VertexSizes<V>,
}

impl<V: Eq + Hash> Default for RoutingInput<V> {
    fn default() -> Self {
        Self {
            positions: IndexMap::new(),
            sizes: IndexMap::new(),
        }
    }
}

impl<V: Eq + Hash> RoutingInput<V> {
    pub fn new(positions: VertexPositions<V>, sizes: VertexSizes<V>) -> Self {
        Self { positions, sizes }
    }

    /// Bounding rectangle of `vertex`, centred on its position.
    pub fn bounds_of(&self, vertex: &V) -> Option<Rect> {
        let center = *self.positions.get(vertex)?;
        let size = self.sizes.get(vertex).copied().unwrap_or(Size::zero());
        Some(rect_from_center(center, size))
    }
}

pub trait EdgeRouter<G: GraphView> {
    /// Routes every edge of the graph. On error (including cancellation)
    /// [`routes`](Self::routes) is left empty.
    fn compute(&mut self, cancel: &CancelToken) -> Result<&EdgeRoutes<G::Edge>>;

    /// Recomputes one edge against the current input and stores it into the route map.
    fn compute_single(&mut self, edge: &G::Edge) -> Result<Vec<Point>>;

    /// Moves a vertex; takes effect on the next computation.
    fn update_vertex_position(&mut self, vertex: G::Vertex, position: Point);

    fn update_vertex_size(&mut self, vertex: G::Vertex, size: Size);

    fn routes(&self) -> &EdgeRoutes<G::Edge>;
}

/// Dense snapshot of a routing run: the indexed graph plus every positioned vertex's rectangle.
pub(crate) struct Scene<V, E> {
    pub(crate) graph: IndexedGraph<V, E>,
    /// `None` for vertices without a position; those are not obstacles.
    pub(crate) rects: Vec<Option<Rect>>,
    /// Bumped whenever `rects` change, so routers can tell when derived data is stale.
    pub(crate) revision: u64,
}

impl<V, E> Scene<V, E>
where
    V: Clone + Eq + Hash,
    E: Clone + Eq + Hash,
{
    fn build<G>(graph: &G, input: &RoutingInput<V>) -> Result<Self>
    where
        G: GraphView<Vertex = V, Edge = E>,
    {
        let graph = IndexedGraph::from_view(graph)?;
        let rects = graph.vertices.iter().map(|v| input.bounds_of(v)).collect();
        Ok(Self {
            graph,
            rects,
            revision: 0,
        })
    }

    fn require_positioned(&self, edge: usize) -> Result<()> {
        let e = self.graph.edges[edge];
        for v in [e.source, e.target] {
            if self.rects[v].is_none() {
                return Err(Error::MissingPosition {
                    vertex: format!("#{v}"),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn center(&self, v: usize) -> Point {
        self.rects[v].map(|r| r.center()).unwrap_or(Point::origin())
    }

    /// Source and target centres of `edge`.
    pub(crate) fn endpoints(&self, edge: usize) -> (Point, Point) {
        let e = self.graph.edges[edge];
        (self.center(e.source), self.center(e.target))
    }

    /// Union of every vertex rectangle, or `None` if nothing is positioned.
    pub(crate) fn extent(&self) -> Option<Rect> {
        bounding_rects(self.rects.iter().flatten())
    }
}

/// Graph, input and the published routes shared by every router.
///
/// The scene of the last run is kept so that [`EdgeRouter::compute_single`] reuses the graph
/// snapshot; input updates patch its rectangles in place.
pub(crate) struct RouterState<G: GraphView> {
    pub(crate) graph: G,
    pub(crate) input: RoutingInput<G::Vertex>,
    pub(crate) routes: EdgeRoutes<G::Edge>,
    scene: Option<Scene<G::Vertex, G::Edge>>,
    revision: u64,
}

impl<G: GraphView> RouterState<G> {
    pub(crate) fn new(graph: G, input: RoutingInput<G::Vertex>) -> Self {
        Self {
            graph,
            input,
            routes: IndexMap::new(),
            scene: None,
            revision: 0,
        }
    }

    fn build_scene(&mut self) -> Result<Scene<G::Vertex, G::Edge>> {
        let mut scene = Scene::build(&self.graph, &self.input)?;
        self.revision += 1;
        scene.revision = self.revision;
        Ok(scene)
    }

    pub(crate) fn set_position(&mut self, vertex: G::Vertex, position: Point) {
        self.input.positions.insert(vertex.clone(), position);
        self.refresh_rect(&vertex);
    }

    pub(crate) fn set_size(&mut self, vertex: G::Vertex, size: Size) {
        self.input.sizes.insert(vertex.clone(), size);
        self.refresh_rect(&vertex);
    }

    fn refresh_rect(&mut self, vertex: &G::Vertex) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let Some(v) = scene.graph.vertex_index(vertex) else {
            return;
        };
        let bounds = self.input.bounds_of(vertex);
        if scene.rects[v] != bounds {
            scene.rects[v] = bounds;
            self.revision += 1;
            scene.revision = self.revision;
        }
    }

    /// Routes every edge through `route_all`, which returns one route per snapshot edge.
    pub(crate) fn run<F>(
        &mut self,
        router: &'static str,
        cancel: &CancelToken,
        route_all: F,
    ) -> Result<()>
    where
        F: FnOnce(&Scene<G::Vertex, G::Edge>, &CancelToken) -> Result<Vec<Vec<Point>>>,
    {
        self.routes.clear();
        cancel.check()?;
        self.scene = None;
        let scene = self.build_scene()?;
        let scene = &*self.scene.insert(scene);
        let _span = tracing::debug_span!(
            "route",
            router,
            vertices = scene.graph.len(),
            edges = scene.graph.edges.len()
        )
        .entered();

        for edge in 0..scene.graph.edges.len() {
            scene.require_positioned(edge)?;
        }
        if scene.graph.edges.is_empty() {
            return Ok(());
        }

        let routes = route_all(scene, cancel)?;
        if routes.iter().flatten().any(|p| !p.is_finite()) {
            tracing::warn!(router, "routing produced a non-finite waypoint");
            return Err(Error::NonFinite { algorithm: router });
        }
        let bends: usize = routes.iter().map(Vec::len).sum();
        tracing::debug!(router, waypoints = bends, "routing finished");

        self.routes = scene.graph.edge_keys.iter().cloned().zip(routes).collect();
        Ok(())
    }

    /// Routes `edge` alone through `route_one` and stores the result.
    pub(crate) fn run_single<F>(
        &mut self,
        router: &'static str,
        edge: &G::Edge,
        route_one: F,
    ) -> Result<Vec<Point>>
    where
        F: FnOnce(&Scene<G::Vertex, G::Edge>, usize) -> Result<Vec<Point>>,
    {
        let scene = match self.scene.take() {
            Some(scene) => scene,
            None => self.build_scene()?,
        };
        let scene = &*self.scene.insert(scene);
        let index = scene.graph.edge_index(edge).ok_or(Error::UnknownEdge)?;
        scene.require_positioned(index)?;

        let route = route_one(scene, index)?;
        if route.iter().any(|p| !p.is_finite()) {
            return Err(Error::NonFinite { algorithm: router });
        }
        tracing::trace!(router, edge = index, waypoints = route.len(), "edge rerouted");
        self.routes.insert(edge.clone(), route.clone());
        Ok(route)
    }
}

/// Drops interior points that continue in the same direction as the previous segment.
pub(crate) fn compress_collinear(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    out.push(points[0]);
    for i in 1..points.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = points[i];
        let next = points[i + 1];
        let a = curr - prev;
        let b = next - curr;
        let cross = a.x * b.y - a.y * b.x;
        if a.square_length() == 0.0 || (cross.abs() <= 1e-9 && a.dot(b) >= 0.0) {
            continue;
        }
        out.push(curr);
    }
    out.push(points[points.len() - 1]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rect;
    use crate::graph::Graph;

    fn revision<G: GraphView>(state: &RouterState<G>) -> Option<u64> {
        state.scene.as_ref().map(|s| s.revision)
    }

    #[test]
    fn input_updates_patch_the_cached_scene() {
        let g = Graph::from_edges([("a", "b")]);
        let edge = g.edges().next().expect("edge");
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::origin());
        input.positions.insert("b", Point::new(10.0, 0.0));
        let mut state = RouterState::new(&g, input);
        state
            .run("test", &CancelToken::none(), |scene, _| {
                Ok(vec![Vec::new(); scene.graph.edges.len()])
            })
            .expect("run");
        let first = revision(&state);

        state.set_position("b", Point::new(20.0, 5.0));
        state.set_size("b", Size::new(4.0, 2.0));
        let second = revision(&state);
        assert!(second > first);

        // Re-applying the same input, or touching a vertex outside the graph, changes nothing.
        state.set_position("b", Point::new(20.0, 5.0));
        state.set_size("elsewhere", Size::new(1.0, 1.0));
        assert_eq!(revision(&state), second);

        let route = state
            .run_single("test", &edge, |scene, index| {
                assert_eq!(index, 0);
                assert_eq!(scene.rects[1], Some(rect(18.0, 4.0, 4.0, 2.0)));
                Ok(vec![Point::new(1.0, 1.0)])
            })
            .expect("single");
        assert_eq!(state.routes[&edge], route);
        assert_eq!(revision(&state), second);
    }

    #[test]
    fn bounds_are_centred_on_the_position() {
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::new(10.0, 10.0));
        input.sizes.insert("a", Size::new(4.0, 2.0));
        input.positions.insert("b", Point::new(0.0, 0.0));
        assert_eq!(input.bounds_of(&"a"), Some(rect(8.0, 9.0, 4.0, 2.0)));
        assert_eq!(input.bounds_of(&"b"), Some(rect(0.0, 0.0, 0.0, 0.0)));
        assert_eq!(input.bounds_of(&"c"), None);
    }

    #[test]
    fn scene_requires_positions_for_edge_endpoints() {
        let g = Graph::from_edges([("a", "b")]);
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::origin());
        let scene = Scene::build(&g, &input).expect("scene");
        assert!(matches!(
            scene.require_positioned(0),
            Err(Error::MissingPosition { vertex }) if vertex == "#1"
        ));
    }

    #[test]
    fn collinear_points_are_dropped() {
        let pts = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(2.0, 2.0),
        ];
        assert_eq!(
            compress_collinear(&pts),
            vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(2.0, 2.0)]
        );
    }
}
