//! Corner-hopping router: detours around each blocking vertex via its best bounding-box corner.

use super::{EdgeRouter, EdgeRoutes, RouterState, RoutingInput, Scene};
use crate::cancel::CancelToken;
use crate::error::{Result, require_non_negative, require_nonzero};
use crate::geometry::{Point, Rect, Size, clip_segment, corners};
use crate::graph::GraphView;

const NAME: &str = "simple-router";

#[derive(Debug, Clone)]
pub struct SimpleOptions {
    /// Clearance kept around every obstacle.
    pub side_step: f64,
    /// Upper bound on detours per edge.
    pub max_steps: usize,
}

impl Default for SimpleOptions {
    fn default() -> Self {
        Self {
            side_step: 5.0,
            max_steps: 64,
        }
    }
}

impl SimpleOptions {
    fn resolve(&self) -> Result<ResolvedSimple> {
        Ok(ResolvedSimple {
            side_step: require_non_negative(NAME, "side_step", self.side_step)?,
            max_steps: require_nonzero(NAME, "max_steps", self.max_steps)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedSimple {
    side_step: f64,
    max_steps: usize,
}

fn route_edge<V, E>(scene: &Scene<V, E>, edge: usize, params: ResolvedSimple) -> Vec<Point>
where
    V: Clone + Eq + std::hash::Hash,
    E: Clone + Eq + std::hash::Hash,
{
    let e = scene.graph.edges[edge];
    if e.is_loop() {
        return Vec::new();
    }
    let (start, end) = scene.endpoints(edge);

    let obstacles: Vec<Rect> = scene
        .rects
        .iter()
        .enumerate()
        .filter(|&(v, _)| v != e.source && v != e.target)
        .filter_map(|(_, r)| r.map(|r| r.inflate(params.side_step, params.side_step)))
        .collect();
    // Corners already visited, per obstacle; an obstacle with all four used no longer blocks.
    let mut used = vec![[false; 4]; obstacles.len()];

    let mut route: Vec<Point> = Vec::new();
    let mut current = start;
    for _ in 0..params.max_steps {
        let blocking = obstacles
            .iter()
            .enumerate()
            .filter(|&(i, _)| used[i].iter().any(|u| !u))
            .filter_map(|(i, r)| clip_segment(r, current, end).map(|(t0, _)| (i, t0)))
            .fold(None::<(usize, f64)>, |best, (i, t0)| match best {
                Some((_, bt)) if bt <= t0 => best,
                _ => Some((i, t0)),
            });
        let Some((i, _)) = blocking else {
            break;
        };
        let Some(k) = best_corner(&obstacles[i], &used[i], current, end) else {
            break;
        };
        used[i][k] = true;
        let corner = corners(&obstacles[i])[k];
        route.push(corner);
        current = corner;
    }
    route
}

/// Index of the unused corner minimising `|current → corner| + |corner → end|`, preferring
/// corners reachable without crossing the obstacle. Ties keep the first corner in clockwise
/// order.
fn best_corner(obstacle: &Rect, used: &[bool; 4], current: Point, end: Point) -> Option<usize> {
    let candidates = corners(obstacle);
    let cheapest = |visible_only: bool| {
        let mut best: Option<(usize, f64)> = None;
        for (k, c) in candidates.iter().enumerate() {
            if used[k] || (visible_only && clip_segment(obstacle, current, *c).is_some()) {
                continue;
            }
            let d = current.distance_to(*c) + c.distance_to(end);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((k, d));
            }
        }
        best
    };
    cheapest(true).or_else(|| cheapest(false)).map(|(k, _)| k)
}

pub struct SimpleRouter<G: GraphView> {
    state: RouterState<G>,
    options: SimpleOptions,
}

impl<G: GraphView> SimpleRouter<G> {
    pub fn new(graph: G, input: RoutingInput<G::Vertex>, options: SimpleOptions) -> Self {
        Self {
            state: RouterState::new(graph, input),
            options,
        }
    }

    pub fn input(&self) -> &RoutingInput<G::Vertex> {
        &self.state.input
    }

    pub fn options(&self) -> &SimpleOptions {
        &self.options
    }
}

impl<G: GraphView> EdgeRouter<G> for SimpleRouter<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&EdgeRoutes<G::Edge>> {
        self.state.routes.clear();
        cancel.check()?;
        let params = self.options.resolve()?;
        self.state.run(NAME, cancel, |scene, cancel| {
            let mut routes = Vec::with_capacity(scene.graph.edges.len());
            for edge in 0..scene.graph.edges.len() {
                cancel.check()?;
                routes.push(route_edge(scene, edge, params));
            }
            Ok(routes)
        })?;
        Ok(&self.state.routes)
    }

    fn compute_single(&mut self, edge: &G::Edge) -> Result<Vec<Point>> {
        let params = self.options.resolve()?;
        self.state
            .run_single(NAME, edge, |scene, index| Ok(route_edge(scene, index, params)))
    }

    fn update_vertex_position(&mut self, vertex: G::Vertex, position: Point) {
        self.state.set_position(vertex, position);
    }

    fn update_vertex_size(&mut self, vertex: G::Vertex, size: Size) {
        self.state.set_size(vertex, size);
    }

    fn routes(&self) -> &EdgeRoutes<G::Edge> {
        &self.state.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rect;
    use crate::graph::Graph;

    const FREE: [bool; 4] = [false; 4];

    #[test]
    fn best_corner_prefers_the_shorter_detour() {
        let obstacle = rect(-10.0, -5.0, 20.0, 30.0);
        let k = best_corner(&obstacle, &FREE, Point::new(0.0, -20.0), Point::new(0.0, 40.0));
        // Left and right detours cost the same; the first clockwise corner wins.
        assert_eq!(k, Some(0));
    }

    #[test]
    fn best_corner_skips_corners_behind_the_obstacle() {
        let obstacle = rect(0.0, 0.0, 10.0, 10.0);
        let k = best_corner(&obstacle, &FREE, Point::new(-5.0, 5.0), Point::new(11.0, 5.0));
        assert!(matches!(k, Some(0) | Some(3)), "{k:?}");
        assert_eq!(best_corner(&obstacle, &[true; 4], Point::origin(), Point::origin()), None);
    }

    #[test]
    fn blocked_edge_wraps_around_the_obstacle() {
        let mut g = Graph::from_edges([("a", "b")]);
        g.add_vertex("c");
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::new(0.0, 0.0));
        input.positions.insert("b", Point::new(100.0, 0.0));
        input.positions.insert("c", Point::new(50.0, 0.0));
        input.sizes.insert("c", Size::new(20.0, 20.0));
        let scene = Scene::build(&g, &input).expect("scene");

        let params = SimpleOptions::default().resolve().expect("resolve");
        let route = route_edge(&scene, 0, params);
        // Inflated obstacle spans [35, 65] x [-15, 15]: over the top-left, then the top-right.
        assert_eq!(route, vec![Point::new(35.0, -15.0), Point::new(65.0, -15.0)]);
    }

    #[test]
    fn unobstructed_edge_is_straight() {
        let g = Graph::from_edges([("a", "b")]);
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::new(0.0, 0.0));
        input.positions.insert("b", Point::new(200.0, 200.0));
        let scene = Scene::build(&g, &input).expect("scene");
        let params = SimpleOptions::default().resolve().expect("resolve");
        assert!(route_edge(&scene, 0, params).is_empty());
    }
}
