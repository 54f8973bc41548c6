//! Grid A* router.
//!
//! The drawing area (every vertex rectangle plus a margin) is cut into uniform cells; cells
//! covered by a vertex other than the edge's endpoints are blocked. Paths are searched from the
//! source cell to the target cell and returned as compressed cell centres.

use super::{EdgeRouter, EdgeRoutes, RouterState, RoutingInput, Scene, compress_collinear};
use crate::cancel::CancelToken;
use crate::error::{Result, require_non_negative, require_nonzero, require_positive};
use crate::geometry::{Point, Rect, Size, bounding_rects};
use crate::graph::GraphView;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const NAME: &str = "pathfinder-router";

/// Grids larger than this are not searched; the edge falls back to a straight line.
const MAX_CELLS: usize = 1 << 22;
/// Extra cost of a step that changes direction, when direction changes are punished.
const TURN_PENALTY: f64 = 20.0;
const TIE_BREAK_WEIGHT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Heuristic {
    #[default]
    Manhattan,
    MaxDxDy,
    DiagonalShortcut,
    Euclidean,
    EuclideanNoSqrt,
}

impl Heuristic {
    /// Estimated remaining cost for a `(dx, dy)` cell offset, before scaling.
    fn estimate(self, dx: f64, dy: f64) -> f64 {
        let (dx, dy) = (dx.abs(), dy.abs());
        match self {
            Heuristic::Manhattan => dx + dy,
            Heuristic::MaxDxDy => dx.max(dy),
            Heuristic::DiagonalShortcut => {
                let diagonal = dx.min(dy);
                let straight = dx + dy;
                std::f64::consts::SQRT_2 * diagonal + (straight - 2.0 * diagonal)
            }
            Heuristic::Euclidean => dx.hypot(dy),
            Heuristic::EuclideanNoSqrt => dx * dx + dy * dy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathfinderOptions {
    pub horizontal_grid_size: f64,
    pub vertical_grid_size: f64,
    /// Margin added around the vertices' bounding box.
    pub side_area_offset: f64,
    pub heuristic: Heuristic,
    /// Multiplier applied to the heuristic; values above 1 trade optimality for speed.
    pub heuristic_estimate: f64,
    pub use_diagonals: bool,
    pub punish_change_direction: bool,
    pub use_tie_breaker: bool,
    /// Maximum number of expanded cells per edge.
    pub search_limit: usize,
}

impl Default for PathfinderOptions {
    fn default() -> Self {
        Self {
            horizontal_grid_size: 10.0,
            vertical_grid_size: 10.0,
            side_area_offset: 40.0,
            heuristic: Heuristic::Manhattan,
            heuristic_estimate: 2.0,
            use_diagonals: true,
            punish_change_direction: false,
            use_tie_breaker: false,
            search_limit: 50_000,
        }
    }
}

impl PathfinderOptions {
    fn resolve(&self) -> Result<ResolvedPathfinder> {
        Ok(ResolvedPathfinder {
            cell_width: require_positive(NAME, "horizontal_grid_size", self.horizontal_grid_size)?,
            cell_height: require_positive(NAME, "vertical_grid_size", self.vertical_grid_size)?,
            margin: require_non_negative(NAME, "side_area_offset", self.side_area_offset)?,
            heuristic: self.heuristic,
            heuristic_estimate: require_non_negative(
                NAME,
                "heuristic_estimate",
                self.heuristic_estimate,
            )?,
            use_diagonals: self.use_diagonals,
            punish_change_direction: self.punish_change_direction,
            use_tie_breaker: self.use_tie_breaker,
            search_limit: require_nonzero(NAME, "search_limit", self.search_limit)?,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedPathfinder {
    cell_width: f64,
    cell_height: f64,
    margin: f64,
    heuristic: Heuristic,
    heuristic_estimate: f64,
    use_diagonals: bool,
    punish_change_direction: bool,
    use_tie_breaker: bool,
    search_limit: usize,
}

/// Uniform grid with the vertices covering each cell.
#[derive(Debug, Clone)]
struct RoutingGrid {
    origin: Point,
    cell_width: f64,
    cell_height: f64,
    cols: usize,
    rows: usize,
    occupants: Vec<Vec<usize>>,
}

impl RoutingGrid {
    fn build(rects: &[Option<Rect>], params: &ResolvedPathfinder) -> Option<Self> {
        let extent = bounding_rects(rects.iter().flatten())?.inflate(params.margin, params.margin);
        let cols = ((extent.width() / params.cell_width).ceil() as usize).max(1);
        let rows = ((extent.height() / params.cell_height).ceil() as usize).max(1);
        if cols.saturating_mul(rows) > MAX_CELLS {
            tracing::debug!(cols, rows, "routing grid too large");
            return None;
        }

        let mut grid = Self {
            origin: extent.origin,
            cell_width: params.cell_width,
            cell_height: params.cell_height,
            cols,
            rows,
            occupants: vec![Vec::new(); cols * rows],
        };
        for (v, r) in rects.iter().enumerate() {
            let Some(r) = r else {
                continue;
            };
            let (x0, y0) = grid.clamped_cell(r.min());
            let (x1, y1) = grid.clamped_cell(r.max());
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let idx = grid.index(x, y);
                    grid.occupants[idx].push(v);
                }
            }
        }
        Some(grid)
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.cols + x
    }

    fn clamped_cell(&self, p: Point) -> (usize, usize) {
        let fx = ((p.x - self.origin.x) / self.cell_width).floor();
        let fy = ((p.y - self.origin.y) / self.cell_height).floor();
        let x = fx.clamp(0.0, (self.cols - 1) as f64) as usize;
        let y = fy.clamp(0.0, (self.rows - 1) as f64) as usize;
        (x, y)
    }

    fn cell_center(&self, x: usize, y: usize) -> Point {
        Point::new(
            self.origin.x + (x as f64 + 0.5) * self.cell_width,
            self.origin.y + (y as f64 + 0.5) * self.cell_height,
        )
    }

    fn blocked(&self, idx: usize, source: usize, target: usize) -> bool {
        self.occupants[idx]
            .iter()
            .any(|&v| v != source && v != target)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    g: f64,
    cell: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    // Min-heap on `f`; among equal `f` prefer the deeper node, then the lower cell index.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NO_PARENT: usize = usize::MAX;

/// A* from `start` to `end` cell; returns the cell path (both ends included) or `None`.
fn search(
    grid: &RoutingGrid,
    params: &ResolvedPathfinder,
    start: (usize, usize),
    end: (usize, usize),
    endpoints: (usize, usize),
) -> Option<Vec<(usize, usize)>> {
    const STRAIGHT: [(isize, isize); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
    const DIAGONAL: [(isize, isize); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

    let cells = grid.cols * grid.rows;
    let mut best_g = vec![f64::INFINITY; cells];
    let mut parent = vec![NO_PARENT; cells];
    let mut closed = vec![false; cells];
    let mut heap: BinaryHeap<OpenEntry> = BinaryHeap::new();

    let heuristic = |x: usize, y: usize| {
        let dx = x as f64 - end.0 as f64;
        let dy = y as f64 - end.1 as f64;
        let mut h = params.heuristic_estimate * params.heuristic.estimate(dx, dy);
        if params.use_tie_breaker {
            let sx = start.0 as f64 - end.0 as f64;
            let sy = start.1 as f64 - end.1 as f64;
            h += (dx * sy - sx * dy).abs() * TIE_BREAK_WEIGHT;
        }
        h
    };

    let start_idx = grid.index(start.0, start.1);
    let end_idx = grid.index(end.0, end.1);
    best_g[start_idx] = 0.0;
    heap.push(OpenEntry {
        f: heuristic(start.0, start.1),
        g: 0.0,
        cell: start_idx,
    });

    let mut expanded = 0usize;
    while let Some(OpenEntry { g, cell, .. }) = heap.pop() {
        if closed[cell] || g > best_g[cell] {
            continue;
        }
        if cell == end_idx {
            break;
        }
        closed[cell] = true;
        expanded += 1;
        if expanded > params.search_limit {
            tracing::debug!(expanded, "pathfinder search limit reached");
            return None;
        }

        let (x, y) = (cell % grid.cols, cell / grid.cols);
        let incoming = (parent[cell] != NO_PARENT).then(|| {
            let p = parent[cell];
            (
                x as isize - (p % grid.cols) as isize,
                y as isize - (p / grid.cols) as isize,
            )
        });

        let moves = STRAIGHT
            .iter()
            .map(|&d| (d, 1.0))
            .chain(
                DIAGONAL
                    .iter()
                    .filter(|_| params.use_diagonals)
                    .map(|&d| (d, std::f64::consts::SQRT_2)),
            );
        for ((dx, dy), step) in moves {
            let (Some(nx), Some(ny)) = (x.checked_add_signed(dx), y.checked_add_signed(dy)) else {
                continue;
            };
            if nx >= grid.cols || ny >= grid.rows {
                continue;
            }
            let next = grid.index(nx, ny);
            if closed[next] || (next != end_idx && grid.blocked(next, endpoints.0, endpoints.1)) {
                continue;
            }
            // No corner cutting past a blocked orthogonal neighbour.
            if dx != 0 && dy != 0 {
                let side_a = grid.index(nx, y);
                let side_b = grid.index(x, ny);
                if grid.blocked(side_a, endpoints.0, endpoints.1)
                    || grid.blocked(side_b, endpoints.0, endpoints.1)
                {
                    continue;
                }
            }

            let mut next_g = g + step;
            if params.punish_change_direction && incoming.is_some_and(|d| d != (dx, dy)) {
                next_g += TURN_PENALTY;
            }
            if next_g >= best_g[next] {
                continue;
            }
            best_g[next] = next_g;
            parent[next] = cell;
            heap.push(OpenEntry {
                f: next_g + heuristic(nx, ny),
                g: next_g,
                cell: next,
            });
        }
    }

    if parent[end_idx] == NO_PARENT && end_idx != start_idx {
        return None;
    }
    let mut path = Vec::new();
    let mut cur = end_idx;
    loop {
        path.push((cur % grid.cols, cur / grid.cols));
        if cur == start_idx {
            break;
        }
        cur = parent[cur];
    }
    path.reverse();
    Some(path)
}

fn route_edge<V, E>(
    scene: &Scene<V, E>,
    grid: Option<&RoutingGrid>,
    edge: usize,
    params: &ResolvedPathfinder,
) -> Vec<Point>
where
    V: Clone + Eq + std::hash::Hash,
    E: Clone + Eq + std::hash::Hash,
{
    let e = scene.graph.edges[edge];
    let Some(grid) = grid else {
        return Vec::new();
    };
    if e.is_loop() {
        return Vec::new();
    }
    let (a, b) = scene.endpoints(edge);
    let start = grid.clamped_cell(a);
    let end = grid.clamped_cell(b);
    if start == end {
        return Vec::new();
    }

    let Some(cells) = search(grid, params, start, end, (e.source, e.target)) else {
        tracing::debug!(edge, "no grid path; falling back to a straight line");
        return Vec::new();
    };

    let mut points = Vec::with_capacity(cells.len());
    points.push(a);
    points.extend(
        cells[1..cells.len() - 1]
            .iter()
            .map(|&(x, y)| grid.cell_center(x, y)),
    );
    points.push(b);
    let compressed = compress_collinear(&points);
    compressed[1..compressed.len() - 1].to_vec()
}

/// Grid built for one scene revision; `None` when the scene was too large to grid.
struct CachedGrid {
    revision: u64,
    grid: Option<RoutingGrid>,
}

/// Grid for `scene`, rebuilt only when its rectangles changed since the cached one.
fn cached_grid<'a, V, E>(
    cache: &'a mut Option<CachedGrid>,
    scene: &Scene<V, E>,
    params: &ResolvedPathfinder,
) -> Option<&'a RoutingGrid> {
    if cache.as_ref().is_none_or(|c| c.revision != scene.revision) {
        *cache = Some(CachedGrid {
            revision: scene.revision,
            grid: RoutingGrid::build(&scene.rects, params),
        });
    }
    cache.as_ref().and_then(|c| c.grid.as_ref())
}

pub struct PathfinderRouter<G: GraphView> {
    state: RouterState<G>,
    options: PathfinderOptions,
    grid: Option<CachedGrid>,
}

impl<G: GraphView> PathfinderRouter<G> {
    pub fn new(graph: G, input: RoutingInput<G::Vertex>, options: PathfinderOptions) -> Self {
        Self {
            state: RouterState::new(graph, input),
            options,
            grid: None,
        }
    }

    pub fn input(&self) -> &RoutingInput<G::Vertex> {
        &self.state.input
    }

    pub fn options(&self) -> &PathfinderOptions {
        &self.options
    }
}

impl<G: GraphView> EdgeRouter<G> for PathfinderRouter<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&EdgeRoutes<G::Edge>> {
        self.state.routes.clear();
        cancel.check()?;
        let params = self.options.resolve()?;
        let cache = &mut self.grid;
        self.state.run(NAME, cancel, |scene, cancel| {
            let grid = cached_grid(cache, scene, &params);
            let mut routes = Vec::with_capacity(scene.graph.edges.len());
            for edge in 0..scene.graph.edges.len() {
                cancel.check()?;
                routes.push(route_edge(scene, grid, edge, &params));
            }
            Ok(routes)
        })?;
        Ok(&self.state.routes)
    }

    fn compute_single(&mut self, edge: &G::Edge) -> Result<Vec<Point>> {
        let params = self.options.resolve()?;
        let cache = &mut self.grid;
        self.state.run_single(NAME, edge, |scene, index| {
            let grid = cached_grid(cache, scene, &params);
            Ok(route_edge(scene, grid, index, &params))
        })
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

    fn params(options: PathfinderOptions) -> ResolvedPathfinder {
        options.resolve().expect("resolve")
    }

    #[test]
    fn heuristics_measure_cell_offsets() {
        assert_eq!(Heuristic::Manhattan.estimate(3.0, -4.0), 7.0);
        assert_eq!(Heuristic::MaxDxDy.estimate(3.0, -4.0), 4.0);
        assert_eq!(Heuristic::Euclidean.estimate(3.0, -4.0), 5.0);
        assert_eq!(Heuristic::EuclideanNoSqrt.estimate(3.0, -4.0), 25.0);
        let octile = Heuristic::DiagonalShortcut.estimate(3.0, -4.0);
        assert!((octile - (3.0 * std::f64::consts::SQRT_2 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn grid_marks_vertex_cells() {
        let rects = [
            Some(rect(0.0, 0.0, 10.0, 10.0)),
            None,
            Some(rect(35.0, 0.0, 10.0, 10.0)),
        ];
        let p = params(PathfinderOptions {
            side_area_offset: 0.0,
            ..Default::default()
        });
        let grid = RoutingGrid::build(&rects, &p).expect("grid");
        assert_eq!((grid.cols, grid.rows), (5, 1));
        assert_eq!(grid.occupants[0], vec![0]);
        assert_eq!(grid.occupants[1], vec![0]);
        assert!(grid.occupants[2].is_empty());
        assert_eq!(grid.occupants[3], vec![2]);
        assert!(grid.blocked(3, 0, 1));
        assert!(!grid.blocked(3, 0, 2));
    }

    #[test]
    fn grid_is_rebuilt_only_for_a_new_scene_revision() {
        let g = crate::graph::Graph::from_edges([("a", "b")]);
        let mut input: RoutingInput<&str> = RoutingInput::default();
        input.positions.insert("a", Point::new(0.0, 0.0));
        input.positions.insert("b", Point::new(100.0, 0.0));
        let mut scene = Scene::build(&g, &input).expect("scene");
        let p = params(PathfinderOptions::default());

        let mut cache = None;
        let cols = cached_grid(&mut cache, &scene, &p).expect("grid").cols;
        assert_eq!(cols, 18);

        // Same revision: the stale rectangle is not looked at again.
        scene.rects[1] = Some(rect(300.0, 0.0, 0.0, 0.0));
        assert_eq!(cached_grid(&mut cache, &scene, &p).expect("grid").cols, cols);

        scene.revision += 1;
        assert_eq!(cached_grid(&mut cache, &scene, &p).expect("grid").cols, 38);
    }

    #[test]
    fn search_walks_around_a_wall() {
        // 5 x 5 grid with a wall in column 2, rows 0..=3.
        let mut grid = RoutingGrid {
            origin: Point::origin(),
            cell_width: 1.0,
            cell_height: 1.0,
            cols: 5,
            rows: 5,
            occupants: vec![Vec::new(); 25],
        };
        for y in 0..4 {
            grid.occupants[y * 5 + 2].push(9);
        }
        let p = params(PathfinderOptions {
            use_diagonals: false,
            heuristic_estimate: 1.0,
            ..Default::default()
        });
        let path = search(&grid, &p, (0, 0), (4, 0), (0, 1)).expect("path");
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(4, 0)));
        assert!(path.contains(&(2, 4)), "must pass below the wall: {path:?}");
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            assert_eq!(a.0.abs_diff(b.0) + a.1.abs_diff(b.1), 1);
        }
        // Optimal: 4 steps right plus 4 down and 4 back up.
        assert_eq!(path.len(), 13);
    }

    #[test]
    fn search_gives_up_past_the_limit() {
        let grid = RoutingGrid {
            origin: Point::origin(),
            cell_width: 1.0,
            cell_height: 1.0,
            cols: 20,
            rows: 20,
            occupants: vec![Vec::new(); 400],
        };
        let p = params(PathfinderOptions {
            search_limit: 3,
            ..Default::default()
        });
        assert!(search(&grid, &p, (0, 0), (19, 19), (0, 1)).is_none());
        let p = params(PathfinderOptions::default());
        assert!(search(&grid, &p, (0, 0), (19, 19), (0, 1)).is_some());
    }

    #[test]
    fn search_fails_when_walled_off() {
        let mut grid = RoutingGrid {
            origin: Point::origin(),
            cell_width: 1.0,
            cell_height: 1.0,
            cols: 5,
            rows: 5,
            occupants: vec![Vec::new(); 25],
        };
        for y in 0..5 {
            grid.occupants[y * 5 + 2].push(9);
        }
        let p = params(PathfinderOptions::default());
        assert!(search(&grid, &p, (0, 0), (4, 0), (0, 1)).is_none());
    }
}
