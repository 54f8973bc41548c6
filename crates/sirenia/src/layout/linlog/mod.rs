//! LinLog energy model with Barnes-Hut repulsion.
//!
//! Minimises `Σ_edges w·d^a/a − Σ_pairs f·w_u·w_v·d^r/r + gravitation` (logarithms replace
//! the power terms for a zero exponent) one vertex at a time: a Newton-like direction from the
//! gradient and curvature of the vertex's energy, followed by a coarse line search along it.

mod quadtree;

use super::{InitialLayout, LayoutAlgorithm, LayoutState, VertexPositions};
use crate::cancel::CancelToken;
use crate::error::{Result, require_non_negative, require_nonzero};
use crate::geometry::{Point, Vector, bounding, finite_or_zero, rect};
use crate::graph::{GraphView, IndexedGraph};
use quadtree::{NodeId, QuadTree, ROOT};

const NAME: &str = "linlog";

const CANCEL_STRIDE: usize = 64;
const MIN_ROOT_WIDTH: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct LinLogOptions {
    pub attraction_exponent: f64,
    pub repulsive_exponent: f64,
    pub gravitation_multiplier: f64,
    pub iteration_count: usize,
    pub initial: InitialLayout,
}

impl Default for LinLogOptions {
    fn default() -> Self {
        Self {
            attraction_exponent: 1.0,
            repulsive_exponent: 0.0,
            gravitation_multiplier: 0.1,
            iteration_count: 100,
            initial: InitialLayout::default(),
        }
    }
}

impl LinLogOptions {
    fn resolve(&self) -> Result<ResolvedLinLog> {
        Ok(ResolvedLinLog {
            attraction_exponent: require_non_negative(
                NAME,
                "attraction_exponent",
                self.attraction_exponent,
            )?,
            repulsive_exponent: require_non_negative(
                NAME,
                "repulsive_exponent",
                self.repulsive_exponent,
            )?,
            gravitation_multiplier: require_non_negative(
                NAME,
                "gravitation_multiplier",
                self.gravitation_multiplier,
            )?,
            iteration_count: require_nonzero(NAME, "iteration_count", self.iteration_count)?,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedLinLog {
    attraction_exponent: f64,
    repulsive_exponent: f64,
    gravitation_multiplier: f64,
    iteration_count: usize,
}

impl ResolvedLinLog {
    /// Exponents for `step`. Long runs with a sub-linear repulsion start from a smoother energy
    /// (higher exponents) and blend back to the requested one between 60 % and 90 % of the run.
    fn exponents_at(&self, step: usize) -> (f64, f64) {
        let (a, r) = (self.attraction_exponent, self.repulsive_exponent);
        if self.iteration_count < 50 || r >= 1.0 {
            return (a, r);
        }
        let n = self.iteration_count as f64;
        let step = step as f64;
        let blend = if step <= 0.6 * n {
            1.0
        } else if step <= 0.9 * n {
            (0.9 - step / n) / 0.3
        } else {
            0.0
        };
        (a + 1.1 * (1.0 - r) * blend, r + 0.9 * (1.0 - r) * blend)
    }
}

/// `d^e / e`, or `ln d` for `e == 0`.
fn energy_term(d: f64, exponent: f64) -> f64 {
    if exponent == 0.0 {
        d.ln()
    } else {
        d.powf(exponent) / exponent
    }
}

/// `attr_sum / rep_sum² · rep_sum^(½(a − r))`; 1 when either sum vanishes.
fn repulsion_factor(attraction_sum: f64, repulsion_sum: f64, a: f64, r: f64) -> f64 {
    if attraction_sum <= 0.0 || repulsion_sum <= 0.0 {
        return 1.0;
    }
    attraction_sum / (repulsion_sum * repulsion_sum) * repulsion_sum.powf(0.5 * (a - r))
}

/// Immutable per-run model: incident edges and repulsion weights by vertex index.
struct Model {
    incident: Vec<Vec<(usize, f64)>>,
    repulsion_weight: Vec<f64>,
    attraction_sum: f64,
    repulsion_sum: f64,
    gravitation: f64,
}

impl Model {
    fn new<V, E>(graph: &IndexedGraph<V, E>, gravitation: f64) -> Self {
        let n = graph.vertices.len();
        let mut incident: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for e in graph.edges.iter().filter(|e| !e.is_loop()) {
            incident[e.source].push((e.target, e.weight));
            incident[e.target].push((e.source, e.weight));
        }
        let repulsion_weight: Vec<f64> = incident
            .iter()
            .map(|es| es.iter().map(|&(_, w)| w).sum::<f64>().max(gravitation))
            .collect();
        let attraction_sum = incident.iter().flatten().map(|&(_, w)| w).sum();
        let repulsion_sum = repulsion_weight.iter().sum();
        Self {
            incident,
            repulsion_weight,
            attraction_sum,
            repulsion_sum,
            gravitation,
        }
    }
}

/// Exponent-dependent constants of one iteration.
#[derive(Debug, Clone, Copy)]
struct Step {
    a: f64,
    r: f64,
    factor: f64,
    barycenter: Point,
}

/// Per-run solver state; the tree arena and path buffer are reused across iterations.
struct Solver<'m> {
    model: &'m Model,
    tree: QuadTree,
    path: Vec<NodeId>,
    stack: Vec<NodeId>,
}

impl<'m> Solver<'m> {
    fn new(model: &'m Model) -> Self {
        Self {
            model,
            tree: QuadTree::default(),
            path: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn rebuild(&mut self, pos: &[Point]) {
        let bounds = bounding(pos.iter().copied()).unwrap_or_default();
        let width = bounds.width().max(bounds.height()).max(MIN_ROOT_WIDTH);
        // A hair of slack keeps points on the max edge inside the root square.
        let width = width * (1.0 + 1e-9);
        self.tree.reset(bounds.origin, width, pos.len());
        for (i, &p) in pos.iter().enumerate() {
            self.tree.insert(i, p, self.model.repulsion_weight[i]);
        }
    }

    fn barycenter(&self, pos: &[Point]) -> Point {
        let mut sum = Vector::zero();
        let mut total = 0.0;
        for (p, &w) in pos.iter().zip(&self.model.repulsion_weight) {
            sum += p.to_vector() * w;
            total += w;
        }
        if total > 0.0 {
            Point::origin() + sum / total
        } else {
            Point::origin()
        }
    }

    /// Calls `visit(centroid, weight)` for every body or pseudo-body acting on vertex `v` when
    /// it sits at `at`. Aggregates containing `v` itself (stored at `stored`) have it removed.
    fn for_each_body(
        &mut self,
        v: usize,
        at: Point,
        stored: Point,
        mut visit: impl FnMut(Point, f64),
    ) {
        let wv = self.model.repulsion_weight[v];
        self.tree.path_of(v, &mut self.path);
        self.stack.clear();
        self.stack.push(ROOT);

        while let Some(id) = self.stack.pop() {
            let node = self.tree.node(id);
            if node.bodies == 0 {
                continue;
            }
            let (mut centroid, mut weight) = (node.centroid, node.weight);
            if self.path.contains(&id) {
                if node.bodies == 1 {
                    continue;
                }
                let rest = weight - wv;
                if rest > 0.0 {
                    centroid = Point::new(
                        (centroid.x * weight - stored.x * wv) / rest,
                        (centroid.y * weight - stored.y * wv) / rest,
                    );
                }
                weight = rest;
            }

            let far = at.distance_to(centroid) >= 2.0 * node.width;
            if node.is_leaf() || (far && !self.path.contains(&id)) {
                if weight > 0.0 {
                    visit(centroid, weight);
                }
                continue;
            }
            self.stack.extend(node.child_ids());
        }
    }

    /// Energy of vertex `v` placed at `at`.
    fn energy(&mut self, pos: &[Point], v: usize, at: Point, step: Step) -> f64 {
        let model = self.model;
        let wv = model.repulsion_weight[v];
        let mut e = 0.0;

        for &(u, w) in &model.incident[v] {
            let d = at.distance_to(pos[u]);
            if d > 0.0 {
                e += w * energy_term(d, step.a);
            }
        }

        let mut repulsion = 0.0;
        self.for_each_body(v, at, pos[v], |c, w| {
            let d = at.distance_to(c);
            if d > 0.0 {
                repulsion -= w * energy_term(d, step.r);
            }
        });
        e += step.factor * wv * repulsion;

        let d = at.distance_to(step.barycenter);
        if d > 0.0 {
            e += model.gravitation * step.factor * wv * energy_term(d, step.a);
        }
        e
    }

    /// Gradient-over-curvature move for `v`, clamped to an eighth of the root width.
    fn direction(&mut self, pos: &[Point], v: usize, step: Step) -> Vector {
        let model = self.model;
        let wv = model.repulsion_weight[v];
        let at = pos[v];
        let mut dir = Vector::zero();
        let mut curvature = 0.0;

        for &(u, w) in &model.incident[v] {
            let delta = pos[u] - at;
            let d = delta.length();
            if d > 0.0 {
                let s = w * d.powf(step.a - 2.0);
                dir += delta * s;
                curvature += s * (step.a - 1.0).abs();
            }
        }

        let mut rep_dir = Vector::zero();
        let mut rep_curvature = 0.0;
        self.for_each_body(v, at, at, |c, w| {
            let delta = c - at;
            let d = delta.length();
            if d > 0.0 {
                let s = w * d.powf(step.r - 2.0);
                rep_dir -= delta * s;
                rep_curvature += s * (step.r - 1.0).abs();
            }
        });
        dir += rep_dir * (step.factor * wv);
        curvature += rep_curvature * step.factor * wv;

        let delta = step.barycenter - at;
        let d = delta.length();
        if d > 0.0 {
            let s = model.gravitation * step.factor * wv * d.powf(step.a - 2.0);
            dir += delta * s;
            curvature += s * (step.a - 1.0).abs();
        }

        if !(curvature > 0.0 && curvature.is_finite()) {
            return Vector::zero();
        }
        let dir = finite_or_zero(dir / curvature);
        let limit = self.tree.root().width / 8.0;
        let len = dir.length();
        if len > limit { dir * (limit / len) } else { dir }
    }

    /// Tries multiples of `dir / 32` (32 down to 1, then 64 and 128) and applies the best.
    /// Returns the energy improvement.
    fn line_search(&mut self, pos: &mut [Point], v: usize, dir: Vector, step: Step) -> f64 {
        let origin = pos[v];
        let unit = dir / 32.0;
        let initial = self.energy(pos, v, origin, step);
        let mut best_energy = initial;
        let mut best_multiple = 0u32;

        let mut multiple = 32u32;
        while multiple >= 1 && (best_multiple == 0 || best_multiple / 2 == multiple) {
            let e = self.energy(pos, v, origin + unit * f64::from(multiple), step);
            if e < best_energy {
                best_energy = e;
                best_multiple = multiple;
            }
            multiple /= 2;
        }

        let mut multiple = 64u32;
        while multiple <= 128 && best_multiple == multiple / 2 {
            let e = self.energy(pos, v, origin + unit * f64::from(multiple), step);
            if e < best_energy {
                best_energy = e;
                best_multiple = multiple;
            }
            multiple *= 2;
        }

        if best_multiple > 0 {
            let to = origin + unit * f64::from(best_multiple);
            self.tree
                .move_body(v, origin, to, self.model.repulsion_weight[v]);
            pos[v] = to;
        }
        initial - best_energy
    }
}

fn minimize<V, E>(
    graph: &IndexedGraph<V, E>,
    pos: &mut [Point],
    params: &ResolvedLinLog,
    cancel: &CancelToken,
) -> Result<()> {
    let model = Model::new(graph, params.gravitation_multiplier);
    let mut solver = Solver::new(&model);

    let mut improvement = 0.0;
    for iteration in 0..params.iteration_count {
        cancel.check()?;
        let (a, r) = params.exponents_at(iteration);
        let step = Step {
            a,
            r,
            factor: repulsion_factor(model.attraction_sum, model.repulsion_sum, a, r),
            barycenter: solver.barycenter(pos),
        };
        solver.rebuild(pos);

        improvement = 0.0;
        for v in 0..pos.len() {
            if v % CANCEL_STRIDE == CANCEL_STRIDE - 1 {
                cancel.check()?;
            }
            let dir = solver.direction(pos, v, step);
            if dir == Vector::zero() {
                continue;
            }
            improvement += solver.line_search(pos, v, dir, step);
        }
        let nodes = solver.tree.len();
        tracing::trace!(iteration, a, r, improvement, nodes, "linlog iteration");
    }

    tracing::debug!(
        iterations = params.iteration_count,
        last_improvement = improvement,
        "linlog finished"
    );
    Ok(())
}

pub struct LinLog<G: GraphView> {
    state: LayoutState<G>,
    options: LinLogOptions,
}

impl<G: GraphView> LinLog<G> {
    pub fn new(graph: G, options: LinLogOptions) -> Self {
        Self {
            state: LayoutState::new(graph),
            options,
        }
    }

    pub fn with_initial_positions(mut self, positions: VertexPositions<G::Vertex>) -> Self {
        self.state.initial = Some(positions);
        self
    }

    pub fn options(&self) -> &LinLogOptions {
        &self.options
    }
}

impl<G: GraphView> LayoutAlgorithm<G> for LinLog<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&VertexPositions<G::Vertex>> {
        self.state.positions.clear();
        cancel.check()?;
        let params = self.options.resolve()?;

        self.state.run(
            NAME,
            &self.options.initial,
            rect(-0.5, -0.5, 1.0, 1.0),
            cancel,
            |graph, pos, _rng, cancel| minimize(graph, pos, &params, cancel),
        )?;
        Ok(&self.state.positions)
    }

    fn positions(&self) -> &VertexPositions<G::Vertex> {
        &self.state.positions
    }

    fn reset_graph(&mut self, graph: G) {
        self.state.reset_graph(graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn exponent_schedule_blends_back_to_the_requested_values() {
        let p = LinLogOptions::default().resolve().expect("resolve");
        for step in [0, 60] {
            let (a, r) = p.exponents_at(step);
            assert!((a - 2.1).abs() < 1e-12 && (r - 0.9).abs() < 1e-12);
        }
        let (a, r) = p.exponents_at(75);
        assert!((a - 1.55).abs() < 1e-12 && (r - 0.45).abs() < 1e-12);
        assert_eq!(p.exponents_at(95), (1.0, 0.0));

        let short = LinLogOptions {
            iteration_count: 10,
            ..Default::default()
        }
        .resolve()
        .expect("resolve");
        assert_eq!(short.exponents_at(0), (1.0, 0.0));
    }

    #[test]
    fn logarithmic_terms_for_zero_exponents() {
        assert_eq!(energy_term(1.0, 0.0), 0.0);
        assert!((energy_term(4.0, 2.0) - 8.0).abs() < 1e-12);
        assert_eq!(repulsion_factor(0.0, 3.0, 1.0, 0.0), 1.0);
        assert!((repulsion_factor(4.0, 4.0, 1.0, 0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn repulsion_weight_is_floored_by_gravitation() {
        let mut g: Graph<u8> = Graph::new();
        g.add_weighted_edge(0, 1, 2.0);
        g.add_edge(1, 1);
        g.add_vertex(2);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        let m = Model::new(&ig, 0.1);
        assert_eq!(m.repulsion_weight, vec![2.0, 2.0, 0.1]);
        assert_eq!(m.attraction_sum, 4.0);
    }

    #[test]
    fn minimisation_lowers_the_energy_of_a_stretched_edge() {
        let g: Graph<u8> = Graph::from_edges([(0, 1), (1, 2)]);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        let params = LinLogOptions {
            iteration_count: 20,
            ..Default::default()
        }
        .resolve()
        .expect("resolve");
        let mut pos = vec![
            Point::new(-40.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(40.0, 0.0),
        ];
        minimize(&ig, &mut pos, &params, &CancelToken::none()).expect("minimize");
        assert!(pos.iter().all(|p| p.is_finite()));
        assert!(pos[0].distance_to(pos[2]) < 80.0);
    }

    #[test]
    fn self_is_excluded_from_the_repulsion_bodies() {
        let g: Graph<u8> = Graph::from_edges([(0, 1), (1, 2), (2, 3)]);
        let ig = IndexedGraph::from_view(&g).expect("snapshot");
        let model = Model::new(&ig, 0.1);
        let mut solver = Solver::new(&model);
        let pos = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
        ];
        solver.rebuild(&pos);
        let mut total = 0.0;
        solver.for_each_body(0, pos[0], pos[0], |_, w| total += w);
        let expected: f64 = model.repulsion_weight[1..].iter().sum();
        assert!((total - expected).abs() < 1e-9, "{total} vs {expected}");
    }
}
