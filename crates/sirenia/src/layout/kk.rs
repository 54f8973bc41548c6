//! Kamada-Kawai energy minimisation.
//!
//! Every vertex pair is joined by a spring whose rest length is proportional to the pair's
//! graph-theoretic (hop) distance. One vertex per outer iteration, the one with the steepest
//! energy gradient, is relocated by a 2D Newton-Raphson solve.

use super::{InitialLayout, LayoutAlgorithm, LayoutState, VertexPositions};
use crate::cancel::CancelToken;
use crate::error::{Result, require_nonzero, require_positive};
use crate::geometry::{Point, Rect, Vector, finite_or_zero, rect};
use crate::graph::{GraphView, bfs_hops};
use nalgebra as na;

const NAME: &str = "kamada-kawai";

const EPSILON: f64 = f64::EPSILON;
const MAX_NEWTON_STEPS: usize = 100;
const CANCEL_STRIDE: usize = 64;
/// Round-off in the partial energy sums must not trigger a swap.
const EXCHANGE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct KkOptions {
    pub width: f64,
    pub height: f64,
    pub max_iterations: usize,
    /// Spring stiffness constant `K`; pair stiffness is `K / d_ij²`.
    pub k: f64,
    pub length_factor: f64,
    /// Hop distance assigned to unreachable pairs, as a fraction of the diameter.
    pub disconnected_multiplier: f64,
    pub exchange_vertices: bool,
    pub adjust_for_gravity: bool,
    pub initial: InitialLayout,
}

impl Default for KkOptions {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            max_iterations: 200,
            k: 1.0,
            length_factor: 1.0,
            disconnected_multiplier: 0.5,
            exchange_vertices: false,
            adjust_for_gravity: false,
            initial: InitialLayout::default(),
        }
    }
}

impl KkOptions {
    fn resolve(&self) -> Result<ResolvedKk> {
        Ok(ResolvedKk {
            width: require_positive(NAME, "width", self.width)?,
            height: require_positive(NAME, "height", self.height)?,
            max_iterations: require_nonzero(NAME, "max_iterations", self.max_iterations)?,
            k: require_positive(NAME, "k", self.k)?,
            length_factor: require_positive(NAME, "length_factor", self.length_factor)?,
            disconnected_multiplier: require_positive(
                NAME,
                "disconnected_multiplier",
                self.disconnected_multiplier,
            )?,
            exchange_vertices: self.exchange_vertices,
            adjust_for_gravity: self.adjust_for_gravity,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedKk {
    width: f64,
    height: f64,
    max_iterations: usize,
    k: f64,
    length_factor: f64,
    disconnected_multiplier: f64,
    exchange_vertices: bool,
    adjust_for_gravity: bool,
}

impl ResolvedKk {
    fn area(&self) -> Rect {
        rect(0.0, 0.0, self.width, self.height)
    }
}

/// Dense `n × n` rest lengths and stiffnesses.
#[derive(Debug, Clone)]
struct Springs {
    n: usize,
    length: Vec<f64>,
    strength: Vec<f64>,
}

impl Springs {
    fn build(neighbors: &[Vec<usize>], params: &ResolvedKk, cancel: &CancelToken) -> Result<Self> {
        let n = neighbors.len();
        let mut hops: Vec<Option<usize>> = vec![None; n * n];
        let mut row: Vec<Option<usize>> = Vec::with_capacity(n);
        for s in 0..n {
            cancel.check()?;
            bfs_hops(neighbors, s, &mut row);
            hops[s * n..(s + 1) * n].copy_from_slice(&row);
        }

        let diameter = hops.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;
        let disconnected = (diameter * params.disconnected_multiplier).max(1.0);
        let edge_length = params.width.min(params.height) / diameter * params.length_factor;

        let mut length = vec![0.0; n * n];
        let mut strength = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let d = hops[i * n + j].map_or(disconnected, |h| h as f64);
                length[i * n + j] = edge_length * d;
                strength[i * n + j] = params.k / (d * d);
            }
        }
        tracing::debug!(diameter, edge_length, "kamada-kawai springs");
        Ok(Self {
            n,
            length,
            strength,
        })
    }

    fn pair(&self, i: usize, j: usize) -> (f64, f64) {
        (self.length[i * self.n + j], self.strength[i * self.n + j])
    }

    /// `(∂E/∂x_m, ∂E/∂y_m)`.
    fn gradient(&self, pos: &[Point], m: usize) -> Vector {
        let mut g = Vector::zero();
        for i in 0..self.n {
            if i == m {
                continue;
            }
            let delta = pos[m] - pos[i];
            let d = delta.length();
            if d == 0.0 {
                continue;
            }
            let (l, k) = self.pair(m, i);
            g += delta * (k * (1.0 - l / d));
        }
        finite_or_zero(g)
    }

    /// Newton-Raphson displacement for vertex `m`, or `None` if the Hessian is singular.
    fn newton_step(&self, pos: &[Point], m: usize) -> Option<Vector> {
        let mut gx = 0.0;
        let mut gy = 0.0;
        let mut hxx = 0.0;
        let mut hxy = 0.0;
        let mut hyy = 0.0;
        for i in 0..self.n {
            if i == m {
                continue;
            }
            let delta = pos[m] - pos[i];
            let d = delta.length();
            if d == 0.0 {
                continue;
            }
            let (l, k) = self.pair(m, i);
            let d3 = d * d * d;
            gx += k * (delta.x - l * delta.x / d);
            gy += k * (delta.y - l * delta.y / d);
            hxx += k * (1.0 - l * delta.y * delta.y / d3);
            hxy += k * l * delta.x * delta.y / d3;
            hyy += k * (1.0 - l * delta.x * delta.x / d3);
        }

        let hessian = na::Matrix2::new(hxx, hxy, hxy, hyy);
        let rhs = na::Vector2::new(-gx, -gy);
        let step = hessian.lu().solve(&rhs)?;
        let step = Vector::new(step.x, step.y);
        step.is_finite().then_some(step)
    }

    fn pair_energy(&self, i: usize, j: usize, pi: Point, pj: Point) -> f64 {
        let (l, k) = self.pair(i, j);
        let d = pi.distance_to(pj);
        0.5 * k * (d - l) * (d - l)
    }

    /// Energy change from swapping the positions of `i` and `j`. The `i`–`j` spring itself is
    /// symmetric under the swap and drops out.
    fn exchange_delta(&self, pos: &[Point], i: usize, j: usize) -> f64 {
        let mut delta = 0.0;
        for x in 0..self.n {
            if x == i || x == j {
                continue;
            }
            let before =
                self.pair_energy(i, x, pos[i], pos[x]) + self.pair_energy(j, x, pos[j], pos[x]);
            let after =
                self.pair_energy(i, x, pos[j], pos[x]) + self.pair_energy(j, x, pos[i], pos[x]);
            delta += after - before;
        }
        delta
    }

    fn total_energy(&self, pos: &[Point]) -> f64 {
        let mut e = 0.0;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                e += self.pair_energy(i, j, pos[i], pos[j]);
            }
        }
        e
    }
}

/// Swaps the first pair (in `(i, j), i < j` order) whose exchange lowers the energy.
fn try_exchange(springs: &Springs, pos: &mut [Point], cancel: &CancelToken) -> Result<bool> {
    let n = pos.len();
    for i in 0..n {
        cancel.check()?;
        for j in (i + 1)..n {
            if springs.exchange_delta(pos, i, j) < -EXCHANGE_TOLERANCE {
                pos.swap(i, j);
                tracing::trace!(i, j, "kamada-kawai exchange");
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn relocate(springs: &Springs, pos: &mut [Point], m: usize, cancel: &CancelToken) -> Result<()> {
    for _ in 0..MAX_NEWTON_STEPS {
        // Each step is a full pass over the springs of `m`.
        cancel.check()?;
        let Some(step) = springs.newton_step(pos, m) else {
            break;
        };
        pos[m] += step;
        if springs.gradient(pos, m).length() < EPSILON {
            break;
        }
    }
    Ok(())
}

fn steepest(springs: &Springs, pos: &[Point], cancel: &CancelToken) -> Result<(usize, f64)> {
    let mut best = (0, f64::NEG_INFINITY);
    for m in 0..pos.len() {
        if m % CANCEL_STRIDE == CANCEL_STRIDE - 1 {
            cancel.check()?;
        }
        let g = springs.gradient(pos, m).length();
        if g > best.1 {
            best = (m, g);
        }
    }
    Ok(best)
}

fn move_barycenter_to(pos: &mut [Point], target: Point) {
    let n = pos.len() as f64;
    let sum = pos
        .iter()
        .fold(Vector::zero(), |acc, p| acc + p.to_vector());
    let shift = target - Point::origin() - sum / n;
    for p in pos.iter_mut() {
        *p += shift;
    }
}

pub struct KamadaKawai<G: GraphView> {
    state: LayoutState<G>,
    options: KkOptions,
}

impl<G: GraphView> KamadaKawai<G> {
    pub fn new(graph: G, options: KkOptions) -> Self {
        Self {
            state: LayoutState::new(graph),
            options,
        }
    }

    pub fn with_initial_positions(mut self, positions: VertexPositions<G::Vertex>) -> Self {
        self.state.initial = Some(positions);
        self
    }

    pub fn options(&self) -> &KkOptions {
        &self.options
    }
}

impl<G: GraphView> LayoutAlgorithm<G> for KamadaKawai<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&VertexPositions<G::Vertex>> {
        self.state.positions.clear();
        cancel.check()?;
        let params = self.options.resolve()?;

        self.state.run(
            NAME,
            &self.options.initial,
            params.area(),
            cancel,
            |graph, pos, _rng, cancel| {
                let springs = Springs::build(&graph.neighbors, &params, cancel)?;

                let mut iterations = 0;
                let mut exchanges = 0;
                for iteration in 0..params.max_iterations {
                    cancel.check()?;
                    iterations = iteration + 1;
                    let (m, max_gradient) = steepest(&springs, pos, cancel)?;
                    tracing::trace!(iteration, vertex = m, max_gradient, "kk iteration");

                    if max_gradient >= EPSILON {
                        relocate(&springs, pos, m, cancel)?;
                        continue;
                    }
                    if params.exchange_vertices && try_exchange(&springs, pos, cancel)? {
                        exchanges += 1;
                        continue;
                    }
                    break;
                }

                if params.adjust_for_gravity {
                    move_barycenter_to(pos, params.area().center());
                }

                tracing::debug!(
                    iterations,
                    exchanges,
                    energy = springs.total_energy(pos),
                    "kamada-kawai finished"
                );
                Ok(())
            },
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
