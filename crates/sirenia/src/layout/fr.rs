//! Fruchterman-Reingold spring embedder.

use super::{InitialLayout, LayoutAlgorithm, LayoutState, VertexPositions};
use crate::cancel::CancelToken;
use crate::error::{Error, Result, require_nonzero, require_positive};
use crate::geometry::{Rect, Vector, clamp_point, finite_or_zero, rect};
use crate::graph::GraphView;

const NAME: &str = "fruchterman-reingold";

/// Poll the cancel token every this many rows of the O(V²) repulsion loop.
const CANCEL_STRIDE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrBounds {
    /// Positions are clamped into `[0, width] × [0, height]`; the ideal edge length and initial
    /// temperature derive from the area and vertex count.
    Bounded { width: f64, height: f64 },
    /// No clamping; the ideal edge length is given explicitly.
    Unbounded { ideal_edge_length: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cooling {
    /// `t = t0 · (1 − i / max_iterations)`.
    Linear,
    /// `t ← t · λ` after every iteration.
    #[default]
    Exponential,
}

#[derive(Debug, Clone)]
pub struct FrOptions {
    pub bounds: FrBounds,
    pub attraction_multiplier: f64,
    pub repulsive_multiplier: f64,
    pub max_iterations: usize,
    pub cooling: Cooling,
    /// Exponential cooling rate, in `(0, 1]`.
    pub lambda: f64,
    pub initial: InitialLayout,
}

impl Default for FrOptions {
    fn default() -> Self {
        Self {
            bounds: FrBounds::Bounded {
                width: 1000.0,
                height: 1000.0,
            },
            attraction_multiplier: 1.2,
            repulsive_multiplier: 0.6,
            max_iterations: 200,
            cooling: Cooling::Exponential,
            lambda: 0.95,
            initial: InitialLayout::default(),
        }
    }
}

impl FrOptions {
    pub fn bounded(width: f64, height: f64) -> Self {
        Self {
            bounds: FrBounds::Bounded { width, height },
            ..Default::default()
        }
    }

    pub fn unbounded(ideal_edge_length: f64) -> Self {
        Self {
            bounds: FrBounds::Unbounded { ideal_edge_length },
            ..Default::default()
        }
    }

    fn resolve(&self, vertex_count: usize) -> Result<ResolvedFr> {
        let n = vertex_count.max(1) as f64;
        let attraction =
            require_positive(NAME, "attraction_multiplier", self.attraction_multiplier)?;
        let repulsion =
            require_positive(NAME, "repulsive_multiplier", self.repulsive_multiplier)?;
        let max_iterations = require_nonzero(NAME, "max_iterations", self.max_iterations)?;
        if !(self.lambda.is_finite() && self.lambda > 0.0 && self.lambda <= 1.0) {
            return Err(Error::invalid(
                NAME,
                "lambda",
                format!("expected a value in (0, 1], got {}", self.lambda),
            ));
        }

        let (k, initial_temperature, clamp, default_bounds) = match self.bounds {
            FrBounds::Bounded { width, height } => {
                let width = require_positive(NAME, "width", width)?;
                let height = require_positive(NAME, "height", height)?;
                let k = (width * height / n).sqrt();
                let t0 = width.min(height) / 10.0;
                let area = rect(0.0, 0.0, width, height);
                (k, t0, Some(area), area)
            }
            FrBounds::Unbounded { ideal_edge_length } => {
                let k = require_positive(NAME, "ideal_edge_length", ideal_edge_length)?;
                let t0 = (k * k * n).sqrt();
                let side = k * n.sqrt();
                let area = rect(-side / 2.0, -side / 2.0, side, side);
                (k, t0, None, area)
            }
        };

        Ok(ResolvedFr {
            repulsion_constant: (k * repulsion).powi(2),
            attraction_constant: k * attraction,
            initial_temperature,
            max_iterations,
            cooling: self.cooling,
            lambda: self.lambda,
            clamp,
            default_bounds,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedFr {
    repulsion_constant: f64,
    attraction_constant: f64,
    initial_temperature: f64,
    max_iterations: usize,
    cooling: Cooling,
    lambda: f64,
    clamp: Option<Rect>,
    default_bounds: Rect,
}

impl ResolvedFr {
    fn temperature_after(&self, iteration: usize, current: f64) -> f64 {
        match self.cooling {
            Cooling::Linear => {
                let done = (iteration + 1) as f64 / self.max_iterations as f64;
                self.initial_temperature * (1.0 - done).max(0.0)
            }
            Cooling::Exponential => current * self.lambda,
        }
    }
}

/// `delta / |delta| · c / |delta|`; degenerate deltas contribute nothing.
fn repulsion(delta: Vector, constant: f64) -> Vector {
    let len_sq = delta.square_length();
    if len_sq == 0.0 {
        return Vector::zero();
    }
    finite_or_zero(delta * (constant / len_sq))
}

/// `delta / |delta| · |delta|² / c`.
fn attraction(delta: Vector, constant: f64) -> Vector {
    let len = delta.length();
    if len == 0.0 {
        return Vector::zero();
    }
    finite_or_zero(delta * (len / constant))
}

pub struct FruchtermanReingold<G: GraphView> {
    state: LayoutState<G>,
    options: FrOptions,
}

impl<G: GraphView> FruchtermanReingold<G> {
    pub fn new(graph: G, options: FrOptions) -> Self {
        Self {
            state: LayoutState::new(graph),
            options,
        }
    }

    pub fn with_initial_positions(mut self, positions: VertexPositions<G::Vertex>) -> Self {
        self.state.initial = Some(positions);
        self
    }

    pub fn options(&self) -> &FrOptions {
        &self.options
    }
}

impl<G: GraphView> LayoutAlgorithm<G> for FruchtermanReingold<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&VertexPositions<G::Vertex>> {
        self.state.positions.clear();
        cancel.check()?;
        let params = self.options.resolve(self.state.graph.vertex_count())?;

        self.state.run(
            NAME,
            &self.options.initial,
            params.default_bounds,
            cancel,
            |graph, pos, _rng, cancel| {
                let n = pos.len();
                let mut disp: Vec<Vector> = vec![Vector::zero(); n];
                let mut temperature = params.initial_temperature;

                for iteration in 0..params.max_iterations {
                    cancel.check()?;
                    disp.fill(Vector::zero());

                    for i in 0..n {
                        if i % CANCEL_STRIDE == CANCEL_STRIDE - 1 {
                            cancel.check()?;
                        }
                        for j in (i + 1)..n {
                            let f = repulsion(pos[i] - pos[j], params.repulsion_constant);
                            disp[i] += f;
                            disp[j] -= f;
                        }
                    }

                    for e in graph.edges.iter().filter(|e| !e.is_loop()) {
                        let delta = pos[e.source] - pos[e.target];
                        let f = attraction(delta, params.attraction_constant);
                        disp[e.source] -= f;
                        disp[e.target] += f;
                    }

                    for (p, d) in pos.iter_mut().zip(&disp) {
                        let len = d.length();
                        if !(len > 0.0 && len.is_finite()) {
                            continue;
                        }
                        *p += *d * (len.min(temperature) / len);
                        if let Some(area) = &params.clamp {
                            *p = clamp_point(area, *p);
                        }
                    }

                    temperature = params.temperature_after(iteration, temperature);
                    tracing::trace!(iteration, temperature, "fr iteration");
                }

                tracing::debug!(
                    iterations = params.max_iterations,
                    final_temperature = temperature,
                    "fruchterman-reingold finished"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_constants_derive_from_area() {
        let p = FrOptions::bounded(400.0, 100.0).resolve(4).expect("resolve");
        // k = sqrt(400 * 100 / 4) = 100
        assert!((p.attraction_constant - 120.0).abs() < 1e-12);
        assert!((p.repulsion_constant - 3600.0).abs() < 1e-9);
        assert!((p.initial_temperature - 10.0).abs() < 1e-12);
        assert_eq!(p.clamp, Some(rect(0.0, 0.0, 400.0, 100.0)));
    }

    #[test]
    fn unbounded_constants_derive_from_ideal_length() {
        let p = FrOptions::unbounded(10.0).resolve(9).expect("resolve");
        assert!((p.attraction_constant - 12.0).abs() < 1e-12);
        assert!((p.initial_temperature - 30.0).abs() < 1e-12);
        assert!(p.clamp.is_none());
    }

    #[test]
    fn invalid_options_are_rejected_up_front() {
        let bad_area = FrOptions::bounded(0.0, 100.0);
        assert!(matches!(
            bad_area.resolve(3),
            Err(Error::InvalidOption { option: "width", .. })
        ));

        let bad_lambda = FrOptions {
            lambda: 1.5,
            ..Default::default()
        };
        assert!(bad_lambda.resolve(3).is_err());

        let no_iterations = FrOptions {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(no_iterations.resolve(3).is_err());
    }

    #[test]
    fn linear_cooling_reaches_zero_on_the_last_iteration() {
        let p = FrOptions {
            cooling: Cooling::Linear,
            max_iterations: 4,
            ..FrOptions::bounded(100.0, 100.0)
        }
        .resolve(2)
        .expect("resolve");
        let t = p.temperature_after(3, p.initial_temperature);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn coincident_points_produce_no_force() {
        assert_eq!(repulsion(Vector::zero(), 10.0), Vector::zero());
        assert_eq!(attraction(Vector::zero(), 10.0), Vector::zero());
        let r = repulsion(Vector::new(2.0, 0.0), 8.0);
        assert!((r.x - 4.0).abs() < 1e-12);
    }
}
