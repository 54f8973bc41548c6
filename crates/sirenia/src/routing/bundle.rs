//! Force-directed edge bundling.
//!
//! Every edge is subdivided into evenly spaced control points. Springs keep each edge smooth
//! while corresponding control points of compatible edges attract each other, pulling
//! similar edges into shared bundles.

use super::{EdgeRouter, EdgeRoutes, RouterState, RoutingInput, Scene};
use crate::cancel::CancelToken;
use crate::error::{Error, Result, require_nonzero, require_positive};
use crate::geometry::{Point, Rect, Size, Vector, clamp_point, finite_or_zero};
use crate::graph::GraphView;

const NAME: &str = "bundle-router";

const INITIAL_STEP: f64 = 0.1;
const CANCEL_STRIDE: usize = 64;

#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Interior control points per edge.
    pub subdivision_points: usize,
    pub iterations: usize,
    pub spring_constant: f64,
    /// Minimum compatibility (in `[0, 1]`) for two edges to interact.
    pub threshold: f64,
    /// Push oppositely directed compatible edges apart instead of bundling them.
    pub repulse_opposite: bool,
    pub repulsion_coefficient: f64,
    /// Final blend of every control point toward the straight line, in `[0, 1]`.
    pub straightening: f64,
    /// Clamp area for control points; defaults to the bounding box of the vertices.
    pub bounds: Option<Rect>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            subdivision_points: 15,
            iterations: 200,
            spring_constant: 10.0,
            threshold: 0.2,
            repulse_opposite: false,
            repulsion_coefficient: -0.1,
            straightening: 0.15,
            bounds: None,
        }
    }
}

fn require_unit(option: &'static str, v: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(Error::invalid(
            NAME,
            option,
            format!("expected a value in [0, 1], got {v}"),
        ))
    }
}

impl BundleOptions {
    fn resolve(&self) -> Result<ResolvedBundle> {
        if !self.repulsion_coefficient.is_finite() {
            return Err(Error::invalid(
                NAME,
                "repulsion_coefficient",
                format!("expected a finite value, got {}", self.repulsion_coefficient),
            ));
        }
        if let Some(b) = self.bounds {
            let ok = b.is_finite() && b.width() >= 0.0 && b.height() >= 0.0;
            if !ok {
                return Err(Error::invalid(
                    NAME,
                    "bounds",
                    format!("expected a finite, non-negative rectangle, got {b:?}"),
                ));
            }
        }
        Ok(ResolvedBundle {
            subdivision_points: require_nonzero(
                NAME,
                "subdivision_points",
                self.subdivision_points,
            )?,
            iterations: require_nonzero(NAME, "iterations", self.iterations)?,
            spring_constant: require_positive(NAME, "spring_constant", self.spring_constant)?,
            threshold: require_unit("threshold", self.threshold)?,
            repulse_opposite: self.repulse_opposite,
            repulsion_coefficient: self.repulsion_coefficient,
            straightening: require_unit("straightening", self.straightening)?,
            bounds: self.bounds,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedBundle {
    subdivision_points: usize,
    iterations: usize,
    spring_constant: f64,
    threshold: f64,
    repulse_opposite: bool,
    repulsion_coefficient: f64,
    straightening: f64,
    bounds: Option<Rect>,
}

/// One bundled edge: endpoints plus its current interior control points.
#[derive(Debug, Clone)]
struct Strand {
    edge: usize,
    source: usize,
    target: usize,
    a: Point,
    b: Point,
    points: Vec<Point>,
}

impl Strand {
    fn new(edge: usize, source: usize, target: usize, a: Point, b: Point, count: usize) -> Self {
        let points = (1..=count)
            .map(|k| a.lerp(b, k as f64 / (count + 1) as f64))
            .collect();
        Self {
            edge,
            source,
            target,
            a,
            b,
            points,
        }
    }

    fn vector(&self) -> Vector {
        self.b - self.a
    }

    fn midpoint(&self) -> Point {
        self.a.lerp(self.b, 0.5)
    }

    fn shares_endpoint(&self, other: &Strand) -> bool {
        self.source == other.source
            || self.source == other.target
            || self.target == other.source
            || self.target == other.target
    }
}

/// Angle, scale and position compatibility in `[0, 1]`.
fn compatibility(p: &Strand, q: &Strand) -> f64 {
    let (vp, vq) = (p.vector(), q.vector());
    let (lp, lq) = (vp.length(), vq.length());
    let angle = (vp.dot(vq) / (lp * lq)).abs();
    let avg = (lp + lq) / 2.0;
    let scale = 2.0 / (avg / lp.min(lq) + lp.max(lq) / avg);
    let position = avg / (avg + p.midpoint().distance_to(q.midpoint()));
    let c = angle * scale * position;
    if c.is_finite() { c } else { 0.0 }
}

/// For each strand, the compatible partners and whether each runs the opposite way.
fn partners(strands: &[Strand], threshold: f64) -> Vec<Vec<(usize, bool)>> {
    let mut out: Vec<Vec<(usize, bool)>> = vec![Vec::new(); strands.len()];
    for i in 0..strands.len() {
        for j in (i + 1)..strands.len() {
            let (p, q) = (&strands[i], &strands[j]);
            if p.shares_endpoint(q) || compatibility(p, q) >= threshold {
                let opposite = p.vector().dot(q.vector()) < 0.0;
                out[i].push((j, opposite));
                out[j].push((i, opposite));
            }
        }
    }
    out
}

fn bundle(
    strands: &mut [Strand],
    clamp: Rect,
    params: &ResolvedBundle,
    cancel: &CancelToken,
) -> Result<()> {
    let links = partners(strands, params.threshold);
    let count = params.subdivision_points;
    let mut forces: Vec<Vec<Vector>> = vec![vec![Vector::zero(); count]; strands.len()];

    for iteration in 0..params.iterations {
        cancel.check()?;
        let step = INITIAL_STEP * (1.0 - iteration as f64 / params.iterations as f64);

        for (i, strand) in strands.iter().enumerate() {
            if i % CANCEL_STRIDE == CANCEL_STRIDE - 1 {
                cancel.check()?;
            }
            let stiffness =
                params.spring_constant / (strand.vector().length() * (count + 1) as f64);
            for k in 0..count {
                let here = strand.points[k];
                let prev = if k == 0 { strand.a } else { strand.points[k - 1] };
                let next = if k + 1 == count { strand.b } else { strand.points[k + 1] };
                let mut f = ((prev - here) + (next - here)) * stiffness;

                for &(j, opposite) in &links[i] {
                    let other = &strands[j];
                    let there = if opposite {
                        other.points[count - 1 - k]
                    } else {
                        other.points[k]
                    };
                    let Some(dir) = (there - here).try_normalize() else {
                        continue;
                    };
                    f += if opposite && params.repulse_opposite {
                        dir * params.repulsion_coefficient
                    } else {
                        dir
                    };
                }
                forces[i][k] = finite_or_zero(f);
            }
        }

        for (strand, f) in strands.iter_mut().zip(&forces) {
            for (p, d) in strand.points.iter_mut().zip(f) {
                *p = clamp_point(&clamp, *p + *d * step);
            }
        }
        tracing::trace!(iteration, step, "bundle iteration");
    }

    for strand in strands.iter_mut() {
        let (a, b) = (strand.a, strand.b);
        for (k, p) in strand.points.iter_mut().enumerate() {
            let straight = a.lerp(b, (k + 1) as f64 / (count + 1) as f64);
            *p = p.lerp(straight, params.straightening);
        }
    }
    Ok(())
}

fn route_all<V, E>(
    scene: &Scene<V, E>,
    params: &ResolvedBundle,
    cancel: &CancelToken,
) -> Result<Vec<Vec<Point>>>
where
    V: Clone + Eq + std::hash::Hash,
    E: Clone + Eq + std::hash::Hash,
{
    let mut strands: Vec<Strand> = Vec::new();
    for (i, e) in scene.graph.edges.iter().enumerate() {
        let (a, b) = scene.endpoints(i);
        if e.is_loop() || a == b {
            continue;
        }
        strands.push(Strand::new(
            i,
            e.source,
            e.target,
            a,
            b,
            params.subdivision_points,
        ));
    }

    let clamp = params
        .bounds
        .or_else(|| scene.extent())
        .unwrap_or_default();
    bundle(&mut strands, clamp, params, cancel)?;
    tracing::debug!(strands = strands.len(), "bundling finished");

    let mut routes = vec![Vec::new(); scene.graph.edges.len()];
    for strand in strands {
        routes[strand.edge] = strand.points;
    }
    Ok(routes)
}

pub struct BundleRouter<G: GraphView> {
    state: RouterState<G>,
    options: BundleOptions,
}

impl<G: GraphView> BundleRouter<G> {
    pub fn new(graph: G, input: RoutingInput<G::Vertex>, options: BundleOptions) -> Self {
        Self {
            state: RouterState::new(graph, input),
            options,
        }
    }

    pub fn input(&self) -> &RoutingInput<G::Vertex> {
        &self.state.input
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }
}

impl<G: GraphView> EdgeRouter<G> for BundleRouter<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&EdgeRoutes<G::Edge>> {
        self.state.routes.clear();
        cancel.check()?;
        let params = self.options.resolve()?;
        self.state
            .run(NAME, cancel, |scene, cancel| route_all(scene, &params, cancel))?;
        Ok(&self.state.routes)
    }

    /// Bundling is a joint simulation: the whole bundle is recomputed against the current input
    /// and only `edge`'s route is stored.
    fn compute_single(&mut self, edge: &G::Edge) -> Result<Vec<Point>> {
        let params = self.options.resolve()?;
        self.state.run_single(NAME, edge, |scene, index| {
            let mut routes = route_all(scene, &params, &CancelToken::none())?;
            Ok(std::mem::take(&mut routes[index]))
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
