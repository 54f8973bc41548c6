//! Inverted self-organising map (Meyer's ISOM).

use super::{InitialLayout, LayoutAlgorithm, LayoutState, VertexPositions};
use crate::cancel::CancelToken;
use crate::error::{Error, Result, require_non_negative, require_nonzero, require_positive};
use crate::geometry::{Point, Rect, rect};
use crate::graph::GraphView;
use crate::rng::XorShift64Star;
use std::collections::VecDeque;

const NAME: &str = "isom";

#[derive(Debug, Clone)]
pub struct IsomOptions {
    pub width: f64,
    pub height: f64,
    pub max_epochs: usize,
    /// Number of epochs between radius decrements.
    pub radius_constant_time: usize,
    pub initial_radius: usize,
    pub min_radius: usize,
    pub initial_adaptation: f64,
    pub min_adaptation: f64,
    pub cooling_factor: f64,
    pub initial: InitialLayout,
}

impl Default for IsomOptions {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 300.0,
            max_epochs: 2000,
            radius_constant_time: 100,
            initial_radius: 5,
            min_radius: 1,
            initial_adaptation: 0.9,
            min_adaptation: 0.0,
            cooling_factor: 2.0,
            initial: InitialLayout::default(),
        }
    }
}

impl IsomOptions {
    fn resolve(&self) -> Result<ResolvedIsom> {
        let width = require_positive(NAME, "width", self.width)?;
        let height = require_positive(NAME, "height", self.height)?;
        let initial_adaptation =
            require_positive(NAME, "initial_adaptation", self.initial_adaptation)?;
        let min_adaptation = require_non_negative(NAME, "min_adaptation", self.min_adaptation)?;
        if min_adaptation > initial_adaptation {
            return Err(Error::invalid(
                NAME,
                "min_adaptation",
                format!("must not exceed initial_adaptation ({initial_adaptation})"),
            ));
        }
        if self.min_radius > self.initial_radius {
            return Err(Error::invalid(
                NAME,
                "min_radius",
                format!("must not exceed initial_radius ({})", self.initial_radius),
            ));
        }
        Ok(ResolvedIsom {
            width,
            height,
            max_epochs: require_nonzero(NAME, "max_epochs", self.max_epochs)?,
            radius_constant_time: require_nonzero(
                NAME,
                "radius_constant_time",
                self.radius_constant_time,
            )?,
            initial_radius: self.initial_radius,
            min_radius: self.min_radius,
            initial_adaptation,
            min_adaptation,
            cooling_factor: require_non_negative(NAME, "cooling_factor", self.cooling_factor)?,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedIsom {
    width: f64,
    height: f64,
    max_epochs: usize,
    radius_constant_time: usize,
    initial_radius: usize,
    min_radius: usize,
    initial_adaptation: f64,
    min_adaptation: f64,
    cooling_factor: f64,
}

impl ResolvedIsom {
    fn area(&self) -> Rect {
        rect(0.0, 0.0, self.width, self.height)
    }

    /// Inner 80 % of the area; targets are never sampled near the border.
    fn target_area(&self) -> Rect {
        rect(
            0.1 * self.width,
            0.1 * self.height,
            0.8 * self.width,
            0.8 * self.height,
        )
    }

    fn adaptation_after(&self, epoch: usize) -> f64 {
        let t = epoch as f64 / self.max_epochs as f64;
        (self.initial_adaptation * (-self.cooling_factor * t).exp()).max(self.min_adaptation)
    }
}

/// Per-epoch BFS bookkeeping, reused across epochs.
struct Sweep {
    hops: Vec<Option<usize>>,
    queue: VecDeque<usize>,
    touched: Vec<usize>,
}

impl Sweep {
    fn new(n: usize) -> Self {
        Self {
            hops: vec![None; n],
            queue: VecDeque::new(),
            touched: Vec::new(),
        }
    }

    fn reset(&mut self) {
        for &v in &self.touched {
            self.hops[v] = None;
        }
        self.touched.clear();
        self.queue.clear();
    }

    /// Pulls `winner` toward `target` by `adaptation` and every vertex within `radius` hops by
    /// `adaptation / 2^hops`.
    fn adjust(
        &mut self,
        neighbors: &[Vec<usize>],
        pos: &mut [Point],
        winner: usize,
        target: Point,
        adaptation: f64,
        radius: usize,
    ) {
        self.reset();
        self.hops[winner] = Some(0);
        self.touched.push(winner);
        self.queue.push_back(winner);

        while let Some(v) = self.queue.pop_front() {
            let Some(h) = self.hops[v] else {
                continue;
            };
            let factor = adaptation / 2f64.powi(h as i32);
            pos[v] = pos[v] + (target - pos[v]) * factor;

            if h >= radius {
                continue;
            }
            for &w in &neighbors[v] {
                if self.hops[w].is_none() {
                    self.hops[w] = Some(h + 1);
                    self.touched.push(w);
                    self.queue.push_back(w);
                }
            }
        }
    }
}

/// Index of the vertex nearest to `target`; the first one wins on ties.
fn nearest(pos: &[Point], target: Point) -> usize {
    let mut best = (0, f64::INFINITY);
    for (i, p) in pos.iter().enumerate() {
        let d = (*p - target).square_length();
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

fn epochs(
    neighbors: &[Vec<usize>],
    pos: &mut [Point],
    params: &ResolvedIsom,
    rng: &mut XorShift64Star,
    cancel: &CancelToken,
) -> Result<()> {
    let target_area = params.target_area();
    let mut sweep = Sweep::new(pos.len());
    let mut adaptation = params.initial_adaptation;
    let mut radius = params.initial_radius;

    for epoch in 1..=params.max_epochs {
        cancel.check()?;
        let target = rng.next_point_in(&target_area);
        let winner = nearest(pos, target);
        sweep.adjust(neighbors, pos, winner, target, adaptation, radius);

        adaptation = params.adaptation_after(epoch);
        if epoch % params.radius_constant_time == 0 && radius > params.min_radius {
            radius -= 1;
        }
        tracing::trace!(epoch, adaptation, radius, "isom epoch");
    }

    tracing::debug!(
        epochs = params.max_epochs,
        final_adaptation = adaptation,
        final_radius = radius,
        "isom finished"
    );
    Ok(())
}

pub struct Isom<G: GraphView> {
    state: LayoutState<G>,
    options: IsomOptions,
}

impl<G: GraphView> Isom<G> {
    pub fn new(graph: G, options: IsomOptions) -> Self {
        Self {
            state: LayoutState::new(graph),
            options,
        }
    }

    pub fn with_initial_positions(mut self, positions: VertexPositions<G::Vertex>) -> Self {
        self.state.initial = Some(positions);
        self
    }

    pub fn options(&self) -> &IsomOptions {
        &self.options
    }
}

impl<G: GraphView> LayoutAlgorithm<G> for Isom<G> {
    fn compute(&mut self, cancel: &CancelToken) -> Result<&VertexPositions<G::Vertex>> {
        self.state.positions.clear();
        cancel.check()?;
        let params = self.options.resolve()?;

        self.state.run(
            NAME,
            &self.options.initial,
            params.area(),
            cancel,
            |graph, pos, rng, cancel| epochs(&graph.neighbors, pos, &params, rng, cancel),
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
    use crate::geometry::contains_inclusive;

    #[test]
    fn nearest_breaks_ties_by_enumeration_order() {
        let pos = [
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(1.0, 5.0),
        ];
        assert_eq!(nearest(&pos, Point::new(1.0, 0.0)), 0);
        assert_eq!(nearest(&pos, Point::new(1.9, 0.0)), 1);
    }

    #[test]
    fn adjustment_halves_with_every_hop() {
        // Path 0 - 1 - 2 - 3, radius 2: vertex 3 is out of reach.
        let neighbors = vec![vec![1], vec![0, 2], vec![1, 3], vec![2]];
        let mut pos = vec![Point::origin(); 4];
        let mut sweep = Sweep::new(4);
        sweep.adjust(&neighbors, &mut pos, 0, Point::new(8.0, 0.0), 0.5, 2);
        assert_eq!(
            pos,
            vec![
                Point::new(4.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(1.0, 0.0),
                Point::origin(),
            ]
        );

        // Bookkeeping is reset between epochs.
        sweep.adjust(&neighbors, &mut pos, 3, Point::new(0.0, 0.0), 1.0, 0);
        assert_eq!(pos[3], Point::origin());
        assert_eq!(pos[2], Point::new(1.0, 0.0));
    }

    #[test]
    fn adaptation_decays_toward_the_floor() {
        let p = IsomOptions {
            min_adaptation: 0.2,
            ..Default::default()
        }
        .resolve()
        .expect("resolve");
        assert!((p.adaptation_after(0) - 0.9).abs() < 1e-12);
        let mid = p.adaptation_after(1000);
        assert!((mid - 0.9 * (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(p.adaptation_after(2000), 0.2);
    }

    #[test]
    fn epochs_keep_vertices_inside_the_area() {
        let options = IsomOptions {
            max_epochs: 350,
            ..Default::default()
        };
        let params = options.resolve().expect("resolve");
        let neighbors = vec![vec![1], vec![0]];
        let mut pos = vec![Point::new(10.0, 10.0), Point::new(20.0, 20.0)];
        let mut rng = XorShift64Star::new(1);
        epochs(&neighbors, &mut pos, &params, &mut rng, &CancelToken::none()).expect("epochs");
        assert!(pos.iter().all(|p| p.is_finite()));
        assert!(pos.iter().all(|p| contains_inclusive(&params.area(), *p)));
    }

    #[test]
    fn inverted_radius_bounds_are_rejected() {
        let options = IsomOptions {
            initial_radius: 1,
            min_radius: 3,
            ..Default::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(Error::InvalidOption { option: "min_radius", .. })
        ));
    }
}
