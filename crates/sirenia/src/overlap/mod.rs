//! Rectangle overlap removal: reposition rectangles so no two intersect, keeping every size.
//!
//! Rectangles are given by their top-left corner. Output maps carry the input keys in input
//! order; inputs with fewer than two rectangles come back unchanged.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::geometry::{Rect, rect};
use indexmap::IndexMap;
use std::hash::Hash;

pub mod fsa;
pub mod one_way;

pub use fsa::{Fsa, FsaOptions};
pub use one_way::{OneWayFsa, OneWayFsaOptions};

pub trait OverlapRemoval<K> {
    fn compute(
        &mut self,
        rectangles: &IndexMap<K, Rect>,
        cancel: &CancelToken,
    ) -> Result<IndexMap<K, Rect>>;
}

/// Axis along which rectangles are moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Way {
    #[default]
    Horizontal,
    Vertical,
}

impl Way {
    pub(crate) fn start(self, r: &Rect) -> f64 {
        match self {
            Way::Horizontal => r.min_x(),
            Way::Vertical => r.min_y(),
        }
    }

    pub(crate) fn end(self, r: &Rect) -> f64 {
        match self {
            Way::Horizontal => r.max_x(),
            Way::Vertical => r.max_y(),
        }
    }

    pub(crate) fn center(self, r: &Rect) -> f64 {
        match self {
            Way::Horizontal => r.center().x,
            Way::Vertical => r.center().y,
        }
    }

    /// `r` moved along this axis so that it starts at `start`.
    pub(crate) fn moved_to(self, r: &Rect, start: f64) -> Rect {
        match self {
            Way::Horizontal => rect(start, r.min_y(), r.width(), r.height()),
            Way::Vertical => rect(r.min_x(), start, r.width(), r.height()),
        }
    }

    /// Strict overlap of the two rectangles on the other axis.
    fn crosses(self, a: &Rect, b: &Rect) -> bool {
        match self {
            Way::Horizontal => a.min_y() < b.max_y() && b.min_y() < a.max_y(),
            Way::Vertical => a.min_x() < b.max_x() && b.min_x() < a.max_x(),
        }
    }
}

/// Indices ordered by centre along `way`, ties in input order.
pub(crate) fn centre_order(rects: &[Rect], way: Way) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rects.len()).collect();
    order.sort_by(|&a, &b| way.center(&rects[a]).total_cmp(&way.center(&rects[b])));
    order
}

/// Single pass along `way`: every rectangle that shares a band of the other axis with an
/// earlier one (in centre order) is pushed to start at least `gap` after that one ends.
/// Afterwards no two rectangles intersect.
pub(crate) fn sweep(
    rects: &mut [Rect],
    way: Way,
    gap: f64,
    cancel: &CancelToken,
) -> Result<usize> {
    let order = centre_order(rects, way);
    let mut moved = 0;
    for (n, &i) in order.iter().enumerate() {
        if n % 256 == 255 {
            cancel.check()?;
        }
        let mut start = way.start(&rects[i]);
        for &p in &order[..n] {
            if way.crosses(&rects[p], &rects[i]) {
                start = start.max(way.end(&rects[p]) + gap);
            }
        }
        if start != way.start(&rects[i]) {
            rects[i] = way.moved_to(&rects[i], start);
            moved += 1;
        }
    }
    Ok(moved)
}

/// Shared run shape: cancellation, degenerate inputs and the finite-output check.
pub(crate) fn run<K, F>(
    algorithm: &'static str,
    rectangles: &IndexMap<K, Rect>,
    cancel: &CancelToken,
    solve: F,
) -> Result<IndexMap<K, Rect>>
where
    K: Clone + Eq + Hash,
    F: FnOnce(&mut Vec<Rect>, &CancelToken) -> Result<()>,
{
    cancel.check()?;
    if rectangles.len() < 2 {
        return Ok(rectangles.clone());
    }
    let _span = tracing::debug_span!("remove_overlaps", algorithm, rects = rectangles.len())
        .entered();

    let mut rects: Vec<Rect> = rectangles.values().copied().collect();
    solve(&mut rects, cancel)?;
    if rects.iter().any(|r| !r.origin.is_finite()) {
        tracing::warn!(algorithm, "overlap removal produced a non-finite coordinate");
        return Err(Error::NonFinite { algorithm });
    }
    Ok(rectangles.keys().cloned().zip(rects).collect())
}
