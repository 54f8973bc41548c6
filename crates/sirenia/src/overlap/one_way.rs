//! Single-axis force-scan: rectangles only move along one axis.
//!
//! A sweep in centre order pushes each rectangle past every earlier one it shares a band with,
//! then the whole set is shifted back so its mean centre on that axis is where it started. The
//! other coordinate is copied through untouched.

use super::{OverlapRemoval, Way, run, sweep};
use crate::cancel::CancelToken;
use crate::error::{Result, require_non_negative};
use crate::geometry::Rect;
use indexmap::IndexMap;
use std::hash::Hash;

const NAME: &str = "one-way-fsa";

#[derive(Debug, Clone, Default)]
pub struct OneWayFsaOptions {
    pub way: Way,
    /// Minimum distance between rectangles along `way`.
    pub gap: f64,
}

fn mean_center(rects: &[Rect], way: Way) -> f64 {
    rects.iter().map(|r| way.center(r)).sum::<f64>() / rects.len() as f64
}

fn remove_overlaps(rects: &mut [Rect], way: Way, gap: f64, cancel: &CancelToken) -> Result<()> {
    let before = mean_center(rects, way);
    let moved = sweep(rects, way, gap, cancel)?;
    if moved == 0 {
        tracing::debug!(?way, "no overlaps to remove");
        return Ok(());
    }

    let shift = before - mean_center(rects, way);
    for r in rects.iter_mut() {
        *r = way.moved_to(r, way.start(r) + shift);
    }
    // Shifting can round a touching pair into a sliver of overlap; a second sweep only ever
    // moves by that rounding error.
    sweep(rects, way, gap, cancel)?;
    tracing::debug!(?way, moved, shift, "one-way overlap removal finished");
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct OneWayFsa {
    options: OneWayFsaOptions,
}

impl OneWayFsa {
    pub fn new(options: OneWayFsaOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OneWayFsaOptions {
        &self.options
    }
}

impl<K: Clone + Eq + Hash> OverlapRemoval<K> for OneWayFsa {
    fn compute(
        &mut self,
        rectangles: &IndexMap<K, Rect>,
        cancel: &CancelToken,
    ) -> Result<IndexMap<K, Rect>> {
        cancel.check()?;
        let way = self.options.way;
        let gap = require_non_negative(NAME, "gap", self.options.gap)?;
        run(NAME, rectangles, cancel, |rects, cancel| {
            remove_overlaps(rects, way, gap, cancel)
        })
    }
}
