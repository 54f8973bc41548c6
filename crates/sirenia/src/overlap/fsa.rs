//! Force-scan overlap removal.
//!
//! Each pass visits pairs in centre order and pushes every overlapping pair apart along the axis
//! that needs the smaller correction, half the shift on each rectangle. Passes repeat until one
//! finds nothing to fix. Should the iteration bound run out first, a horizontal [`sweep`] settles
//! what is left.

use super::{OverlapRemoval, Way, centre_order, run, sweep};
use crate::cancel::CancelToken;
use crate::error::{Result, require_non_negative, require_nonzero};
use crate::geometry::{Rect, Vector};
use indexmap::IndexMap;
use std::hash::Hash;

const NAME: &str = "fsa";

/// Extra clearance added to every push so resolved pairs end up strictly apart.
const SLACK: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct FsaOptions {
    pub horizontal_gap: f64,
    pub vertical_gap: f64,
    pub max_iterations: usize,
}

impl Default for FsaOptions {
    fn default() -> Self {
        Self {
            horizontal_gap: 0.0,
            vertical_gap: 0.0,
            max_iterations: 1000,
        }
    }
}

impl FsaOptions {
    fn resolve(&self) -> Result<ResolvedFsa> {
        Ok(ResolvedFsa {
            horizontal_gap: require_non_negative(NAME, "horizontal_gap", self.horizontal_gap)?,
            vertical_gap: require_non_negative(NAME, "vertical_gap", self.vertical_gap)?,
            max_iterations: require_nonzero(NAME, "max_iterations", self.max_iterations)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedFsa {
    horizontal_gap: f64,
    vertical_gap: f64,
    max_iterations: usize,
}

/// Correction needed on each axis to separate `a` and `b` with the configured gaps, or `None`
/// when they are already apart on at least one axis.
fn penetration(a: &Rect, b: &Rect, params: ResolvedFsa) -> Option<(f64, f64)> {
    let (ca, cb) = (a.center(), b.center());
    let px = (a.width() + b.width()) / 2.0 + params.horizontal_gap - (ca.x - cb.x).abs();
    let py = (a.height() + b.height()) / 2.0 + params.vertical_gap - (ca.y - cb.y).abs();
    (px > 0.0 && py > 0.0).then_some((px, py))
}

/// Separates `rects[i]` and `rects[j]`; on equal centres `j` is the one moved right or down.
fn push_apart(rects: &mut [Rect], i: usize, j: usize, (px, py): (f64, f64)) {
    let (ci, cj) = (rects[i].center(), rects[j].center());
    let shift = if px <= py {
        let dx = px / 2.0 + SLACK;
        Vector::new(if cj.x >= ci.x { dx } else { -dx }, 0.0)
    } else {
        let dy = py / 2.0 + SLACK;
        Vector::new(0.0, if cj.y >= ci.y { dy } else { -dy })
    };
    rects[i] = rects[i].translate(-shift);
    rects[j] = rects[j].translate(shift);
}

/// One scan over every pair; returns the number of pairs that had to be pushed apart.
fn scan(rects: &mut [Rect], params: ResolvedFsa, cancel: &CancelToken) -> Result<usize> {
    let order = centre_order(rects, Way::Horizontal);
    let mut pushed = 0;
    for (n, &i) in order.iter().enumerate() {
        if n % 64 == 63 {
            cancel.check()?;
        }
        for &j in &order[n + 1..] {
            if let Some(p) = penetration(&rects[i], &rects[j], params) {
                push_apart(rects, i, j, p);
                pushed += 1;
            }
        }
    }
    Ok(pushed)
}

fn any_overlap(rects: &[Rect], params: ResolvedFsa) -> bool {
    rects.iter().enumerate().any(|(i, a)| {
        rects[i + 1..]
            .iter()
            .any(|b| a.intersects(b) || penetration(a, b, params).is_some())
    })
}

fn remove_overlaps(rects: &mut [Rect], params: ResolvedFsa, cancel: &CancelToken) -> Result<()> {
    let mut passes = 0;
    while passes < params.max_iterations {
        cancel.check()?;
        passes += 1;
        let pushed = scan(rects, params, cancel)?;
        tracing::trace!(pass = passes, pushed, "fsa scan");
        if pushed == 0 {
            break;
        }
    }

    if any_overlap(rects, params) {
        let moved = sweep(rects, Way::Horizontal, params.horizontal_gap, cancel)?;
        tracing::debug!(passes, moved, "fsa fell back to a horizontal sweep");
    } else {
        tracing::debug!(passes, "fsa converged");
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Fsa {
    options: FsaOptions,
}

impl Fsa {
    pub fn new(options: FsaOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FsaOptions {
        &self.options
    }
}

impl<K: Clone + Eq + Hash> OverlapRemoval<K> for Fsa {
    fn compute(
        &mut self,
        rectangles: &IndexMap<K, Rect>,
        cancel: &CancelToken,
    ) -> Result<IndexMap<K, Rect>> {
        cancel.check()?;
        let params = self.options.resolve()?;
        run(NAME, rectangles, cancel, |rects, cancel| {
            remove_overlaps(rects, params, cancel)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Size, rect};

    fn params() -> ResolvedFsa {
        FsaOptions::default().resolve().expect("resolve")
    }

    #[test]
    fn penetration_includes_gaps() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(11.0, 0.0, 10.0, 10.0);
        assert_eq!(penetration(&a, &b, params()), None);

        let gapped = FsaOptions {
            horizontal_gap: 3.0,
            ..Default::default()
        }
        .resolve()
        .expect("resolve");
        assert_eq!(penetration(&a, &b, gapped), Some((2.0, 10.0)));
    }

    #[test]
    fn touching_rectangles_do_not_overlap() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(10.0, 0.0, 10.0, 10.0);
        assert_eq!(penetration(&a, &b, params()), None);
    }

    #[test]
    fn push_uses_the_cheaper_axis() {
        let mut rects = [
            rect(0.0, 0.0, 100.0, 50.0),
            rect(50.0, 25.0, 100.0, 50.0),
        ];
        let p = penetration(&rects[0], &rects[1], params()).expect("overlap");
        assert_eq!(p, (50.0, 25.0));
        push_apart(&mut rects, 0, 1, p);
        assert_eq!(rects[0].min_x(), 0.0);
        assert_eq!(rects[1].min_x(), 50.0);
        assert!(rects[0].min_y() < -12.5 && rects[1].min_y() > 37.5);
        assert!(!rects[0].intersects(&rects[1]));
    }

    #[test]
    fn exhausted_iterations_fall_back_to_a_sweep() {
        let limited = FsaOptions {
            max_iterations: 1,
            ..Default::default()
        }
        .resolve()
        .expect("resolve");
        let mut rects = vec![rect(0.0, 0.0, 10.0, 10.0); 6];
        remove_overlaps(&mut rects, limited, &CancelToken::none()).expect("fsa");
        for (i, a) in rects.iter().enumerate() {
            assert!(rects[i + 1..].iter().all(|b| !a.intersects(b)), "{rects:?}");
        }
        assert!(rects.iter().all(|r| r.size == Size::new(10.0, 10.0)));
    }
}
