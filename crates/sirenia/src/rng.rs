//! Run-owned pseudo-random generator.
//!
//! Every randomized step (initial placement, ISOM target sampling) draws from an
//! [`XorShift64Star`] seeded by the run's options, never from process-global state, so identical
//! seeds reproduce identical layouts.

use crate::geometry::{Point, Rect};

/// One splitmix64 step: a bijection on `u64`, so distinct seeds start from distinct states.
fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct XorShift64Star {
    state: u64,
}

impl XorShift64Star {
    pub fn new(seed: u64) -> Self {
        // xorshift is stuck at zero; exactly one seed mixes to it.
        let state = match splitmix64(seed) {
            0 => 0x9E3779B97F4A7C15,
            s => s,
        };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D_u64)
    }

    /// Uniform in `[0, 1)` with 53 bits of precision.
    pub fn next_f64_unit(&mut self) -> f64 {
        let u = self.next_u64() >> 11;
        (u as f64) / ((1u64 << 53) as f64)
    }

    /// Uniform in `[lo, hi)`.
    pub fn next_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64_unit()
    }

    pub fn next_usize(&mut self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        // `floor(unit * upper)` rather than `% upper`, which is biased for small uppers.
        let v = self.next_f64_unit();
        let idx = (v * (upper as f64)).floor() as usize;
        idx.min(upper - 1)
    }

    pub fn next_point_in(&mut self, rect: &Rect) -> Point {
        let x = self.next_range(rect.min_x(), rect.max_x());
        let y = self.next_range(rect.min_y(), rect.max_y());
        Point::new(x, y)
    }
}
