//! Double-precision 2D value types, aliased from `euclid`.
//!
//! A `Rect` is anchored at its minimum corner (`origin`), which is the rectangle model the
//! overlap-removal family works in. Layout positions are vertex centres.

pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Vector = euclid::Vector2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
pub type Rect = euclid::Rect<f64, Unit>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn vector(x: f64, y: f64) -> Vector {
    euclid::vec2(x, y)
}

pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Rect {
    euclid::rect(x, y, width, height)
}

/// Rectangle of `size` centred on `center`.
pub fn rect_from_center(center: Point, size: Size) -> Rect {
    Rect::new(center - size.to_vector() / 2.0, size)
}

/// Smallest rectangle containing every point, or `None` for an empty or non-finite input.
///
/// Unlike `Rect::union`, degenerate (zero-area) extents are kept.
pub fn bounding(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
    let mut min = point(f64::INFINITY, f64::INFINITY);
    let mut max = point(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min = min.min(p);
        max = max.max(p);
    }
    if !(min.is_finite() && max.is_finite()) {
        return None;
    }
    Some(Rect::new(min, (max - min).to_size()))
}

/// Bounding box of a set of rectangles, zero-size ones included.
pub fn bounding_rects<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
    bounding(rects.into_iter().flat_map(|r| [r.min(), r.max()]))
}

/// Containment including the right and bottom edges.
pub fn contains_inclusive(r: &Rect, p: Point) -> bool {
    r.to_box2d().contains_inclusive(p)
}

pub fn clamp_point(r: &Rect, p: Point) -> Point {
    p.clamp(r.min(), r.max())
}

/// Corners in clockwise order starting at the origin.
pub fn corners(r: &Rect) -> [Point; 4] {
    [
        r.origin,
        point(r.max_x(), r.min_y()),
        r.max(),
        point(r.min_x(), r.max_y()),
    ]
}

/// Collapses non-finite vectors to zero so they never propagate into positions.
pub fn finite_or_zero(v: Vector) -> Vector {
    if v.is_finite() { v } else { Vector::zero() }
}

/// Parameter range `(t_enter, t_exit)` of the part of segment `a → b` strictly inside `r`
/// (Liang-Barsky clipping), or `None` when the segment misses the interior.
pub fn clip_segment(r: &Rect, a: Point, b: Point) -> Option<(f64, f64)> {
    let d = b - a;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-d.x, a.x - r.min_x()),
        (d.x, r.max_x() - a.x),
        (-d.y, a.y - r.min_y()),
        (d.y, r.max_y() - a.y),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q <= 0.0 {
                return None;
            }
            continue;
        }
        let ratio = q / p;
        if p < 0.0 {
            t0 = t0.max(ratio);
        } else {
            t1 = t1.min(ratio);
        }
        if t0 >= t1 {
            return None;
        }
    }
    Some((t0, t1))
}
