//! Closest approach between 3-D segments.

use super::core::{Point3, Tolerance};

/// Closest points between segments `p1-q1` and `p2-q2`.
///
/// Returns `(s, t, c1, c2)` where `c1 = p1 + s (q1 - p1)` and
/// `c2 = p2 + t (q2 - p2)`. Degenerate (point-like) segments are handled.
#[must_use]
pub fn closest_points_segment_segment(
    p1: Point3,
    q1: Point3,
    p2: Point3,
    q2: Point3,
) -> (f64, f64, Point3, Point3) {
    let eps = Tolerance::ZERO_LENGTH.eps;
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    let (s, t) = if a <= eps && e <= eps {
        (0.0, 0.0)
    } else if a <= eps {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= eps {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > eps {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (s, t, p1 + d1 * s, p2 + d2 * t)
}

/// Minimum distance between two segments.
#[must_use]
pub fn segment_segment_distance(p1: Point3, q1: Point3, p2: Point3, q2: Point3) -> f64 {
    let (_, _, c1, c2) = closest_points_segment_segment(p1, q1, p2, q2);
    c1.distance_to(c2)
}
