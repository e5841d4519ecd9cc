//! Cubic Hermite and Bezier evaluation.
//!
//! Both families are evaluated directly from their basis polynomials; `t` is
//! expected in `[0, 1]` but is not clamped.

use super::core::{Point3, Vec3};

/// Hermite basis values `[h00, h01, h10, h11]` at `t`.
#[must_use]
pub fn hermite_basis(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        2.0 * t3 - 3.0 * t2 + 1.0,
        -2.0 * t3 + 3.0 * t2,
        t3 - 2.0 * t2 + t,
        t3 - t2,
    ]
}

/// Derivatives of the Hermite basis at `t`.
#[must_use]
pub fn hermite_basis_derivative(t: f64) -> [f64; 4] {
    let t2 = t * t;
    [
        6.0 * t2 - 6.0 * t,
        -6.0 * t2 + 6.0 * t,
        3.0 * t2 - 4.0 * t + 1.0,
        3.0 * t2 - 2.0 * t,
    ]
}

/// Point on the Hermite segment from `p0` (tangent `m0`) to `p1` (tangent `m1`).
#[must_use]
pub fn hermite(p0: Point3, m0: Vec3, p1: Point3, m1: Vec3, t: f64) -> Point3 {
    let [h00, h01, h10, h11] = hermite_basis(t);
    Point3::from(p0.to_vec3() * h00 + p1.to_vec3() * h01 + m0 * h10 + m1 * h11)
}

#[must_use]
pub fn hermite_tangent(p0: Point3, m0: Vec3, p1: Point3, m1: Vec3, t: f64) -> Vec3 {
    let [h00, h01, h10, h11] = hermite_basis_derivative(t);
    p0.to_vec3() * h00 + p1.to_vec3() * h01 + m0 * h10 + m1 * h11
}

/// Control polygon of a cubic Bezier curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    pub p0: Point3,
    pub p1: Point3,
    pub p2: Point3,
    pub p3: Point3,
}

impl CubicBezier {
    #[must_use]
    pub const fn new(p0: Point3, p1: Point3, p2: Point3, p3: Point3) -> Self {
        Self { p0, p1, p2, p3 }
    }

    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3 {
        let s = 1.0 - t;
        let v = self.p0.to_vec3() * (s * s * s)
            + self.p1.to_vec3() * (3.0 * t * s * s)
            + self.p2.to_vec3() * (3.0 * t * t * s)
            + self.p3.to_vec3() * (t * t * t);
        Point3::from(v)
    }

    /// First derivative with respect to `t`.
    #[must_use]
    pub fn tangent_at(&self, t: f64) -> Vec3 {
        let s = 1.0 - t;
        self.p0.to_vec3() * (-3.0 * s * s)
            + self.p1.to_vec3() * (3.0 * s * s - 6.0 * s * t)
            + self.p2.to_vec3() * (6.0 * s * t - 3.0 * t * t)
            + self.p3.to_vec3() * (3.0 * t * t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-9
    }

    #[test]
    fn test_hermite_basis_partition_of_unity() {
        for i in 0..=10 {
            let t = f64::from(i) / 10.0;
            let [h00, h01, _, _] = hermite_basis(t);
            assert!((h00 + h01 - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hermite_endpoints_and_tangents() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(4.0, 1.0, 0.0);
        let m0 = Vec3::new(1.0, 0.0, 0.0);
        let m1 = Vec3::new(0.0, 2.0, 0.0);

        assert_eq!(hermite(p0, m0, p1, m1, 0.0), p0);
        assert_eq!(hermite(p0, m0, p1, m1, 1.0), p1);
        assert!(close(hermite_tangent(p0, m0, p1, m1, 0.0), m0));
        assert!(close(hermite_tangent(p0, m0, p1, m1, 1.0), m1));
    }

    #[test]
    fn test_bezier_endpoints_and_end_tangents() {
        let curve = CubicBezier::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(3.0, 1.0, 0.0),
        );
        assert_eq!(curve.point_at(0.0), curve.p0);
        assert_eq!(curve.point_at(1.0), curve.p3);
        assert!(close(curve.tangent_at(0.0), (curve.p1 - curve.p0) * 3.0));
        assert!(close(curve.tangent_at(1.0), (curve.p3 - curve.p2) * 3.0));
    }

    #[test]
    fn test_bezier_tangent_matches_finite_difference() {
        let curve = CubicBezier::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 1.0),
            Point3::new(5.0, 3.0, -1.0),
            Point3::new(5.0, 0.0, 0.0),
        );
        let h = 1e-6;
        for t in [0.1, 0.35, 0.5, 0.9] {
            let fd = (curve.point_at(t + h) - curve.point_at(t - h)) / (2.0 * h);
            assert!((fd - curve.tangent_at(t)).length() < 1e-5);
        }
    }
}
