use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// Unit vector along the X axis.
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    /// Unit vector along the Y axis.
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    /// Unit vector along the Z axis. Also the world up direction.
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub const fn length_squared(self) -> f64 {
        self.dot(self)
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len.is_finite() && len > 0.0 {
            Some(Self::new(self.x / len, self.y / len, self.z / len))
        } else {
            None
        }
    }

    /// Normalized copy, or zero when the vector has no usable length.
    #[must_use]
    pub fn normalized_or_zero(self) -> Self {
        if self.length_squared() <= Tolerance::ZERO_LENGTH.eps_squared() {
            return Self::ZERO;
        }
        self.normalized().unwrap_or(Self::ZERO)
    }

    #[must_use]
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
    }

    /// Any unit vector perpendicular to `self`.
    #[must_use]
    pub fn any_perpendicular(self) -> Self {
        let helper = if self.x.abs() < 0.9 { Self::X } else { Self::Y };
        self.cross(helper).normalized_or_zero()
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(arr: [f64; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Self::Output {
        Vec3::new(self * rhs.x, self * rhs.y, self * rhs.z)
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Point3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Position vector from the origin.
    #[must_use]
    pub const fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    #[must_use]
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        (self - other).length()
    }

}

impl Default for Point3 {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(arr: [f64; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        p.to_array()
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl Add<Vec3> for Point3 {
    type Output = Self;
    fn add(self, rhs: Vec3) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub<Vec3> for Point3 {
    type Output = Self;
    fn sub(self, rhs: Vec3) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vec2
// ─────────────────────────────────────────────────────────────────────────────

/// 2-D vector, used for UVs and profile outlines.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[must_use]
    pub fn distance_squared_to(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[must_use]
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(self.x + (rhs.x - self.x) * t, self.y + (rhs.y - self.y) * t)
    }

    /// Component-wise absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y))
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transform
// ─────────────────────────────────────────────────────────────────────────────

/// Affine 4x4 transform in column-vector convention: `a.compose(b)` applies `b`
/// first, then `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    m: [[f64; 4]; 4],
}

impl Transform {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Construct a transform from origin and three orthonormal axes.
    /// The axes are expected to be unit vectors and mutually perpendicular.
    #[must_use]
    pub fn from_axes(origin: Point3, x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        Self {
            m: [
                [x_axis.x, y_axis.x, z_axis.x, origin.x],
                [x_axis.y, y_axis.y, z_axis.y, origin.y],
                [x_axis.z, y_axis.z, z_axis.z, origin.z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub const fn translate(offset: Vec3) -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, offset.x],
                [0.0, 1.0, 0.0, offset.y],
                [0.0, 0.0, 1.0, offset.z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub fn rotate_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, -s, 0.0],
                [0.0, s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub fn rotate_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [c, 0.0, s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [-s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    #[must_use]
    pub fn rotate_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            m: [
                [c, -s, 0.0, 0.0],
                [s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Placement from a position and Euler angles in degrees, applied X, then Y,
    /// then Z.
    #[must_use]
    pub fn from_position_euler_degrees(position: Point3, degrees: [f64; 3]) -> Self {
        let rotation = Self::rotate_z(degrees[2].to_radians())
            .compose(Self::rotate_y(degrees[1].to_radians()))
            .compose(Self::rotate_x(degrees[0].to_radians()));
        Self::translate(position.to_vec3()).compose(rotation)
    }

    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        let mut result = Self::identity();
        for i in 0..4 {
            for j in 0..4 {
                result.m[i][j] = self.m[i][0] * other.m[0][j]
                    + self.m[i][1] * other.m[1][j]
                    + self.m[i][2] * other.m[2][j]
                    + self.m[i][3] * other.m[3][j];
            }
        }
        result
    }

    #[must_use]
    pub fn origin(self) -> Point3 {
        Point3::new(self.m[0][3], self.m[1][3], self.m[2][3])
    }

    /// First column, the local forward direction.
    #[must_use]
    pub fn x_axis(self) -> Vec3 {
        Vec3::new(self.m[0][0], self.m[1][0], self.m[2][0])
    }

    /// Second column, the local right direction.
    #[must_use]
    pub fn y_axis(self) -> Vec3 {
        Vec3::new(self.m[0][1], self.m[1][1], self.m[2][1])
    }

    /// Third column, the local up direction.
    #[must_use]
    pub fn z_axis(self) -> Vec3 {
        Vec3::new(self.m[0][2], self.m[1][2], self.m[2][2])
    }

    #[must_use]
    pub fn apply_point(self, p: Point3) -> Point3 {
        let x = self.m[0][0] * p.x + self.m[0][1] * p.y + self.m[0][2] * p.z + self.m[0][3];
        let y = self.m[1][0] * p.x + self.m[1][1] * p.y + self.m[1][2] * p.z + self.m[1][3];
        let z = self.m[2][0] * p.x + self.m[2][1] * p.y + self.m[2][2] * p.z + self.m[2][3];
        Point3::new(x, y, z)
    }

}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Transform {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BBox
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Point3,
    pub max: Point3,
}

impl BBox {
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let mut iter = points.iter().copied();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), Self::expand_point))
    }

    #[must_use]
    pub fn center(self) -> Point3 {
        self.min.lerp(self.max, 0.5)
    }

    #[must_use]
    pub fn size(self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn diagonal(self) -> f64 {
        self.size().length()
    }

    /// Inclusive containment test.
    #[must_use]
    pub fn contains_point(self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    #[must_use]
    pub fn expand_point(self, p: Point3) -> Self {
        Self::new(
            Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        )
    }

    /// Grow by a scalar amount in all directions.
    #[must_use]
    pub fn expand_by(self, amount: f64) -> Self {
        let delta = Vec3::new(amount, amount, amount);
        Self::new(self.min - delta, self.max + delta)
    }

    /// Point at normalized coordinates inside the box (0 = min, 1 = max per axis).
    #[must_use]
    pub fn point_at(self, u: f64, v: f64, w: f64) -> Point3 {
        Point3::new(
            self.min.x + (self.max.x - self.min.x) * u,
            self.min.y + (self.max.y - self.min.y) * v,
            self.min.z + (self.max.z - self.min.z) * w,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tolerance
// ─────────────────────────────────────────────────────────────────────────────

/// Tolerance configuration for geometric operations.
///
/// Use the named constants to avoid epsilon scatter:
/// - `Tolerance::DEFAULT` - general comparisons (1e-9)
/// - `Tolerance::ZERO_LENGTH` - degenerate vectors (1e-12)
/// - `Tolerance::MESH_VERTEX` - polygon mesh vertex/UV identity (1e-3)
/// - `Tolerance::FRAME` - frame orthogonality and unit-length checks (1e-4)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    pub const DEFAULT: Self = Self { eps: 1e-9 };

    pub const ZERO_LENGTH: Self = Self { eps: 1e-12 };

    /// Vertices (and UVs) closer than this are the same mesh vertex.
    pub const MESH_VERTEX: Self = Self { eps: 1e-3 };

    pub const FRAME: Self = Self { eps: 1e-4 };

    #[must_use]
    pub const fn new(eps: f64) -> Self {
        Self { eps }
    }

    #[must_use]
    pub const fn eps_squared(self) -> f64 {
        self.eps * self.eps
    }

    #[must_use]
    pub fn approx_eq_point3(self, a: Point3, b: Point3) -> bool {
        (a - b).length_squared() <= self.eps_squared()
    }

    #[must_use]
    pub fn approx_eq_vec3(self, a: Vec3, b: Vec3) -> bool {
        (a - b).length_squared() <= self.eps_squared()
    }

    /// Strict variant used for vertex identity: distance must be below `eps`.
    #[must_use]
    pub fn within_point3(self, a: Point3, b: Point3) -> bool {
        (a - b).length_squared() < self.eps_squared()
    }

    #[must_use]
    pub fn within_vec2(self, a: Vec2, b: Vec2) -> bool {
        a.distance_squared_to(b) < self.eps_squared()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operators() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(2.0 * a, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
    }

    #[test]
    fn test_vec2_abs_and_max_are_component_wise() {
        let a = Vec2::new(-3.0, 1.0);
        let b = Vec2::new(2.0, -4.0);
        assert_eq!(a.abs(), Vec2::new(3.0, 1.0));
        assert_eq!(a.max(b), Vec2::new(2.0, 1.0));
        assert_eq!(a.abs().max(b.abs()), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_normalized_or_zero_handles_degenerate() {
        assert_eq!(Vec3::ZERO.normalized_or_zero(), Vec3::ZERO);
        let n = Vec3::new(0.0, 3.0, 4.0).normalized_or_zero();
        assert!((n.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_any_perpendicular_is_orthogonal() {
        for v in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(1.0, 1.0, 1.0)] {
            let p = v.any_perpendicular();
            assert!(p.dot(v).abs() < 1e-12);
            assert!((p.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transform_axes_round_trip() {
        let t = Transform::from_axes(Point3::new(1.0, 2.0, 3.0), Vec3::Y, -Vec3::X, Vec3::Z);
        assert_eq!(t.x_axis(), Vec3::Y);
        assert_eq!(t.y_axis(), -Vec3::X);
        assert_eq!(t.z_axis(), Vec3::Z);
        assert_eq!(t.origin(), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(t.apply_point(Point3::new(1.0, 0.0, 0.0)), Point3::new(1.0, 3.0, 3.0));
    }

    #[test]
    fn test_euler_placement_applies_z_last() {
        let t = Transform::from_position_euler_degrees(Point3::new(5.0, 0.0, 0.0), [0.0, 0.0, 180.0]);
        let p = t.apply_point(Point3::new(1.0, 0.0, 0.0));
        assert!(Tolerance::new(1e-12).approx_eq_point3(p, Point3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_bbox_point_at_and_expand() {
        let bbox = BBox::from_points(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)])
            .unwrap();
        assert_eq!(bbox.center(), Point3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.point_at(0.5, 0.5, 0.5), bbox.center());
        let grown = bbox.expand_by(1.0);
        assert!(grown.contains_point(Point3::new(-0.5, -0.5, -0.5)));
        assert!(!bbox.contains_point(Point3::new(-0.5, -0.5, -0.5)));
    }

    #[test]
    fn test_mesh_vertex_tolerance_is_strict() {
        let tol = Tolerance::MESH_VERTEX;
        assert!(tol.within_point3(Point3::ORIGIN, Point3::new(0.0009, 0.0, 0.0)));
        assert!(!tol.within_point3(Point3::ORIGIN, Point3::new(0.001, 0.0, 0.0)));
    }
}
