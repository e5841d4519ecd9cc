//! Orientation helpers shared by the structural graph and its objectives.

use std::f64::consts::TAU;

use super::core::{Point3, Transform, Vec3};

/// Orthonormal `(forward, right, up)` from an approximate up and a forward.
///
/// `right = up x forward`, then `up` is rebuilt as `forward x right` so it is
/// exactly orthogonal to `forward`.
#[must_use]
pub fn make_axis_set(up: Vec3, forward: Vec3) -> (Vec3, Vec3, Vec3) {
    let forward = forward.normalized_or_zero();
    let mut right = up.cross(forward).normalized_or_zero();
    if right == Vec3::ZERO {
        right = forward.any_perpendicular();
    }
    let up = forward.cross(right).normalized_or_zero();
    (forward, right, up)
}

/// Node placement: local X is forward, Y is right, Z is up.
#[must_use]
pub fn make_transform(position: Point3, up: Vec3, forward: Vec3) -> Transform {
    let (forward, right, up) = make_axis_set(up, forward);
    Transform::from_axes(position, forward, right, up)
}

/// Component of `v` orthogonal to `normal` (which need not be unit length).
#[must_use]
pub fn project_onto_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let Some(n) = normal.normalized() else {
        return v;
    };
    v - n * v.dot(n)
}

/// Angle that rotates `from` onto `to` about `axis`, both projected onto the
/// plane orthogonal to `axis` first.
///
/// Positive means a right-handed rotation about `axis`. With `positive_range`
/// the result is wrapped into `[0, 2π)`, otherwise it lies in `[-π, π]`.
#[must_use]
pub fn signed_angle(from: Vec3, to: Vec3, axis: Vec3, positive_range: bool) -> f64 {
    let f = project_onto_plane(from, axis).normalized_or_zero();
    let t = project_onto_plane(to, axis).normalized_or_zero();
    let mut angle = f.dot(t).clamp(-1.0, 1.0).acos();
    if f.cross(t).dot(axis) < 0.0 {
        angle = -angle;
    }
    if positive_range && angle < 0.0 {
        angle += TAU;
    }
    angle
}

/// Rodrigues rotation of `v` about unit `axis` by `angle`.
#[must_use]
pub fn rotate_about(v: Vec3, axis: Vec3, angle: f64) -> Vec3 {
    let k = axis.normalized_or_zero();
    let (s, c) = angle.sin_cos();
    v * c + k.cross(v) * s + k * (k.dot(v) * (1.0 - c))
}

/// Newell polygon normal of a loop of vectors (not normalized).
#[must_use]
pub fn newell_normal(points: &[Vec3]) -> Vec3 {
    let Some(&last) = points.last() else {
        return Vec3::ZERO;
    };
    let mut prev = last;
    let mut normal = Vec3::ZERO;
    for &p in points {
        normal += prev.cross(p);
        prev = p;
    }
    normal
}
