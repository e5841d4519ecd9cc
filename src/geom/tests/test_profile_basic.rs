//! Tests for the parameterised road profile.

use std::f64::consts::FRAC_PI_2;

use crate::geom::{
    EdgeType, NUM_VERTS, ParameterisedProfile, Point3, ProfileError, RoadbedShape, Tolerance, Transform, Vec2,
    Vec3, VertType,
};

fn one_barrier() -> ParameterisedProfile {
    ParameterisedProfile::new(4.0, [2.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [false; NUM_VERTS])
        .expect("consistent profile")
}

fn flat(width: f64) -> ParameterisedProfile {
    ParameterisedProfile::new(width, [0.0; 4], [0.0; 4], [false; NUM_VERTS]).expect("consistent profile")
}

fn close(a: Vec2, b: Vec2) -> bool {
    Tolerance::DEFAULT.within_vec2(a, b)
}

// ============================================================================
// Outline
// ============================================================================

#[test]
fn test_upper_right_quarter_outline() {
    let p = one_barrier();
    let expected = [
        Vec2::new(2.0, 0.5),
        Vec2::new(2.0, 2.5),
        Vec2::new(1.0, 2.5),
        Vec2::new(1.0, 3.5),
        Vec2::new(3.0, 3.5),
        Vec2::new(3.0, 0.5),
    ];
    for (i, e) in expected.iter().enumerate() {
        assert!(close(p.point(i), *e), "point {i}: {:?}", p.point(i));
    }
}

#[test]
fn test_bare_quarters_collapse_to_roadbed_corner() {
    let p = one_barrier();
    for i in 6..12 {
        assert!(close(p.point(i), Vec2::new(2.0, -0.5)));
    }
    for i in 12..18 {
        assert!(close(p.point(i), Vec2::new(-2.0, -0.5)));
    }
    for i in 18..24 {
        assert!(close(p.point(i), Vec2::new(-2.0, 0.5)));
    }
}

#[test]
fn test_bound_and_radius() {
    let p = one_barrier();
    assert!(close(p.absolute_bound(), Vec2::new(3.0, 3.5)));
    assert!((p.radius() - 21.25_f64.sqrt()).abs() < 1e-9);
    assert!((flat(2.0).radius() - 1.25_f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_diff_is_zero_for_equal_outlines() {
    let a = one_barrier();
    assert!(a.diff(&a.clone()).abs() < 1e-12);
    // Every point moves 0.5 sideways.
    assert!((flat(4.0).diff(&flat(5.0)) - 12.0).abs() < 1e-9);
}

// ============================================================================
// Consistency rules
// ============================================================================

#[test]
fn test_rejects_non_positive_width() {
    let err = ParameterisedProfile::new(0.0, [0.0; 4], [0.0; 4], [false; NUM_VERTS]).unwrap_err();
    assert_eq!(err, ProfileError::NonPositiveWidth(0.0));
}

#[test]
fn test_rejects_negative_parameters() {
    let err = ParameterisedProfile::new(3.0, [0.0, -1.0, 0.0, 0.0], [0.0; 4], [false; NUM_VERTS]).unwrap_err();
    assert!(matches!(err, ProfileError::NegativeBarrier { index: 1, .. }));
    let err = ParameterisedProfile::new(3.0, [0.0; 4], [0.0, 0.0, -0.5, 0.0], [false; NUM_VERTS]).unwrap_err();
    assert!(matches!(err, ProfileError::NegativeOverhang { index: 2, .. }));
}

#[test]
fn test_rejects_overhang_on_low_barrier() {
    let err =
        ParameterisedProfile::new(3.0, [0.5, 0.0, 0.0, 0.0], [0.5, 0.0, 0.0, 0.0], [false; NUM_VERTS]).unwrap_err();
    assert!(matches!(err, ProfileError::OverhangWithoutBarrier { index: 0, .. }));
}

#[test]
fn test_opposite_overhangs_collide_unless_staggered() {
    let err =
        ParameterisedProfile::new(3.0, [2.0, 0.0, 0.0, 2.0], [2.0, 0.0, 0.0, 2.0], [false; NUM_VERTS]).unwrap_err();
    assert!(matches!(err, ProfileError::OverhangCollision { index: 0, opposite: 3, .. }));

    // One barrier a full unit higher lets the overhangs pass over each other.
    assert!(
        ParameterisedProfile::new(3.0, [3.0, 0.0, 0.0, 2.0], [2.0, 0.0, 0.0, 2.0], [false; NUM_VERTS]).is_ok()
    );
}

// ============================================================================
// Roadbed halves and ceilings
// ============================================================================

#[test]
fn test_from_roadbed_scales_by_width() {
    let top = RoadbedShape::new(1.0, 1.0, 0.5, 0.5, 6, 11);
    let bottom = RoadbedShape::new(0.0, 0.0, 0.0, 0.0, 6, 11);
    let p = ParameterisedProfile::from_roadbed(3.0, &top, &bottom).expect("consistent");
    assert_eq!(p.barrier_heights(), [3.0, 0.0, 0.0, 3.0]);
    assert_eq!(p.overhang_widths(), [1.5, 0.0, 0.0, 1.5]);
    assert!(p.closed_top());
    assert!(!p.closed_bottom());
}

#[test]
fn test_from_roadbed_marks_rough_points_sharp() {
    let top = RoadbedShape::new(1.0, 0.0, 0.0, 0.0, 6, 9);
    let p = ParameterisedProfile::from_roadbed(3.0, &top, &top).expect("consistent");
    // Quarter 0 is built from top points 6..12: 6..9 smooth, 9 and 10 rough,
    // 11 always smooth.
    assert!(!p.outgoing_sharp(0));
    assert_eq!(p.outgoing_edge_type(2), EdgeType::Rounded);
    assert!(p.outgoing_sharp(3));
    assert_eq!(p.outgoing_edge_type(4), EdgeType::Sharp);
    assert!(!p.outgoing_sharp(5));
    // Quarter 3 is built from top points 0..6, all outside the range but 0.
    assert!(!p.outgoing_sharp(18));
    assert!(p.outgoing_sharp(19));
}

#[test]
fn test_mirrored_shape_swaps_sides() {
    let shape = RoadbedShape::new(1.0, 0.0, 0.5, 0.0, 2, 5);
    let m = shape.mirrored();
    assert_eq!(m.left_barrier, 0.0);
    assert_eq!(m.right_barrier, 1.0);
    assert_eq!(m.right_overhang, 0.5);
    assert_eq!((m.smooth_start, m.smooth_end), (7, 10));
    assert_eq!(m.mirrored(), shape);
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn test_interp_endpoints_and_midpoint() {
    let a = flat(2.0);
    let b = flat(4.0);
    assert_eq!(a.interp(&b, 0.0).expect("valid"), a);
    assert_eq!(a.interp(&b, 1.0).expect("valid"), b);
    assert!((a.interp(&b, 0.5).expect("valid").width() - 3.0).abs() < 1e-12);
}

#[test]
fn test_interp_rejects_fraction_outside_unit_range() {
    let a = flat(2.0);
    assert_eq!(a.interp(&a, 1.5).unwrap_err(), ProfileError::FractionOutOfRange(1.5));
    assert!(a.interp(&a, -0.1).is_err());
}

#[test]
fn test_interp_grows_barrier_before_overhang() {
    let a = flat(3.0);
    let b = ParameterisedProfile::new(3.0, [1.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [false; NUM_VERTS])
        .expect("consistent");
    // A straight blend would put a 0.5 overhang on a 0.5 barrier.
    for step in 0..=8 {
        let frac = f64::from(step) / 8.0;
        let p = a.interp(&b, frac).expect("every step is consistent");
        assert!(p.check_consistent().is_ok());
    }
    let mid = a.interp(&b, 0.5).expect("valid");
    assert_eq!(mid.barrier_heights()[0], 1.0);
    assert_eq!(mid.overhang_widths()[0], 0.0);
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_transformed_vert_maps_profile_into_connector_frame() {
    let p = one_barrier();
    // Connector facing +Y with Z up: local Y (profile x) points along -X.
    let t = Transform::from_axes(Point3::new(10.0, 0.0, 0.0), Vec3::Y, -Vec3::X, Vec3::Z);
    let v = p.transformed_vert_of_type(VertType::RoadbedInner, 0, &t);
    assert!(Tolerance::DEFAULT.approx_eq_point3(v, Point3::new(8.0, 0.0, 0.5)));

    let r = Transform::rotate_z(FRAC_PI_2);
    let w = p.transformed_vert(ParameterisedProfile::vert_index(VertType::BarrierTopOuter, 0), &r);
    assert!(Tolerance::DEFAULT.approx_eq_point3(w, Point3::new(-3.0, 0.0, 3.5)));
}
