//! Parameterised cross-section of a road segment.
//!
//! A profile is a roadbed of some width with a barrier on each of its four
//! quarters (upper-right, lower-right, lower-left, upper-left), and optionally
//! an overhang folding back inwards from the top of each barrier. Each quarter
//! contributes six outline points:
//!
//! ```text
//!              <-overhang-><-1->
//!           ^  3---------------4  ^
//!         1 |  |               |  |
//!           v  2--------1      |  | barrier
//!                       |      |  |
//!  ---------------------0      |  |
//!  <----- width/2 ----->       5  v
//! ```
//!
//! Odd quarters list their points in reverse order so the 24 points walk the
//! outline continuously. Profiles are immutable; interpolation builds new ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::core::{Point3, Transform, Vec2};
use super::mesh::EdgeType;

pub const VERTS_PER_QUARTER: usize = 6;
pub const NUM_VERTS: usize = VERTS_PER_QUARTER * 4;

/// Role of a point within its quarter, in even-quarter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertType {
    RoadbedInner = 0,
    BarrierTopInner = 1,
    OverhangEndInner = 2,
    OverhangEndOuter = 3,
    BarrierTopOuter = 4,
    RoadbedOuter = 5,
}

const USES_BARRIER_HEIGHT: [bool; VERTS_PER_QUARTER] = [false, true, true, true, true, false];
const USES_OVERHANG_WIDTH: [bool; VERTS_PER_QUARTER] = [false, false, true, true, false, false];
const IS_X_OUTER: [[bool; VERTS_PER_QUARTER]; 2] = [
    [false, false, false, false, true, true],
    [true, true, false, false, false, false],
];
const IS_Y_OUTER: [[bool; VERTS_PER_QUARTER]; 2] = [
    [false, false, false, true, true, false],
    [false, true, true, false, false, false],
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile width must be positive, got {0}")]
    NonPositiveWidth(f64),
    #[error("barrier height {index} is negative ({value})")]
    NegativeBarrier { index: usize, value: f64 },
    #[error("overhang width {index} is negative ({value})")]
    NegativeOverhang { index: usize, value: f64 },
    #[error("overhang {index} needs a barrier at least 1 high (barrier is {barrier})")]
    OverhangWithoutBarrier { index: usize, barrier: f64 },
    #[error("overhangs {index} and {opposite} collide across a width of {width}")]
    OverhangCollision { index: usize, opposite: usize, width: f64 },
    #[error("interpolation fraction {0} is outside [0, 1]")]
    FractionOutOfRange(f64),
}

#[allow(clippy::float_cmp)]
fn is_zero(v: f64) -> bool {
    v == 0.0
}

fn lerp(from: f64, to: f64, frac: f64) -> f64 {
    from + (to - from) * frac
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterisedProfile {
    width: f64,
    barrier_heights: [f64; 4],
    overhang_widths: [f64; 4],
    outgoing_sharp: [bool; NUM_VERTS],
    #[serde(skip)]
    points: [Vec2; NUM_VERTS],
    #[serde(skip)]
    absolute_bound: Vec2,
}

impl ParameterisedProfile {
    /// # Errors
    /// When the parameters break a consistency rule (see [`ProfileError`]).
    pub fn new(
        width: f64,
        barrier_heights: [f64; 4],
        overhang_widths: [f64; 4],
        outgoing_sharp: [bool; NUM_VERTS],
    ) -> Result<Self, ProfileError> {
        let mut profile = Self {
            width,
            barrier_heights,
            overhang_widths,
            outgoing_sharp,
            points: [Vec2::ZERO; NUM_VERTS],
            absolute_bound: Vec2::ZERO,
        };
        profile.check_consistent()?;
        for i in 0..NUM_VERTS {
            profile.points[i] = profile.compute_point(i);
            profile.absolute_bound = profile.absolute_bound.max(profile.points[i].abs());
        }
        Ok(profile)
    }

    /// Profile from a top and a bottom half, with barrier and overhang
    /// fractions scaled by `width`. Points outside a half's smooth range get
    /// sharp outgoing edges.
    ///
    /// # Errors
    /// When the scaled parameters are inconsistent.
    pub fn from_roadbed(width: f64, top: &RoadbedShape, bottom: &RoadbedShape) -> Result<Self, ProfileError> {
        let barriers = [
            top.barrier(1) * width,
            bottom.barrier(0) * width,
            bottom.barrier(1) * width,
            top.barrier(0) * width,
        ];
        let overhangs = [
            top.overhang(1) * width,
            bottom.overhang(0) * width,
            bottom.overhang(1) * width,
            top.overhang(0) * width,
        ];
        let mut sharp = [false; NUM_VERTS];
        for i in 0..VERTS_PER_QUARTER {
            sharp[i] = !top.smooth(i + VERTS_PER_QUARTER);
            sharp[i + VERTS_PER_QUARTER] = !bottom.smooth(i);
            sharp[i + VERTS_PER_QUARTER * 2] = !bottom.smooth(i + VERTS_PER_QUARTER);
            sharp[i + VERTS_PER_QUARTER * 3] = !top.smooth(i);
        }
        Self::new(width, barriers, overhangs, sharp)
    }

    /// # Errors
    /// The first broken rule: positive width, no negative barriers or
    /// overhangs, overhangs only on barriers at least 1 high, and opposite
    /// overhangs fitting within the width unless their barriers differ by 1.
    pub fn check_consistent(&self) -> Result<(), ProfileError> {
        if self.width <= 0.0 || self.width.is_nan() {
            return Err(ProfileError::NonPositiveWidth(self.width));
        }
        for i in 0..4 {
            let barrier = self.barrier_heights[i];
            let overhang = self.overhang_widths[i];
            if barrier < 0.0 {
                return Err(ProfileError::NegativeBarrier { index: i, value: barrier });
            }
            if overhang < 0.0 {
                return Err(ProfileError::NegativeOverhang { index: i, value: overhang });
            }
            if !is_zero(overhang) && barrier < 1.0 {
                return Err(ProfileError::OverhangWithoutBarrier { index: i, barrier });
            }
            let opposite = 3 - i;
            let fits = overhang + self.overhang_widths[opposite] <= self.width;
            let staggered = (barrier - self.barrier_heights[opposite]).abs() >= 1.0;
            if !fits && !staggered {
                return Err(ProfileError::OverhangCollision {
                    index: i,
                    opposite,
                    width: self.width,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn barrier_heights(&self) -> [f64; 4] {
        self.barrier_heights
    }

    #[must_use]
    pub fn overhang_widths(&self) -> [f64; 4] {
        self.overhang_widths
    }

    #[must_use]
    pub const fn quarter_index(idx: usize) -> usize {
        idx / VERTS_PER_QUARTER
    }

    /// Outline index of `vert_type` in `quarter`.
    #[must_use]
    pub const fn vert_index(vert_type: VertType, quarter: usize) -> usize {
        let base = quarter * VERTS_PER_QUARTER;
        if quarter % 2 == 1 {
            base + 5 - vert_type as usize
        } else {
            base + vert_type as usize
        }
    }

    fn compute_point(&self, idx: usize) -> Vec2 {
        let quarter = Self::quarter_index(idx);
        let local = idx % VERTS_PER_QUARTER;
        let barrier = self.barrier_heights[quarter];
        let overhang = self.overhang_widths[quarter];

        let mut x = self.width / 2.0;
        let mut y = 0.5;
        if USES_BARRIER_HEIGHT[local] {
            y += barrier;
        }
        if IS_X_OUTER[quarter % 2][local] && barrier > 0.0 {
            x += 1.0;
        }
        if USES_OVERHANG_WIDTH[local] {
            x -= overhang;
        }
        if IS_Y_OUTER[quarter % 2][local] && !is_zero(overhang) {
            y += 1.0;
        }
        if quarter > 1 {
            x = -x;
        }
        if quarter == 1 || quarter == 2 {
            y = -y;
        }
        Vec2::new(x, y)
    }

    /// Outline point `idx` in profile space (x across, y up).
    #[must_use]
    pub fn point(&self, idx: usize) -> Vec2 {
        self.points[idx]
    }

    #[must_use]
    pub fn points(&self) -> &[Vec2; NUM_VERTS] {
        &self.points
    }

    /// Outline point placed by a connector transform. Profile x maps to local
    /// Y and profile y to local Z; the profile faces down local X.
    #[must_use]
    pub fn transformed_vert(&self, idx: usize, transform: &Transform) -> Point3 {
        let p = self.points[idx];
        transform.apply_point(Point3::new(0.0, p.x, p.y))
    }

    #[must_use]
    pub fn transformed_vert_of_type(&self, vert_type: VertType, quarter: usize, transform: &Transform) -> Point3 {
        self.transformed_vert(Self::vert_index(vert_type, quarter), transform)
    }

    /// Corner of the smallest origin-centred rectangle holding every point.
    #[must_use]
    pub fn absolute_bound(&self) -> Vec2 {
        self.absolute_bound
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.absolute_bound.length()
    }

    /// Sum of point-to-point distances; zero for identical outlines.
    #[must_use]
    pub fn diff(&self, other: &Self) -> f64 {
        self.points
            .iter()
            .zip(&other.points)
            .map(|(a, b)| (*a - *b).length())
            .sum()
    }

    #[must_use]
    pub fn outgoing_sharp(&self, idx: usize) -> bool {
        self.outgoing_sharp[idx]
    }

    /// Type of the extrusion edge leaving point `idx`.
    #[must_use]
    pub fn outgoing_edge_type(&self, idx: usize) -> EdgeType {
        if self.outgoing_sharp[idx] {
            EdgeType::Sharp
        } else {
            EdgeType::Rounded
        }
    }

    /// The overhangs of quarters `qa` and `qb` span the width and sit at the
    /// same height, closing that side of the profile.
    #[must_use]
    pub fn overhangs_meet(&self, qa: usize, qb: usize) -> bool {
        let oa = self.overhang_widths[qa];
        let ob = self.overhang_widths[qb];
        !is_zero(oa)
            && !is_zero(ob)
            && (oa + ob - self.width).abs() < 1e-6
            && (self.barrier_heights[qa] - self.barrier_heights[qb]).abs() < 1e-6
    }

    #[must_use]
    pub fn closed_top(&self) -> bool {
        self.overhangs_meet(0, 3)
    }

    #[must_use]
    pub fn closed_bottom(&self) -> bool {
        self.overhangs_meet(1, 2)
    }

    /// Profile `frac` of the way to `other`.
    ///
    /// When an overhang appears or disappears, the blend passes through an
    /// intermediate with the higher barriers and the narrower overhangs, so
    /// no overhang ever hangs off a barrier too low for it.
    ///
    /// # Errors
    /// When `frac` is outside `[0, 1]` or an intermediate is inconsistent.
    pub fn interp(&self, other: &Self, frac: f64) -> Result<Self, ProfileError> {
        if !(0.0..=1.0).contains(&frac) {
            return Err(ProfileError::FractionOutOfRange(frac));
        }
        let overhang_toggles =
            (0..4).any(|i| is_zero(self.overhang_widths[i]) != is_zero(other.overhang_widths[i]));
        if !overhang_toggles {
            return self.raw_interp(other, frac);
        }
        let safe = self.safe_intermediate(other)?;
        if frac < 0.5 {
            self.raw_interp(&safe, frac * 2.0)
        } else {
            safe.raw_interp(other, frac * 2.0 - 1.0)
        }
    }

    fn raw_interp(&self, other: &Self, frac: f64) -> Result<Self, ProfileError> {
        let barriers = std::array::from_fn(|i| lerp(self.barrier_heights[i], other.barrier_heights[i], frac));
        let overhangs = std::array::from_fn(|i| lerp(self.overhang_widths[i], other.overhang_widths[i], frac));
        let sharp = if frac < 0.5 {
            self.outgoing_sharp
        } else {
            other.outgoing_sharp
        };
        Self::new(lerp(self.width, other.width, frac), barriers, overhangs, sharp)
    }

    fn safe_intermediate(&self, other: &Self) -> Result<Self, ProfileError> {
        Self::new(
            (self.width + other.width) / 2.0,
            std::array::from_fn(|i| self.barrier_heights[i].max(other.barrier_heights[i])),
            std::array::from_fn(|i| self.overhang_widths[i].min(other.overhang_widths[i])),
            other.outgoing_sharp,
        )
    }
}

// ============================================================================
// Roadbed halves
// ============================================================================

/// One half (top or bottom) of a profile, with heights and overhangs as
/// fractions of the eventual width.
///
/// The half's twelve points run from the left roadbed edge (0) round both
/// barriers to the right roadbed edge (11). Points 0 and 11 are always smooth;
/// otherwise points in `smooth_start..smooth_end` are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadbedShape {
    pub left_barrier: f64,
    pub right_barrier: f64,
    pub left_overhang: f64,
    pub right_overhang: f64,
    pub smooth_start: usize,
    pub smooth_end: usize,
}

impl RoadbedShape {
    #[must_use]
    pub const fn new(
        left_barrier: f64,
        right_barrier: f64,
        left_overhang: f64,
        right_overhang: f64,
        smooth_start: usize,
        smooth_end: usize,
    ) -> Self {
        Self {
            left_barrier,
            right_barrier,
            left_overhang,
            right_overhang,
            smooth_start,
            smooth_end,
        }
    }

    /// `0` is left, `1` is right.
    #[must_use]
    pub fn barrier(&self, side: usize) -> f64 {
        assert!(side < 2, "roadbed side must be 0 or 1");
        if side == 0 { self.left_barrier } else { self.right_barrier }
    }

    #[must_use]
    pub fn overhang(&self, side: usize) -> f64 {
        assert!(side < 2, "roadbed side must be 0 or 1");
        if side == 0 { self.left_overhang } else { self.right_overhang }
    }

    #[must_use]
    pub fn smooth(&self, idx: usize) -> bool {
        assert!(idx < 12, "roadbed half has twelve points");
        idx == 0 || idx == 11 || (self.smooth_start..self.smooth_end).contains(&idx)
    }

    #[must_use]
    pub fn is_empty_smooth_range(&self) -> bool {
        self.smooth_start >= self.smooth_end
    }

    /// Left/right swapped, smooth range mirrored.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        let end = self.smooth_end.min(12);
        let start = self.smooth_start.min(end);
        Self {
            left_barrier: self.right_barrier,
            right_barrier: self.left_barrier,
            left_overhang: self.right_overhang,
            right_overhang: self.left_overhang,
            smooth_start: 12 - end,
            smooth_end: 12 - start,
        }
    }
}
