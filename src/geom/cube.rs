//! Unit cubes on an integer lattice, and the self-test battery built on them.
//!
//! Adding a cube inserts six quads; any quad that meets an existing opposite
//! face cancels it, so abutting cubes fuse into one closed surface. Removing a
//! cube inserts the reversed quads, which carves it back out.
//!
//! Cube faces wind clockwise seen from outside; bake with `inside_out` set for
//! counter-clockwise front faces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::core::{Point3, Vec2};
use super::mesh::{EdgeType, PolyMesh, TopologyError};

/// The twelve edges of a cube, in the order used by [`Cube::edge_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeEdge {
    TopFront,
    TopLeft,
    TopBack,
    TopRight,
    FrontLeft,
    BackLeft,
    BackRight,
    FrontRight,
    BottomFront,
    BottomLeft,
    BottomBack,
    BottomRight,
}

impl CubeEdge {
    pub const ALL: [Self; 12] = [
        Self::TopFront,
        Self::TopLeft,
        Self::TopBack,
        Self::TopRight,
        Self::FrontLeft,
        Self::BackLeft,
        Self::BackRight,
        Self::FrontRight,
        Self::BottomFront,
        Self::BottomLeft,
        Self::BottomBack,
        Self::BottomRight,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

fn rounded_edges() -> [EdgeType; 12] {
    [EdgeType::Rounded; 12]
}

/// A unit cube centred on an integer lattice point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cube {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(default = "rounded_edges")]
    pub edge_types: [EdgeType; 12],
}

impl Default for Cube {
    fn default() -> Self {
        Self::at(0, 0, 0)
    }
}

impl Cube {
    /// Cube with all edges Rounded.
    #[must_use]
    pub fn at(x: i32, y: i32, z: i32) -> Self {
        Self {
            x,
            y,
            z,
            edge_types: rounded_edges(),
        }
    }

    #[must_use]
    pub fn with_edge(mut self, edge: CubeEdge, edge_type: EdgeType) -> Self {
        self.edge_types[edge.index()] = edge_type;
        self
    }

    #[must_use]
    pub fn with_all_edges(mut self, edge_type: EdgeType) -> Self {
        self.edge_types = [edge_type; 12];
        self
    }

    #[must_use]
    pub fn edge_type(&self, edge: CubeEdge) -> EdgeType {
        self.edge_types[edge.index()]
    }

    /// Corner positions, indexed by the `L/R`, `F/B`, `B/T` constants below.
    fn corners(&self) -> [Point3; 8] {
        let (x, y, z) = (f64::from(self.x), f64::from(self.y), f64::from(self.z));
        [
            Point3::new(x - 0.5, y - 0.5, z - 0.5),
            Point3::new(x - 0.5, y - 0.5, z + 0.5),
            Point3::new(x - 0.5, y + 0.5, z - 0.5),
            Point3::new(x - 0.5, y + 0.5, z + 0.5),
            Point3::new(x + 0.5, y - 0.5, z - 0.5),
            Point3::new(x + 0.5, y - 0.5, z + 0.5),
            Point3::new(x + 0.5, y + 0.5, z - 0.5),
            Point3::new(x + 0.5, y + 0.5, z + 0.5),
        ]
    }
}

// Corner names: Left/Right (x), Front/Back (y), Bottom/Top (z).
const LFB: usize = 0;
const LFT: usize = 1;
const LBB: usize = 2;
const LBT: usize = 3;
const RFB: usize = 4;
const RFT: usize = 5;
const RBB: usize = 6;
const RBT: usize = 7;

const FACE_CORNERS: [[usize; 4]; 6] = [
    [RFB, RBB, LBB, LFB],
    [RFB, RFT, RBT, RBB],
    [LBB, RBB, RBT, LBT],
    [LFT, LFB, LBB, LBT],
    [RFT, RFB, LFB, LFT],
    [RFT, LFT, LBT, RBT],
];

/// `FACE_EDGES[f][k]` is the edge from corner `k` to corner `k + 1` of face `f`.
const FACE_EDGES: [[CubeEdge; 4]; 6] = {
    use CubeEdge::{
        BackLeft, BackRight, BottomBack, BottomFront, BottomLeft, BottomRight, FrontLeft, FrontRight, TopBack,
        TopFront, TopLeft, TopRight,
    };
    [
        [BottomRight, BottomBack, BottomLeft, BottomFront],
        [FrontRight, TopRight, BackRight, BottomRight],
        [BottomBack, BackRight, TopBack, BackLeft],
        [FrontLeft, BottomLeft, BackLeft, TopLeft],
        [FrontRight, BottomFront, FrontLeft, TopFront],
        [TopFront, TopLeft, TopBack, TopRight],
    ]
};

const FACE_UVS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(1.0, 0.0),
];

impl PolyMesh {
    /// Fuse a cube into the mesh. Each face gets its own UV group.
    pub fn add_cube(&mut self, cube: &Cube) {
        self.clean = false;
        let corners = cube.corners();
        for (&loop_corners, &loop_edges) in FACE_CORNERS.iter().zip(FACE_EDGES.iter()) {
            let positions = loop_corners.map(|c| corners[c]);
            let types = loop_edges.map(|e| cube.edge_type(e));
            let group = self.next_uv_group();
            self.add_face(&positions, &FACE_UVS, group, &types, 0);
            self.debug_check(false);
        }
        self.merge_partial_edges();
        self.clean_up_redundant_edges();
        self.check_consistent(true);
    }

    /// Carve a cube out of the mesh by inserting its reversed faces.
    pub fn remove_cube(&mut self, cube: &Cube) {
        self.clean = false;
        let corners = cube.corners();
        let reversed_uvs = [FACE_UVS[3], FACE_UVS[2], FACE_UVS[1], FACE_UVS[0]];
        for (&loop_corners, &loop_edges) in FACE_CORNERS.iter().zip(FACE_EDGES.iter()) {
            let [c0, c1, c2, c3] = loop_corners;
            let positions = [corners[c3], corners[c2], corners[c1], corners[c0]];
            let [t0, t1, t2, t3] = loop_edges.map(|e| cube.edge_type(e));
            let group = self.next_uv_group();
            self.add_face(&positions, &reversed_uvs, group, &[t2, t1, t0, t3], 0);
            self.debug_check(false);
        }
        self.merge_partial_edges();
        self.clean_up_redundant_edges();
        self.check_consistent(true);
    }
}

// ============================================================================
// Self-test battery
// ============================================================================

/// A named set of lattice cells added in order.
#[derive(Debug, Clone, Copy)]
pub struct BatteryConfig {
    pub name: &'static str,
    pub cells: &'static [[i32; 3]],
}

const BLOCK_IN_ORDER: [[i32; 3]; 27] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 0, 2],
    [0, 1, 0],
    [0, 1, 1],
    [0, 1, 2],
    [0, 2, 0],
    [0, 2, 1],
    [0, 2, 2],
    [1, 0, 0],
    [1, 0, 1],
    [1, 0, 2],
    [1, 1, 0],
    [1, 1, 1],
    [1, 1, 2],
    [1, 2, 0],
    [1, 2, 1],
    [1, 2, 2],
    [2, 0, 0],
    [2, 0, 1],
    [2, 0, 2],
    [2, 1, 0],
    [2, 1, 1],
    [2, 1, 2],
    [2, 2, 0],
    [2, 2, 1],
    [2, 2, 2],
];

const BLOCK_MIDDLE_LAST: [[i32; 3]; 27] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 0, 2],
    [0, 1, 0],
    [0, 1, 1],
    [0, 1, 2],
    [0, 2, 0],
    [0, 2, 1],
    [0, 2, 2],
    [1, 0, 0],
    [1, 0, 1],
    [1, 0, 2],
    [1, 1, 0],
    [1, 1, 2],
    [1, 2, 0],
    [1, 2, 1],
    [1, 2, 2],
    [2, 0, 0],
    [2, 0, 1],
    [2, 0, 2],
    [2, 1, 0],
    [2, 1, 1],
    [2, 1, 2],
    [2, 2, 0],
    [2, 2, 1],
    [2, 2, 2],
    [1, 1, 1],
];

/// Cube arrangements that must fuse into closed, subdividable meshes.
pub const BATTERY: &[BatteryConfig] = &[
    BatteryConfig {
        name: "one cube",
        cells: &[[0, 0, 0]],
    },
    BatteryConfig {
        name: "face contact",
        cells: &[[0, 0, 0], [0, 0, 1]],
    },
    BatteryConfig {
        name: "edge contact",
        cells: &[[0, 0, 0], [0, 1, 1]],
    },
    BatteryConfig {
        name: "edge contact then fill-in",
        cells: &[[0, 0, 0], [0, 1, 1], [0, 1, 0]],
    },
    BatteryConfig {
        name: "corner contact",
        cells: &[[0, 0, 0], [1, 1, 1]],
    },
    BatteryConfig {
        name: "three in a row",
        cells: &[[0, 0, 0], [0, 0, 1], [0, 0, 2]],
    },
    BatteryConfig {
        name: "L shape",
        cells: &[[0, 0, 0], [0, 0, 1], [0, 1, 1]],
    },
    BatteryConfig {
        name: "square",
        cells: &[[0, 0, 0], [0, 0, 1], [0, 1, 1], [0, 1, 0]],
    },
    BatteryConfig {
        name: "3x3x3 in order",
        cells: &BLOCK_IN_ORDER,
    },
    BatteryConfig {
        name: "3x3x3 middle last",
        cells: &BLOCK_MIDDLE_LAST,
    },
];

/// Coordinate orders applied to every battery configuration.
pub const AXIS_PERMUTATIONS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

/// Auto-sharp angle used by the battery meshes.
pub const BATTERY_SHARP_ANGLE_DEGREES: f64 = 20.0;

/// Build the mesh for one battery variant.
#[must_use]
pub fn battery_mesh(cells: &[[i32; 3]], permutation: [usize; 3], mirror: bool) -> PolyMesh {
    let sign = if mirror { -1 } else { 1 };
    let mut mesh = PolyMesh::with_auto_sharp_angle(BATTERY_SHARP_ANGLE_DEGREES);
    for cell in cells {
        mesh.add_cube(&Cube::at(
            cell[permutation[0]] * sign,
            cell[permutation[1]] * sign,
            cell[permutation[2]] * sign,
        ));
    }
    mesh
}

#[derive(Debug, Error)]
pub enum SelfTestError {
    #[error("{config} (axes {permutation:?}, mirror {mirror}) broke at subdivision level {level}: {source}")]
    Topology {
        config: &'static str,
        permutation: [usize; 3],
        mirror: bool,
        level: usize,
        source: TopologyError,
    },
    #[error("sharp {edge:?} cube has {found} sharp edges at level {level}, expected {expected}")]
    SharpEdgeCount {
        edge: CubeEdge,
        level: usize,
        expected: usize,
        found: usize,
    },
}

/// Summary of a passing self-test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    pub meshes_checked: usize,
    pub faces_checked: usize,
}

fn sharp_set_count(mesh: &PolyMesh) -> usize {
    mesh.edges().iter().filter(|e| e.set_type == EdgeType::Sharp).count()
}

/// Run the whole battery, twice-subdivided, plus the single-sharp-edge cubes.
///
/// # Errors
/// The first variant whose topology check fails, or a sharp-edge count that
/// does not double per subdivision.
pub fn run_self_test() -> Result<SelfTestReport, SelfTestError> {
    let mut report = SelfTestReport::default();

    for edge in CubeEdge::ALL {
        let mut mesh = PolyMesh::with_auto_sharp_angle(BATTERY_SHARP_ANGLE_DEGREES);
        mesh.add_cube(&Cube::at(0, 0, 0).with_edge(edge, EdgeType::Sharp));
        for (level, expected) in [(0, 1), (1, 2), (2, 4)] {
            if level > 0 {
                mesh = mesh.subdivide();
            }
            let found = sharp_set_count(&mesh);
            if found != expected {
                return Err(SelfTestError::SharpEdgeCount {
                    edge,
                    level,
                    expected,
                    found,
                });
            }
        }
        report.meshes_checked += 1;
        report.faces_checked += mesh.face_count();
    }

    for config in BATTERY {
        for permutation in AXIS_PERMUTATIONS {
            for mirror in [false, true] {
                let mut mesh = battery_mesh(config.cells, permutation, mirror);
                for level in 0..=2 {
                    if level > 0 {
                        mesh = mesh.subdivide();
                    }
                    mesh.validate(true).map_err(|source| SelfTestError::Topology {
                        config: config.name,
                        permutation,
                        mirror,
                        level,
                        source,
                    })?;
                }
                report.meshes_checked += 1;
                report.faces_checked += mesh.face_count();
            }
        }
        log::debug!("cube battery: {} passed", config.name);
    }

    log::info!(
        "cube self-test passed: {} meshes, {} faces",
        report.meshes_checked,
        report.faces_checked
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cube_topology() {
        let mut mesh = PolyMesh::new();
        mesh.add_cube(&Cube::at(0, 0, 0));
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.edge_count(), 12);
        assert_eq!(mesh.face_count(), 6);
        assert!(mesh.is_closed());
        assert!(!mesh.is_clean());
    }

    #[test]
    fn test_face_contact_fuses() {
        let mut mesh = PolyMesh::new();
        mesh.add_cube(&Cube::at(0, 0, 0));
        mesh.add_cube(&Cube::at(0, 0, 1));
        assert_eq!(mesh.face_count(), 10);
        assert_eq!(mesh.vertex_count(), 12);
        assert_eq!(mesh.edge_count(), 20);
    }

    #[test]
    fn test_remove_cube_restores_single_cube() {
        let mut mesh = PolyMesh::new();
        mesh.add_cube(&Cube::at(0, 0, 0));
        mesh.add_cube(&Cube::at(1, 0, 0));
        mesh.remove_cube(&Cube::at(1, 0, 0));
        assert_eq!(mesh.face_count(), 6);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.edge_count(), 12);
        let max_x = mesh.vertices().iter().map(|v| v.pos.x).fold(f64::MIN, f64::max);
        assert!((max_x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_remove_only_cube_empties_mesh() {
        let mut mesh = PolyMesh::new();
        mesh.add_cube(&Cube::at(2, -1, 3));
        mesh.remove_cube(&Cube::at(2, -1, 3));
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_every_edge_can_be_sharpened_alone() {
        for edge in CubeEdge::ALL {
            let mut mesh = PolyMesh::new();
            mesh.add_cube(&Cube::at(0, 0, 0).with_edge(edge, EdgeType::Sharp));
            assert_eq!(sharp_set_count(&mesh), 1, "{edge:?}");
        }
    }

    #[test]
    fn test_cube_edge_index_order() {
        assert_eq!(CubeEdge::TopFront.index(), 0);
        assert_eq!(CubeEdge::FrontLeft.index(), 4);
        assert_eq!(CubeEdge::BottomRight.index(), 11);
        for (i, edge) in CubeEdge::ALL.iter().enumerate() {
            assert_eq!(edge.index(), i);
        }
    }

    #[test]
    fn test_battery_mesh_mirror_negates() {
        let mesh = battery_mesh(&[[0, 0, 0], [1, 0, 0]], [0, 1, 2], true);
        let min_x = mesh.vertices().iter().map(|v| v.pos.x).fold(f64::MAX, f64::min);
        assert!((min_x + 1.5).abs() < 1e-12);
    }
}
