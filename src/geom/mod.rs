mod bake;
mod core;
mod cube;
mod diagnostics;
mod distance;
mod frame;
mod mesh;
mod metrics;
mod profile;
mod spline;
mod subdivision;

pub use bake::{DebugEdges, MeshResult, NodePosition, TriangleChannel};
pub use core::{BBox, Point3, Tolerance, Transform, Vec2, Vec3};
pub use cube::{
    AXIS_PERMUTATIONS, BATTERY, BATTERY_SHARP_ANGLE_DEGREES, BatteryConfig, Cube, CubeEdge,
    SelfTestError, SelfTestReport, battery_mesh, run_self_test,
};
pub use diagnostics::MeshDiagnostics;
pub use distance::{closest_points_segment_segment, segment_segment_distance};
pub use frame::{
    make_axis_set, make_transform, newell_normal, project_onto_plane, rotate_about, signed_angle,
};
pub use mesh::{
    EdgeIdx, EdgeType, FaceIdx, MeshEdge, MeshFace, MeshVert, MultiUv, PolyMesh, RawVert,
    TopologyError, VertIdx,
};
pub use metrics::{PhaseTimings, PipelineMetrics, TimingBucket};
pub use profile::{
    NUM_VERTS, ParameterisedProfile, ProfileError, RoadbedShape, VERTS_PER_QUARTER, VertType,
};
pub use spline::{CubicBezier, hermite, hermite_basis, hermite_basis_derivative, hermite_tangent};

#[cfg(test)]
mod tests;
