//! Tests for baking fused and subdivided meshes into triangle buffers.

use crate::geom::{Cube, CubeEdge, DebugEdges, EdgeType, MeshResult, PolyMesh, Tolerance};

fn expected_triangles(mesh: &PolyMesh) -> usize {
    mesh.faces().iter().map(|f| f.verts.len() - 2).sum()
}

#[test]
fn test_cube_bakes_to_twelve_triangles() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0));
    let mut out = MeshResult::default();
    mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
    assert_eq!(out.triangle_count(), 12);
    // Corners only merge where their UVs agree.
    assert!((8..=24).contains(&out.verts.len()));
    assert_eq!(out.uvs.len(), out.verts.len());
}

#[test]
fn test_triangle_count_matches_face_sizes() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0));
    mesh.add_cube(&Cube::at(1, 0, 0));
    mesh.add_cube(&Cube::at(1, 1, 0));
    let smooth = mesh.subdivide();
    let mut out = MeshResult::default();
    smooth.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
    assert_eq!(out.triangle_count(), expected_triangles(&smooth));
}

#[test]
fn test_baked_positions_come_from_the_mesh() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(2, 0, -1));
    let mut out = MeshResult::default();
    mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
    for v in &out.verts {
        assert!(
            mesh.vertices()
                .iter()
                .any(|m| Tolerance::MESH_VERTEX.within_point3(m.pos, *v)),
            "baked vertex {v:?} is not in the mesh"
        );
    }
    for tri in out.face_channels[0].triangles.chunks_exact(3) {
        assert!(tri.iter().all(|&i| (i as usize) < out.verts.len()));
        assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
    }
}

#[test]
fn test_inside_out_reverses_every_triangle() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0));
    let mut normal = MeshResult::default();
    let mut flipped = MeshResult::default();
    mesh.bake_all_channels_into_one(&mut normal, false, DebugEdges::None);
    mesh.bake_all_channels_into_one(&mut flipped, true, DebugEdges::None);
    let a = &normal.face_channels[0].triangles;
    let b = &flipped.face_channels[0].triangles;
    assert_eq!(a.len(), b.len());
    for (ta, tb) in a.chunks_exact(3).zip(b.chunks_exact(3)) {
        assert_eq!([ta[0], ta[2], ta[1]], [tb[0], tb[1], tb[2]]);
    }
}

#[test]
fn test_effective_debug_edges_cover_every_edge() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(
        &Cube::at(0, 0, 0)
            .with_edge(CubeEdge::FrontLeft, EdgeType::Sharp)
            .with_edge(CubeEdge::BackRight, EdgeType::Sharp),
    );
    let mut out = MeshResult::default();
    mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::Effective);
    assert_eq!(out.sharp_edges.len(), 2);
    assert_eq!(out.rounded_edges.len(), 10);
    assert!(out.auto_edges.is_empty());
}
