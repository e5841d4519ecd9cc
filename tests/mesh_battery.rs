use pgc_engine::geom::{BATTERY, Cube, CubeEdge, EdgeType, run_self_test};
use pgc_engine::pipeline::generate_cubes;

#[test]
fn self_test_battery_passes() {
    let report = run_self_test().expect("cube self-test");
    // Twelve sharp-edge cubes plus every battery entry in 6 permutations x 2 parities.
    assert_eq!(report.meshes_checked, 12 + BATTERY.len() * 12);
    assert!(report.faces_checked > 0);
}

#[test]
fn one_cube_subdivided_twice_bakes_192_triangles() {
    // One cube, two subdivisions: 6 * 4 * 4 quads.
    let out = generate_cubes(&[Cube::at(0, 0, 0)], 2, false);
    assert_eq!(out.triangle_count(), 6 * 16 * 2);
    assert_eq!(out.face_channels.len(), 1);
    for v in &out.verts {
        assert!(v.x.abs() <= 0.5 + 1e-9 && v.y.abs() <= 0.5 + 1e-9 && v.z.abs() <= 0.5 + 1e-9);
    }
}

#[test]
fn sharp_cube_edge_keeps_its_corner_through_subdivision() {
    let cube = Cube::at(0, 0, 0).with_all_edges(EdgeType::Sharp);
    let out = generate_cubes(&[cube], 2, false);
    assert!(out.verts.iter().any(|v| (v.x.abs() - 0.5).abs() < 1e-9
        && (v.y.abs() - 0.5).abs() < 1e-9
        && (v.z.abs() - 0.5).abs() < 1e-9));

    let single = Cube::at(0, 0, 0).with_edge(CubeEdge::ALL[3], EdgeType::Sharp);
    let out = generate_cubes(&[single, Cube::at(5, 0, 0)], 1, true);
    assert_eq!(out.triangle_count(), 2 * 6 * 4 * 2);
}
