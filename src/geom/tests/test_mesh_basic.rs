//! Tests for polygon mesh editing through cube insertion and removal.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{Cube, CubeEdge, EdgeType, PolyMesh};

const NEIGHBOURS: [[i32; 3]; 6] = [[1, 0, 0], [-1, 0, 0], [0, 1, 0], [0, -1, 0], [0, 0, 1], [0, 0, -1]];

fn exposed_faces(cells: &BTreeSet<[i32; 3]>) -> usize {
    cells
        .iter()
        .map(|c| {
            NEIGHBOURS
                .iter()
                .filter(|d| !cells.contains(&[c[0] + d[0], c[1] + d[1], c[2] + d[2]]))
                .count()
        })
        .sum()
}

// ============================================================================
// Fusion
// ============================================================================

#[test]
fn test_face_contact_fuses_to_ten_faces() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0));
    mesh.add_cube(&Cube::at(0, 0, 1));
    assert_eq!(mesh.face_count(), 10);
    assert!(mesh.validate(true).is_ok());
}

#[test]
fn test_three_in_a_row_keeps_shared_rings() {
    let mut mesh = PolyMesh::new();
    for z in 0..3 {
        mesh.add_cube(&Cube::at(0, 0, z));
    }
    assert_eq!(mesh.face_count(), 14);
    assert_eq!(mesh.vertex_count(), 16);
    let diag = mesh.diagnostics();
    assert_eq!(diag.euler_characteristic, 2);
    assert!(diag.is_closed());
}

#[test]
fn test_edge_contact_shares_vertices_but_not_edges() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0));
    mesh.add_cube(&Cube::at(0, 1, 1));
    assert_eq!(mesh.face_count(), 12);
    // Two vertices are shared along the contact edge.
    assert_eq!(mesh.vertex_count(), 14);
    // The contact edge is present twice, once per cube.
    assert_eq!(mesh.edge_count(), 24);
    assert!(mesh.validate(true).is_ok());
}

// ============================================================================
// Sharpness
// ============================================================================

#[test]
fn test_every_single_sharp_edge_survives_insertion() {
    for edge in CubeEdge::ALL {
        let mut mesh = PolyMesh::new();
        mesh.add_cube(&Cube::at(0, 0, 0).with_edge(edge, EdgeType::Sharp));
        let sharp = mesh.edges().iter().filter(|e| e.set_type == EdgeType::Sharp).count();
        assert_eq!(sharp, 1, "{edge:?}");
    }
}

#[test]
fn test_sharp_wins_over_rounded_on_shared_edge() {
    let mut mesh = PolyMesh::new();
    mesh.add_cube(&Cube::at(0, 0, 0).with_all_edges(EdgeType::Sharp));
    mesh.add_cube(&Cube::at(1, 0, 0));
    // The ring where the cubes meet now joins two rounded faces of the second
    // cube to the first, but keeps the sharpness it was given.
    let sharp = mesh.edges().iter().filter(|e| e.set_type == EdgeType::Sharp).count();
    assert_eq!(sharp, 12);
    assert_eq!(mesh.edge_count(), 20);
}

// ============================================================================
// Random add/remove sequences
// ============================================================================

#[test]
fn test_random_cube_edits_stay_consistent() {
    for seed in [1_u64, 7, 42] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mesh = PolyMesh::new();
        let mut cells: BTreeSet<[i32; 3]> = BTreeSet::new();

        for _ in 0..40 {
            let cell = [rng.random_range(0..3), rng.random_range(0..3), rng.random_range(0..2)];
            let [x, y, z] = cell;
            if cells.contains(&cell) {
                mesh.remove_cube(&Cube::at(x, y, z));
                cells.remove(&cell);
            } else {
                mesh.add_cube(&Cube::at(x, y, z));
                cells.insert(cell);
            }

            assert!(mesh.validate(true).is_ok(), "seed {seed}: {:?}", mesh.validate(true));
            assert_eq!(mesh.face_count(), exposed_faces(&cells), "seed {seed}");
        }
    }
}

#[test]
fn test_removing_every_cube_empties_the_mesh() {
    let mut mesh = PolyMesh::new();
    let cells = [[0, 0, 0], [1, 0, 0], [1, 1, 0], [1, 1, 1]];
    for [x, y, z] in cells {
        mesh.add_cube(&Cube::at(x, y, z));
    }
    for [x, y, z] in cells.iter().rev() {
        mesh.remove_cube(&Cube::at(*x, *y, *z));
    }
    assert!(mesh.is_empty());
    assert_eq!(mesh.edge_count(), 0);
    assert_eq!(mesh.vertex_count(), 0);
}
