//! Flattening a [`PolyMesh`] into indexed triangle buffers.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::core::{Point3, Tolerance, Vec2, Vec3};
use super::mesh::{EdgeIdx, EdgeType, PolyMesh, RawVert};

/// Triangle index list of one output channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriangleChannel {
    pub triangles: Vec<u32>,
}

/// Placement of one layout node in the finished structure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodePosition {
    pub position: Point3,
    pub up: Vec3,
}

/// Baked output: shared vertex/UV buffers, per-channel triangles and optional
/// debug edge lists (index pairs into `verts`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshResult {
    pub verts: Vec<Point3>,
    pub uvs: Vec<Vec2>,
    pub face_channels: Vec<TriangleChannel>,
    pub sharp_edges: Vec<[u32; 2]>,
    pub rounded_edges: Vec<[u32; 2]>,
    pub auto_edges: Vec<[u32; 2]>,
    pub nodes: Vec<NodePosition>,
}

impl MeshResult {
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.face_channels.iter().map(|c| c.triangles.len() / 3).sum()
    }

    /// Wavefront OBJ text, one group per channel.
    #[must_use]
    pub fn to_obj(&self) -> String {
        let mut out = String::new();
        for v in &self.verts {
            let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z);
        }
        for uv in &self.uvs {
            let _ = writeln!(out, "vt {:.6} {:.6}", uv.x, uv.y);
        }
        for (channel, set) in self.face_channels.iter().enumerate() {
            let _ = writeln!(out, "g channel_{channel}");
            for tri in set.triangles.chunks_exact(3) {
                let (a, b, c) = (tri[0] + 1, tri[1] + 1, tri[2] + 1);
                let _ = writeln!(out, "f {a}/{a} {b}/{b} {c}/{c}");
            }
        }
        for (name, edges) in [
            ("sharp_edges", &self.sharp_edges),
            ("rounded_edges", &self.rounded_edges),
            ("auto_edges", &self.auto_edges),
        ] {
            if edges.is_empty() {
                continue;
            }
            let _ = writeln!(out, "g {name}");
            for [a, b] in edges {
                let _ = writeln!(out, "l {} {}", a + 1, b + 1);
            }
        }
        out
    }
}

/// Which edge classification, if any, to emit as debug line lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugEdges {
    #[default]
    None,
    /// Resolved types (Sharp or Rounded).
    Effective,
    /// Requested types, Auto kept separate.
    Set,
}

/// Deduplicates baked vertices by position and UV within tolerance.
struct Baker<'a> {
    out: &'a mut MeshResult,
    tolerance: Tolerance,
    cells: HashMap<(i64, i64, i64), Vec<u32>>,
}

impl<'a> Baker<'a> {
    fn new(out: &'a mut MeshResult, tolerance: Tolerance) -> Self {
        let mut baker = Self {
            out,
            tolerance,
            cells: HashMap::new(),
        };
        for i in 0..baker.out.verts.len() {
            let key = baker.key(baker.out.verts[i]);
            baker.cells.entry(key).or_default().push(to_index(i));
        }
        baker
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, p: Point3) -> (i64, i64, i64) {
        let cell = self.tolerance.eps.max(1e-9);
        (
            (p.x / cell).floor() as i64,
            (p.y / cell).floor() as i64,
            (p.z / cell).floor() as i64,
        )
    }

    fn bake_vertex(&mut self, raw: RawVert) -> u32 {
        let (kx, ky, kz) = self.key(raw.pos);
        let mut found: Option<u32> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(list) = self.cells.get(&(kx + dx, ky + dy, kz + dz)) else {
                        continue;
                    };
                    for &i in list {
                        let existing = RawVert::new(self.out.verts[i as usize], self.out.uvs[i as usize]);
                        if existing.tolerance_eq(&raw, self.tolerance) {
                            found = Some(found.map_or(i, |f| f.min(i)));
                        }
                    }
                }
            }
        }
        if let Some(i) = found {
            return i;
        }
        let idx = to_index(self.out.verts.len());
        self.out.verts.push(raw.pos);
        self.out.uvs.push(raw.uv);
        self.cells.entry((kx, ky, kz)).or_default().push(idx);
        idx
    }

    fn ensure_channel(&mut self, channel: usize) {
        if self.out.face_channels.len() <= channel {
            self.out.face_channels.resize_with(channel + 1, TriangleChannel::default);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_index(i: usize) -> u32 {
    i as u32
}

impl PolyMesh {
    /// Triangulate every face into output channel 0.
    pub fn bake_all_channels_into_one(&self, out: &mut MeshResult, inside_out: bool, debug_edges: DebugEdges) {
        let mut baker = Baker::new(out, self.vertex_tolerance);
        self.bake_into_channel(&mut baker, inside_out, None, 0);
        self.bake_debug_edges(&mut baker, debug_edges);
    }

    /// Triangulate faces of channels `start..=end`, each into the output
    /// channel with the same number.
    pub fn bake_channels(
        &self,
        out: &mut MeshResult,
        inside_out: bool,
        debug_edges: DebugEdges,
        start: u32,
        end: u32,
    ) {
        let mut baker = Baker::new(out, self.vertex_tolerance);
        for channel in start..=end {
            self.bake_into_channel(&mut baker, inside_out, Some(channel), channel as usize);
        }
        self.bake_debug_edges(&mut baker, debug_edges);
    }

    fn bake_into_channel(&self, baker: &mut Baker<'_>, inside_out: bool, from: Option<u32>, to: usize) {
        baker.ensure_channel(to);
        for face in &self.faces {
            if from.is_some_and(|c| c != face.channel) {
                continue;
            }
            let idxs: Vec<u32> = face
                .verts
                .iter()
                .map(|v| baker.bake_vertex(self.verts[v.0].raw(face.uv_group)))
                .collect();
            assert!(idxs.len() > 2, "cannot bake a face with fewer than three vertices");

            let triangles = &mut baker.out.face_channels[to].triangles;
            let common = idxs[0];
            for pair in idxs[1..].windows(2) {
                let (prev, this) = (pair[0], pair[1]);
                if inside_out {
                    triangles.extend_from_slice(&[common, this, prev]);
                } else {
                    triangles.extend_from_slice(&[common, prev, this]);
                }
            }
        }
    }

    fn bake_debug_edges(&self, baker: &mut Baker<'_>, mode: DebugEdges) {
        if mode == DebugEdges::None {
            return;
        }
        for (i, edge) in self.edges.iter().enumerate() {
            let start = &self.verts[edge.start.0];
            let end = &self.verts[edge.end.0];
            let a = baker.bake_vertex(RawVert::new(start.pos, start.uvs.first().unwrap_or(Vec2::ZERO)));
            let b = baker.bake_vertex(RawVert::new(end.pos, end.uvs.first().unwrap_or(Vec2::ZERO)));
            let kind = match mode {
                DebugEdges::Effective => self.resolved_edge_type(EdgeIdx(i)),
                _ => edge.set_type,
            };
            let list = match kind {
                EdgeType::Sharp => &mut baker.out.sharp_edges,
                EdgeType::Rounded => &mut baker.out.rounded_edges,
                EdgeType::Auto | EdgeType::Unset => &mut baker.out.auto_edges,
            };
            list.push([a, b]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mesh(channel: u32) -> PolyMesh {
        let mut mesh = PolyMesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let mut types = [EdgeType::Rounded; 4];
        types[1] = EdgeType::Sharp;
        mesh.add_face(&pts, &uvs, 0, &types, channel);
        mesh
    }

    #[test]
    fn test_fan_winding_and_inside_out() {
        let mesh = square_mesh(0);
        let mut out = MeshResult::default();
        mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
        assert_eq!(out.verts.len(), 4);
        assert_eq!(out.face_channels[0].triangles, vec![0, 1, 2, 0, 2, 3]);

        let mut flipped = MeshResult::default();
        mesh.bake_all_channels_into_one(&mut flipped, true, DebugEdges::None);
        assert_eq!(flipped.face_channels[0].triangles, vec![0, 2, 1, 0, 3, 2]);
    }

    #[test]
    fn test_bake_channels_keeps_channel_numbers() {
        let mesh = square_mesh(2);
        let mut out = MeshResult::default();
        mesh.bake_channels(&mut out, false, DebugEdges::None, 0, 2);
        assert_eq!(out.face_channels.len(), 3);
        assert!(out.face_channels[0].triangles.is_empty());
        assert_eq!(out.face_channels[2].triangles.len(), 6);
        assert_eq!(out.triangle_count(), 2);
    }

    #[test]
    fn test_debug_edges_by_set_type() {
        let mesh = square_mesh(0);
        let mut out = MeshResult::default();
        mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::Set);
        assert_eq!(out.sharp_edges.len(), 1);
        assert_eq!(out.rounded_edges.len(), 3);
        assert!(out.auto_edges.is_empty());
        // Debug edges reuse the face vertices.
        assert_eq!(out.verts.len(), 4);
    }

    #[test]
    fn test_repeated_bake_shares_vertices() {
        let mesh = square_mesh(0);
        let mut out = MeshResult::default();
        mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
        mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::None);
        assert_eq!(out.verts.len(), 4);
        assert_eq!(out.face_channels[0].triangles.len(), 12);
    }

    #[test]
    fn test_obj_export_is_one_based() {
        let mesh = square_mesh(0);
        let mut out = MeshResult::default();
        mesh.bake_all_channels_into_one(&mut out, false, DebugEdges::Effective);
        let obj = out.to_obj();
        assert_eq!(obj.lines().filter(|l| l.starts_with("v ")).count(), 4);
        assert!(obj.contains("f 1/1 2/2 3/3"));
        assert!(obj.contains("g sharp_edges"));
    }
}
