//! Crease-aware Catmull-Clark subdivision for [`PolyMesh`].
//!
//! Each step replaces every n-gon with n quads built from a vertex point, the
//! two adjacent edge points and the face point. Sharp edges keep their
//! midpoints and pin the vertices between them; vertices where three or more
//! sharp edges meet stay put.
//!
//! # Example
//! ```ignore
//! use pgc_engine::geom::{Cube, CubeEdge, EdgeType, PolyMesh};
//!
//! let mut mesh = PolyMesh::with_auto_sharp_angle(20.0);
//! mesh.add_cube(&Cube::at(0, 0, 0).with_edge(CubeEdge::TopFront, EdgeType::Sharp));
//!
//! // Four quads per original quad, per step
//! let smooth = mesh.subdivide_n(2);
//! assert_eq!(smooth.face_count(), 6 * 16);
//! ```

use super::core::{Point3, Vec2, Vec3};
use super::frame::newell_normal;
use super::mesh::{EdgeIdx, EdgeType, FaceIdx, MeshVert, MultiUv, PolyMesh, RawVert, VertIdx, regularize};

// ============================================================================
// Working points
// ============================================================================

/// New position plus the UVs it carries into the next mesh.
#[derive(Debug, Clone)]
struct WorkingVert {
    pos: Point3,
    uvs: MultiUv,
}

impl WorkingVert {
    fn raw(&self, group: u32) -> RawVert {
        let uv = self
            .uvs
            .get(group)
            .unwrap_or_else(|| panic!("subdivision point has no uv for group {group}"));
        RawVert::new(self.pos, uv)
    }
}

fn average_point(points: impl IntoIterator<Item = Point3>) -> Point3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0.0;
    for p in points {
        sum += p.to_vec3();
        count += 1.0;
    }
    if count == 0.0 {
        return Point3::ORIGIN;
    }
    Point3::from(sum / count)
}

// ============================================================================
// Subdivision
// ============================================================================

impl PolyMesh {
    /// One subdivision step. The result is clean and keeps this mesh's
    /// auto-sharp angle.
    ///
    /// # Panics
    /// When the mesh is not closed.
    #[must_use]
    pub fn subdivide(&self) -> PolyMesh {
        self.check_consistent(true);

        let mut work = if self.clean {
            self.clone()
        } else {
            self.split_shared_verts()
        };
        work.resolve_effective_edge_types();
        work.subdivide_inner()
    }

    /// `count` subdivision steps. `0` returns a copy.
    #[must_use]
    pub fn subdivide_n(&self, count: usize) -> PolyMesh {
        let mut current = self.clone();
        for _ in 0..count {
            current = current.subdivide();
        }
        current
    }

    fn subdivide_inner(&self) -> PolyMesh {
        assert!(self.clean, "subdivision needs split shared vertices");

        let face_points: Vec<WorkingVert> = self
            .faces
            .iter()
            .map(|face| {
                let raws: Vec<RawVert> = face.verts.iter().map(|v| self.verts[v.0].raw(face.uv_group)).collect();
                let pos = average_point(raws.iter().map(|r| r.pos));
                let uv_sum = raws.iter().fold(Vec2::ZERO, |acc, r| acc + r.uv);
                #[allow(clippy::cast_precision_loss)]
                let uv = uv_sum / raws.len() as f64;
                WorkingVert {
                    pos,
                    uvs: MultiUv::single(face.uv_group, uv),
                }
            })
            .collect();

        let edge_points: Vec<WorkingVert> = self
            .edges
            .iter()
            .map(|edge| {
                let start = &self.verts[edge.start.0];
                let end = &self.verts[edge.end.0];
                let pos = match (edge.effective_type, edge.forward_face, edge.backward_face) {
                    (EdgeType::Rounded, Some(ff), Some(bf)) => average_point([
                        start.pos,
                        end.pos,
                        face_points[ff.0].pos,
                        face_points[bf.0].pos,
                    ]),
                    _ => start.pos.lerp(end.pos, 0.5),
                };
                WorkingVert {
                    pos,
                    uvs: MultiUv::midpoint(&start.uvs, &end.uvs),
                }
            })
            .collect();

        let vert_points: Vec<WorkingVert> = self
            .verts
            .iter()
            .enumerate()
            .map(|(i, vert)| WorkingVert {
                pos: self.vertex_point(VertIdx(i), vert, &face_points, &edge_points),
                uvs: vert.uvs.clone(),
            })
            .collect();

        let mut out = self.empty_like();
        for (fi, face) in self.faces.iter().enumerate() {
            let face_idx = FaceIdx(fi);
            let n = face.verts.len();
            let group = face.uv_group;
            for i in 0..n {
                let vert = face.verts[i];
                let prev = face.verts[(i + n - 1) % n];
                let next = face.verts[(i + 1) % n];
                let (Some(prev_edge), Some(next_edge)) = (
                    self.find_edge(prev, vert, face_idx),
                    self.find_edge(vert, next, face_idx),
                ) else {
                    panic!("face {face_idx} is missing an edge at vertex {vert}");
                };
                let quad = [
                    vert_points[vert.0].raw(group),
                    edge_points[next_edge.0].raw(group),
                    face_points[fi].raw(group),
                    edge_points[prev_edge.0].raw(group),
                ];
                let types = [
                    self.edges[next_edge.0].set_type,
                    EdgeType::Rounded,
                    EdgeType::Rounded,
                    self.edges[prev_edge.0].set_type,
                ];
                out.add_raw_face(&quad, group, &types, face.channel);
            }
        }

        out.debug_check(true);
        out
    }

    fn vertex_point(
        &self,
        idx: VertIdx,
        vert: &MeshVert,
        face_points: &[WorkingVert],
        edge_points: &[WorkingVert],
    ) -> Point3 {
        let sharp: Vec<EdgeIdx> = vert
            .edges
            .iter()
            .copied()
            .filter(|e| self.edges[e.0].effective_type == EdgeType::Sharp)
            .collect();

        match sharp.len() {
            0 | 1 => {
                #[allow(clippy::cast_precision_loss)]
                let n = vert.faces.len() as f64;
                let f = average_point(vert.faces.iter().map(|f| face_points[f.0].pos)).to_vec3();
                // Closed meshes have as many edges as faces around a vertex.
                let r = vert
                    .edges
                    .iter()
                    .fold(Vec3::ZERO, |acc, e| acc + edge_points[e.0].pos.to_vec3())
                    / n;
                Point3::from((vert.pos.to_vec3() * (n - 3.0) + r * 2.0 + f) / n)
            }
            2 => {
                let ov0 = self.verts[self.edges[sharp[0].0].other_vert(idx).0].pos;
                let ov1 = self.verts[self.edges[sharp[1].0].other_vert(idx).0].pos;
                Point3::from(vert.pos.to_vec3() * 0.75 + ov0.to_vec3() * 0.125 + ov1.to_vec3() * 0.125)
            }
            _ => vert.pos,
        }
    }

    // ========================================================================
    // Edge type resolution
    // ========================================================================

    /// Fill in `effective_type` on every edge that has none yet.
    pub fn resolve_effective_edge_types(&mut self) {
        for i in 0..self.edges.len() {
            let resolved = self.resolved_edge_type(EdgeIdx(i));
            self.edges[i].effective_type = resolved;
        }
    }

    /// Effective type of `edge`, computing it when not resolved yet.
    ///
    /// `Auto` edges become Sharp when the faces either side meet at more than
    /// the auto-sharp angle; `Unset` edges count as Rounded.
    #[must_use]
    pub fn resolved_edge_type(&self, edge: EdgeIdx) -> EdgeType {
        let e = &self.edges[edge.0];
        if e.effective_type != EdgeType::Unset {
            return e.effective_type;
        }
        match e.set_type {
            EdgeType::Auto => self.auto_edge_type(edge),
            EdgeType::Unset => EdgeType::Rounded,
            other => other,
        }
    }

    fn auto_edge_type(&self, edge: EdgeIdx) -> EdgeType {
        let e = &self.edges[edge.0];
        let (Some(cos_limit), Some(ff), Some(bf)) = (self.cos_auto_sharp_angle, e.forward_face, e.backward_face) else {
            return EdgeType::Rounded;
        };
        let n1 = self.face_normal(ff);
        let n2 = self.face_normal(bf);
        if n1.dot(n2) < cos_limit {
            EdgeType::Sharp
        } else {
            EdgeType::Rounded
        }
    }

    /// Unit Newell normal of a (possibly non-planar) face.
    #[must_use]
    pub fn face_normal(&self, face: FaceIdx) -> Vec3 {
        let points: Vec<Vec3> = self.faces[face.0]
            .verts
            .iter()
            .map(|v| self.verts[v.0].pos.to_vec3())
            .collect();
        newell_normal(&points).normalized_or_zero()
    }

    // ========================================================================
    // Shared vertex splitting
    // ========================================================================

    /// Copy of this mesh where every vertex touched by more than one fan of
    /// faces is duplicated, one copy per fan. The copy is marked clean.
    ///
    /// # Panics
    /// When the mesh is not closed.
    #[must_use]
    pub fn split_shared_verts(&self) -> PolyMesh {
        let mut out = self.clone();
        out.clean = true;
        for i in 0..self.verts.len() {
            let pyramids = out.find_pyramids(VertIdx(i));
            if pyramids.len() > 1 {
                out.split_pyramids(&pyramids, VertIdx(i));
            }
        }
        out.debug_check(true);
        out
    }

    /// Cyclic fans of faces around `vert`, walked face→edge→face.
    #[must_use]
    pub fn find_pyramids(&self, vert: VertIdx) -> Vec<Vec<FaceIdx>> {
        let mut remaining: Vec<FaceIdx> = self.verts[vert.0].faces.clone();
        let mut pyramids = Vec::new();

        while let Some(&first) = remaining.first() {
            let mut fan = Vec::new();
            let mut current = first;
            let mut prev_edge: Option<EdgeIdx> = None;
            loop {
                fan.push(current);
                remaining.retain(|f| *f != current);

                let Some(edge) = self.faces[current.0]
                    .edges
                    .iter()
                    .copied()
                    .find(|e| Some(*e) != prev_edge && self.edges[e.0].contains(vert))
                else {
                    panic!("face {current} has no edge leaving vertex {vert}");
                };
                prev_edge = Some(edge);
                let Some(next) = self.edges[edge.0].other_face(current) else {
                    panic!("edge {edge} is open around vertex {vert}");
                };
                if next == first {
                    break;
                }
                current = next;
            }
            pyramids.push(fan);
        }
        pyramids
    }

    fn split_pyramids(&mut self, pyramids: &[Vec<FaceIdx>], vert: VertIdx) {
        let pos = self.verts[vert.0].pos;
        for pyramid in pyramids.iter().skip(1) {
            // Duplicate positions are fine here; the next subdivision makes
            // them unique again.
            let new_vert = self.push_vert(pos);

            for &face_idx in pyramid {
                let group = self.faces[face_idx.0].uv_group;
                if let Some(uv) = self.verts[vert.0].uvs.get(group) {
                    self.verts[new_vert.0].uvs.insert(group, uv);
                }
                self.verts[vert.0].faces.retain(|f| *f != face_idx);
                self.verts[new_vert.0].faces.push(face_idx);

                let face = &mut self.faces[face_idx.0];
                let Some(slot) = face.verts.iter_mut().find(|v| **v == vert) else {
                    panic!("face {face_idx} does not contain vertex {vert}");
                };
                *slot = new_vert;
                let shift = regularize(&mut face.verts);
                face.edges.rotate_left(shift);
            }

            // Each edge around the vertex joins two faces of one pyramid or
            // none, so checking one slot is enough.
            let moved: Vec<EdgeIdx> = self.verts[vert.0]
                .edges
                .iter()
                .copied()
                .filter(|e| self.edges[e.0].forward_face.is_some_and(|f| pyramid.contains(&f)))
                .collect();
            assert_eq!(moved.len(), pyramid.len(), "pyramid edge count differs from face count");
            for e in moved {
                let edge = &mut self.edges[e.0];
                if edge.start == vert {
                    edge.start = new_vert;
                } else {
                    edge.end = new_vert;
                }
                self.verts[vert.0].edges.retain(|x| *x != e);
                self.verts[new_vert.0].edges.push(e);
            }

            self.debug_check(true);
        }
    }

    // ========================================================================
    // Triangulation
    // ========================================================================

    /// Split every face into a fan of triangles around its centre. Outer
    /// edges keep their set type; the spokes are Rounded.
    #[must_use]
    pub fn triangulate(&self) -> PolyMesh {
        let mut out = self.empty_like();
        for (fi, face) in self.faces.iter().enumerate() {
            let group = face.uv_group;
            let raws: Vec<RawVert> = face.verts.iter().map(|v| self.verts[v.0].raw(group)).collect();
            let centre_pos = average_point(raws.iter().map(|r| r.pos));
            #[allow(clippy::cast_precision_loss)]
            let centre_uv = raws.iter().fold(Vec2::ZERO, |acc, r| acc + r.uv) / raws.len() as f64;
            let centre = RawVert::new(centre_pos, centre_uv);

            let n = face.verts.len();
            for i in 0..n {
                let prev = (i + n - 1) % n;
                let edge_type = self
                    .find_edge(face.verts[prev], face.verts[i], FaceIdx(fi))
                    .map_or(EdgeType::Rounded, |e| self.edges[e.0].set_type);
                out.add_raw_face(
                    &[raws[prev], raws[i], centre],
                    group,
                    &[edge_type, EdgeType::Rounded, EdgeType::Rounded],
                    face.channel,
                );
            }
        }
        out.debug_check(false);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> PolyMesh {
        let p = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let mut mesh = PolyMesh::new();
        let uvs = [Vec2::ZERO; 3];
        let types = [EdgeType::Rounded; 3];
        for tri in [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]] {
            mesh.add_face(&[p[tri[0]], p[tri[1]], p[tri[2]]], &uvs, 0, &types, 0);
        }
        mesh
    }

    #[test]
    fn test_tetrahedron_is_closed() {
        let mesh = tetrahedron();
        mesh.check_consistent(true);
        assert_eq!(mesh.face_count(), 4);
        assert_eq!(mesh.edge_count(), 6);
    }

    #[test]
    fn test_subdivide_quadruples_triangles_into_quads() {
        let mesh = tetrahedron();
        let once = mesh.subdivide();
        // One quad per corner.
        assert_eq!(once.face_count(), 12);
        assert!(once.is_clean());
        once.check_consistent(true);
        // V - E + F stays 2.
        let euler = once.vertex_count() as i64 - once.edge_count() as i64 + once.face_count() as i64;
        assert_eq!(euler, 2);
    }

    #[test]
    fn test_rounded_subdivision_shrinks_hull() {
        let mesh = tetrahedron();
        let smooth = mesh.subdivide_n(2);
        let far = smooth
            .vertices()
            .iter()
            .map(|v| v.pos.distance_to(Point3::new(1.0, 0.0, 0.0)))
            .fold(f64::INFINITY, f64::min);
        assert!(far > 1e-3, "corner should be pulled inwards");
    }

    #[test]
    fn test_unset_resolves_to_rounded() {
        let mut mesh = tetrahedron();
        mesh.resolve_effective_edge_types();
        assert!(mesh.edges().iter().all(|e| e.effective_type == EdgeType::Rounded));
    }

    #[test]
    fn test_auto_edges_follow_dihedral_angle() {
        let mut mesh = tetrahedron();
        for edge in &mut mesh.edges {
            edge.set_type = EdgeType::Auto;
        }
        let mut lenient = mesh.clone();
        lenient.cos_auto_sharp_angle = Some(150.0_f64.to_radians().cos());
        lenient.resolve_effective_edge_types();
        assert!(lenient.edges().iter().all(|e| e.effective_type == EdgeType::Rounded));

        mesh.cos_auto_sharp_angle = Some(20.0_f64.to_radians().cos());
        mesh.resolve_effective_edge_types();
        assert!(mesh.edges().iter().all(|e| e.effective_type == EdgeType::Sharp));
    }

    #[test]
    fn test_auto_without_angle_is_rounded() {
        let mut mesh = tetrahedron();
        for edge in &mut mesh.edges {
            edge.set_type = EdgeType::Auto;
        }
        mesh.resolve_effective_edge_types();
        assert!(mesh.edges().iter().all(|e| e.effective_type == EdgeType::Rounded));
    }

    #[test]
    fn test_all_sharp_keeps_corners() {
        let mut mesh = tetrahedron();
        for edge in &mut mesh.edges {
            edge.set_type = EdgeType::Sharp;
        }
        let once = mesh.subdivide();
        for corner in [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)] {
            assert!(once.find_vert(corner).is_some(), "corner {corner:?} moved");
        }
    }

    #[test]
    fn test_triangulate_fans_every_face() {
        let mesh = tetrahedron();
        let tris = mesh.triangulate();
        assert_eq!(tris.face_count(), 12);
        assert!(tris.faces().iter().all(|f| f.verts.len() == 3));
        tris.check_consistent(true);
    }

    #[test]
    fn test_face_normal_points_outwards() {
        let mesh = tetrahedron();
        let bottom = mesh
            .faces()
            .iter()
            .position(|f| f.verts.iter().all(|v| mesh.vertices()[v.0].pos.z == 0.0))
            .unwrap();
        let n = mesh.face_normal(FaceIdx(bottom));
        assert!((n - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-12);
    }
}
