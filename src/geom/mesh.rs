//! Topological polygon mesh with incremental face insertion.
//!
//! [`PolyMesh`] keeps vertices, edges and faces in packed arenas. Faces are
//! stored with their vertex loop rotated so the lowest vertex index comes
//! first, which lets a face be found (or its reverse cancelled) by comparing
//! vertex sequences. Each edge records the face that walks it start→end
//! (`forward_face`) and the face that walks it end→start (`backward_face`).
//!
//! Removing anything re-packs the arenas and shifts every higher index down by
//! one. Any [`VertIdx`], [`EdgeIdx`] or [`FaceIdx`] held across a removal is
//! stale.
//!
//! # Example
//! ```ignore
//! use pgc_engine::geom::{Cube, PolyMesh};
//!
//! let mut mesh = PolyMesh::with_auto_sharp_angle(20.0);
//! mesh.add_cube(&Cube::at(0, 0, 0));
//! mesh.add_cube(&Cube::at(0, 0, 1));
//! assert_eq!(mesh.face_count(), 10);
//! let smooth = mesh.subdivide_n(2);
//! smooth.check_consistent(true);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::core::{Point3, Tolerance, Vec2};

// ============================================================================
// Index handles
// ============================================================================

macro_rules! mesh_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);

        impl $name {
            #[must_use]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

mesh_index!(
    /// Vertex handle. Invalidated by any removal.
    VertIdx
);
mesh_index!(
    /// Edge handle. Invalidated by any removal.
    EdgeIdx
);
mesh_index!(
    /// Face handle. Invalidated by any removal.
    FaceIdx
);

// ============================================================================
// Edge classification
// ============================================================================

/// Sharpness requested for (or resolved on) an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgeType {
    Rounded,
    Sharp,
    /// Decided from the dihedral angle when subdividing.
    Auto,
    #[default]
    Unset,
}

impl EdgeType {
    /// Combine two requests for the same edge.
    ///
    /// Precedence is `Unset < Auto < Rounded < Sharp`, so a Sharp request is
    /// never downgraded.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unset | Self::Auto | Self::Rounded, Self::Sharp) | (Self::Sharp, _) => Self::Sharp,
            (Self::Unset | Self::Auto, Self::Rounded) | (Self::Rounded, _) => Self::Rounded,
            (Self::Unset, Self::Auto) | (Self::Auto, _) => Self::Auto,
            (Self::Unset, Self::Unset) => Self::Unset,
        }
    }
}

// ============================================================================
// Vertices, edges, faces
// ============================================================================

/// Per-UV-group texture coordinates of one vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiUv(BTreeMap<u32, Vec2>);

impl MultiUv {
    #[must_use]
    pub fn single(group: u32, uv: Vec2) -> Self {
        let mut map = BTreeMap::new();
        map.insert(group, uv);
        Self(map)
    }

    #[must_use]
    pub fn get(&self, group: u32) -> Option<Vec2> {
        self.0.get(&group).copied()
    }

    #[must_use]
    pub fn contains(&self, group: u32) -> bool {
        self.0.contains_key(&group)
    }

    pub fn insert(&mut self, group: u32, uv: Vec2) {
        self.0.insert(group, uv);
    }

    /// UV of the lowest group, if any.
    #[must_use]
    pub fn first(&self) -> Option<Vec2> {
        self.0.values().next().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Vec2)> + '_ {
        self.0.iter().map(|(g, uv)| (*g, *uv))
    }

    /// Midpoint of two UV sets. Groups present in only one side keep that
    /// side's value.
    #[must_use]
    pub fn midpoint(a: &Self, b: &Self) -> Self {
        let mut out = a.clone();
        for (group, uv) in b.iter() {
            out.0
                .entry(group)
                .and_modify(|existing| *existing = existing.lerp(uv, 0.5))
                .or_insert(uv);
        }
        out
    }
}

/// A position together with the UV it carries in one UV group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawVert {
    pub pos: Point3,
    pub uv: Vec2,
}

impl RawVert {
    #[must_use]
    pub const fn new(pos: Point3, uv: Vec2) -> Self {
        Self { pos, uv }
    }

    #[must_use]
    pub fn tolerance_eq(&self, other: &Self, tol: Tolerance) -> bool {
        tol.within_point3(self.pos, other.pos) && tol.within_vec2(self.uv, other.uv)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshVert {
    pub pos: Point3,
    pub uvs: MultiUv,
    pub edges: Vec<EdgeIdx>,
    pub faces: Vec<FaceIdx>,
}

impl MeshVert {
    fn new(pos: Point3) -> Self {
        Self {
            pos,
            uvs: MultiUv::default(),
            edges: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Position plus the UV of `group`.
    ///
    /// # Panics
    /// When the vertex has no UV in that group.
    #[must_use]
    pub fn raw(&self, group: u32) -> RawVert {
        let uv = self
            .uvs
            .get(group)
            .unwrap_or_else(|| panic!("vertex has no uv for group {group}"));
        RawVert::new(self.pos, uv)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshEdge {
    pub start: VertIdx,
    pub end: VertIdx,
    /// Face walking this edge start→end.
    pub forward_face: Option<FaceIdx>,
    /// Face walking this edge end→start.
    pub backward_face: Option<FaceIdx>,
    pub set_type: EdgeType,
    pub effective_type: EdgeType,
}

impl MeshEdge {
    fn new(start: VertIdx, end: VertIdx) -> Self {
        Self {
            start,
            end,
            forward_face: None,
            backward_face: None,
            set_type: EdgeType::Unset,
            effective_type: EdgeType::Unset,
        }
    }

    #[must_use]
    pub fn contains(&self, v: VertIdx) -> bool {
        self.start == v || self.end == v
    }

    #[must_use]
    pub fn connects(&self, a: VertIdx, b: VertIdx) -> bool {
        (self.start == a && self.end == b) || (self.start == b && self.end == a)
    }

    /// # Panics
    /// When `v` is not an endpoint.
    #[must_use]
    pub fn other_vert(&self, v: VertIdx) -> VertIdx {
        assert!(self.contains(v), "vertex {v} is not on this edge");
        if self.start == v { self.end } else { self.start }
    }

    #[must_use]
    pub fn contains_face(&self, f: FaceIdx) -> bool {
        self.forward_face == Some(f) || self.backward_face == Some(f)
    }

    #[must_use]
    pub fn other_face(&self, f: FaceIdx) -> Option<FaceIdx> {
        if self.forward_face == Some(f) {
            self.backward_face
        } else if self.backward_face == Some(f) {
            self.forward_face
        } else {
            None
        }
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        usize::from(self.forward_face.is_some()) + usize::from(self.backward_face.is_some())
    }

    /// Exactly one face slot is filled.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.face_count() == 1
    }

    /// True when a face walking `from → other end` could use this edge.
    fn slot_free_from(&self, from: VertIdx) -> bool {
        if self.start == from {
            self.forward_face.is_none()
        } else {
            self.end == from && self.backward_face.is_none()
        }
    }

    fn add_face(&mut self, face: FaceIdx, start_vert: VertIdx) {
        if start_vert == self.start {
            assert!(self.forward_face.is_none(), "forward slot already taken");
            self.forward_face = Some(face);
        } else {
            assert!(start_vert == self.end, "face does not walk this edge");
            assert!(self.backward_face.is_none(), "backward slot already taken");
            self.backward_face = Some(face);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshFace {
    /// Vertex loop, lowest index first.
    pub verts: Vec<VertIdx>,
    /// `edges[i]` joins `verts[i - 1]` and `verts[i]`.
    pub edges: Vec<EdgeIdx>,
    pub uv_group: u32,
    pub channel: u32,
}

// ============================================================================
// Errors
// ============================================================================

/// A broken topological invariant, reported by [`PolyMesh::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("edge {edge} references a vertex outside the mesh")]
    EdgeVertexOutOfRange { edge: usize },
    #[error("vertex {vert} does not list its edge {edge}")]
    EdgeMissingFromVertex { edge: usize, vert: usize },
    #[error("edge {edge} is open in a mesh expected to be closed")]
    OpenEdge { edge: usize },
    #[error("edge {edge} refers to face {face}, which does not list it")]
    EdgeFaceNotListed { edge: usize, face: usize },
    #[error("vertex {vert} has {faces} faces but {edges} edges")]
    FaceCountMismatch { vert: usize, faces: usize, edges: usize },
    #[error("vertex {vert} lists edge {edge}, which does not touch it")]
    VertEdgeNotIncident { vert: usize, edge: usize },
    #[error("vertex {vert} lists face {face}, which does not contain it")]
    VertFaceNotIncident { vert: usize, face: usize },
    #[error("face {face} has fewer than three unique vertices")]
    DegenerateFace { face: usize },
    #[error("face {face} does not start at its lowest vertex")]
    IrregularFace { face: usize },
    #[error("face {face} has no edge between vertices {from} and {to}")]
    MissingFaceEdge { face: usize, from: usize, to: usize },
    #[error("edge {edge} slot direction disagrees with face {face}")]
    EdgeDirectionMismatch { face: usize, edge: usize },
    #[error("vertex {vert} does not list face {face}")]
    FaceMissingFromVertex { face: usize, vert: usize },
    #[error("face {face} edge list is out of step with its vertex loop")]
    FaceEdgeListMismatch { face: usize },
}

// ============================================================================
// Vertex lookup
// ============================================================================

/// Uniform grid over vertex positions; cell size equals the vertex tolerance,
/// so a tolerance ball is covered by the 27 surrounding cells.
#[derive(Debug, Clone, Default)]
struct VertexLookup {
    cell: f64,
    cells: HashMap<(i64, i64, i64), Vec<VertIdx>>,
}

impl VertexLookup {
    fn new(cell: f64) -> Self {
        Self {
            cell: cell.max(1e-9),
            cells: HashMap::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key(&self, p: Point3) -> (i64, i64, i64) {
        (
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
            (p.z / self.cell).floor() as i64,
        )
    }

    fn insert(&mut self, idx: VertIdx, pos: Point3) {
        let key = self.key(pos);
        self.cells.entry(key).or_default().push(idx);
    }

    fn rebuild(&mut self, verts: &[MeshVert]) {
        self.cells.clear();
        for (i, v) in verts.iter().enumerate() {
            self.insert(VertIdx(i), v.pos);
        }
    }

    fn exact_cell(&self, pos: Point3) -> &[VertIdx] {
        self.cells
            .get(&self.key(pos))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn neighbourhood(&self, pos: Point3) -> Vec<VertIdx> {
        let (kx, ky, kz) = self.key(pos);
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(list) = self.cells.get(&(kx + dx, ky + dy, kz + dz)) {
                        out.extend_from_slice(list);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

// ============================================================================
// PolyMesh
// ============================================================================

/// Polygon mesh with vertex/edge/face adjacency.
#[derive(Debug, Clone)]
pub struct PolyMesh {
    pub(crate) verts: Vec<MeshVert>,
    pub(crate) edges: Vec<MeshEdge>,
    pub(crate) faces: Vec<MeshFace>,
    pub(crate) next_uv_group: u32,
    pub(crate) vertex_tolerance: Tolerance,
    pub(crate) cos_auto_sharp_angle: Option<f64>,
    /// False once faces were inserted that may pinch vertices together; the
    /// next subdivision splits shared vertices first.
    pub(crate) clean: bool,
    lookup: VertexLookup,
}

impl Default for PolyMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl PolyMesh {
    /// Empty mesh. `Auto` edges resolve to Rounded.
    #[must_use]
    pub fn new() -> Self {
        let vertex_tolerance = Tolerance::MESH_VERTEX;
        Self {
            verts: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
            next_uv_group: 0,
            vertex_tolerance,
            cos_auto_sharp_angle: None,
            clean: true,
            lookup: VertexLookup::new(vertex_tolerance.eps),
        }
    }

    /// Empty mesh whose `Auto` edges become Sharp when the faces either side
    /// meet at more than `degrees`.
    #[must_use]
    pub fn with_auto_sharp_angle(degrees: f64) -> Self {
        let mut mesh = Self::new();
        mesh.cos_auto_sharp_angle = Some(degrees.to_radians().cos());
        mesh
    }

    /// Empty mesh sharing this mesh's settings.
    #[must_use]
    pub(crate) fn empty_like(&self) -> Self {
        let mut mesh = Self::new();
        mesh.vertex_tolerance = self.vertex_tolerance;
        mesh.lookup = VertexLookup::new(self.vertex_tolerance.eps);
        mesh.cos_auto_sharp_angle = self.cos_auto_sharp_angle;
        mesh.next_uv_group = self.next_uv_group;
        mesh
    }

    pub fn clear(&mut self) {
        self.verts.clear();
        self.edges.clear();
        self.faces.clear();
        self.lookup.cells.clear();
        self.next_uv_group = 0;
        self.clean = true;
    }

    #[must_use]
    pub fn vertices(&self) -> &[MeshVert] {
        &self.verts
    }

    #[must_use]
    pub fn edges(&self) -> &[MeshEdge] {
        &self.edges
    }

    #[must_use]
    pub fn faces(&self) -> &[MeshFace] {
        &self.faces
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.clean
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Every edge has both face slots filled.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.edges.iter().all(|e| e.face_count() == 2)
    }

    /// Hand out a fresh UV group id.
    pub fn next_uv_group(&mut self) -> u32 {
        let group = self.next_uv_group;
        self.next_uv_group += 1;
        group
    }

    // ------------------------------------------------------------------------
    // Face insertion
    // ------------------------------------------------------------------------

    /// Insert a polygon, or cancel the existing face with the reverse loop.
    ///
    /// Returns the new (or already present) face, or `None` when the polygon
    /// annihilated an opposing face. `edge_types[i]` applies to the edge from
    /// vertex `i` to vertex `i + 1`.
    ///
    /// # Panics
    /// When the slices differ in length, fewer than three vertices remain, or
    /// two vertices collapse onto the same mesh vertex.
    pub fn add_face(
        &mut self,
        positions: &[Point3],
        uvs: &[Vec2],
        uv_group: u32,
        edge_types: &[EdgeType],
        channel: u32,
    ) -> Option<FaceIdx> {
        assert_eq!(positions.len(), uvs.len(), "one uv per vertex");
        let raw: Vec<RawVert> = positions
            .iter()
            .zip(uvs)
            .map(|(p, uv)| RawVert::new(*p, *uv))
            .collect();
        self.clean = false;
        self.add_raw_face(&raw, uv_group, edge_types, channel)
    }

    /// Insert a polygon without touching the clean flag.
    pub(crate) fn add_raw_face(
        &mut self,
        verts: &[RawVert],
        uv_group: u32,
        edge_types: &[EdgeType],
        channel: u32,
    ) -> Option<FaceIdx> {
        assert_eq!(verts.len(), edge_types.len(), "one edge type per vertex");
        let mut idxs: Vec<VertIdx> = verts.iter().map(|v| self.add_vert(*v, uv_group)).collect();
        let mut types = edge_types.to_vec();
        let shift = regularize(&mut idxs);
        types.rotate_left(shift);
        self.add_find_face(idxs, &types, uv_group, channel)
    }

    /// Remove the face whose loop is the exact reverse of `positions`.
    ///
    /// Returns false (and changes nothing) when no such face exists.
    pub fn cancel_existing_face(&mut self, positions: &[Point3]) -> bool {
        let mut idxs = Vec::with_capacity(positions.len());
        for p in positions {
            match self.find_vert(*p) {
                Some(v) => idxs.push(v),
                None => return false,
            }
        }
        regularize(&mut idxs);
        self.cancel_existing_reverse_face(&idxs)
    }

    fn add_find_face(
        &mut self,
        verts: Vec<VertIdx>,
        edge_types: &[EdgeType],
        uv_group: u32,
        channel: u32,
    ) -> Option<FaceIdx> {
        let n = verts.len();
        assert!(n >= 3, "a face needs at least three vertices");
        let mut sorted = verts.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), n, "face vertices must be unique");

        if self.cancel_existing_reverse_face(&verts) {
            return None;
        }
        if let Some(existing) = self.find_face_by_verts(&verts) {
            return Some(existing);
        }

        let face_idx = FaceIdx(self.faces.len());
        let mut edges = Vec::with_capacity(n);
        let mut prev = verts[n - 1];
        let mut prev_type = edge_types[n - 1];
        for (i, &v) in verts.iter().enumerate() {
            self.verts[v.0].faces.push(face_idx);
            let e = self.add_find_edge(prev, v);
            edges.push(e);
            let edge = &mut self.edges[e.0];
            edge.set_type = edge.set_type.merge(prev_type);
            edge.add_face(face_idx, prev);
            prev = v;
            prev_type = edge_types[i];
        }
        self.faces.push(MeshFace {
            verts,
            edges,
            uv_group,
            channel,
        });
        Some(face_idx)
    }

    fn cancel_existing_reverse_face(&mut self, verts: &[VertIdx]) -> bool {
        let mut reversed = Vec::with_capacity(verts.len());
        reversed.push(verts[0]);
        reversed.extend(verts[1..].iter().rev());
        match self.find_face_by_verts(&reversed) {
            Some(face) => {
                self.remove_face(face);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Face with exactly this (regularized) vertex loop.
    #[must_use]
    pub fn find_face_by_verts(&self, verts: &[VertIdx]) -> Option<FaceIdx> {
        let first = verts.first()?;
        self.verts
            .get(first.0)?
            .faces
            .iter()
            .copied()
            .find(|f| self.faces[f.0].verts == verts)
    }

    /// Edge between `v1` and `v2` that borders `face`.
    #[must_use]
    pub fn find_edge(&self, v1: VertIdx, v2: VertIdx, face: FaceIdx) -> Option<EdgeIdx> {
        self.verts[v1.0]
            .edges
            .iter()
            .copied()
            .filter(|e| {
                let edge = &self.edges[e.0];
                edge.connects(v1, v2) && edge.contains_face(face)
            })
            .min()
    }

    /// Every edge between `v1` and `v2`, in index order.
    #[must_use]
    pub fn find_edges_between(&self, v1: VertIdx, v2: VertIdx) -> Vec<EdgeIdx> {
        let mut out: Vec<EdgeIdx> = self.verts[v1.0]
            .edges
            .iter()
            .copied()
            .filter(|e| self.edges[e.0].connects(v1, v2))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Vertex at exactly `pos`.
    #[must_use]
    pub fn find_vert(&self, pos: Point3) -> Option<VertIdx> {
        self.lookup
            .exact_cell(pos)
            .iter()
            .copied()
            .filter(|v| self.verts[v.0].pos == pos)
            .min()
    }

    fn find_vert_in_group(&self, raw: RawVert, group: u32) -> Option<VertIdx> {
        let tol = self.vertex_tolerance;
        self.lookup.neighbourhood(raw.pos).into_iter().find(|v| {
            let vert = &self.verts[v.0];
            vert.uvs
                .get(group)
                .is_some_and(|uv| RawVert::new(vert.pos, uv).tolerance_eq(&raw, tol))
        })
    }

    fn add_vert(&mut self, raw: RawVert, group: u32) -> VertIdx {
        let idx = self
            .find_vert_in_group(raw, group)
            .or_else(|| self.find_vert(raw.pos))
            .unwrap_or_else(|| self.push_vert(raw.pos));
        self.verts[idx.0].uvs.insert(group, raw.uv);
        idx
    }

    pub(crate) fn push_vert(&mut self, pos: Point3) -> VertIdx {
        let idx = VertIdx(self.verts.len());
        self.verts.push(MeshVert::new(pos));
        self.lookup.insert(idx, pos);
        idx
    }

    /// Edge `v1 → v2` for a new face: reuse one whose matching slot is free,
    /// otherwise create it.
    fn add_find_edge(&mut self, v1: VertIdx, v2: VertIdx) -> EdgeIdx {
        let reusable = self.verts[v1.0]
            .edges
            .iter()
            .copied()
            .filter(|e| {
                let edge = &self.edges[e.0];
                edge.connects(v1, v2) && edge.face_count() < 2 && edge.slot_free_from(v1)
            })
            .min();
        if let Some(e) = reusable {
            return e;
        }
        let idx = EdgeIdx(self.edges.len());
        self.edges.push(MeshEdge::new(v1, v2));
        self.verts[v1.0].edges.push(idx);
        self.verts[v2.0].edges.push(idx);
        idx
    }

    // ------------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------------

    /// Remove a face, then merge the partial edges it leaves behind and purge
    /// unused edges and vertices. Invalidates all held indices.
    pub fn remove_face(&mut self, face: FaceIdx) {
        let shift = |f: &mut FaceIdx| {
            if f.0 > face.0 {
                f.0 -= 1;
            }
        };
        for vert in &mut self.verts {
            vert.faces.retain(|f| *f != face);
            vert.faces.iter_mut().for_each(shift);
        }
        for edge in &mut self.edges {
            for slot in [&mut edge.forward_face, &mut edge.backward_face] {
                if *slot == Some(face) {
                    *slot = None;
                } else if let Some(f) = slot {
                    shift(f);
                }
            }
        }
        self.faces.remove(face.0);

        self.merge_partial_edges();
        self.clean_up_redundant_edges();
    }

    /// Remove an edge that no face uses.
    ///
    /// # Panics
    /// When a face still references the edge.
    pub fn remove_edge(&mut self, edge: EdgeIdx) {
        assert_eq!(self.edges[edge.0].face_count(), 0, "edge {edge} still has faces");
        let shift = |e: &mut EdgeIdx| {
            if e.0 > edge.0 {
                e.0 -= 1;
            }
        };
        for vert in &mut self.verts {
            vert.edges.retain(|e| *e != edge);
            vert.edges.iter_mut().for_each(shift);
        }
        for face in &mut self.faces {
            assert!(!face.edges.contains(&edge), "face still lists edge {edge}");
            face.edges.iter_mut().for_each(shift);
        }
        self.edges.remove(edge.0);
    }

    /// Remove a vertex with no edges or faces.
    pub fn remove_vert(&mut self, vert: VertIdx) {
        self.remove_vert_keep_lookup(vert);
        self.lookup.rebuild(&self.verts);
    }

    fn remove_vert_keep_lookup(&mut self, vert: VertIdx) {
        let v = &self.verts[vert.0];
        assert!(v.edges.is_empty(), "vertex {vert} still has edges");
        assert!(v.faces.is_empty(), "vertex {vert} still has faces");
        let shift = |x: &mut VertIdx| {
            assert_ne!(*x, vert, "vertex {vert} is still referenced");
            if x.0 > vert.0 {
                x.0 -= 1;
            }
        };
        for edge in &mut self.edges {
            shift(&mut edge.start);
            shift(&mut edge.end);
        }
        for face in &mut self.faces {
            face.verts.iter_mut().for_each(shift);
        }
        self.verts.remove(vert.0);
    }

    /// Join pairs of partial edges between the same two vertices whose free
    /// slots complement each other.
    pub(crate) fn merge_partial_edges(&mut self) {
        for i in 0..self.edges.len() {
            if !self.edges[i].is_partial() {
                continue;
            }
            let to = EdgeIdx(i);
            let (start, end) = (self.edges[i].start, self.edges[i].end);
            for other in self.find_edges_between(start, end) {
                if !self.edges[i].is_partial() {
                    break;
                }
                if other != to && self.edges[other.0].is_partial() && self.can_merge(to, other) {
                    self.merge_edges(to, other);
                }
            }
        }
    }

    fn can_merge(&self, to: EdgeIdx, from: EdgeIdx) -> bool {
        let t = &self.edges[to.0];
        let f = &self.edges[from.0];
        let same_direction = t.start == f.start;
        let needs_forward = f.forward_face.is_some() == same_direction;
        if needs_forward {
            t.forward_face.is_none()
        } else {
            t.backward_face.is_none()
        }
    }

    /// Move the face of `from` onto `to`. `from` is left without faces.
    fn merge_edges(&mut self, to: EdgeIdx, from: EdgeIdx) {
        let source = self.edges[from.0].clone();
        let same_direction = self.edges[to.0].start == source.start;
        let moves = [(source.forward_face, true), (source.backward_face, false)];
        for (face, was_forward) in moves {
            let Some(face) = face else { continue };
            let target = &mut self.edges[to.0];
            if was_forward == same_direction {
                assert!(target.forward_face.is_none(), "merge target forward slot taken");
                target.forward_face = Some(face);
            } else {
                assert!(target.backward_face.is_none(), "merge target backward slot taken");
                target.backward_face = Some(face);
            }
            if let Some(slot) = self.faces[face.0].edges.iter_mut().find(|e| **e == from) {
                *slot = to;
            }
        }
        let target = &mut self.edges[to.0];
        target.set_type = target.set_type.merge(source.set_type);
        let emptied = &mut self.edges[from.0];
        emptied.forward_face = None;
        emptied.backward_face = None;
    }

    /// Remove edges without faces. Returns whether anything was removed.
    pub(crate) fn clean_up_redundant_edges(&mut self) -> bool {
        let mut removed = false;
        for i in (0..self.edges.len()).rev() {
            if self.edges[i].face_count() == 0 {
                self.remove_edge(EdgeIdx(i));
                removed = true;
            }
        }
        if removed {
            self.clean_up_redundant_verts();
        }
        removed
    }

    pub(crate) fn clean_up_redundant_verts(&mut self) {
        let mut removed = false;
        for i in (0..self.verts.len()).rev() {
            if self.verts[i].edges.is_empty() {
                self.remove_vert_keep_lookup(VertIdx(i));
                removed = true;
            }
        }
        if removed {
            self.lookup.rebuild(&self.verts);
        }
    }

    // ------------------------------------------------------------------------
    // Consistency
    // ------------------------------------------------------------------------

    /// Check every adjacency invariant. With `closed`, also require that no
    /// edge is open and each vertex has as many faces as edges.
    ///
    /// # Errors
    /// The first violated invariant.
    pub fn validate(&self, closed: bool) -> Result<(), TopologyError> {
        self.validate_edges(closed)?;
        self.validate_verts(closed)?;
        self.validate_faces()
    }

    /// [`validate`](Self::validate), panicking on failure.
    ///
    /// # Panics
    /// When the mesh is inconsistent.
    pub fn check_consistent(&self, closed: bool) {
        if let Err(err) = self.validate(closed) {
            panic!("mesh consistency check failed: {err}");
        }
    }

    /// Consistency check that only runs in debug builds.
    pub(crate) fn debug_check(&self, closed: bool) {
        if cfg!(debug_assertions) {
            self.check_consistent(closed);
        }
    }

    fn validate_edges(&self, closed: bool) -> Result<(), TopologyError> {
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.start.0 >= self.verts.len() || edge.end.0 >= self.verts.len() {
                return Err(TopologyError::EdgeVertexOutOfRange { edge: i });
            }
            for v in [edge.start, edge.end] {
                if !self.verts[v.0].edges.contains(&EdgeIdx(i)) {
                    return Err(TopologyError::EdgeMissingFromVertex { edge: i, vert: v.0 });
                }
            }
            if closed && edge.face_count() != 2 {
                return Err(TopologyError::OpenEdge { edge: i });
            }
            for face in [edge.forward_face, edge.backward_face].into_iter().flatten() {
                let listed = self
                    .faces
                    .get(face.0)
                    .is_some_and(|f| f.edges.contains(&EdgeIdx(i)));
                if !listed {
                    return Err(TopologyError::EdgeFaceNotListed { edge: i, face: face.0 });
                }
            }
        }
        Ok(())
    }

    fn validate_verts(&self, closed: bool) -> Result<(), TopologyError> {
        for (i, vert) in self.verts.iter().enumerate() {
            let idx = VertIdx(i);
            if closed && vert.faces.len() != vert.edges.len() {
                return Err(TopologyError::FaceCountMismatch {
                    vert: i,
                    faces: vert.faces.len(),
                    edges: vert.edges.len(),
                });
            }
            if let Some(e) = vert.edges.iter().find(|e| !self.edges[e.0].contains(idx)) {
                return Err(TopologyError::VertEdgeNotIncident { vert: i, edge: e.0 });
            }
            if let Some(f) = vert.faces.iter().find(|f| !self.faces[f.0].verts.contains(&idx)) {
                return Err(TopologyError::VertFaceNotIncident { vert: i, face: f.0 });
            }
        }
        Ok(())
    }

    fn validate_faces(&self) -> Result<(), TopologyError> {
        for (i, face) in self.faces.iter().enumerate() {
            let idx = FaceIdx(i);
            let mut unique = face.verts.clone();
            unique.sort_unstable();
            unique.dedup();
            if unique.len() < 3 || unique.len() != face.verts.len() {
                return Err(TopologyError::DegenerateFace { face: i });
            }
            if face.verts[0] != unique[0] {
                return Err(TopologyError::IrregularFace { face: i });
            }
            if face.edges.len() != face.verts.len() {
                return Err(TopologyError::FaceEdgeListMismatch { face: i });
            }
            let mut prev = face.verts[face.verts.len() - 1];
            for &v in &face.verts {
                let Some(e) = self.find_edge(prev, v, idx) else {
                    return Err(TopologyError::MissingFaceEdge {
                        face: i,
                        from: prev.0,
                        to: v.0,
                    });
                };
                let edge = &self.edges[e.0];
                let forward_ok = (edge.start == prev) == (edge.forward_face == Some(idx));
                let backward_ok = (edge.end == prev) == (edge.backward_face == Some(idx));
                if !forward_ok || !backward_ok || !face.edges.contains(&e) {
                    return Err(TopologyError::EdgeDirectionMismatch { face: i, edge: e.0 });
                }
                if !self.verts[v.0].faces.contains(&idx) {
                    return Err(TopologyError::FaceMissingFromVertex { face: i, vert: v.0 });
                }
                prev = v;
            }
        }
        Ok(())
    }
}

/// Rotate a vertex loop so the lowest index is first. Returns the rotation,
/// for callers that keep per-vertex data alongside.
pub(crate) fn regularize(verts: &mut [VertIdx]) -> usize {
    let start = verts
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| **v)
        .map_or(0, |(i, _)| i);
    verts.rotate_left(start);
    start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(z: f64, flip: bool) -> Vec<Point3> {
        let mut q = vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ];
        if flip {
            q.reverse();
        }
        q
    }

    fn add(mesh: &mut PolyMesh, pts: &[Point3]) -> Option<FaceIdx> {
        let uvs = vec![Vec2::ZERO; pts.len()];
        let types = vec![EdgeType::Rounded; pts.len()];
        mesh.add_face(pts, &uvs, 0, &types, 0)
    }

    #[test]
    fn test_edge_type_merge_precedence() {
        use EdgeType::{Auto, Rounded, Sharp, Unset};
        assert_eq!(Unset.merge(Auto), Auto);
        assert_eq!(Auto.merge(Rounded), Rounded);
        assert_eq!(Rounded.merge(Auto), Rounded);
        assert_eq!(Rounded.merge(Sharp), Sharp);
        assert_eq!(Sharp.merge(Rounded), Sharp);
        assert_eq!(Sharp.merge(Unset), Sharp);
        assert_eq!(Unset.merge(Unset), Unset);
    }

    #[test]
    fn test_regularize_rotates_data_alongside() {
        let mut verts = vec![VertIdx(5), VertIdx(2), VertIdx(7)];
        let mut data = vec!['a', 'b', 'c'];
        data.rotate_left(regularize(&mut verts));
        assert_eq!(verts, vec![VertIdx(2), VertIdx(7), VertIdx(5)]);
        assert_eq!(data, vec!['b', 'c', 'a']);
    }

    #[test]
    fn test_single_face_is_open_but_consistent() {
        let mut mesh = PolyMesh::new();
        let face = add(&mut mesh, &quad(0.0, false));
        assert_eq!(face, Some(FaceIdx(0)));
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.edge_count(), 4);
        mesh.check_consistent(false);
        assert!(!mesh.is_closed());
        assert!(mesh.validate(true).is_err());
    }

    #[test]
    fn test_same_face_twice_is_deduplicated() {
        let mut mesh = PolyMesh::new();
        let first = add(&mut mesh, &quad(0.0, false));
        let mut rotated = quad(0.0, false);
        rotated.rotate_left(2);
        let second = add(&mut mesh, &rotated);
        assert_eq!(first, second);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_reverse_face_cancels_and_cleans_up() {
        let mut mesh = PolyMesh::new();
        add(&mut mesh, &quad(0.0, false));
        let result = add(&mut mesh, &quad(0.0, true));
        assert_eq!(result, None);
        assert_eq!(mesh.face_count(), 0);
        assert_eq!(mesh.edge_count(), 0);
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn test_cancel_existing_face_requires_reverse() {
        let mut mesh = PolyMesh::new();
        add(&mut mesh, &quad(0.0, false));
        assert!(!mesh.cancel_existing_face(&quad(0.0, false)));
        assert!(!mesh.cancel_existing_face(&quad(3.0, true)));
        assert!(mesh.cancel_existing_face(&quad(0.0, true)));
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_vertices_within_tolerance_are_shared() {
        let mut mesh = PolyMesh::new();
        add(&mut mesh, &quad(0.0, false));
        let nudged: Vec<Point3> = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(1.0002, 1.0, 0.0),
        ]
        .to_vec();
        add(&mut mesh, &nudged);
        assert_eq!(mesh.vertex_count(), 6);
        // The shared boundary became one closed-on-both-sides edge.
        let shared = mesh.find_edges_between(
            mesh.find_vert(Point3::new(1.0, 0.0, 0.0)).unwrap(),
            mesh.find_vert(Point3::new(1.0, 1.0, 0.0)).unwrap(),
        );
        assert_eq!(shared.len(), 1);
        assert_eq!(mesh.edges()[shared[0].0].face_count(), 2);
        mesh.check_consistent(false);
    }

    #[test]
    fn test_uv_groups_keep_separate_coordinates() {
        let mut mesh = PolyMesh::new();
        let pts = quad(0.0, false);
        let types = vec![EdgeType::Rounded; 4];
        mesh.add_face(&pts, &[Vec2::new(0.0, 0.0); 4], 0, &types, 0);
        let other = [pts[1], pts[0], Point3::new(0.0, -1.0, 0.0), Point3::new(1.0, -1.0, 0.0)];
        mesh.add_face(&other, &[Vec2::new(0.5, 0.5); 4], 1, &types, 0);
        let v = mesh.find_vert(pts[0]).unwrap();
        let uvs = &mesh.vertices()[v.0].uvs;
        assert_eq!(uvs.get(0), Some(Vec2::new(0.0, 0.0)));
        assert_eq!(uvs.get(1), Some(Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn test_sharp_request_survives_later_rounded() {
        let mut mesh = PolyMesh::new();
        let pts = quad(0.0, false);
        let uvs = [Vec2::ZERO; 4];
        let mut types = [EdgeType::Rounded; 4];
        types[0] = EdgeType::Sharp;
        mesh.add_face(&pts, &uvs, 0, &types, 0);
        let other = [pts[1], pts[0], Point3::new(0.0, -1.0, 0.0), Point3::new(1.0, -1.0, 0.0)];
        mesh.add_face(&other, &uvs, 0, &[EdgeType::Rounded; 4], 0);
        let sharp = mesh.edges().iter().filter(|e| e.set_type == EdgeType::Sharp).count();
        assert_eq!(sharp, 1);
    }

    #[test]
    #[should_panic(expected = "face vertices must be unique")]
    fn test_collapsing_vertices_panic() {
        let mut mesh = PolyMesh::new();
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        add(&mut mesh, &pts);
    }

    #[test]
    fn test_remove_edge_shifts_indices() {
        let mut mesh = PolyMesh::new();
        let a = mesh.push_vert(Point3::new(0.0, 0.0, 0.0));
        let b = mesh.push_vert(Point3::new(1.0, 0.0, 0.0));
        let c = mesh.push_vert(Point3::new(2.0, 0.0, 0.0));
        let e0 = mesh.add_find_edge(a, b);
        let e1 = mesh.add_find_edge(b, c);
        assert_eq!((e0, e1), (EdgeIdx(0), EdgeIdx(1)));
        mesh.remove_edge(e0);
        assert_eq!(mesh.vertices()[c.0].edges, vec![EdgeIdx(0)]);
        mesh.clean_up_redundant_verts();
        assert_eq!(mesh.vertex_count(), 2);
        assert_eq!(mesh.edges()[0].start, VertIdx(0));
        assert_eq!(mesh.find_vert(Point3::new(2.0, 0.0, 0.0)), Some(VertIdx(1)));
    }
}
