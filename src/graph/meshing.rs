//! Meshing the structural graph: profile strips along edges, polygon fill at
//! junctions and caps on unused connectors.
//!
//! All faces wind clockwise seen from outside the solid.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::geom::{
    EdgeType, NUM_VERTS, ParameterisedProfile, Point3, PolyMesh, Tolerance, Transform, Vec2, VertType,
    make_transform, signed_angle,
};

use super::structural::{SEdgeIdx, SGraph, SNodeIdx, SNodeKind, StructuralError};

const STRUCTURE_UV_GROUP: u32 = 0;
const STRUCTURE_CHANNEL: u32 = 0;
/// Neighbouring ups closer to perpendicular than this take the roll from the
/// edge's half-twist flag.
const AMBIGUOUS_ROLL: f64 = 0.05;

/// Faces joining neighbouring connectors, as (first, second) vertex types.
const CONNECTOR_FACE_PAIRS: [(VertType, VertType); 4] = [
    (VertType::OverhangEndOuter, VertType::BarrierTopOuter),
    (VertType::OverhangEndInner, VertType::OverhangEndOuter),
    (VertType::BarrierTopInner, VertType::OverhangEndInner),
    (VertType::RoadbedInner, VertType::BarrierTopInner),
];

/// Add a polygon whose edge `i` (vertex `i` to `i + 1`) has type `types[i]`.
///
/// Coincident neighbours collapse, a loop touching itself is split into simple
/// loops, and loops with fewer than three vertices are dropped.
///
/// # Panics
/// When `points` and `types` differ in length.
pub fn add_poly(mesh: &mut PolyMesh, points: &[Point3], types: &[EdgeType]) {
    assert_eq!(points.len(), types.len(), "one edge type per point");
    let tol = Tolerance::MESH_VERTEX;
    let mut ring: Vec<(Point3, EdgeType)> = Vec::with_capacity(points.len());
    for (&p, &t) in points.iter().zip(types) {
        match ring.last_mut() {
            // The edge now leaves the earlier copy.
            Some(last) if tol.within_point3(last.0, p) => last.1 = t,
            _ => ring.push((p, t)),
        }
    }
    while ring.len() > 1 && tol.within_point3(ring[0].0, ring[ring.len() - 1].0) {
        ring.pop();
    }
    add_simple_loops(mesh, &ring);
}

/// [`add_poly`] with the winding reversed; each edge keeps its type.
pub fn add_poly_reversed(mesh: &mut PolyMesh, points: &[Point3], types: &[EdgeType]) {
    assert_eq!(points.len(), types.len(), "one edge type per point");
    let n = points.len();
    if n == 0 {
        return;
    }
    let rev_points: Vec<Point3> = points.iter().rev().copied().collect();
    let rev_types: Vec<EdgeType> = (0..n).map(|j| types[(2 * n - 2 - j) % n]).collect();
    add_poly(mesh, &rev_points, &rev_types);
}

fn add_simple_loops(mesh: &mut PolyMesh, ring: &[(Point3, EdgeType)]) {
    if ring.len() < 3 {
        return;
    }
    let tol = Tolerance::MESH_VERTEX;
    for i in 0..ring.len() {
        for j in i + 1..ring.len() {
            if tol.within_point3(ring[i].0, ring[j].0) {
                add_simple_loops(mesh, &ring[i..j]);
                let outer: Vec<(Point3, EdgeType)> = ring[j..].iter().chain(&ring[..i]).copied().collect();
                add_simple_loops(mesh, &outer);
                return;
            }
        }
    }
    let positions: Vec<Point3> = ring.iter().map(|(p, _)| *p).collect();
    let types: Vec<EdgeType> = ring.iter().map(|(_, t)| *t).collect();
    let uvs = vec![Vec2::ZERO; ring.len()];
    mesh.add_face(&positions, &uvs, STRUCTURE_UV_GROUP, &types, STRUCTURE_CHANNEL);
}

/// Canonical quarter -> profile quarter for a connector seen from its
/// junction. Canonically quarter 0 is upper and faces the next connector
/// counter-clockwise about the junction up.
fn quarter_map(inward: bool, rolled: bool) -> [usize; 4] {
    let mut map = [0, 1, 2, 3];
    if inward {
        map.swap(0, 3);
        map.swap(1, 2);
    }
    if rolled {
        map.swap(0, 2);
        map.swap(1, 3);
    }
    map
}

/// One connector around a junction.
struct JunctionSide {
    transform: Transform,
    profile: Arc<ParameterisedProfile>,
    map: [usize; 4],
}

impl JunctionSide {
    fn vert(&self, vert_type: VertType, quarter: usize) -> Point3 {
        self.profile
            .transformed_vert_of_type(vert_type, self.map[quarter], &self.transform)
    }

    /// Overhangs of the two canonical quarters meet.
    fn closes(&self, qa: usize, qb: usize) -> bool {
        self.profile.overhangs_meet(self.map[qa], self.map[qb])
    }
}

fn auto_types(len: usize) -> Vec<EdgeType> {
    vec![EdgeType::Auto; len]
}

impl SGraph {
    /// Extrude every profiled edge and fill every junction into `mesh`.
    ///
    /// Transforms are rebuilt from the current frames first, so this can run
    /// again after the nodes move.
    pub fn make_mesh(&mut self, mesh: &mut PolyMesh) -> Result<(), StructuralError> {
        for node in &mut self.nodes {
            node.refresh_transform();
        }
        self.orient_profile_chains();
        for e in 0..self.edges.len() {
            self.add_edge_strip(SEdgeIdx(e), mesh);
        }
        for j in 0..self.nodes.len() {
            if self.nodes[j].kind == SNodeKind::Junction {
                self.fill_junction(SNodeIdx(j), mesh)?;
            }
        }
        log::debug!(
            "structure mesh: {} faces, {} verts",
            mesh.face_count(),
            mesh.vertex_count()
        );
        Ok(())
    }

    /// Fix the meshing transform of every profiled node before any strip is
    /// built.
    ///
    /// Profiled nodes form simple paths (connector, connections, connector).
    /// Each path is walked outward from one anchor, a connection node when it
    /// has one, and every other node is yawed and rolled once to agree with
    /// the neighbour it was reached from. Connectors end up absorbing the
    /// corrections.
    pub(crate) fn orient_profile_chains(&mut self) {
        let n = self.nodes.len();
        let mut oriented = vec![false; n];
        let anchors: Vec<SNodeIdx> = (0..n)
            .filter(|&i| self.nodes[i].kind == SNodeKind::Connection)
            .chain((0..n).filter(|&i| self.nodes[i].kind == SNodeKind::JunctionConnector))
            .map(SNodeIdx)
            .collect();
        for anchor in anchors {
            if oriented[anchor.0] || self.nodes[anchor.0].profile.is_none() {
                continue;
            }
            oriented[anchor.0] = true;
            let mut stack = vec![anchor];
            while let Some(node) = stack.pop() {
                for k in 0..self.nodes[node.0].edges.len() {
                    let edge = self.edges[self.nodes[node.0].edges[k].0];
                    let next = edge.other(node);
                    if oriented[next.0] || self.nodes[next.0].profile.is_none() {
                        continue;
                    }
                    self.align_to(next, node, edge.rolling);
                    oriented[next.0] = true;
                    stack.push(next);
                }
            }
        }
    }

    /// Yaw `target` half a turn when its forward opposes `reference`'s, then
    /// roll it half a turn when the ups still disagree.
    fn align_to(&mut self, target: SNodeIdx, reference: SNodeIdx, twisted: bool) {
        let reference = self.nodes[reference.0].transform;
        let node = &mut self.nodes[target.0];
        if node.transform.x_axis().dot(reference.x_axis()) < 0.0 {
            node.transform = node.transform.compose(Transform::rotate_z(PI));
            node.flipped = true;
        }
        let agreement = node.transform.z_axis().dot(reference.z_axis());
        let roll = if agreement.abs() > AMBIGUOUS_ROLL {
            agreement < 0.0
        } else {
            twisted
        };
        if roll {
            node.transform = node.transform.compose(Transform::rotate_x(PI));
            node.rolled = true;
        }
    }

    fn add_edge_strip(&self, edge: SEdgeIdx, mesh: &mut PolyMesh) {
        let (from, to) = (self.edges[edge.0].from, self.edges[edge.0].to);
        let (Some(from_profile), Some(to_profile)) = (&self.nodes[from.0].profile, &self.nodes[to.0].profile)
        else {
            return;
        };

        let from_t = self.nodes[from.0].transform;
        let to_t = self.nodes[to.0].transform;
        let ahead = (to_t.origin() - from_t.origin()).dot(from_t.x_axis()) >= 0.0;
        for i in 0..NUM_VERTS {
            let prev = (i + NUM_VERTS - 1) % NUM_VERTS;
            let quad = [
                from_profile.transformed_vert(i, &from_t),
                from_profile.transformed_vert(prev, &from_t),
                to_profile.transformed_vert(prev, &to_t),
                to_profile.transformed_vert(i, &to_t),
            ];
            let types = [
                EdgeType::Auto,
                from_profile.outgoing_edge_type(prev),
                EdgeType::Auto,
                from_profile.outgoing_edge_type(i),
            ];
            if ahead {
                add_poly_reversed(mesh, &quad, &types);
            } else {
                add_poly(mesh, &quad, &types);
            }
        }
    }

    /// Close the profile outline of a connector; `facing_out` selects the
    /// side facing away from the junction.
    fn cap_connector(&self, connector: SNodeIdx, mesh: &mut PolyMesh, facing_out: bool) {
        let node = &self.nodes[connector.0];
        let Some(profile) = &node.profile else {
            return;
        };
        let t = node.transform;
        let points: Vec<Point3> = (0..NUM_VERTS).map(|i| profile.transformed_vert(i, &t)).collect();
        let forward_out = t.x_axis().dot(self.outward_direction(connector)) >= 0.0;
        if forward_out == facing_out {
            add_poly(mesh, &points, &auto_types(NUM_VERTS));
        } else {
            add_poly_reversed(mesh, &points, &auto_types(NUM_VERTS));
        }
    }

    fn fill_junction(&self, junction: SNodeIdx, mesh: &mut PolyMesh) -> Result<(), StructuralError> {
        let connectors = self.connectors_of(junction);
        for &c in &connectors {
            if self.nodes[c.0].edges.len() < 2 {
                self.cap_connector(c, mesh, true);
            }
        }
        if connectors.len() < 2 {
            for &c in &connectors {
                self.cap_connector(c, mesh, false);
            }
            return Ok(());
        }

        let up = self.nodes[junction.0].up;
        let first_axis = self.outward_direction(connectors[0]);
        let mut ordered: Vec<(f64, SNodeIdx)> = connectors
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let angle = if i == 0 {
                    0.0
                } else {
                    signed_angle(first_axis, self.outward_direction(c), up, true)
                };
                (angle, c)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let sides: Vec<JunctionSide> = ordered
            .iter()
            .filter_map(|&(_, c)| {
                let node = &self.nodes[c.0];
                let profile = Arc::clone(node.profile.as_ref()?);
                // The meshing transform is this frame yawed by `flipped` and
                // rolled by `rolled`.
                let frame = make_transform(node.position, node.up, node.forward);
                let inward = (frame.x_axis().dot(self.outward_direction(c)) < 0.0) != node.flipped;
                let rolled = (frame.z_axis().dot(up) < 0.0) != node.rolled;
                Some(JunctionSide {
                    transform: node.transform,
                    profile,
                    map: quarter_map(inward, rolled),
                })
            })
            .collect();

        let ceiling_top = uniform_ceiling(&sides, junction, 0, 3)?;
        let ceiling_bottom = uniform_ceiling(&sides, junction, 1, 2)?;

        let ring = |vt: VertType, qa: usize, qb: usize| -> Vec<Point3> {
            sides.iter().flat_map(|s| [s.vert(vt, qa), s.vert(vt, qb)]).collect()
        };

        let top = ring(VertType::RoadbedInner, 3, 0);
        add_poly_reversed(mesh, &top, &auto_types(top.len()));
        let bottom = ring(VertType::RoadbedInner, 2, 1);
        add_poly(mesh, &bottom, &auto_types(bottom.len()));

        if ceiling_top {
            let inner = ring(VertType::OverhangEndInner, 3, 0);
            add_poly(mesh, &inner, &auto_types(inner.len()));
            let roof = ring(VertType::OverhangEndOuter, 3, 0);
            add_poly_reversed(mesh, &roof, &auto_types(roof.len()));
        }
        if ceiling_bottom {
            let inner = ring(VertType::OverhangEndInner, 2, 1);
            add_poly_reversed(mesh, &inner, &auto_types(inner.len()));
            let floor = ring(VertType::OverhangEndOuter, 2, 1);
            add_poly(mesh, &floor, &auto_types(floor.len()));
        }

        let n = sides.len();
        for i in 0..n {
            let p = &sides[(i + n - 1) % n];
            let c = &sides[i];

            let outer = [
                c.vert(VertType::BarrierTopOuter, 3),
                p.vert(VertType::BarrierTopOuter, 0),
                p.vert(VertType::RoadbedOuter, 0),
                p.vert(VertType::RoadbedOuter, 1),
                p.vert(VertType::BarrierTopOuter, 1),
                c.vert(VertType::BarrierTopOuter, 2),
                c.vert(VertType::RoadbedOuter, 2),
                c.vert(VertType::RoadbedOuter, 3),
            ];
            add_poly_reversed(mesh, &outer, &auto_types(outer.len()));

            for (first, second) in CONNECTOR_FACE_PAIRS {
                let lip = first == VertType::OverhangEndInner;
                if !(lip && ceiling_top) {
                    let upper = [c.vert(first, 3), p.vert(first, 0), p.vert(second, 0), c.vert(second, 3)];
                    add_poly_reversed(mesh, &upper, &auto_types(4));
                }
                if !(lip && ceiling_bottom) {
                    let lower = [c.vert(second, 2), p.vert(second, 1), p.vert(first, 1), c.vert(first, 2)];
                    add_poly_reversed(mesh, &lower, &auto_types(4));
                }
            }
        }
        Ok(())
    }
}

/// Whether every connector closes the side made of quarters `qa`/`qb`.
fn uniform_ceiling(
    sides: &[JunctionSide],
    junction: SNodeIdx,
    qa: usize,
    qb: usize,
) -> Result<bool, StructuralError> {
    let closed = sides.iter().filter(|s| s.closes(qa, qb)).count();
    if closed == 0 {
        Ok(false)
    } else if closed == sides.len() {
        Ok(true)
    } else {
        Err(StructuralError::MixedJunctionCeiling { node: junction })
    }
}
