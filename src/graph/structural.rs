//! Structural graph: the positioned and oriented skeleton of the structure.
//!
//! Every layout node becomes a [`SNodeKind::Junction`] surrounded by one
//! [`SNodeKind::JunctionConnector`] per connector. Layout edges are first kept
//! pending (the coarse phase only moves junctions) and then filled out with
//! [`SNodeKind::Connection`] nodes sampled along a cubic Bezier.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::geom::{
    CubicBezier, NodePosition, ParameterisedProfile, Point3, ProfileError, Transform, Vec3,
    make_transform, project_onto_plane, rotate_about, signed_angle,
};

use super::intermediate::IGraph;
use super::layout::LayoutGraph;
use super::profile_source::ProfileSource;

/// Connectors of one edge must be at least this far apart.
const MIN_CONNECTOR_DISTANCE: f64 = 1.0;
/// Dot product the transported end up must reach against the connector up.
const END_UP_AGREEMENT: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SNodeIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SEdgeIdx(pub usize);

impl fmt::Display for SNodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for SEdgeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SNodeKind {
    /// Centre of a layout node; has no profile.
    Junction,
    /// One connector of a layout node.
    JunctionConnector,
    /// Interior node of a filled-out edge.
    Connection,
}

#[derive(Debug, Clone)]
pub struct SNode {
    pub kind: SNodeKind,
    pub position: Point3,
    pub up: Vec3,
    pub forward: Vec3,
    /// Twist about `forward` relative to the projected parent up.
    pub rotation: f64,
    /// Placement used for meshing; yawed or rolled once per meshing pass to
    /// agree with its profile chain.
    pub transform: Transform,
    pub radius: f64,
    pub profile: Option<Arc<ParameterisedProfile>>,
    pub parent: Option<SNodeIdx>,
    pub edges: Vec<SEdgeIdx>,
    /// `transform` is yawed half a turn from the frame.
    pub flipped: bool,
    /// `transform` is rolled half a turn from the frame.
    pub rolled: bool,
    pub layout_node: Option<usize>,
}

impl SNode {
    fn new(
        kind: SNodeKind,
        position: Point3,
        up: Vec3,
        forward: Vec3,
        radius: f64,
        profile: Option<Arc<ParameterisedProfile>>,
    ) -> Self {
        Self {
            kind,
            position,
            up,
            forward,
            rotation: 0.0,
            transform: make_transform(position, up, forward),
            radius,
            profile,
            parent: None,
            edges: Vec::new(),
            flipped: false,
            rolled: false,
            layout_node: None,
        }
    }

    /// Rebuild the cached transform from position, up and forward and clear
    /// the meshing flags.
    pub fn refresh_transform(&mut self) {
        self.transform = make_transform(self.position, self.up, self.forward);
        self.flipped = false;
        self.rolled = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SEdge {
    pub from: SNodeIdx,
    pub to: SNodeIdx,
    pub d0: f64,
    /// An odd number of half twists arrives on this edge.
    pub rolling: bool,
}

impl SEdge {
    #[must_use]
    pub fn contains(&self, node: SNodeIdx) -> bool {
        self.from == node || self.to == node
    }

    /// # Panics
    /// When `node` is not an end of the edge.
    #[must_use]
    pub fn other(&self, node: SNodeIdx) -> SNodeIdx {
        if self.from == node {
            self.to
        } else {
            assert_eq!(self.to, node, "node {node} is not on edge {}->{}", self.from, self.to);
            self.from
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("connectors {from} and {to} are only {distance:.3} apart")]
    ConnectorsTooClose {
        from: SNodeIdx,
        to: SNodeIdx,
        distance: f64,
    },
    #[error("junction {node} mixes open and closed ceilings")]
    MixedJunctionCeiling { node: SNodeIdx },
    #[error("profile sequence: {0}")]
    Profile(#[from] ProfileError),
}

/// A layout edge waiting to be filled out.
#[derive(Debug, Clone)]
struct PendingEdge {
    from: SNodeIdx,
    to: SNodeIdx,
    rest_length: f64,
    divs: usize,
    twists: u32,
    profiles: Vec<Arc<ParameterisedProfile>>,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    position: Point3,
    up: Vec3,
    forward: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct SGraph {
    pub(crate) nodes: Vec<SNode>,
    pub(crate) edges: Vec<SEdge>,
    pending: Vec<PendingEdge>,
    junction_count: usize,
    pub(crate) dag_order: Vec<SNodeIdx>,
}

/// Largest connector radius inflated by the apothem factor of an n-gon.
fn junction_radius(max_connector_radius: f64, connectors: usize) -> f64 {
    let factor = if connectors < 3 {
        1.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n = connectors as f64;
        (1.0 / (PI / n).tan()).max(1.0)
    };
    max_connector_radius * factor
}

impl SGraph {
    /// Junctions and connectors for every layout node; layout edges stay
    /// pending until [`fill_out`](Self::fill_out).
    #[must_use]
    pub fn from_layout(layout: &LayoutGraph) -> Self {
        let mut graph = Self::default();
        for (i, node) in layout.nodes().iter().enumerate() {
            let max_radius = node
                .connectors
                .iter()
                .map(|c| c.profile.radius())
                .fold(0.0, f64::max);
            let radius = junction_radius(max_radius, node.connectors.len());
            let t = node.transform;
            let j = graph.add_node(SNode::new(
                SNodeKind::Junction,
                t.origin(),
                t.z_axis(),
                t.x_axis(),
                radius,
                None,
            ));
            graph.nodes[j.0].layout_node = Some(i);
        }
        graph.junction_count = layout.node_count();

        let mut connector_nodes = Vec::with_capacity(layout.node_count());
        for (i, node) in layout.nodes().iter().enumerate() {
            let junction = SNodeIdx(i);
            let d0 = graph.nodes[i].radius;
            let mut conns = Vec::with_capacity(node.connectors.len());
            for (c, def) in node.connectors.iter().enumerate() {
                let world = layout.connector_world_transform(i, c);
                let n = graph.add_node(SNode::new(
                    SNodeKind::JunctionConnector,
                    world.origin(),
                    world.z_axis(),
                    world.x_axis(),
                    def.profile.radius(),
                    Some(Arc::clone(&def.profile)),
                ));
                graph.connect(junction, n, d0, false);
                conns.push(n);
            }
            connector_nodes.push(conns);
        }

        for e in layout.edges() {
            graph.pending.push(PendingEdge {
                from: connector_nodes[e.from_node][e.from_connector],
                to: connector_nodes[e.to_node][e.to_connector],
                rest_length: e.rest_length,
                divs: e.divs,
                twists: e.twists,
                profiles: e.profiles.clone(),
            });
        }
        debug!(
            "structural skeleton: {} junctions, {} nodes, {} pending edges",
            graph.junction_count,
            graph.nodes.len(),
            graph.pending.len()
        );
        graph
    }

    fn add_node(&mut self, node: SNode) -> SNodeIdx {
        self.nodes.push(node);
        SNodeIdx(self.nodes.len() - 1)
    }

    fn connect(&mut self, from: SNodeIdx, to: SNodeIdx, d0: f64, rolling: bool) -> SEdgeIdx {
        let idx = SEdgeIdx(self.edges.len());
        self.edges.push(SEdge { from, to, d0, rolling });
        self.nodes[from.0].edges.push(idx);
        self.nodes[to.0].edges.push(idx);
        idx
    }

    #[must_use]
    pub fn nodes(&self) -> &[SNode] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[SEdge] {
        &self.edges
    }

    #[must_use]
    pub fn node(&self, idx: SNodeIdx) -> &SNode {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: SNodeIdx) -> &mut SNode {
        &mut self.nodes[idx.0]
    }

    #[must_use]
    pub fn edge(&self, idx: SEdgeIdx) -> &SEdge {
        &self.edges[idx.0]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Junctions occupy the first `junction_count` node slots.
    #[must_use]
    pub fn junction_count(&self) -> usize {
        self.junction_count
    }

    #[must_use]
    pub fn pending_edge_count(&self) -> usize {
        self.pending.len()
    }

    pub fn neighbours(&self, idx: SNodeIdx) -> impl Iterator<Item = SNodeIdx> + '_ {
        self.nodes[idx.0].edges.iter().map(move |&e| self.edges[e.0].other(idx))
    }

    /// The junction a connector belongs to.
    #[must_use]
    pub fn junction_of(&self, connector: SNodeIdx) -> Option<SNodeIdx> {
        self.neighbours(connector)
            .find(|&n| self.nodes[n.0].kind == SNodeKind::Junction)
    }

    /// Connectors around a junction, in edge order.
    #[must_use]
    pub fn connectors_of(&self, junction: SNodeIdx) -> Vec<SNodeIdx> {
        self.neighbours(junction)
            .filter(|&n| self.nodes[n.0].kind == SNodeKind::JunctionConnector)
            .collect()
    }

    /// Direction pointing out of a connector's junction through the
    /// connector; falls back to the connector's own forward.
    #[must_use]
    pub fn outward_direction(&self, connector: SNodeIdx) -> Vec3 {
        let node = &self.nodes[connector.0];
        self.junction_of(connector)
            .and_then(|j| (node.position - self.nodes[j.0].position).normalized())
            .unwrap_or(node.forward)
    }

    /// Bezier control points leaving each connector along its outward
    /// direction, backed off to half length when one lands near the far end.
    fn spline_controls(&self, from: SNodeIdx, to: SNodeIdx) -> [Point3; 2] {
        let from_pos = self.nodes[from.0].position;
        let to_pos = self.nodes[to.0].position;
        let length = from_pos.distance_to(to_pos);
        let from_dir = self.outward_direction(from);
        let to_dir = self.outward_direction(to);

        let mut c1 = from_pos + from_dir * length;
        if c1.distance_to(to_pos) < length / 2.0 {
            c1 = from_pos + from_dir * (length / 2.0);
        }
        let mut c2 = to_pos + to_dir * length;
        if c2.distance_to(from_pos) < length / 2.0 {
            c2 = to_pos + to_dir * (length / 2.0);
        }
        [c1, c2]
    }

    /// Position-only graph for the coarse phase.
    ///
    /// Junction `i` becomes node `i`. Pending edge `k` adds the two spline
    /// control nodes `J + 2k` and `J + 2k + 1` (`J` = junction count), chained
    /// junction - control - control - junction.
    #[must_use]
    pub fn intermediate_graph(&self) -> IGraph<SNodeIdx> {
        let mut graph = IGraph::new();
        for j in 0..self.junction_count {
            let n = &self.nodes[j];
            graph.add_node(n.position, n.radius, Some(SNodeIdx(j)));
        }
        for p in &self.pending {
            let (Some(fj), Some(tj)) = (self.junction_of(p.from), self.junction_of(p.to)) else {
                continue;
            };
            let [c1, c2] = self.spline_controls(p.from, p.to);
            let radius = self.nodes[p.from.0].radius.max(self.nodes[p.to.0].radius);
            #[allow(clippy::cast_precision_loss)]
            let third = p.rest_length * (p.divs + 1) as f64 / 3.0;
            let a = graph.add_node(c1, radius, None);
            let b = graph.add_node(c2, radius, None);
            graph.connect(fj.0, a, self.nodes[fj.0].radius + third);
            graph.connect(a, b, third);
            graph.connect(b, tj.0, self.nodes[tj.0].radius + third);
        }
        graph
    }

    /// Move every junction (and its connectors) to the position the coarse
    /// phase chose for it.
    pub fn apply_intermediate(&mut self, graph: &IGraph<SNodeIdx>) {
        for node in graph.nodes() {
            let Some(j) = node.reference else {
                continue;
            };
            let delta = node.position - self.nodes[j.0].position;
            self.nodes[j.0].position = node.position;
            for c in self.connectors_of(j) {
                let n = &mut self.nodes[c.0];
                n.position = n.position + delta;
                n.refresh_transform();
            }
            self.nodes[j.0].refresh_transform();
        }
    }

    /// Replace every pending edge with a chain of connection nodes.
    ///
    /// Edges without explicit profiles take a sequence from `source`, or just
    /// blend their two connector profiles when there is none.
    pub fn fill_out(&mut self, mut source: Option<&mut dyn ProfileSource>) -> Result<(), StructuralError> {
        let pending = std::mem::take(&mut self.pending);
        for edge in &pending {
            let from_profile = self.connector_profile(edge.from);
            let to_profile = self.connector_profile(edge.to);
            let profiles = if !edge.profiles.is_empty() {
                edge.profiles.clone()
            } else if let Some(src) = source.as_deref_mut() {
                src.compatible_sequence(&from_profile, &to_profile, edge.divs + 2)?
            } else {
                vec![from_profile, to_profile]
            };
            self.connect_and_fill_out(edge, &profiles)?;
        }
        Ok(())
    }

    fn connector_profile(&self, connector: SNodeIdx) -> Arc<ParameterisedProfile> {
        match &self.nodes[connector.0].profile {
            Some(p) => Arc::clone(p),
            None => panic!("connector {connector} has no profile"),
        }
    }

    fn connect_and_fill_out(
        &mut self,
        edge: &PendingEdge,
        profiles: &[Arc<ParameterisedProfile>],
    ) -> Result<(), StructuralError> {
        assert!(!profiles.is_empty(), "fill-out needs at least one profile");
        let from_pos = self.nodes[edge.from.0].position;
        let to_pos = self.nodes[edge.to.0].position;
        let distance = from_pos.distance_to(to_pos);
        if distance < MIN_CONNECTOR_DISTANCE {
            return Err(StructuralError::ConnectorsTooClose {
                from: edge.from,
                to: edge.to,
                distance,
            });
        }

        let [c1, c2] = self.spline_controls(edge.from, edge.to);
        let curve = CubicBezier::new(from_pos, c1, c2, to_pos);
        let intervals = edge.divs + 1;
        #[allow(clippy::cast_precision_loss)]
        let param = |i: usize| i as f64 / intervals as f64;

        let mut up = self.nodes[edge.from.0].up;
        let mut forward = self.outward_direction(edge.from);
        let mut frames = Vec::with_capacity(intervals + 1);
        for i in 0..=intervals {
            let t = param(i);
            forward = curve.tangent_at(t).normalized().unwrap_or(forward);
            up = project_onto_plane(up, forward)
                .normalized()
                .unwrap_or_else(|| forward.any_perpendicular());
            frames.push(Frame {
                position: curve.point_at(t),
                up,
                forward,
            });
        }

        let to_up = self.nodes[edge.to.0].up;
        let end = frames[intervals];
        let mismatch = signed_angle(end.up, to_up, end.forward, false) + f64::from(edge.twists) * PI;
        for (i, f) in frames.iter_mut().enumerate() {
            f.up = rotate_about(f.up, f.forward, param(i) * mismatch);
        }

        let rolling = edge.twists % 2 == 1;
        if let Some(target) = project_onto_plane(to_up, end.forward).normalized() {
            let sign = if rolling { -1.0 } else { 1.0 };
            let agreement = frames[intervals].up.dot(target) * sign;
            assert!(
                agreement > END_UP_AGREEMENT,
                "edge {}->{} arrives with up agreement {agreement}",
                edge.from,
                edge.to
            );
        }

        let mut current = edge.from;
        for (i, f) in frames.iter().enumerate().take(intervals).skip(1) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let pick = ((profiles.len() as f64 * param(i)) as usize).min(profiles.len() - 1);
            let profile = Arc::clone(&profiles[pick]);
            let next = self.add_node(SNode::new(
                SNodeKind::Connection,
                f.position,
                f.up,
                f.forward,
                profile.radius(),
                Some(profile),
            ));
            self.connect(current, next, edge.rest_length, false);
            current = next;
        }
        self.connect(current, edge.to, edge.rest_length, rolling);
        Ok(())
    }

    /// Position and up of every layout node's junction, in layout order.
    #[must_use]
    pub fn layout_positions(&self) -> Vec<NodePosition> {
        let mut junctions: Vec<&SNode> = self.nodes.iter().filter(|n| n.layout_node.is_some()).collect();
        junctions.sort_by_key(|n| n.layout_node);
        junctions
            .into_iter()
            .map(|n| NodePosition {
                position: n.position,
                up: n.up,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{NUM_VERTS, Tolerance};
    use crate::graph::layout::LayoutNode;
    use crate::graph::profile_source::RandomProfileSource;

    fn flat() -> Arc<ParameterisedProfile> {
        Arc::new(ParameterisedProfile::new(2.0, [0.0; 4], [0.0; 4], [false; NUM_VERTS]).unwrap())
    }

    /// Two back-to-back nodes 20 apart, joined connector 0 to connector 1.
    fn pair(twists: u32, divs: usize) -> LayoutGraph {
        let p = flat();
        let mut layout = LayoutGraph::new();
        let a = layout.add_node(LayoutNode::back_to_back(Transform::identity(), &p, 2.0));
        let b = layout.add_node(LayoutNode::back_to_back(
            Transform::translate(Vec3::new(20.0, 0.0, 0.0)),
            &p,
            2.0,
        ));
        layout.connect((a, 0), (b, 1), 1.0, divs, twists).unwrap();
        layout
    }

    #[test]
    fn junction_radius_uses_apothem_factor() {
        assert!((junction_radius(2.0, 2) - 2.0).abs() < 1e-12);
        assert!((junction_radius(2.0, 3) - 2.0).abs() < 1e-12);
        assert!((junction_radius(2.0, 6) - 2.0 * 3.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn skeleton_has_junctions_then_connectors() {
        let layout = LayoutGraph::demo_tetrahedron();
        let g = SGraph::from_layout(&layout);
        assert_eq!(g.junction_count(), 4);
        assert_eq!(g.node_count(), 4 + 12);
        assert_eq!(g.edge_count(), 12);
        assert_eq!(g.pending_edge_count(), 6);
        for j in 0..4 {
            assert_eq!(g.node(SNodeIdx(j)).kind, SNodeKind::Junction);
            assert_eq!(g.connectors_of(SNodeIdx(j)).len(), 3);
        }
        let c = g.connectors_of(SNodeIdx(1))[0];
        assert_eq!(g.junction_of(c), Some(SNodeIdx(1)));
        assert!(Tolerance::FRAME.approx_eq_point3(g.node(c).position, Point3::new(25.0, 0.0, 0.0)));
        assert!(Tolerance::FRAME.approx_eq_vec3(g.outward_direction(c), -Vec3::X));
    }

    #[test]
    fn intermediate_graph_chains_controls_between_junctions() {
        let g = SGraph::from_layout(&LayoutGraph::demo_tetrahedron());
        let ig = g.intermediate_graph();
        assert_eq!(ig.node_count(), 4 + 2 * 6);
        assert_eq!(ig.edges().len(), 3 * 6);
        assert_eq!(ig.node(0).reference, Some(SNodeIdx(0)));
        assert!(ig.node(4).reference.is_none());
        assert_eq!(ig.neighbours(4).collect::<Vec<_>>(), [0, 5]);
        assert_eq!(ig.neighbours(5).collect::<Vec<_>>(), [4, 1]);
    }

    #[test]
    fn apply_intermediate_moves_connectors_with_their_junction() {
        let mut g = SGraph::from_layout(&LayoutGraph::demo_tetrahedron());
        let mut ig = g.intermediate_graph();
        ig.set_position(1, Point3::new(40.0, 5.0, 1.0));
        g.apply_intermediate(&ig);
        let c = g.connectors_of(SNodeIdx(1))[0];
        assert!(Tolerance::FRAME.approx_eq_point3(g.node(c).position, Point3::new(35.0, 5.0, 1.0)));
        assert!(Tolerance::FRAME.approx_eq_point3(g.node(SNodeIdx(0)).position, Point3::ORIGIN));
    }

    #[test]
    fn fill_out_inserts_divs_connection_nodes() {
        let mut g = SGraph::from_layout(&pair(0, 6));
        let before = g.node_count();
        g.fill_out(None).unwrap();
        assert_eq!(g.pending_edge_count(), 0);
        assert_eq!(g.node_count(), before + 6);
        let chain: Vec<&SNode> = g.nodes()[before..].iter().collect();
        assert!(chain.iter().all(|n| n.kind == SNodeKind::Connection));
        // Straight edge along +X: all ups stay on +Z.
        for n in chain {
            assert!(n.up.dot(Vec3::Z) > 0.999);
            assert!(n.forward.dot(Vec3::X) > 0.999);
        }
        assert!(g.edges().iter().all(|e| !e.rolling));
    }

    #[test]
    fn half_twist_rolls_the_last_edge() {
        let mut g = SGraph::from_layout(&pair(1, 8));
        let before = g.node_count();
        g.fill_out(None).unwrap();
        let rolling: Vec<&SEdge> = g.edges().iter().filter(|e| e.rolling).collect();
        assert_eq!(rolling.len(), 1);
        // Halfway along, the up has turned a quarter.
        let mid = &g.nodes()[before + 4];
        assert!(mid.up.dot(Vec3::Z).abs() < 0.35);
        let last = &g.nodes()[before + 7];
        assert!(last.up.dot(Vec3::Z) < -0.9);
    }

    #[test]
    fn close_connectors_are_rejected() {
        let p = flat();
        let mut layout = LayoutGraph::new();
        let a = layout.add_node(LayoutNode::back_to_back(Transform::identity(), &p, 0.25));
        layout.connect((a, 0), (a, 1), 1.0, 4, 0).unwrap();
        let mut g = SGraph::from_layout(&layout);
        assert!(matches!(
            g.fill_out(None),
            Err(StructuralError::ConnectorsTooClose { .. })
        ));
    }

    #[test]
    fn profile_source_supplies_the_sequence() {
        let mut layout = LayoutGraph::demo_tetrahedron();
        let explicit = vec![flat()];
        layout.set_edge_profiles(5, explicit).unwrap();
        let mut g = SGraph::from_layout(&layout);
        let mut source = RandomProfileSource::with_demo_roadbeds(5);
        g.fill_out(Some(&mut source)).unwrap();
        assert_eq!(g.node_count(), 16 + 6 * 20);
        // The last edge's connection nodes all carry the explicit profile.
        let tail = &g.nodes()[g.node_count() - 20..];
        assert!(tail.iter().all(|n| n.profile.as_deref().is_some_and(|p| p.width() == 2.0)));
    }

    #[test]
    fn layout_positions_follow_layout_order() {
        let g = SGraph::from_layout(&LayoutGraph::demo_tetrahedron());
        let positions = g.layout_positions();
        assert_eq!(positions.len(), 4);
        assert!(Tolerance::FRAME.approx_eq_point3(positions[2].position, Point3::new(-10.0, 20.0, 0.0)));
        assert!(Tolerance::FRAME.approx_eq_vec3(positions[2].up, Vec3::Z));
    }
}
