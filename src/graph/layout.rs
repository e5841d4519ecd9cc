//! Layout graph: nodes with fixed connectors, joined by edges.
//!
//! The layout is the only input of the structural pipeline. It is built in
//! code (see the demo constructors) or from a serde [`LayoutDesc`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{
    NUM_VERTS, ParameterisedProfile, Point3, ProfileError, RoadbedShape, Transform, Vec3,
    make_transform,
};

/// A typed attachment point on a layout node.
#[derive(Debug, Clone)]
pub struct ConnectorDef {
    pub type_id: u32,
    pub profile: Arc<ParameterisedProfile>,
    transform: Transform,
}

impl ConnectorDef {
    /// Connector at `position` (node-local) facing along `normal`.
    ///
    /// The local frame has X = normal, Y = `up x normal` and Z = up, with
    /// `up` re-orthogonalized against the normal.
    #[must_use]
    pub fn new(
        type_id: u32,
        profile: Arc<ParameterisedProfile>,
        position: Point3,
        normal: Vec3,
        up: Vec3,
    ) -> Self {
        Self {
            type_id,
            profile,
            transform: make_transform(position, up, normal),
        }
    }

    /// Node-local placement.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform
    }
}

#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub transform: Transform,
    pub connectors: Vec<ConnectorDef>,
    /// Layout edge attached to each connector.
    edges: Vec<Option<usize>>,
}

impl LayoutNode {
    #[must_use]
    pub fn new(transform: Transform, connectors: Vec<ConnectorDef>) -> Self {
        let edges = vec![None; connectors.len()];
        Self {
            transform,
            connectors,
            edges,
        }
    }

    /// Connectors `offset` from the centre in the local XY plane, one per
    /// angle (degrees about local Z), each facing away from the centre.
    #[must_use]
    pub fn fan(
        transform: Transform,
        profile: &Arc<ParameterisedProfile>,
        offset: f64,
        angles_degrees: &[f64],
    ) -> Self {
        let connectors = angles_degrees
            .iter()
            .map(|deg| {
                let angle = deg.to_radians();
                let dir = Vec3::new(angle.cos(), angle.sin(), 0.0);
                ConnectorDef::new(0, Arc::clone(profile), Point3::ORIGIN + dir * offset, dir, Vec3::Z)
            })
            .collect();
        Self::new(transform, connectors)
    }

    /// Three connectors at 120° spacing, the first along local X.
    #[must_use]
    pub fn y_junction(transform: Transform, profile: &Arc<ParameterisedProfile>, offset: f64) -> Self {
        Self::fan(transform, profile, offset, &[0.0, 120.0, 240.0])
    }

    /// Two connectors facing away from each other along local X.
    #[must_use]
    pub fn back_to_back(transform: Transform, profile: &Arc<ParameterisedProfile>, offset: f64) -> Self {
        Self::fan(transform, profile, offset, &[0.0, 180.0])
    }

    #[must_use]
    pub fn connector_edge(&self, connector: usize) -> Option<usize> {
        self.edges.get(connector).copied().flatten()
    }

    /// Number of connectors with an edge attached.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct LayoutEdge {
    pub from_node: usize,
    pub from_connector: usize,
    pub to_node: usize,
    pub to_connector: usize,
    /// Rest length of each segment along the edge.
    pub rest_length: f64,
    /// Connection nodes inserted between the two connectors.
    pub divs: usize,
    /// Half twists along the edge.
    pub twists: u32,
    /// Explicit profile sequence; empty means "blend the two connector profiles".
    pub profiles: Vec<Arc<ParameterisedProfile>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("layout node {0} does not exist")]
    UnknownNode(usize),
    #[error("layout node {node} has no connector {connector}")]
    UnknownConnector { node: usize, connector: usize },
    #[error("layout edge {0} does not exist")]
    UnknownEdge(usize),
    #[error("connector {connector} of layout node {node} is already connected")]
    ConnectorInUse { node: usize, connector: usize },
    #[error("connector types differ ({from} vs {to})")]
    ConnectorTypeMismatch { from: u32, to: u32 },
    #[error("invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

#[derive(Debug, Clone, Default)]
pub struct LayoutGraph {
    nodes: Vec<LayoutNode>,
    edges: Vec<LayoutEdge>,
}

impl LayoutGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: LayoutNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn check_connector(&self, node: usize, connector: usize) -> Result<&LayoutNode, LayoutError> {
        let n = self.nodes.get(node).ok_or(LayoutError::UnknownNode(node))?;
        if connector >= n.connectors.len() {
            return Err(LayoutError::UnknownConnector { node, connector });
        }
        if n.edges[connector].is_some() {
            return Err(LayoutError::ConnectorInUse { node, connector });
        }
        Ok(n)
    }

    /// Join two free connectors of the same type.
    ///
    /// A node may be connected to itself through two different connectors.
    pub fn connect(
        &mut self,
        from: (usize, usize),
        to: (usize, usize),
        rest_length: f64,
        divs: usize,
        twists: u32,
    ) -> Result<usize, LayoutError> {
        let from_type = self.check_connector(from.0, from.1)?.connectors[from.1].type_id;
        let to_type = self.check_connector(to.0, to.1)?.connectors[to.1].type_id;
        if from == to {
            return Err(LayoutError::ConnectorInUse {
                node: to.0,
                connector: to.1,
            });
        }
        if from_type != to_type {
            return Err(LayoutError::ConnectorTypeMismatch {
                from: from_type,
                to: to_type,
            });
        }

        let idx = self.edges.len();
        self.edges.push(LayoutEdge {
            from_node: from.0,
            from_connector: from.1,
            to_node: to.0,
            to_connector: to.1,
            rest_length,
            divs,
            twists,
            profiles: Vec::new(),
        });
        self.nodes[from.0].edges[from.1] = Some(idx);
        self.nodes[to.0].edges[to.1] = Some(idx);
        Ok(idx)
    }

    /// Replace the profile sequence used along `edge`.
    pub fn set_edge_profiles(
        &mut self,
        edge: usize,
        profiles: Vec<Arc<ParameterisedProfile>>,
    ) -> Result<(), LayoutError> {
        let e = self.edges.get_mut(edge).ok_or(LayoutError::UnknownEdge(edge))?;
        e.profiles = profiles;
        Ok(())
    }

    #[must_use]
    pub fn nodes(&self) -> &[LayoutNode] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[LayoutEdge] {
        &self.edges
    }

    #[must_use]
    pub fn node(&self, idx: usize) -> Option<&LayoutNode> {
        self.nodes.get(idx)
    }

    #[must_use]
    pub fn edge(&self, idx: usize) -> Option<&LayoutEdge> {
        self.edges.get(idx)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// World placement of a connector.
    ///
    /// # Panics
    /// When the node or connector index is out of range.
    #[must_use]
    pub fn connector_world_transform(&self, node: usize, connector: usize) -> Transform {
        let n = &self.nodes[node];
        n.transform.compose(n.connectors[connector].transform)
    }

    /// Build a layout from its serde description.
    pub fn from_desc(desc: &LayoutDesc) -> Result<Self, LayoutError> {
        let mut graph = Self::new();
        for node in &desc.nodes {
            let mut connectors = Vec::with_capacity(node.connectors.len());
            for c in &node.connectors {
                let profile = Arc::new(c.profile.build()?);
                connectors.push(ConnectorDef::new(
                    c.type_id,
                    profile,
                    Point3::from_array(c.position),
                    Vec3::from_array(c.normal),
                    Vec3::from_array(c.up),
                ));
            }
            let transform =
                Transform::from_position_euler_degrees(Point3::from_array(node.position), node.rotation_degrees);
            graph.add_node(LayoutNode::new(transform, connectors));
        }
        for e in &desc.edges {
            graph.connect(
                (e.from_node, e.from_connector),
                (e.to_node, e.to_connector),
                e.rest_length,
                e.divs,
                e.twists,
            )?;
        }
        Ok(graph)
    }

    /// A single Y junction with all three connectors left open.
    #[must_use]
    pub fn demo_y_junction() -> Self {
        let mut graph = Self::new();
        let profile = demo_profile(true);
        graph.add_node(LayoutNode::y_junction(Transform::identity(), &profile, DEMO_CONNECTOR_OFFSET));
        graph
    }

    /// A two-connector node whose connectors, 120° apart, are joined to each
    /// other with a half twist.
    ///
    /// # Panics
    /// Never; both connectors exist and are free.
    #[must_use]
    pub fn demo_loop() -> Self {
        let mut graph = Self::new();
        let profile = demo_profile(false);
        let node = graph.add_node(LayoutNode::fan(
            Transform::identity(),
            &profile,
            DEMO_CONNECTOR_OFFSET,
            &[60.0, -60.0],
        ));
        let connected = graph.connect((node, 0), (node, 1), 1.0, 24, 1);
        assert!(connected.is_ok(), "demo loop connectors are free");
        graph
    }

    /// Four Y junctions joined along the six edges of a tetrahedron, one edge
    /// carrying a half twist.
    ///
    /// # Panics
    /// Never; every connector is used exactly once.
    #[must_use]
    pub fn demo_tetrahedron() -> Self {
        let mut graph = Self::new();
        let profile = demo_profile(true);
        let flipped = [0.0, 0.0, 180.0];
        let placements = [
            (Point3::new(0.0, 0.0, 0.0), [0.0; 3]),
            (Point3::new(30.0, 0.0, 0.0), flipped),
            (Point3::new(-10.0, 20.0, 0.0), flipped),
            (Point3::new(-10.0, -20.0, 0.0), flipped),
        ];
        for (position, rotation) in placements {
            let t = Transform::from_position_euler_degrees(position, rotation);
            graph.add_node(LayoutNode::y_junction(t, &profile, DEMO_CONNECTOR_OFFSET));
        }
        let links = [
            ((0, 0), (1, 0), 1),
            ((0, 1), (2, 0), 0),
            ((0, 2), (3, 0), 0),
            ((1, 1), (2, 1), 0),
            ((1, 2), (3, 1), 0),
            ((2, 2), (3, 2), 0),
        ];
        for (from, to, twists) in links {
            let connected = graph.connect(from, to, 1.0, 20, twists);
            assert!(connected.is_ok(), "tetrahedron connectors are used once");
        }
        graph
    }
}

const DEMO_CONNECTOR_OFFSET: f64 = 5.0;

/// Width-3 roadbed with barriers on both sides; `closed` adds overhangs that
/// meet above and below the deck.
fn demo_profile(closed: bool) -> Arc<ParameterisedProfile> {
    let overhang = if closed { 0.5 } else { 0.0 };
    let shape = RoadbedShape::new(1.0, 1.0, overhang, overhang, 6, 11);
    match ParameterisedProfile::from_roadbed(3.0, &shape, &shape) {
        Ok(p) => Arc::new(p),
        Err(err) => panic!("demo roadbed is consistent: {err}"),
    }
}

/// Serde description of a [`LayoutGraph`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDesc {
    pub nodes: Vec<NodeDesc>,
    #[serde(default)]
    pub edges: Vec<EdgeDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDesc {
    pub position: [f64; 3],
    #[serde(default)]
    pub rotation_degrees: [f64; 3],
    pub connectors: Vec<ConnectorDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDesc {
    #[serde(default)]
    pub type_id: u32,
    pub position: [f64; 3],
    pub normal: [f64; 3],
    #[serde(default = "default_up")]
    pub up: [f64; 3],
    pub profile: ProfileDesc,
}

/// Either explicit profile parameters or a roadbed made of two half shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileDesc {
    Explicit {
        width: f64,
        #[serde(default)]
        barriers: [f64; 4],
        #[serde(default)]
        overhangs: [f64; 4],
        #[serde(default = "all_smooth")]
        outgoing_sharp: [bool; NUM_VERTS],
    },
    Roadbed {
        width: f64,
        top: RoadbedShape,
        bottom: Option<RoadbedShape>,
    },
}

impl ProfileDesc {
    /// # Errors
    /// When the parameters describe an inconsistent profile.
    pub fn build(&self) -> Result<ParameterisedProfile, ProfileError> {
        match self {
            Self::Explicit {
                width,
                barriers,
                overhangs,
                outgoing_sharp,
            } => ParameterisedProfile::new(*width, *barriers, *overhangs, *outgoing_sharp),
            Self::Roadbed { width, top, bottom } => {
                ParameterisedProfile::from_roadbed(*width, top, bottom.as_ref().unwrap_or(top))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDesc {
    pub from_node: usize,
    pub from_connector: usize,
    pub to_node: usize,
    pub to_connector: usize,
    #[serde(default = "default_rest_length")]
    pub rest_length: f64,
    #[serde(default = "default_divs")]
    pub divs: usize,
    #[serde(default)]
    pub twists: u32,
}

fn default_up() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

fn all_smooth() -> [bool; NUM_VERTS] {
    [false; NUM_VERTS]
}

fn default_rest_length() -> f64 {
    1.0
}

fn default_divs() -> usize {
    10
}
