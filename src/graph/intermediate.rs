//! Reduced, position-only graph optimized by the coarse phase.

use rand::Rng;

use crate::geom::{BBox, Point3};

/// Node of an [`IGraph`]; `reference` points back at whatever the node stands
/// for in the caller's graph.
#[derive(Debug, Clone, PartialEq)]
pub struct INode<M> {
    pub position: Point3,
    pub radius: f64,
    pub reference: Option<M>,
    pub edges: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IEdge {
    pub from: usize,
    pub to: usize,
    pub d0: f64,
}

impl IEdge {
    #[must_use]
    pub fn contains(&self, node: usize) -> bool {
        self.from == node || self.to == node
    }

    /// # Panics
    /// When `node` is not an end of the edge.
    #[must_use]
    pub fn other(&self, node: usize) -> usize {
        if self.from == node {
            self.to
        } else {
            assert_eq!(self.to, node, "node {node} is not on edge {}-{}", self.from, self.to);
            self.from
        }
    }

    /// True when the two edges share an end.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        self.contains(other.from) || self.contains(other.to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IGraph<M> {
    nodes: Vec<INode<M>>,
    edges: Vec<IEdge>,
}

impl<M> Default for IGraph<M> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<M> IGraph<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, position: Point3, radius: f64, reference: Option<M>) -> usize {
        self.nodes.push(INode {
            position,
            radius,
            reference,
            edges: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// # Panics
    /// When either node index is out of range.
    pub fn connect(&mut self, from: usize, to: usize, d0: f64) -> usize {
        assert!(from < self.nodes.len() && to < self.nodes.len(), "connect: node out of range");
        let idx = self.edges.len();
        self.edges.push(IEdge { from, to, d0 });
        self.nodes[from].edges.push(idx);
        if to != from {
            self.nodes[to].edges.push(idx);
        }
        idx
    }

    #[must_use]
    pub fn nodes(&self) -> &[INode<M>] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[IEdge] {
        &self.edges
    }

    #[must_use]
    pub fn node(&self, idx: usize) -> &INode<M> {
        &self.nodes[idx]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_position(&mut self, idx: usize, position: Point3) {
        self.nodes[idx].position = position;
    }

    /// The node at the far end of `edge` from `node`.
    #[must_use]
    pub fn other_node(&self, edge: usize, node: usize) -> usize {
        self.edges[edge].other(node)
    }

    #[must_use]
    pub fn edge_contains(&self, edge: usize, node: usize) -> bool {
        self.edges[edge].contains(node)
    }

    /// Neighbours of `node`, one per incident edge, in edge order.
    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[node].edges.iter().map(move |&e| self.edges[e].other(node))
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<BBox> {
        let points: Vec<Point3> = self.nodes.iter().map(|n| n.position).collect();
        BBox::from_points(&points)
    }

    /// Scatter every node uniformly inside `bbox`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, bbox: BBox, rng: &mut R) {
        for n in &mut self.nodes {
            n.position = random_point_in(bbox, rng);
        }
    }

    /// Positions flattened as `x, y, z` triples in node order.
    #[must_use]
    pub fn positions(&self) -> Vec<f64> {
        self.nodes.iter().flat_map(|n| n.position.to_array()).collect()
    }
}

/// Uniform point inside `bbox`; degenerate axes collapse to the minimum.
pub fn random_point_in<R: Rng + ?Sized>(bbox: BBox, rng: &mut R) -> Point3 {
    let mut axis = |lo: f64, hi: f64| if hi > lo { rng.random_range(lo..=hi) } else { lo };
    let x = axis(bbox.min.x, bbox.max.x);
    let y = axis(bbox.min.y, bbox.max.y);
    let z = axis(bbox.min.z, bbox.max.z);
    Point3::new(x, y, z)
}
