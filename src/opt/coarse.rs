//! Coarse layout energy over the intermediate graph: three position
//! parameters per node, no gradient.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::geom::{Point3, Vec3, newell_normal, segment_segment_distance, signed_angle};
use crate::graph::IGraph;

use super::minimizer::Objective;

const PARAMS_PER_NODE: usize = 3;
/// Each coordinate may move this far from where the run started.
const POSITION_LIMIT: f64 = 30.0;
const INITIAL_STEP: f64 = 10.0;
/// Bends up to 30 degrees are free.
const BEND_TOLERANCE: f64 = PI / 6.0;

const TERM_NAMES: [&str; 5] = ["length", "junction_angle", "junction_planar", "bend", "edge_edge"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseScales {
    pub length: f64,
    pub junction_angle: f64,
    pub junction_planar: f64,
    pub bend: f64,
    pub edge_edge: f64,
}

impl Default for CoarseScales {
    fn default() -> Self {
        Self {
            length: 1.0,
            junction_angle: 1.0,
            junction_planar: 1.0,
            bend: 1.0,
            edge_edge: 1.0,
        }
    }
}

/// Which energy families apply where. Depends only on the topology, so every
/// clone of a graph can share one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoarseTopology {
    junctions: Vec<usize>,
    bends: Vec<usize>,
    edge_pairs: Vec<(usize, usize)>,
}

impl CoarseTopology {
    #[must_use]
    pub fn new<M>(graph: &IGraph<M>) -> Self {
        let mut topology = Self::default();
        for (i, node) in graph.nodes().iter().enumerate() {
            if node.reference.is_some() && node.edges.len() >= 3 {
                topology.junctions.push(i);
            } else if node.edges.len() == 2 {
                topology.bends.push(i);
            }
        }
        let edges = graph.edges();
        for i in 0..edges.len() {
            for j in 0..i {
                if !edges[i].touches(&edges[j]) {
                    topology.edge_pairs.push((i, j));
                }
            }
        }
        topology
    }

    /// Referenced nodes with at least three edges.
    #[must_use]
    pub fn junctions(&self) -> &[usize] {
        &self.junctions
    }

    #[must_use]
    pub fn bends(&self) -> &[usize] {
        &self.bends
    }

    /// Edge pairs sharing no node.
    #[must_use]
    pub fn edge_pairs(&self) -> &[(usize, usize)] {
        &self.edge_pairs
    }
}

#[must_use]
pub fn length_energy(p1: Point3, p2: Point3, d0: f64) -> f64 {
    let r = (d0 - p1.distance_to(p2)) / d0;
    r * r
}

/// Squared relative deviation of the angular gaps between `rel` (vectors from
/// a junction to its neighbours) from even spacing.
#[must_use]
pub fn junction_angle_energy(rel: &[Vec3]) -> f64 {
    if rel.len() < 3 {
        return 0.0;
    }
    let normal = newell_normal(rel);
    let mut angles: Vec<f64> = std::iter::once(0.0)
        .chain(rel[1..].iter().map(|&v| signed_angle(rel[0], v, normal, true)))
        .collect();
    angles.sort_by(f64::total_cmp);
    angles.push(TAU);
    #[allow(clippy::cast_precision_loss)]
    let target = TAU / rel.len() as f64;
    angles
        .windows(2)
        .map(|w| {
            let r = (w[1] - w[0] - target) / target;
            r * r
        })
        .sum()
}

/// Sum of squared out-of-plane components of `rel` against its Newell plane.
#[must_use]
pub fn junction_planar_energy(rel: &[Vec3]) -> f64 {
    let Some(normal) = newell_normal(rel).normalized() else {
        return 0.0;
    };
    rel.iter().map(|v| v.dot(normal).powi(2)).sum()
}

/// Zero up to a 30 degree bend at `pos`, then quadratic up to a full reversal.
#[must_use]
pub fn bend_energy(prev: Point3, pos: Point3, next: Point3) -> f64 {
    let in_dir = (pos - prev).normalized_or_zero();
    let out_dir = (next - pos).normalized_or_zero();
    let angle = in_dir.dot(out_dir).clamp(-1.0, 1.0).acos();
    if angle < BEND_TOLERANCE {
        return 0.0;
    }
    let r = (angle - BEND_TOLERANCE) / (PI - BEND_TOLERANCE);
    r * r
}

/// Penalty for two segments closer than the sum of their larger end radii.
#[must_use]
pub fn edge_edge_energy(a: (Point3, Point3), b: (Point3, Point3), radius_a: f64, radius_b: f64) -> f64 {
    let combined = radius_a + radius_b;
    let dist = segment_segment_distance(a.0, a.1, b.0, b.1);
    if dist >= combined || combined <= 0.0 {
        return 0.0;
    }
    let r = (combined - dist) / combined;
    r * r
}

pub struct CoarseObjective<'a, M> {
    graph: &'a mut IGraph<M>,
    topology: &'a CoarseTopology,
    scales: CoarseScales,
    origin: Vec<f64>,
    terms: [f64; 5],
}

impl<'a, M> CoarseObjective<'a, M> {
    /// `topology` must come from `graph` (or a clone of it).
    pub fn new(graph: &'a mut IGraph<M>, topology: &'a CoarseTopology, scales: CoarseScales) -> Self {
        let origin = graph.positions();
        Self {
            graph,
            topology,
            scales,
            origin,
            terms: [0.0; 5],
        }
    }

    /// Energy of the graph as it stands.
    pub fn current_energy(&mut self) -> f64 {
        let x = self.graph.positions();
        self.evaluate(&x, None)
    }

    fn relative_neighbours(&self, node: usize) -> Vec<Vec3> {
        let here = self.graph.node(node).position;
        self.graph
            .neighbours(node)
            .map(|o| self.graph.node(o).position - here)
            .collect()
    }
}

impl<M> Objective for CoarseObjective<'_, M> {
    fn size(&self) -> usize {
        self.graph.node_count() * PARAMS_PER_NODE
    }

    fn evaluate(&mut self, x: &[f64], _grad: Option<&mut [f64]>) -> f64 {
        self.set_state(x);
        let g = &*self.graph;
        let s = self.scales;

        let length: f64 = g
            .edges()
            .iter()
            .map(|e| length_energy(g.node(e.from).position, g.node(e.to).position, e.d0))
            .sum();

        let mut angle = 0.0;
        let mut planar = 0.0;
        for &j in self.topology.junctions() {
            let rel = self.relative_neighbours(j);
            angle += junction_angle_energy(&rel);
            planar += junction_planar_energy(&rel);
        }

        let bend: f64 = self
            .topology
            .bends()
            .iter()
            .map(|&n| {
                let mut around = g.neighbours(n);
                match (around.next(), around.next()) {
                    (Some(a), Some(b)) => bend_energy(g.node(a).position, g.node(n).position, g.node(b).position),
                    _ => 0.0,
                }
            })
            .sum();

        let edge_edge: f64 = self
            .topology
            .edge_pairs()
            .iter()
            .map(|&(i, j)| {
                let (e1, e2) = (g.edges()[i], g.edges()[j]);
                let (f1, t1, f2, t2) = (g.node(e1.from), g.node(e1.to), g.node(e2.from), g.node(e2.to));
                edge_edge_energy(
                    (f1.position, t1.position),
                    (f2.position, t2.position),
                    f1.radius.max(t1.radius),
                    f2.radius.max(t2.radius),
                )
            })
            .sum();

        self.terms = [
            length * s.length,
            angle * s.junction_angle,
            planar * s.junction_planar,
            bend * s.bend,
            edge_edge * s.edge_edge,
        ];
        self.terms.iter().sum()
    }

    fn state(&self, x: &mut [f64]) {
        x.copy_from_slice(&self.graph.positions());
    }

    /// # Panics
    /// When `x` does not hold three values per node.
    fn set_state(&mut self, x: &[f64]) {
        assert_eq!(x.len(), self.size(), "coarse state size");
        for (i, p) in x.chunks_exact(PARAMS_PER_NODE).enumerate() {
            self.graph.set_position(i, Point3::new(p[0], p[1], p[2]));
        }
    }

    fn initial_step_sizes(&self, steps: &mut [f64]) {
        steps.fill(INITIAL_STEP);
    }

    fn bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let lower = self.origin.iter().map(|v| v - POSITION_LIMIT).collect();
        let upper = self.origin.iter().map(|v| v + POSITION_LIMIT).collect();
        Some((lower, upper))
    }

    fn energy_term_names(&self) -> &'static [&'static str] {
        &TERM_NAMES
    }

    fn last_energy_terms(&self) -> Vec<f64> {
        self.terms.to_vec()
    }
}
