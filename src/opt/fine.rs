//! Fine layout energy over the structural graph: position and up per node,
//! analytic gradients.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geom::{Point3, Vec3};
use crate::graph::{SGraph, SNodeIdx};

use super::gradient::check_gradient;
use super::histogram::EnergyHistogram;
use super::minimizer::Objective;

const PARAMS_PER_NODE: usize = 6;
const UP_OFFSET: usize = 3;
/// Weight of the repulsion between unconnected nodes.
const UNCONNECTED_WEIGHT: f64 = 0.01;
const TORSION_OFFSET: f64 = 1.1;
/// Keeps the torsion term finite when an over-long up points backwards.
const MIN_TORSION_DENOMINATOR: f64 = 0.05;
const POSITION_LIMIT: f64 = 100.0;
const UP_LIMIT: f64 = 2.0;
const INITIAL_STEP: f64 = 0.1;

const DISTANCE_CHECK_STEP: f64 = 1e-3;
const TORSION_CHECK_STEP: f64 = 1e-4;
const GRADIENT_TOLERANCE: f64 = 1e-2;

const TERM_NAMES: [&str; 3] = ["connected", "unconnected", "torsion"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineScales {
    pub connected: f64,
    pub unconnected: f64,
    pub torsion: f64,
}

impl Default for FineScales {
    fn default() -> Self {
        Self {
            connected: 1.0,
            unconnected: 1.0,
            torsion: 1.0,
        }
    }
}

/// `(|p2 - p1| - target)^2` with its gradients for `p1` and `p2`.
#[must_use]
pub fn stretch_energy(p1: Vec3, p2: Vec3, target: f64) -> (f64, Vec3, Vec3) {
    let delta = p2 - p1;
    let dist = delta.length();
    let diff = dist - target;
    if dist <= f64::EPSILON {
        return (diff * diff, Vec3::ZERO, Vec3::ZERO);
    }
    let g2 = delta * (2.0 * diff / dist);
    (diff * diff, -g2, g2)
}

/// `1 / (1.1 + â·u2) + (1 - |a|)^2` where `a` is `u1`, negated for a flipped
/// pair, with its gradients for `u1` and `u2`.
#[must_use]
pub fn torsion_energy(u1: Vec3, u2: Vec3, flipped: bool) -> (f64, Vec3, Vec3) {
    let sign = if flipped { -1.0 } else { 1.0 };
    let a = u1 * sign;
    let len = a.length();
    if len <= f64::EPSILON {
        return (1.0 / TORSION_OFFSET + 1.0, Vec3::ZERO, Vec3::ZERO);
    }
    let a_hat = a / len;
    let c = a_hat.dot(u2);
    let stretch = 1.0 - len;
    let raw = TORSION_OFFSET + c;
    let (denom, k) = if raw > MIN_TORSION_DENOMINATOR {
        (raw, -1.0 / (raw * raw))
    } else {
        (MIN_TORSION_DENOMINATOR, 0.0)
    };
    let value = 1.0 / denom + stretch * stretch;
    let grad_u2 = a_hat * k;
    let grad_a = (u2 - a_hat * c) * (k / len) - a_hat * (2.0 * stretch);
    (value, grad_a * sign, grad_u2)
}

fn vec_at(x: &[f64], at: usize) -> Vec3 {
    Vec3::new(x[at], x[at + 1], x[at + 2])
}

fn add_at(grad: &mut [f64], at: usize, v: Vec3) {
    grad[at] += v.x;
    grad[at + 1] += v.y;
    grad[at + 2] += v.z;
}

/// # Panics
/// When the analytic gradients of a two-vector term disagree with centered
/// differences.
fn verify_pair_gradient(
    term: &'static str,
    f: impl Fn(Vec3, Vec3) -> f64,
    (a, b): (Vec3, Vec3),
    (ga, gb): (Vec3, Vec3),
    step: f64,
) {
    let params = [a.x, a.y, a.z, b.x, b.y, b.z];
    let analytic = [ga.x, ga.y, ga.z, gb.x, gb.y, gb.z];
    let result = check_gradient(
        term,
        |v| f(vec_at(v, 0), vec_at(v, 3)),
        &params,
        &analytic,
        step,
        GRADIENT_TOLERANCE,
    );
    if let Err(mismatch) = result {
        panic!("{mismatch}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ConnectedPair {
    a: usize,
    b: usize,
    d0: f64,
    /// The ups pointed apart when the objective was built.
    flipped: bool,
}

pub struct FineObjective<'a> {
    graph: &'a mut SGraph,
    scales: FineScales,
    connected: Vec<ConnectedPair>,
    unconnected: Vec<(usize, usize)>,
    radii: Vec<f64>,
    origin: Vec<f64>,
    histogram: Option<&'a mut EnergyHistogram>,
    check_gradients: bool,
    terms: [f64; 3],
}

impl<'a> FineObjective<'a> {
    /// Gradient checks default to on in debug builds.
    pub fn new(graph: &'a mut SGraph, scales: FineScales) -> Self {
        let n = graph.node_count();
        let mut connected = Vec::with_capacity(graph.edge_count());
        let mut linked = HashSet::with_capacity(graph.edge_count());
        for e in graph.edges() {
            let (a, b) = (e.from.0, e.to.0);
            if a == b {
                continue;
            }
            connected.push(ConnectedPair {
                a,
                b,
                d0: e.d0,
                flipped: graph.nodes()[a].up.dot(graph.nodes()[b].up) < 0.0,
            });
            linked.insert((a.min(b), a.max(b)));
        }

        let neighbours: Vec<Vec<usize>> = (0..n)
            .map(|i| {
                let mut list: Vec<usize> = graph.neighbours(SNodeIdx(i)).map(|o| o.0).collect();
                list.sort_unstable();
                list
            })
            .collect();
        let mut unconnected = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                let shares_neighbour = neighbours[i].iter().any(|k| neighbours[j].binary_search(k).is_ok());
                if !linked.contains(&(i, j)) && !shares_neighbour {
                    unconnected.push((i, j));
                }
            }
        }

        let radii = graph.nodes().iter().map(|node| node.radius).collect();
        let mut objective = Self {
            graph,
            scales,
            connected,
            unconnected,
            radii,
            origin: Vec::new(),
            histogram: None,
            check_gradients: cfg!(debug_assertions),
            terms: [0.0; 3],
        };
        let mut origin = vec![0.0; objective.size()];
        objective.state(&mut origin);
        objective.origin = origin;
        objective
    }

    /// Record every connected-pair `distance / D0` ratio into `histogram`.
    #[must_use]
    pub fn with_histogram(mut self, histogram: &'a mut EnergyHistogram) -> Self {
        self.histogram = Some(histogram);
        self
    }

    #[must_use]
    pub fn with_gradient_check(mut self, enabled: bool) -> Self {
        self.check_gradients = enabled;
        self
    }

    #[must_use]
    pub fn connected_pair_count(&self) -> usize {
        self.connected.len()
    }

    #[must_use]
    pub fn unconnected_pair_count(&self) -> usize {
        self.unconnected.len()
    }
}

impl Objective for FineObjective<'_> {
    fn size(&self) -> usize {
        self.graph.node_count() * PARAMS_PER_NODE
    }

    fn evaluate(&mut self, x: &[f64], mut grad: Option<&mut [f64]>) -> f64 {
        self.set_state(x);
        if let Some(g) = grad.as_deref_mut() {
            g.fill(0.0);
        }
        let s = self.scales;
        let mut connected = 0.0;
        let mut unconnected = 0.0;
        let mut torsion = 0.0;

        for pair in &self.connected {
            let (pa, pb) = (pair.a * PARAMS_PER_NODE, pair.b * PARAMS_PER_NODE);
            let (p1, p2) = (vec_at(x, pa), vec_at(x, pb));
            let (e, g1, g2) = stretch_energy(p1, p2, pair.d0);
            connected += e * s.connected;
            if let Some(h) = self.histogram.as_deref_mut() {
                h.add((p2 - p1).length() / pair.d0);
            }

            let (u1, u2) = (vec_at(x, pa + UP_OFFSET), vec_at(x, pb + UP_OFFSET));
            let (t, h1, h2) = torsion_energy(u1, u2, pair.flipped);
            torsion += t * s.torsion;

            if let Some(g) = grad.as_deref_mut() {
                add_at(g, pa, g1 * s.connected);
                add_at(g, pb, g2 * s.connected);
                add_at(g, pa + UP_OFFSET, h1 * s.torsion);
                add_at(g, pb + UP_OFFSET, h2 * s.torsion);
            }

            if self.check_gradients {
                if (p2 - p1).length() > 10.0 * DISTANCE_CHECK_STEP {
                    let d0 = pair.d0;
                    verify_pair_gradient(
                        "connected",
                        |a, b| stretch_energy(a, b, d0).0,
                        (p1, p2),
                        (g1, g2),
                        DISTANCE_CHECK_STEP,
                    );
                }
                let flipped = pair.flipped;
                verify_pair_gradient(
                    "torsion",
                    |a, b| torsion_energy(a, b, flipped).0,
                    (u1, u2),
                    (h1, h2),
                    TORSION_CHECK_STEP,
                );
            }
        }

        for &(a, b) in &self.unconnected {
            let target = self.radii[a] + self.radii[b];
            let (pa, pb) = (a * PARAMS_PER_NODE, b * PARAMS_PER_NODE);
            let (p1, p2) = (vec_at(x, pa), vec_at(x, pb));
            if (p2 - p1).length() >= target {
                continue;
            }
            let (e, g1, g2) = stretch_energy(p1, p2, target);
            let w = UNCONNECTED_WEIGHT * s.unconnected;
            unconnected += e * w;
            if let Some(g) = grad.as_deref_mut() {
                add_at(g, pa, g1 * w);
                add_at(g, pb, g2 * w);
            }
            if self.check_gradients && (p2 - p1).length() > 10.0 * DISTANCE_CHECK_STEP {
                verify_pair_gradient(
                    "unconnected",
                    |a, b| {
                        if (b - a).length() < target {
                            stretch_energy(a, b, target).0
                        } else {
                            0.0
                        }
                    },
                    (p1, p2),
                    (g1, g2),
                    DISTANCE_CHECK_STEP,
                );
            }
        }

        self.terms = [connected, unconnected, torsion];
        connected + unconnected + torsion
    }

    fn state(&self, x: &mut [f64]) {
        for (node, chunk) in self.graph.nodes().iter().zip(x.chunks_exact_mut(PARAMS_PER_NODE)) {
            chunk[..UP_OFFSET].copy_from_slice(&node.position.to_array());
            chunk[UP_OFFSET..].copy_from_slice(&node.up.to_array());
        }
    }

    /// Positions are taken as given; ups are stored normalized.
    ///
    /// # Panics
    /// When `x` does not hold six values per node.
    fn set_state(&mut self, x: &[f64]) {
        assert_eq!(x.len(), self.size(), "fine state size");
        for (i, chunk) in x.chunks_exact(PARAMS_PER_NODE).enumerate() {
            let node = self.graph.node_mut(SNodeIdx(i));
            node.position = Point3::new(chunk[0], chunk[1], chunk[2]);
            if let Some(up) = vec_at(chunk, UP_OFFSET).normalized() {
                node.up = up;
            }
        }
    }

    fn initial_step_sizes(&self, steps: &mut [f64]) {
        steps.fill(INITIAL_STEP);
    }

    fn bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let mut lower = Vec::with_capacity(self.origin.len());
        let mut upper = Vec::with_capacity(self.origin.len());
        for chunk in self.origin.chunks_exact(PARAMS_PER_NODE) {
            for &v in &chunk[..UP_OFFSET] {
                lower.push(v - POSITION_LIMIT);
                upper.push(v + POSITION_LIMIT);
            }
            for _ in UP_OFFSET..PARAMS_PER_NODE {
                lower.push(-UP_LIMIT);
                upper.push(UP_LIMIT);
            }
        }
        Some((lower, upper))
    }

    fn energy_term_names(&self) -> &'static [&'static str] {
        &TERM_NAMES
    }

    fn last_energy_terms(&self) -> Vec<f64> {
        self.terms.to_vec()
    }

    fn provides_gradient(&self) -> bool {
        true
    }
}
