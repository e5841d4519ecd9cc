//! Orienting the structural graph as a DAG and propagating frames along it.
//!
//! The traversal is planned first ([`SGraph::plan_dag`]) and then applied, so
//! the edge flips and parent links can be inspected before anything moves.

use crate::geom::{Tolerance, Vec3, make_transform, project_onto_plane, rotate_about, signed_angle};

use super::structural::{SEdgeIdx, SGraph, SNodeIdx};

/// Below this length the projected parent up is considered unreliable.
const MIN_PARENT_UP_PROJECTION: f64 = 0.3;

/// Result of the depth-first traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagPlan {
    /// Nodes in visiting order; every parent precedes its children.
    pub order: Vec<SNodeIdx>,
    pub parents: Vec<Option<SNodeIdx>>,
    pub parent_edges: Vec<Option<SEdgeIdx>>,
    /// Edges whose direction must be swapped to point away from the root.
    pub flipped_edges: Vec<SEdgeIdx>,
}

/// Reference up for a node: the parent's up projected onto the plane
/// orthogonal to `forward`, kept on the same side as `current_up`.
///
/// When the parent up is nearly parallel to `forward`, the change of
/// direction `forward - parent_forward` is projected instead.
#[must_use]
pub fn project_parent_up(parent_up: Vec3, parent_forward: Vec3, forward: Vec3, current_up: Vec3) -> Vec3 {
    let mut projected = project_onto_plane(parent_up, forward);
    if projected.length() < MIN_PARENT_UP_PROJECTION {
        projected = project_onto_plane(forward - parent_forward, forward);
    }
    let up = projected
        .normalized()
        .unwrap_or_else(|| forward.any_perpendicular());
    if up.dot(current_up) < 0.0 { -up } else { up }
}

impl SGraph {
    /// Depth-first traversal from node 0 (and from the first unvisited node of
    /// every further component).
    #[must_use]
    pub fn plan_dag(&self) -> DagPlan {
        let n = self.nodes.len();
        let mut rank: Vec<Option<usize>> = vec![None; n];
        let mut plan = DagPlan {
            order: Vec::with_capacity(n),
            parents: vec![None; n],
            parent_edges: vec![None; n],
            flipped_edges: Vec::new(),
        };

        for root in 0..n {
            if rank[root].is_some() {
                continue;
            }
            let mut stack: Vec<(SNodeIdx, Option<SEdgeIdx>)> = vec![(SNodeIdx(root), None)];
            while let Some((node, via)) = stack.pop() {
                if rank[node.0].is_some() {
                    continue;
                }
                rank[node.0] = Some(plan.order.len());
                plan.order.push(node);
                plan.parent_edges[node.0] = via;
                plan.parents[node.0] = via.map(|e| self.edges[e.0].other(node));

                // Reversed so the first edge is explored first.
                for &e in self.nodes[node.0].edges.iter().rev() {
                    let other = self.edges[e.0].other(node);
                    if rank[other.0].is_none() {
                        stack.push((other, Some(e)));
                    }
                }
            }
        }

        for (i, e) in self.edges.iter().enumerate() {
            if rank[e.from.0] > rank[e.to.0] {
                plan.flipped_edges.push(SEdgeIdx(i));
            }
        }
        plan
    }

    /// Flip edges, set parents, move each parent edge to the front of its
    /// node's edge list and refresh every frame.
    ///
    /// # Panics
    /// When the plan was made for a graph of a different size.
    pub fn apply_dag_plan(&mut self, plan: &DagPlan) {
        assert_eq!(plan.parents.len(), self.nodes.len(), "plan does not match the graph");
        for &e in &plan.flipped_edges {
            let edge = &mut self.edges[e.0];
            std::mem::swap(&mut edge.from, &mut edge.to);
        }
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.parent = plan.parents[i];
            if let Some(pe) = plan.parent_edges[i] {
                if let Some(pos) = node.edges.iter().position(|&e| e == pe) {
                    node.edges[..=pos].rotate_right(1);
                }
            }
        }
        self.dag_order.clone_from(&plan.order);
        self.refresh_frames();
    }

    pub fn make_into_dag(&mut self) {
        let plan = self.plan_dag();
        log::debug!(
            "dag: {} nodes, {} edges flipped",
            plan.order.len(),
            plan.flipped_edges.len()
        );
        self.apply_dag_plan(&plan);
    }

    /// Recompute forward, rotation, up and transform of every node in DAG
    /// order (node order before the DAG exists).
    pub fn refresh_frames(&mut self) {
        let order: Vec<SNodeIdx> = if self.dag_order.len() == self.nodes.len() {
            self.dag_order.clone()
        } else {
            (0..self.nodes.len()).map(SNodeIdx).collect()
        };
        for idx in order {
            let forward = self.derive_forward(idx);
            let (parent_up, parent_forward) = match self.nodes[idx.0].parent {
                Some(p) => (self.nodes[p.0].up, self.nodes[p.0].forward),
                None => (Vec3::Z, forward),
            };
            let node = &mut self.nodes[idx.0];
            node.forward = forward;
            let base = project_parent_up(parent_up, parent_forward, forward, node.up);
            node.rotation = if project_onto_plane(node.up, forward).length() > Tolerance::FRAME.eps {
                signed_angle(base, node.up, forward, false)
            } else {
                0.0
            };
            node.up = rotate_about(base, forward, node.rotation)
                .normalized()
                .unwrap_or(base);
            node.transform = make_transform(node.position, node.up, node.forward);
        }
    }

    /// Root: toward its first neighbour. Leaf: away from its parent. Otherwise
    /// from the parent toward the mean of the other neighbours.
    fn derive_forward(&self, idx: SNodeIdx) -> Vec3 {
        let node = &self.nodes[idx.0];
        let pos = node.position;
        let dir = match node.parent {
            None => node
                .edges
                .first()
                .map(|&e| self.nodes[self.edges[e.0].other(idx).0].position - pos),
            Some(p) if node.edges.len() == 1 => Some(pos - self.nodes[p.0].position),
            Some(p) => {
                let mut sum = Vec3::ZERO;
                let mut count = 0_u32;
                for other in self.neighbours(idx).filter(|&o| o != p) {
                    sum += self.nodes[other.0].position.to_vec3();
                    count += 1;
                }
                (count > 0).then(|| sum / f64::from(count) - self.nodes[p.0].position.to_vec3())
            }
        };
        dir.and_then(Vec3::normalized).unwrap_or(node.forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::layout::LayoutGraph;

    fn filled(layout: &LayoutGraph) -> SGraph {
        let mut g = SGraph::from_layout(layout);
        g.fill_out(None).unwrap();
        g
    }

    #[test]
    fn parent_up_projection_falls_back_on_direction_change() {
        let up = project_parent_up(Vec3::Z, Vec3::X, Vec3::Y, Vec3::Z);
        assert!(Tolerance::FRAME.approx_eq_vec3(up, Vec3::Z));

        // Parent up along the new forward: use the turn direction instead.
        let turned = project_parent_up(Vec3::Z, Vec3::X, Vec3::Z, Vec3::X);
        assert!(turned.dot(Vec3::Z).abs() < 1e-9);
        assert!(Tolerance::FRAME.approx_eq_vec3(turned, Vec3::X));

        let flipped = project_parent_up(Vec3::Z, Vec3::X, Vec3::X, -Vec3::Z);
        assert!(Tolerance::FRAME.approx_eq_vec3(flipped, -Vec3::Z));
    }

    #[test]
    fn plan_orders_parents_first_and_flips_backward_edges() {
        let g = filled(&LayoutGraph::demo_tetrahedron());
        let plan = g.plan_dag();
        assert_eq!(plan.order.len(), g.node_count());
        assert_eq!(plan.order[0], SNodeIdx(0));
        let mut rank = vec![0; g.node_count()];
        for (i, n) in plan.order.iter().enumerate() {
            rank[n.0] = i;
        }
        for (i, parent) in plan.parents.iter().enumerate() {
            if let Some(p) = parent {
                assert!(rank[p.0] < rank[i]);
            }
        }
        assert_eq!(plan.parents.iter().filter(|p| p.is_none()).count(), 1);
        assert!(!plan.flipped_edges.is_empty());
    }

    #[test]
    fn applied_dag_points_every_edge_away_from_root() {
        let mut g = filled(&LayoutGraph::demo_tetrahedron());
        let plan = g.plan_dag();
        g.apply_dag_plan(&plan);
        let mut rank = vec![0; g.node_count()];
        for (i, n) in plan.order.iter().enumerate() {
            rank[n.0] = i;
        }
        for e in g.edges() {
            assert!(rank[e.from.0] < rank[e.to.0]);
        }
        for (i, node) in g.nodes().iter().enumerate() {
            if let Some(pe) = plan.parent_edges[i] {
                assert_eq!(node.edges[0], pe);
            }
        }
    }

    #[test]
    fn frames_are_continuous_after_dag() {
        for layout in [LayoutGraph::demo_tetrahedron(), LayoutGraph::demo_loop()] {
            let mut g = filled(&layout);
            g.make_into_dag();
            for (i, node) in g.nodes().iter().enumerate() {
                assert!((node.up.length() - 1.0).abs() < 1e-6, "node {i}");
                assert!(node.up.dot(node.forward).abs() < Tolerance::FRAME.eps, "node {i}");
                let (parent_up, parent_forward) = match node.parent {
                    Some(p) => (g.node(p).up, g.node(p).forward),
                    None => (Vec3::Z, node.forward),
                };
                let base = project_parent_up(parent_up, parent_forward, node.forward, node.up);
                let again = rotate_about(base, node.forward, node.rotation);
                assert!(Tolerance::FRAME.approx_eq_vec3(again, node.up), "node {i}");
            }
        }
    }

    #[test]
    fn straight_chain_forwards_follow_the_chain() {
        let mut g = filled(&LayoutGraph::demo_tetrahedron());
        g.make_into_dag();
        // Connector 0 of junction 0 leaves along +X toward junction 1.
        let c = g.connectors_of(SNodeIdx(0))[0];
        assert!(g.node(c).forward.dot(Vec3::X) > 0.99);
        assert_eq!(g.node(c).parent, Some(SNodeIdx(0)));
    }
}
