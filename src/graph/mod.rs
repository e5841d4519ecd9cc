//! Graphs that turn an abstract layout into a positioned, meshable structure.
//!
//! [`LayoutGraph`] is the input topology. [`SGraph`] expands it into junction,
//! connector and connection nodes, [`IGraph`] is the reduced position-only
//! graph the coarse phase optimizes, and [`meshing`] extrudes the result.

pub mod dag;
pub mod intermediate;
pub mod layout;
pub mod meshing;
pub mod profile_source;
pub mod structural;

pub use dag::DagPlan;
pub use intermediate::{IEdge, IGraph, INode};
pub use layout::{
    ConnectorDef, ConnectorDesc, EdgeDesc, LayoutDesc, LayoutEdge, LayoutError, LayoutGraph,
    LayoutNode, NodeDesc, ProfileDesc,
};
pub use profile_source::{ProfileSource, RandomProfileSource};
pub use structural::{SEdge, SEdgeIdx, SGraph, SNode, SNodeIdx, SNodeKind, StructuralError};
