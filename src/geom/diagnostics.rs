//! Topology summary for polygon meshes.
//!
//! [`MeshDiagnostics`] is a cheap snapshot of a [`PolyMesh`]: element counts,
//! open edges, edge classification and the Euler characteristic. The CLI
//! prints it and the pipeline logs it after meshing.
//!
//! # Example
//!
//! ```ignore
//! let diag = mesh.diagnostics();
//! if !diag.is_closed() {
//!     log::warn!("{} open edges", diag.open_edge_count);
//! }
//! println!("{diag}");
//! ```

use std::fmt;

use super::mesh::{EdgeType, PolyMesh};

/// Counts describing the state of a [`PolyMesh`].
///
/// # Topology
///
/// - `open_edge_count`: edges with a single face (holes)
/// - `euler_characteristic`: `V - E + F`; 2 for a closed genus-0 surface,
///   dropping by 2 per handle
///
/// # Edge classification
///
/// Counts use the resolved type when one exists, otherwise the requested type.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MeshDiagnostics {
    pub vertex_count: usize,
    pub edge_count: usize,
    pub face_count: usize,

    /// Faces per output channel, indexed by channel.
    pub faces_per_channel: Vec<usize>,

    /// Edges with exactly one face.
    pub open_edge_count: usize,

    pub sharp_edge_count: usize,
    pub rounded_edge_count: usize,
    pub auto_edge_count: usize,
    pub unset_edge_count: usize,

    /// Faces with more than four vertices.
    pub ngon_count: usize,

    pub euler_characteristic: i64,

    /// Whether the next subdivision has to split shared vertices first.
    pub needs_vertex_split: bool,

    /// Human-readable notes about anything unusual.
    pub warnings: Vec<String>,
}

impl MeshDiagnostics {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.open_edge_count == 0
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// One-line summary for logging.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "V={} E={} F={} open={} sharp={} chi={}",
            self.vertex_count,
            self.edge_count,
            self.face_count,
            self.open_edge_count,
            self.sharp_edge_count,
            self.euler_characteristic
        )
    }
}

impl fmt::Display for MeshDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Diagnostics:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Edges: {}", self.edge_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        if self.faces_per_channel.len() > 1 {
            for (channel, count) in self.faces_per_channel.iter().enumerate() {
                writeln!(f, "    - channel {channel}: {count}")?;
            }
        }
        writeln!(
            f,
            "  Edge types: {} sharp, {} rounded, {} auto, {} unset",
            self.sharp_edge_count, self.rounded_edge_count, self.auto_edge_count, self.unset_edge_count
        )?;
        if self.open_edge_count > 0 {
            writeln!(f, "  Open edges: {}", self.open_edge_count)?;
        }
        writeln!(f, "  Euler characteristic: {}", self.euler_characteristic)?;
        if self.has_warnings() {
            writeln!(f, "  Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "    - {warning}")?;
            }
        }
        let status = if self.is_closed() { "closed" } else { "open" };
        writeln!(f, "  Status: {status}")
    }
}

impl PolyMesh {
    /// Snapshot of counts and edge classification.
    #[must_use]
    pub fn diagnostics(&self) -> MeshDiagnostics {
        let mut diag = MeshDiagnostics {
            vertex_count: self.verts.len(),
            edge_count: self.edges.len(),
            face_count: self.faces.len(),
            needs_vertex_split: !self.clean,
            ..MeshDiagnostics::default()
        };

        for face in &self.faces {
            let channel = face.channel as usize;
            if diag.faces_per_channel.len() <= channel {
                diag.faces_per_channel.resize(channel + 1, 0);
            }
            diag.faces_per_channel[channel] += 1;
            if face.verts.len() > 4 {
                diag.ngon_count += 1;
            }
        }

        for edge in &self.edges {
            if edge.face_count() < 2 {
                diag.open_edge_count += 1;
            }
            let kind = if edge.effective_type == EdgeType::Unset {
                edge.set_type
            } else {
                edge.effective_type
            };
            match kind {
                EdgeType::Sharp => diag.sharp_edge_count += 1,
                EdgeType::Rounded => diag.rounded_edge_count += 1,
                EdgeType::Auto => diag.auto_edge_count += 1,
                EdgeType::Unset => diag.unset_edge_count += 1,
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        {
            diag.euler_characteristic =
                self.verts.len() as i64 - self.edges.len() as i64 + self.faces.len() as i64;
        }

        let orphans = self.verts.iter().filter(|v| v.edges.is_empty()).count();
        if orphans > 0 {
            diag.add_warning(format!("{orphans} vertices without edges"));
        }
        if diag.open_edge_count > 0 {
            diag.add_warning(format!("{} open edges; subdivision will be skipped", diag.open_edge_count));
        }

        diag
    }
}
