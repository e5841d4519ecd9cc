//! End-to-end generation: layout in, baked mesh out.
//!
//! The phases run in a fixed order:
//!
//! 1. structural skeleton from the layout
//! 2. coarse species search over the intermediate graph, copied back
//! 3. spline fill-out of every layout edge
//! 4. DAG frame propagation
//! 5. fine L-BFGS refinement of positions and ups, frames refreshed after
//! 6. profile extrusion and junction fill
//! 7. subdivision (closed meshes only) and bake
//!
//! Non-convergence is logged and the best state found is used.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{
    Cube, DebugEdges, MeshResult, PhaseTimings, PipelineMetrics, PolyMesh, TimingBucket,
};
use crate::graph::{LayoutDesc, LayoutError, LayoutGraph, ProfileSource, RandomProfileSource, SGraph, StructuralError};
use crate::opt::{
    CoarseScales, EnergyHistogram, FineObjective, FineScales, OptOutcome, Optimizer, OptimizerConfig, SearchConfig,
    SpeciesSearch,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("layout has no nodes")]
    EmptyLayout,
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseConfig {
    /// Skip the search and keep the layout's own junction positions.
    pub enabled: bool,
    pub search: SearchConfig,
    pub scales: CoarseScales,
}

impl Default for CoarseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search: SearchConfig::default(),
            scales: CoarseScales::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FineConfig {
    pub scales: FineScales,
    pub optimizer: OptimizerConfig,
    /// Compare every term's gradient with finite differences; panics on a
    /// mismatch. On by default in debug builds.
    pub check_gradients: bool,
    /// Log the final connected-pair stretch histogram.
    pub histogram: bool,
}

impl Default for FineConfig {
    fn default() -> Self {
        Self {
            scales: FineScales::default(),
            optimizer: OptimizerConfig::default()
                .with_tolerance(1e-6)
                .with_max_evaluations(20_000),
            check_gradients: cfg!(debug_assertions),
            histogram: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub subdivisions: usize,
    /// `Auto` edges between faces meeting at more than this become Sharp.
    pub auto_sharp_angle: f64,
    pub inside_out: bool,
    pub debug_edges: DebugEdges,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            subdivisions: 2,
            auto_sharp_angle: 30.0,
            inside_out: false,
            debug_edges: DebugEdges::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seeds the species search and the profile source.
    pub seed: u64,
    /// Vary profiles along edges with random roadbed sequences instead of
    /// blending the two connector profiles.
    pub vary_profiles: bool,
    pub coarse: CoarseConfig,
    pub fine: FineConfig,
    pub mesh: MeshConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedStructure {
    pub mesh: MeshResult,
    /// `None` when the coarse phase was disabled.
    pub coarse: Option<OptOutcome>,
    pub fine: OptOutcome,
    /// The structure mesh was closed before subdivision.
    pub closed: bool,
    #[serde(skip)]
    pub timings: Option<PhaseTimings>,
}

/// Parse a layout description and run [`generate`].
///
/// # Errors
/// An invalid description, or any error of [`generate`].
pub fn generate_from_desc(desc: &LayoutDesc, config: &PipelineConfig) -> Result<GeneratedStructure, PipelineError> {
    let layout = LayoutGraph::from_desc(desc)?;
    generate(&layout, config)
}

/// Run every phase on `layout`.
///
/// # Errors
/// An empty layout, connectors too close to fill an edge, or a junction
/// mixing open and closed ceilings.
pub fn generate(layout: &LayoutGraph, config: &PipelineConfig) -> Result<GeneratedStructure, PipelineError> {
    if layout.node_count() == 0 {
        return Err(PipelineError::EmptyLayout);
    }
    let mut metrics = PipelineMetrics::default();
    metrics.begin();

    let mut graph = metrics.time(TimingBucket::Construction, || SGraph::from_layout(layout));

    let coarse = if config.coarse.enabled {
        let outcome = metrics.time(TimingBucket::CoarseSearch, || {
            let start = graph.intermediate_graph();
            let search_config = SearchConfig {
                seed: config.seed,
                ..config.coarse.search.clone()
            };
            let result = SpeciesSearch::new(search_config, config.coarse.scales).run(&start);
            graph.apply_intermediate(&result.graph);
            result.outcome
        });
        if !outcome.converged {
            log::warn!(
                "coarse phase stopped at its evaluation budget, energy {:.6e}",
                outcome.energy
            );
        }
        Some(outcome)
    } else {
        None
    };

    metrics.time(TimingBucket::FillOut, || {
        let mut source = RandomProfileSource::with_demo_roadbeds(config.seed);
        let source: Option<&mut dyn ProfileSource> = if config.vary_profiles { Some(&mut source) } else { None };
        graph.fill_out(source)
    })?;

    metrics.time(TimingBucket::Dag, || graph.make_into_dag());

    let fine = metrics.time(TimingBucket::FinePhase, || {
        let mut histogram = EnergyHistogram::default();
        let outcome = {
            let objective = FineObjective::new(&mut graph, config.fine.scales)
                .with_gradient_check(config.fine.check_gradients);
            let mut objective = if config.fine.histogram {
                objective.with_histogram(&mut histogram)
            } else {
                objective
            };
            Optimizer::new(config.fine.optimizer).run(&mut objective)
        };
        if config.fine.histogram {
            log::debug!("{histogram}");
        }
        graph.refresh_frames();
        outcome
    });
    if !fine.converged {
        log::warn!("fine phase stopped at its evaluation budget, energy {:.6e}", fine.energy);
    }

    let mut mesh = PolyMesh::with_auto_sharp_angle(config.mesh.auto_sharp_angle);
    metrics.time(TimingBucket::Meshing, || graph.make_mesh(&mut mesh))?;
    let closed = mesh.is_closed();
    if config.mesh.subdivisions > 0 {
        if closed {
            mesh = metrics.time(TimingBucket::Subdivision, || mesh.subdivide_n(config.mesh.subdivisions));
        } else {
            log::warn!("structure mesh is open; skipping subdivision");
        }
    }

    let mut out = MeshResult::default();
    metrics.time(TimingBucket::Bake, || {
        mesh.bake_all_channels_into_one(&mut out, config.mesh.inside_out, config.mesh.debug_edges);
    });
    out.nodes = graph.layout_positions();

    let timings = metrics.end();
    if let Some(t) = &timings {
        log::info!("pipeline took {:.2} ms", t.total_ms());
    }
    log::info!(
        "generated {} triangles from {} layout nodes (closed: {closed})",
        out.triangle_count(),
        layout.node_count()
    );
    Ok(GeneratedStructure {
        mesh: out,
        coarse,
        fine,
        closed,
        timings,
    })
}

/// Fuse `cubes` into one mesh, subdivide it and bake it. Repeated positions
/// are added once.
#[must_use]
pub fn generate_cubes(cubes: &[Cube], subdivisions: usize, inside_out: bool) -> MeshResult {
    let mut mesh = PolyMesh::new();
    let mut seen = HashSet::with_capacity(cubes.len());
    for cube in cubes {
        if seen.insert((cube.x, cube.y, cube.z)) {
            mesh.add_cube(cube);
        } else {
            log::debug!("skipping repeated cube at ({}, {}, {})", cube.x, cube.y, cube.z);
        }
    }
    if !mesh.is_empty() {
        mesh = mesh.subdivide_n(subdivisions);
    }
    let mut out = MeshResult::default();
    mesh.bake_all_channels_into_one(&mut out, inside_out, DebugEdges::None);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> PipelineConfig {
        PipelineConfig {
            seed: 7,
            coarse: CoarseConfig {
                enabled: true,
                search: SearchConfig {
                    species: 1,
                    population: 2,
                    mutations: 1,
                    tolerances: vec![1e-2],
                    final_tolerance: 1e-3,
                    max_evaluations: 300,
                    ..SearchConfig::default()
                },
                scales: CoarseScales::default(),
            },
            fine: FineConfig {
                optimizer: OptimizerConfig::default().with_max_evaluations(200),
                ..FineConfig::default()
            },
            mesh: MeshConfig {
                subdivisions: 1,
                ..MeshConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn y_junction_generates_a_closed_structure() {
        let result = generate(&LayoutGraph::demo_y_junction(), &quick()).unwrap();
        assert!(result.closed);
        assert!(result.mesh.triangle_count() > 0);
        assert_eq!(result.mesh.nodes.len(), 1);
        assert!(result.coarse.is_some());
        assert_eq!(result.fine.terms.len(), 3);
    }

    #[test]
    fn varied_profiles_keep_the_tetrahedron_closed() {
        for seed in 0..3 {
            let config = PipelineConfig {
                seed,
                vary_profiles: true,
                ..quick()
            };
            let result = generate(&LayoutGraph::demo_tetrahedron(), &config).unwrap();
            assert!(result.closed, "seed {seed}");
            assert_eq!(result.mesh.nodes.len(), 4);
        }
    }

    #[test]
    fn gradient_checks_follow_the_build_profile() {
        assert_eq!(FineConfig::default().check_gradients, cfg!(debug_assertions));
        assert_eq!(PipelineConfig::default().fine.check_gradients, cfg!(debug_assertions));
    }

    #[test]
    fn disabled_coarse_phase_is_skipped() {
        let mut config = quick();
        config.coarse.enabled = false;
        config.mesh.subdivisions = 0;
        let result = generate(&LayoutGraph::demo_loop(), &config).unwrap();
        assert!(result.coarse.is_none());
        assert_eq!(result.mesh.nodes.len(), 1);
    }

    #[test]
    fn empty_layout_is_rejected() {
        assert!(matches!(
            generate(&LayoutGraph::new(), &PipelineConfig::default()),
            Err(PipelineError::EmptyLayout)
        ));
    }

    #[test]
    fn two_fused_cubes_bake_ten_quads() {
        let cubes = [Cube::at(0, 0, 0), Cube::at(0, 0, 1), Cube::at(0, 0, 1)];
        let out = generate_cubes(&cubes, 0, false);
        assert_eq!(out.triangle_count(), 20);
        assert!(generate_cubes(&[], 2, false).verts.is_empty());
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"seed": 3, "mesh": {"subdivisions": 0}}"#).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.mesh.subdivisions, 0);
        assert!((config.mesh.auto_sharp_angle - 30.0).abs() < 1e-12);
        assert!(config.coarse.enabled);
        assert_eq!(config.fine.optimizer.max_evaluations, 20_000);
    }
}
