use pgc_engine::Engine;
use pgc_engine::graph::{LayoutDesc, LayoutGraph};
use pgc_engine::opt::{OptimizerConfig, SearchConfig};
use pgc_engine::pipeline::{self, CoarseConfig, FineConfig, MeshConfig, PipelineConfig, PipelineError};

/// Two back-to-back nodes 20 apart, joined by one edge.
const TUBE_LAYOUT: &str = r#"{
    "nodes": [
        {
            "position": [0.0, 0.0, 0.0],
            "connectors": [
                { "position": [2.0, 0.0, 0.0], "normal": [1.0, 0.0, 0.0], "profile": { "width": 2.0 } },
                { "position": [-2.0, 0.0, 0.0], "normal": [-1.0, 0.0, 0.0], "profile": { "width": 2.0 } }
            ]
        },
        {
            "position": [20.0, 0.0, 0.0],
            "connectors": [
                { "position": [2.0, 0.0, 0.0], "normal": [1.0, 0.0, 0.0], "profile": { "width": 2.0 } },
                { "position": [-2.0, 0.0, 0.0], "normal": [-1.0, 0.0, 0.0], "profile": { "width": 2.0 } }
            ]
        }
    ],
    "edges": [
        { "from_node": 0, "from_connector": 0, "to_node": 1, "to_connector": 1, "divs": 6 }
    ]
}"#;

fn quick_config() -> PipelineConfig {
    PipelineConfig {
        seed: 4,
        coarse: CoarseConfig {
            search: SearchConfig {
                species: 1,
                population: 2,
                mutations: 1,
                tolerances: vec![1e-2],
                final_tolerance: 1e-3,
                max_evaluations: 300,
                ..SearchConfig::default()
            },
            ..CoarseConfig::default()
        },
        fine: FineConfig {
            optimizer: OptimizerConfig::default().with_max_evaluations(300),
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
fn engine_starts_empty() {
    let engine = Engine::new();
    assert!(!engine.has_layout());
}

#[test]
fn tube_layout_from_json_generates_a_closed_mesh() {
    let desc: LayoutDesc = serde_json::from_str(TUBE_LAYOUT).expect("parse layout");
    let result = pipeline::generate_from_desc(&desc, &quick_config()).expect("generate");

    assert!(result.closed);
    assert!(result.mesh.triangle_count() > 0);
    assert_eq!(result.mesh.nodes.len(), 2);
    assert_eq!(result.fine.terms.len(), 3);
    let coarse = result.coarse.as_ref().expect("coarse phase ran");
    assert!(coarse.energy.is_finite());

    // Every triangle index points at a baked vertex.
    let vertex_count = u32::try_from(result.mesh.verts.len()).unwrap();
    for channel in &result.mesh.face_channels {
        assert!(channel.triangles.iter().all(|&i| i < vertex_count));
    }
}

#[test]
fn generated_structure_serializes() {
    let result = pipeline::generate(&LayoutGraph::demo_y_junction(), &quick_config()).expect("generate");
    let json = serde_json::to_value(&result).expect("serialize");
    assert!(json["mesh"]["verts"].as_array().is_some_and(|v| !v.is_empty()));
    assert_eq!(json["closed"], serde_json::Value::Bool(true));
    assert_eq!(json["fine"]["terms"][0]["name"], "connected");
}

#[test]
fn tetrahedron_runs_end_to_end() {
    let mut config = quick_config();
    config.vary_profiles = true;
    let result = pipeline::generate(&LayoutGraph::demo_tetrahedron(), &config).expect("generate");
    assert!(result.closed);
    assert_eq!(result.mesh.nodes.len(), 4);
    assert!(result.mesh.triangle_count() > 0);
    for node in &result.mesh.nodes {
        assert!((node.up.length() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn unknown_connector_in_description_is_reported() {
    let mut desc: LayoutDesc = serde_json::from_str(TUBE_LAYOUT).expect("parse layout");
    desc.edges[0].to_connector = 7;
    assert!(matches!(
        pipeline::generate_from_desc(&desc, &quick_config()),
        Err(PipelineError::Layout(_))
    ));
}
