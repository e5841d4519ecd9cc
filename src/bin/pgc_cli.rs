#[cfg(target_arch = "wasm32")]
fn main() {
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = native::run() {
        eprintln!("pgc_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use pgc_engine::geom::{Cube, CubeEdge, EdgeType, MeshResult, Point3, Vec3, run_self_test};
    use pgc_engine::graph::LayoutGraph;
    use pgc_engine::opt::OptOutcome;
    use pgc_engine::pipeline::{self, GeneratedStructure, PipelineConfig};
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};

    const SNAPSHOT_QUANTIZE: f64 = 1e-6;
    const SNAPSHOT_DECIMALS: usize = 6;

    const USAGE: &str = r#"pgc_cli (pgc-engine)

USAGE:
  pgc_cli list
  pgc_cli run <scenario|all> [options]
  pgc_cli selftest

SCENARIOS:
  y_junction
  loop
  tetrahedron
  cubes

OPTIONS (run):
  --out-dir <dir>    Write <scenario>.obj and/or <scenario>.snap to this dir (required for `all`)
  --obj <path>       Write OBJ (single scenario only)
  --snap <path>      Write snapshot (single scenario only)
  --config <path>    Pipeline configuration as JSON; missing fields take defaults
  --seed <n>         Override the configured seed
  --no-obj           Skip OBJ when using --out-dir
  --no-snap          Skip snapshot when using --out-dir
  --overwrite        Overwrite existing output files
  -h, --help         Show this help
"#;

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                print_scenarios();
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "selftest" => cmd_selftest(),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    fn print_scenarios() {
        for scenario in Scenario::ALL {
            println!("{}", scenario.name());
        }
    }

    fn cmd_selftest() -> Result<(), String> {
        let report = run_self_test().map_err(|e| e.to_string())?;
        println!(
            "cube self-test passed: {} meshes, {} faces",
            report.meshes_checked, report.faces_checked
        );
        Ok(())
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;

        let mut out_dir: Option<PathBuf> = None;
        let mut obj_path: Option<PathBuf> = None;
        let mut snap_path: Option<PathBuf> = None;
        let mut config = PipelineConfig::default();
        let mut seed: Option<u64> = None;
        let mut overwrite = false;
        let mut write_obj = true;
        let mut write_snap = true;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out-dir" => out_dir = Some(PathBuf::from(args.value("--out-dir")?)),
                "--obj" => obj_path = Some(PathBuf::from(args.value("--obj")?)),
                "--snap" => snap_path = Some(PathBuf::from(args.value("--snap")?)),
                "--config" => config = read_config(Path::new(&args.value("--config")?))?,
                "--seed" => {
                    let value = args.value("--seed")?;
                    seed = Some(value.parse().map_err(|e| format!("invalid seed `{value}`: {e}"))?);
                }
                "--overwrite" => overwrite = true,
                "--no-obj" => write_obj = false,
                "--no-snap" => write_snap = false,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`\n\n{USAGE}")),
            }
        }
        if let Some(seed) = seed {
            config.seed = seed;
        }

        if let Some(dir) = out_dir.as_ref() {
            if obj_path.is_some() || snap_path.is_some() {
                return Err("use either --out-dir or --obj/--snap (not both)".to_string());
            }
            if !write_obj && !write_snap {
                return Err("nothing to write (both --no-obj and --no-snap set)".to_string());
            }

            fs::create_dir_all(dir).map_err(|e| format!("create out dir: {e}"))?;

            if scenario_name == "all" {
                for scenario in Scenario::ALL {
                    run_one_scenario_to_dir(*scenario, &config, dir, write_obj, write_snap, overwrite)?;
                }
                return Ok(());
            }

            let scenario = Scenario::from_str(scenario_name.as_str())
                .ok_or_else(|| unknown_scenario(&scenario_name))?;
            return run_one_scenario_to_dir(scenario, &config, dir, write_obj, write_snap, overwrite);
        }

        if scenario_name == "all" {
            return Err("`run all` requires --out-dir".to_string());
        }

        let scenario =
            Scenario::from_str(scenario_name.as_str()).ok_or_else(|| unknown_scenario(&scenario_name))?;
        let output = run_scenario(scenario, &config)?;

        if let Some(path) = snap_path.as_deref() {
            write_text_file(path, &output.snapshot, overwrite)?;
            eprintln!("wrote {}", path.display());
        } else {
            print!("{}", output.snapshot);
        }

        if let Some(path) = obj_path.as_deref() {
            write_obj_file(path, &output.mesh, output.name, overwrite)?;
            eprintln!("wrote {}", path.display());
        }

        eprintln!("{}", output.summary());
        Ok(())
    }

    fn run_one_scenario_to_dir(
        scenario: Scenario,
        config: &PipelineConfig,
        dir: &Path,
        write_obj: bool,
        write_snap: bool,
        overwrite: bool,
    ) -> Result<(), String> {
        let output = run_scenario(scenario, config)?;

        if write_snap {
            let path = dir.join(format!("{}.snap", output.name));
            write_text_file(&path, &output.snapshot, overwrite)?;
            eprintln!("wrote {}", path.display());
        }

        if write_obj {
            let path = dir.join(format!("{}.obj", output.name));
            write_obj_file(&path, &output.mesh, output.name, overwrite)?;
            eprintln!("wrote {}", path.display());
        }

        eprintln!("{}", output.summary());
        Ok(())
    }

    fn read_config(path: &Path) -> Result<PipelineConfig, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("parse {}: {e}", path.display()))
    }

    fn unknown_scenario(name: &str) -> String {
        let mut msg = format!("unknown scenario `{name}`\n\navailable scenarios:\n");
        for scenario in Scenario::ALL {
            let _ = writeln!(msg, "  {}", scenario.name());
        }
        msg
    }

    fn write_text_file(path: &Path, text: &str, overwrite: bool) -> Result<(), String> {
        if path.exists() && !overwrite {
            return Err(format!(
                "refusing to overwrite existing file {} (use --overwrite)",
                path.display()
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create dir {}: {e}", parent.display()))?;
        }
        fs::write(path, normalize_snapshot_text(text)).map_err(|e| format!("write {}: {e}", path.display()))
    }

    fn write_obj_file(path: &Path, mesh: &MeshResult, name: &str, overwrite: bool) -> Result<(), String> {
        if mesh.triangle_count() == 0 {
            return Err(format!("{name}: nothing to write, the mesh has no triangles"));
        }
        let text = format!("# pgc-engine pgc_cli\no {name}\n{}", mesh.to_obj());
        write_text_file(path, &text, overwrite)
    }

    fn normalize_snapshot_text(text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        if normalized.ends_with('\n') {
            normalized
        } else {
            format!("{normalized}\n")
        }
    }

    fn quantize_f64(value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let q = (value / SNAPSHOT_QUANTIZE).round() * SNAPSHOT_QUANTIZE;
        if q == 0.0 { 0.0 } else { q }
    }

    fn write_f64(out: &mut String, value: f64) {
        let value = quantize_f64(value);
        let _ = write!(out, "{value:.SNAPSHOT_DECIMALS$}");
    }

    fn write_point_line(out: &mut String, prefix: &str, p: Point3) {
        let _ = write!(out, "{prefix} ");
        write_f64(out, p.x);
        out.push(' ');
        write_f64(out, p.y);
        out.push(' ');
        write_f64(out, p.z);
        out.push('\n');
    }

    fn write_vec3_line(out: &mut String, prefix: &str, v: Vec3) {
        write_point_line(out, prefix, Point3::new(v.x, v.y, v.z));
    }

    fn write_outcome(out: &mut String, phase: &str, outcome: &OptOutcome) {
        let _ = writeln!(out, "{phase}.converged {}", outcome.converged);
        let _ = writeln!(out, "{phase}.evaluations {}", outcome.evaluations);
        let _ = write!(out, "{phase}.energy ");
        write_f64(out, outcome.energy);
        out.push('\n');
        for term in &outcome.terms {
            let _ = write!(out, "{phase}.term.{} ", term.name);
            write_f64(out, term.value);
            out.push('\n');
        }
    }

    fn mesh_snapshot(out: &mut String, mesh: &MeshResult) {
        let _ = writeln!(out, "mesh.vertex_count {}", mesh.verts.len());
        let _ = writeln!(out, "mesh.triangle_count {}", mesh.triangle_count());
        let _ = writeln!(out, "mesh.sharp_edge_count {}", mesh.sharp_edges.len());
        if let Some(bbox) = pgc_engine::geom::BBox::from_points(&mesh.verts) {
            write_point_line(out, "mesh.bbox_min", bbox.min);
            write_point_line(out, "mesh.bbox_max", bbox.max);
        }
        for (idx, node) in mesh.nodes.iter().enumerate() {
            write_point_line(out, &format!("node.{idx}.position"), node.position);
            write_vec3_line(out, &format!("node.{idx}.up"), node.up);
        }
    }

    fn structure_snapshot(name: &str, generated: &GeneratedStructure) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "scenario {name}");
        let _ = writeln!(out, "closed {}", generated.closed);
        if let Some(coarse) = generated.coarse.as_ref() {
            write_outcome(&mut out, "coarse", coarse);
        }
        write_outcome(&mut out, "fine", &generated.fine);
        mesh_snapshot(&mut out, &generated.mesh);
        out
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Scenario {
        YJunction,
        Loop,
        Tetrahedron,
        Cubes,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::YJunction,
            Scenario::Loop,
            Scenario::Tetrahedron,
            Scenario::Cubes,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::YJunction => "y_junction",
                Scenario::Loop => "loop",
                Scenario::Tetrahedron => "tetrahedron",
                Scenario::Cubes => "cubes",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Self::ALL.iter().copied().find(|s| s.name() == name)
        }
    }

    struct ScenarioOutput {
        name: &'static str,
        mesh: MeshResult,
        closed: Option<bool>,
        snapshot: String,
    }

    impl ScenarioOutput {
        fn summary(&self) -> String {
            let mut line = format!(
                "{}: vertices={} triangles={}",
                self.name,
                self.mesh.verts.len(),
                self.mesh.triangle_count()
            );
            if let Some(closed) = self.closed {
                let _ = write!(line, " closed={closed}");
            }
            line
        }
    }

    fn run_scenario(scenario: Scenario, config: &PipelineConfig) -> Result<ScenarioOutput, String> {
        let layout = match scenario {
            Scenario::YJunction => LayoutGraph::demo_y_junction(),
            Scenario::Loop => LayoutGraph::demo_loop(),
            Scenario::Tetrahedron => LayoutGraph::demo_tetrahedron(),
            Scenario::Cubes => return Ok(scenario_cubes(config)),
        };
        let generated = pipeline::generate(&layout, config).map_err(|e| e.to_string())?;
        let name = scenario.name();
        Ok(ScenarioOutput {
            name,
            snapshot: structure_snapshot(name, &generated),
            closed: Some(generated.closed),
            mesh: generated.mesh,
        })
    }

    /// An L of three cubes with one sharp edge along the corner cube.
    fn scenario_cubes(config: &PipelineConfig) -> ScenarioOutput {
        let cubes = [
            Cube::at(0, 0, 0).with_edge(CubeEdge::ALL[0], EdgeType::Sharp),
            Cube::at(1, 0, 0),
            Cube::at(0, 1, 0),
        ];
        let mesh = pipeline::generate_cubes(&cubes, config.mesh.subdivisions, config.mesh.inside_out);
        let mut snapshot = String::from("scenario cubes\n");
        mesh_snapshot(&mut snapshot, &mesh);
        ScenarioOutput {
            name: Scenario::Cubes.name(),
            mesh,
            closed: None,
            snapshot,
        }
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }
    }
}
