#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod geom;
pub mod graph;
pub mod opt;
pub mod pipeline;

use std::fmt;

use geom::Cube;
use graph::{LayoutDesc, LayoutGraph};
use pipeline::PipelineConfig;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            // no-op fallback when panic hook is disabled
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {
    // no-op fallback when debug logs are disabled
}

#[cfg(all(feature = "parallel", target_arch = "wasm32"))]
#[wasm_bindgen]
pub async fn initialize_parallel(worker_count: Option<u32>) -> Result<(), JsError> {
    let threads = worker_count
        .map(|count| count.max(1) as usize)
        .or_else(|| {
            std::thread::available_parallelism()
                .map(|value| value.get())
                .ok()
        })
        .unwrap_or(1);

    wasm_bindgen_rayon::init_thread_pool(threads)
        .await
        .map_err(|err| JsError::new(&format!("could not initialize the rayon thread pool: {err}")))
}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Public entry point for consumers.
#[wasm_bindgen]
#[derive(Default)]
pub struct Engine {
    layout: Option<LayoutGraph>,
    config: PipelineConfig,
}

#[wasm_bindgen]
impl Engine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Load a layout description (`{ nodes, edges }`).
    #[wasm_bindgen]
    pub fn load_layout(&mut self, desc: JsValue) -> Result<(), JsValue> {
        let desc: LayoutDesc = serde_wasm_bindgen::from_value(desc).map_err(to_js_error)?;
        let layout = LayoutGraph::from_desc(&desc).map_err(to_js_error)?;
        debug_log!(
            "layout loaded: {} nodes, {} edges",
            layout.node_count(),
            layout.edge_count()
        );
        self.layout = Some(layout);
        Ok(())
    }

    /// Replace the pipeline configuration; missing fields take defaults.
    #[wasm_bindgen]
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        self.config = serde_wasm_bindgen::from_value(config).map_err(to_js_error)?;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn has_layout(&self) -> bool {
        self.layout.is_some()
    }

    /// Run the whole pipeline on the loaded layout and return the baked mesh
    /// with the optimizer summaries.
    #[wasm_bindgen]
    pub fn generate(&self) -> Result<JsValue, JsValue> {
        let Some(layout) = self.layout.as_ref() else {
            return Err(js_error("no layout has been loaded"));
        };
        let generated = pipeline::generate(layout, &self.config).map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&generated).map_err(to_js_error)
    }

    /// Fuse, subdivide and bake a list of cubes (`{ x, y, z, edge_types? }`).
    #[wasm_bindgen]
    pub fn generate_cubes(&self, cubes: JsValue, subdivisions: u32, inside_out: bool) -> Result<JsValue, JsValue> {
        let cubes: Vec<Cube> = serde_wasm_bindgen::from_value(cubes).map_err(to_js_error)?;
        let mesh = pipeline::generate_cubes(&cubes, subdivisions as usize, inside_out);
        serde_wasm_bindgen::to_value(&mesh).map_err(to_js_error)
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
