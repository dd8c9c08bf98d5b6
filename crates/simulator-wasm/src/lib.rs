//! WebAssembly bridge for the Layerlab compiler and CPU simulator.
//!
//! [`WasmSimulator`] wraps an in-process backend and hands every result to
//! JavaScript as a plain object.

use compiler::LocalBackend;
use serde::Serialize;
use simulator_core::{
    hierarchy, Backend, BackendClient, CompilationStep, Instruction, PipelineOptions,
    StagePacing,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

macro_rules! console_log {
    ($($t:tt)*) => (log(&format!($($t)*)))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn js_error(err: impl ToString) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn options() -> PipelineOptions {
    PipelineOptions {
        pacing: StagePacing::Immediate,
        clock: js_sys::Date::now,
        ..PipelineOptions::default()
    }
}

/// Compiler plus CPU for a browser front end.
#[wasm_bindgen]
pub struct WasmSimulator {
    backend: BackendClient<LocalBackend>,
}

#[wasm_bindgen]
impl WasmSimulator {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        console_error_panic_hook::set_once();
        Self {
            backend: BackendClient::new(LocalBackend::with_options(options())),
        }
    }

    /// Compiles `source` and returns the compilation result.
    ///
    /// `on_step`, when given, receives every stage snapshot as it happens.
    pub fn compile_code(
        &self,
        source: &str,
        language: &str,
        on_step: Option<js_sys::Function>,
    ) -> Result<JsValue, JsValue> {
        let result = match on_step {
            Some(callback) => self
                .backend
                .compile_code_with_progress(source, language, &mut |step| {
                    notify(&callback, step);
                }),
            None => self.backend.compile_code(source, language),
        }
        .map_err(js_error)?;
        console_log!(
            "compiled {} instructions, {} errors",
            result.instructions.len(),
            result.errors.len()
        );
        to_js(&result)
    }

    /// Loads a program given as an array of instruction objects.
    pub fn load_instructions(&self, instructions: JsValue) -> Result<(), JsValue> {
        let instructions: Vec<Instruction> =
            serde_wasm_bindgen::from_value(instructions).map_err(js_error)?;
        self.backend
            .load_instructions(&instructions)
            .map_err(js_error)?;
        console_log!("loaded {} instructions", instructions.len());
        Ok(())
    }

    /// Advances the CPU by one micro-stage.
    pub fn step_execution(&self) -> Result<JsValue, JsValue> {
        let step = self.backend.step_execution().map_err(js_error)?;
        to_js(&step)
    }

    /// Resets the CPU and returns the fresh state.
    pub fn reset_cpu(&self) -> Result<JsValue, JsValue> {
        let state = self.backend.reset_cpu().map_err(js_error)?;
        to_js(&state)
    }

    pub fn get_cpu_state(&self) -> Result<JsValue, JsValue> {
        let state = self.backend.get_cpu_state().map_err(js_error)?;
        to_js(&state)
    }

    /// Layer, concept and interface catalog.
    pub fn hierarchy(&self) -> Result<JsValue, JsValue> {
        to_js(hierarchy())
    }
}

impl Default for WasmSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(callback: &js_sys::Function, step: &CompilationStep) {
    let outcome = to_js(step).and_then(|value| callback.call1(&JsValue::NULL, &value));
    if let Err(err) = outcome {
        console_log!("progress callback failed: {err:?}");
    }
}
