use std::sync::{Mutex, MutexGuard};

use simulator_core::{
    Backend, BackendError, CompilationResult, CompilationStep, Cpu, CpuState, ExecutionResult,
    Instruction, PipelineOptions,
};

use crate::compile_with_progress;

/// Compiler plus CPU in the calling process.
#[derive(Debug, Default)]
pub struct LocalBackend {
    cpu: Mutex<Cpu>,
    options: PipelineOptions,
}

impl LocalBackend {
    /// Backend with default pipeline options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose compiles run with `options`.
    #[must_use]
    pub fn with_options(options: PipelineOptions) -> Self {
        Self {
            cpu: Mutex::new(Cpu::new()),
            options,
        }
    }

    fn cpu(&self) -> Result<MutexGuard<'_, Cpu>, BackendError> {
        self.cpu
            .lock()
            .map_err(|_| BackendError::Unavailable("CPU lock poisoned".to_owned()))
    }
}

impl Backend for LocalBackend {
    fn compile_code(&self, source: &str, language: &str) -> Result<CompilationResult, BackendError> {
        Ok(compile_with_progress(
            source,
            language,
            self.options.clone(),
            |_| {},
        ))
    }

    fn compile_code_with_progress(
        &self,
        source: &str,
        language: &str,
        on_step: &mut dyn FnMut(&CompilationStep),
    ) -> Result<CompilationResult, BackendError> {
        Ok(compile_with_progress(
            source,
            language,
            self.options.clone(),
            on_step,
        ))
    }

    fn load_instructions(&self, instructions: &[Instruction]) -> Result<(), BackendError> {
        Ok(self.cpu()?.load_instructions(instructions.to_vec())?)
    }

    fn step_execution(&self) -> Result<ExecutionResult, BackendError> {
        Ok(self.cpu()?.step()?)
    }

    fn reset_cpu(&self) -> Result<CpuState, BackendError> {
        Ok(self.cpu()?.reset().clone())
    }

    fn get_cpu_state(&self) -> Result<CpuState, BackendError> {
        Ok(self.cpu()?.state().clone())
    }
}
