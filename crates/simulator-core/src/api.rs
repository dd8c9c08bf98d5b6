//! Backend contract between a front end and the compiler/CPU.
//!
//! [`Backend`] names the five operations a front end may invoke.
//! [`BackendClient`] wraps any backend, logs failures at the boundary and
//! keeps a single compile in flight per source/language pair.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, error};

use crate::{CompilationStep, CpuFault, CpuState, ExecutionStage, Instruction};

/// Terminal result of a compile request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CompilationResult {
    /// `true` when every stage completed.
    pub success: bool,
    /// Generated program; empty unless `success`.
    pub instructions: Vec<Instruction>,
    /// Failing stage description and diagnostics.
    pub errors: Vec<String>,
    /// Non-fatal diagnostics.
    pub warnings: Vec<String>,
    /// Wall time in milliseconds.
    pub compilation_time: u64,
}

impl CompilationResult {
    /// Failed result carrying `errors`. The instruction list is always empty.
    #[must_use]
    pub const fn failure(errors: Vec<String>, warnings: Vec<String>, compilation_time: u64) -> Self {
        Self {
            success: false,
            instructions: Vec::new(),
            errors,
            warnings,
            compilation_time,
        }
    }
}

/// Observation returned by one CPU micro-step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExecutionResult {
    /// Stage just performed.
    pub stage: ExecutionStage,
    /// Instruction under execution, `None` when nothing is loaded or the
    /// program has finished.
    pub instruction: Option<Instruction>,
    /// State after the step.
    pub cpu_state: CpuState,
    /// Human-readable description of the step.
    pub message: String,
    /// Effective micro-steps so far.
    pub cycle_count: u64,
}

/// Failures crossing the backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// An identical compile is still running.
    #[error("a compile of this source and language is already in flight")]
    CompileInFlight,
    /// The CPU rejected a program or faulted.
    #[error(transparent)]
    Fault(#[from] CpuFault),
    /// The backend could not service the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The five backend operations.
pub trait Backend {
    /// Compiles `source` written in `language`.
    ///
    /// Compile errors are reported inside the [`CompilationResult`]; `Err`
    /// means the request itself failed.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the request cannot be serviced.
    fn compile_code(&self, source: &str, language: &str) -> Result<CompilationResult, BackendError>;

    /// Compiles like [`Backend::compile_code`], handing every stage
    /// snapshot to `on_step` as it happens.
    ///
    /// Backends without observable stages compile without reporting.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the request cannot be serviced.
    fn compile_code_with_progress(
        &self,
        source: &str,
        language: &str,
        on_step: &mut dyn FnMut(&CompilationStep),
    ) -> Result<CompilationResult, BackendError> {
        let _ = on_step;
        self.compile_code(source, language)
    }

    /// Loads a program into the CPU.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Fault`] when the program is rejected.
    fn load_instructions(&self, instructions: &[Instruction]) -> Result<(), BackendError>;

    /// Performs one CPU micro-step.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Fault`] for runtime faults.
    fn step_execution(&self) -> Result<ExecutionResult, BackendError>;

    /// Resets the CPU and returns the boot snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the backend is unavailable.
    fn reset_cpu(&self) -> Result<CpuState, BackendError>;

    /// Returns the current CPU state.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the backend is unavailable.
    fn get_cpu_state(&self) -> Result<CpuState, BackendError>;
}

/// Logging, de-duplicating wrapper around a [`Backend`].
#[derive(Debug, Default)]
pub struct BackendClient<B> {
    backend: B,
    in_flight: Mutex<HashSet<(String, String)>>,
}

/// Removes an in-flight key when the compile returns or unwinds.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn logged<T>(operation: &'static str, result: Result<T, BackendError>) -> Result<T, BackendError> {
    if let Err(err) = &result {
        error!(operation, error = %err, "backend call failed");
    }
    result
}

impl<B: Backend> BackendClient<B> {
    /// Wraps `backend`.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wrapped backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    fn guarded(
        &self,
        source: &str,
        language: &str,
        compile: impl FnOnce() -> Result<CompilationResult, BackendError>,
    ) -> Result<CompilationResult, BackendError> {
        let key = (source.to_owned(), language.to_owned());
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            return logged("compile_code", Err(BackendError::CompileInFlight));
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key,
        };
        debug!(language, bytes = source.len(), "compile requested");
        logged("compile_code", compile())
    }
}

impl<B: Backend> Backend for BackendClient<B> {
    fn compile_code(&self, source: &str, language: &str) -> Result<CompilationResult, BackendError> {
        self.guarded(source, language, || {
            self.backend.compile_code(source, language)
        })
    }

    fn compile_code_with_progress(
        &self,
        source: &str,
        language: &str,
        on_step: &mut dyn FnMut(&CompilationStep),
    ) -> Result<CompilationResult, BackendError> {
        self.guarded(source, language, || {
            self.backend
                .compile_code_with_progress(source, language, on_step)
        })
    }

    fn load_instructions(&self, instructions: &[Instruction]) -> Result<(), BackendError> {
        logged(
            "load_instructions",
            self.backend.load_instructions(instructions),
        )
    }

    fn step_execution(&self) -> Result<ExecutionResult, BackendError> {
        logged("step_execution", self.backend.step_execution())
    }

    fn reset_cpu(&self) -> Result<CpuState, BackendError> {
        logged("reset_cpu", self.backend.reset_cpu())
    }

    fn get_cpu_state(&self) -> Result<CpuState, BackendError> {
        logged("get_cpu_state", self.backend.get_cpu_state())
    }
}
