//! Layerlab C-subset compiler and in-process backend.
//!
//! [`compile_code`] runs source text through the six compilation stages and
//! returns a [`CompilationResult`] whose instructions load directly into the
//! simulator CPU. [`LocalBackend`] pairs the compiler with a CPU behind the
//! [`Backend`](simulator_core::Backend) contract.

use clap as _;
#[cfg(test)]
use rstest as _;
use serde_json as _;
#[cfg(test)]
use tempfile as _;
use toml as _;
use tracing_subscriber as _;

/// In-process [`Backend`](simulator_core::Backend) implementation.
pub mod backend;
/// IR to simulator instructions.
pub mod codegen;
/// Stage work for the compilation pipeline.
pub mod driver;
/// x86-style machine-code encoding.
pub mod encoder;
/// Structured compile errors and warnings.
pub mod errors;
/// Three-address code.
pub mod ir;
/// Tokenizer.
pub mod lexer;
/// Constant folding and dead code removal.
pub mod optimize;
/// Recursive-descent parser.
pub mod parser;
/// Name resolution and usage checks.
pub mod semantic;

pub use backend::LocalBackend;
pub use driver::CompilerDriver;
pub use errors::{CompileError, CompileErrorKind, CompileWarning, SourceLocation, WarningKind};

use simulator_core::{
    CompilationResult, CompilationStep, PipelineOptions, ProgrammingLanguage, StagePipeline,
};
use tracing::{info, warn};

/// Compiles `source` written in `language` with default pipeline options.
#[must_use]
pub fn compile_code(source: &str, language: &str) -> CompilationResult {
    compile_with_progress(source, language, PipelineOptions::default(), |_| {})
}

/// Compiles `source`, calling `on_step` for every stage snapshot.
///
/// An unknown language tag fails before any stage runs. Languages other
/// than C go through the same front end with a warning.
pub fn compile_with_progress<F: FnMut(&CompilationStep)>(
    source: &str,
    language: &str,
    options: PipelineOptions,
    on_step: F,
) -> CompilationResult {
    let language = match language.parse::<ProgrammingLanguage>() {
        Ok(language) => language,
        Err(err) => {
            warn!(%err, "compile rejected");
            return CompilationResult::failure(vec![err.to_string()], Vec::new(), 0);
        }
    };

    let mut driver = CompilerDriver::new();
    if !language.is_native() {
        driver.warn(CompileWarning::new(WarningKind::ForeignLanguage(language)));
    }
    let (report, driver) = StagePipeline::with_options(driver, source, options).drive(on_step);
    let (instructions, warnings) = driver.into_parts();
    let warnings: Vec<String> = warnings.iter().map(ToString::to_string).collect();

    let result = if report.succeeded() {
        CompilationResult {
            success: true,
            instructions,
            errors: Vec::new(),
            warnings,
            compilation_time: report.elapsed_ms,
        }
    } else {
        CompilationResult::failure(report.errors(), warnings, report.elapsed_ms)
    };
    info!(
        language = language.as_str(),
        success = result.success,
        instructions = result.instructions.len(),
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        elapsed_ms = result.compilation_time,
        "compilation finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use simulator_core::{PipelineOptions, StageStatus};

    use super::{compile_code, compile_with_progress};

    #[test]
    fn single_declaration_compiles() {
        let result = compile_code("int a = 5;", "c");
        assert!(result.success);
        assert!(!result.instructions.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn unknown_language_fails_before_any_stage() {
        let mut seen = 0;
        let result =
            compile_with_progress("int a;", "cobol", PipelineOptions::default(), |_| seen += 1);
        assert!(!result.success);
        assert_eq!(result.errors, vec!["unsupported language `cobol`".to_owned()]);
        assert_eq!(seen, 0);
    }

    #[test]
    fn foreign_languages_compile_with_a_warning() {
        let result = compile_code("int a = 5;", "Python");
        assert!(result.success);
        assert_eq!(
            result.warnings[0],
            "warning: Python source is compiled with the C front end"
        );
    }

    #[test]
    fn failed_compiles_have_no_instructions() {
        let result = compile_code("int a = ;", "c");
        assert!(!result.success);
        assert!(result.instructions.is_empty());
        assert!(result.errors[0].starts_with("Syntax Analysis"));
    }

    #[test]
    fn progress_reports_twelve_transitions() {
        let mut statuses = Vec::new();
        let result = compile_with_progress(
            simulator_core::DEFAULT_SOURCE,
            "c",
            PipelineOptions::default(),
            |step| statuses.push(step.status()),
        );
        assert!(result.success);
        assert_eq!(statuses.len(), 12);
        assert!(statuses
            .chunks(2)
            .all(|pair| pair == [StageStatus::InProgress, StageStatus::Completed]));
    }

    #[test]
    fn deeply_nested_source_fails_cleanly() {
        let source = format!("int a = {}5{};", "(".repeat(200_000), ")".repeat(200_000));
        let result = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || compile_code(&source, "c"))
            .expect("spawns")
            .join()
            .expect("compiles without overflowing the stack");
        assert!(!result.success);
        assert!(result.instructions.is_empty());
        assert!(result.errors[1].ends_with("nested more than 256 levels deep"));
    }
}
