//! Stage work that runs the compiler front end inside a
//! [`StagePipeline`](simulator_core::StagePipeline).
//!
//! Each stage keeps its structured result for the next one and returns a
//! text rendering as the stage output.

use std::fmt::Write as _;

use simulator_core::{CompilationStage, Instruction, StageFailure, StageWork};
use tracing::debug;

use crate::codegen::generate;
use crate::errors::{CompileError, CompileWarning};
use crate::ir::{lower, IrProgram};
use crate::lexer::{tokenize, Token};
use crate::optimize::optimize;
use crate::parser::{parse, Program};
use crate::semantic::{analyze, Analysis};

fn failure(err: &CompileError) -> StageFailure {
    StageFailure::new(err.to_string())
}

fn failures(errors: &[CompileError]) -> StageFailure {
    let mut rendered = errors.iter().map(ToString::to_string);
    let first = rendered
        .next()
        .unwrap_or_else(|| "stage reported no diagnostics".to_owned());
    StageFailure::new(first).with_diagnostics(rendered.collect())
}

fn missing(stage: &str) -> StageFailure {
    StageFailure::new(format!("{stage} has not produced a result"))
}

/// Compiler state threaded through the six stages.
#[derive(Debug, Default)]
pub struct CompilerDriver {
    tokens: Vec<Token>,
    program: Option<Program>,
    analysis: Option<Analysis>,
    ir: Option<IrProgram>,
    instructions: Vec<Instruction>,
    warnings: Vec<CompileWarning>,
}

impl CompilerDriver {
    /// Fresh driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a warning reported outside the stages.
    pub fn warn(&mut self, warning: CompileWarning) {
        self.warnings.push(warning);
    }

    /// Warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    /// Semantic analysis result, once that stage has run.
    #[must_use]
    pub const fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// Generated program; empty until code generation completes.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Consumes the driver, returning the program and warnings.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Instruction>, Vec<CompileWarning>) {
        (self.instructions, self.warnings)
    }

    fn lex(&mut self, source: &str) -> Result<String, StageFailure> {
        self.tokens = tokenize(source).map_err(|err| failure(&err))?;
        let mut out = String::new();
        for token in &self.tokens {
            let _ = writeln!(out, "{} {token}", token.location);
        }
        Ok(out)
    }

    fn parse(&mut self) -> Result<String, StageFailure> {
        let program = parse(&self.tokens).map_err(|err| failure(&err))?;
        let out = program.to_string();
        self.program = Some(program);
        Ok(out)
    }

    fn check(&mut self) -> Result<String, StageFailure> {
        let program = self.program.as_ref().ok_or_else(|| missing("syntax analysis"))?;
        let analysis = analyze(program).map_err(|errors| failures(&errors))?;
        let mut out = analysis.to_string();
        for warning in &analysis.warnings {
            let _ = writeln!(out, "{warning}");
        }
        self.warnings.extend(analysis.warnings.iter().cloned());
        self.analysis = Some(analysis);
        Ok(out)
    }

    fn lower(&mut self) -> Result<String, StageFailure> {
        let program = self.program.as_ref().ok_or_else(|| missing("syntax analysis"))?;
        let (ir, warnings) = lower(program).map_err(|err| failure(&err))?;
        self.warnings.extend(warnings);
        let out = ir.to_string();
        self.ir = Some(ir);
        Ok(out)
    }

    fn optimize(&mut self) -> Result<String, StageFailure> {
        let ir = self.ir.take().ok_or_else(|| missing("intermediate code"))?;
        let optimized = optimize(ir);
        self.warnings.extend(optimized.warnings);
        let out = format!("{}; {}\n", optimized.ir, optimized.stats);
        self.ir = Some(optimized.ir);
        Ok(out)
    }

    fn generate(&mut self) -> Result<String, StageFailure> {
        let ir = self.ir.as_ref().ok_or_else(|| missing("optimization"))?;
        self.instructions = generate(ir).map_err(|err| failure(&err))?;
        let mut out = String::new();
        for instruction in &self.instructions {
            let _ = writeln!(
                out,
                "{:<22} {}",
                instruction.machine_code(),
                instruction.assembly()
            );
        }
        Ok(out)
    }
}

impl StageWork for CompilerDriver {
    fn run(&mut self, stage: CompilationStage, input: &str) -> Result<String, StageFailure> {
        debug!(stage = stage.id(), input_bytes = input.len(), "running stage");
        match stage {
            CompilationStage::LexicalAnalysis => self.lex(input),
            CompilationStage::SyntaxAnalysis => self.parse(),
            CompilationStage::SemanticAnalysis => self.check(),
            CompilationStage::IntermediateCode => self.lower(),
            CompilationStage::Optimization => self.optimize(),
            CompilationStage::CodeGeneration => self.generate(),
        }
    }
}
