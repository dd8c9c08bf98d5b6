use std::fmt;

use thiserror::Error;

/// The six compilation stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompilationStage {
    /// Source text to tokens.
    LexicalAnalysis,
    /// Tokens to syntax tree.
    SyntaxAnalysis,
    /// Scope and symbol checks.
    SemanticAnalysis,
    /// Syntax tree to three-address code.
    IntermediateCode,
    /// IR rewrites.
    Optimization,
    /// IR to machine instructions.
    CodeGeneration,
}

impl CompilationStage {
    /// All stages in order.
    pub const ALL: [Self; 6] = [
        Self::LexicalAnalysis,
        Self::SyntaxAnalysis,
        Self::SemanticAnalysis,
        Self::IntermediateCode,
        Self::Optimization,
        Self::CodeGeneration,
    ];

    /// Stable id.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::LexicalAnalysis => "lexical_analysis",
            Self::SyntaxAnalysis => "syntax_analysis",
            Self::SemanticAnalysis => "semantic_analysis",
            Self::IntermediateCode => "intermediate_code",
            Self::Optimization => "optimization",
            Self::CodeGeneration => "code_generation",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LexicalAnalysis => "词法分析",
            Self::SyntaxAnalysis => "语法分析",
            Self::SemanticAnalysis => "语义分析",
            Self::IntermediateCode => "中间代码生成",
            Self::Optimization => "代码优化",
            Self::CodeGeneration => "目标代码生成",
        }
    }

    /// English display name.
    #[must_use]
    pub const fn name_en(self) -> &'static str {
        match self {
            Self::LexicalAnalysis => "Lexical Analysis",
            Self::SyntaxAnalysis => "Syntax Analysis",
            Self::SemanticAnalysis => "Semantic Analysis",
            Self::IntermediateCode => "Intermediate Code Generation",
            Self::Optimization => "Code Optimization",
            Self::CodeGeneration => "Code Generation",
        }
    }

    /// One-line description of the stage's job.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::LexicalAnalysis => "Split the source text into tokens",
            Self::SyntaxAnalysis => "Build an abstract syntax tree from the grammar rules",
            Self::SemanticAnalysis => "Check semantic correctness and build the symbol table",
            Self::IntermediateCode => "Generate a machine-independent intermediate representation",
            Self::Optimization => "Optimize the intermediate code",
            Self::CodeGeneration => "Generate target machine instructions",
        }
    }

    /// Ordered sub-step descriptions.
    #[must_use]
    pub const fn details(self) -> &'static [&'static str] {
        match self {
            Self::LexicalAnalysis => &[
                "Recognize keywords",
                "Recognize identifiers",
                "Recognize operators",
                "Recognize literals",
                "Recognize delimiters",
            ],
            Self::SyntaxAnalysis => &[
                "Build declaration nodes",
                "Build assignment expressions",
                "Verify syntactic correctness",
                "Produce the AST",
            ],
            Self::SemanticAnalysis => &[
                "Type checking",
                "Variable declaration checks",
                "Scope analysis",
                "Symbol table construction",
            ],
            Self::IntermediateCode => &[
                "Emit three-address code",
                "Allocate temporaries",
                "Assign variable addresses",
            ],
            Self::Optimization => &[
                "Constant folding",
                "Constant propagation",
                "Dead temporary elimination",
            ],
            Self::CodeGeneration => &[
                "Instruction selection",
                "Register allocation",
                "Address calculation",
                "Machine-code encoding",
            ],
        }
    }
}

impl fmt::Display for CompilationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Lifecycle status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum StageStatus {
    /// Not started.
    #[default]
    Pending,
    /// Work under way.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Error,
}

impl StageStatus {
    /// Legal transitions: pending → in-progress → completed | error.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Error)
        )
    }

    /// Returns `true` for completed and error.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stage {stage} cannot move from {} to {}", .from.as_str(), .to.as_str())]
pub struct StageTransitionError {
    /// Stage being updated.
    pub stage: CompilationStage,
    /// Current status.
    pub from: StageStatus,
    /// Requested status.
    pub to: StageStatus,
}

/// Observable snapshot of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CompilationStep {
    id: CompilationStage,
    stage: String,
    stage_en: String,
    status: StageStatus,
    input: String,
    output: String,
    description: String,
    details: Vec<String>,
    duration_ms: Option<u64>,
}

impl CompilationStep {
    /// Fresh pending snapshot for `stage`.
    #[must_use]
    pub fn pending(stage: CompilationStage) -> Self {
        Self {
            id: stage,
            stage: stage.name().to_owned(),
            stage_en: stage.name_en().to_owned(),
            status: StageStatus::Pending,
            input: String::new(),
            output: String::new(),
            description: stage.description().to_owned(),
            details: stage.details().iter().map(|d| (*d).to_owned()).collect(),
            duration_ms: None,
        }
    }

    /// Stage identity.
    #[must_use]
    pub const fn id(&self) -> CompilationStage {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.stage
    }

    /// English display name.
    #[must_use]
    pub fn name_en(&self) -> &str {
        &self.stage_en
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> StageStatus {
        self.status
    }

    /// Stage input text.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Stage output text, or the failure message on error.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Fixed description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Sub-step descriptions.
    #[must_use]
    pub fn details(&self) -> &[String] {
        &self.details
    }

    /// Measured duration, present once completed.
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn transition(&mut self, to: StageStatus) -> Result<(), StageTransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(StageTransitionError {
                stage: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Moves pending → in-progress with `input`.
    ///
    /// # Errors
    ///
    /// Returns [`StageTransitionError`] unless the step is pending.
    pub fn begin(&mut self, input: &str) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::InProgress)?;
        input.clone_into(&mut self.input);
        Ok(())
    }

    /// Moves in-progress → completed with `output` and its measured duration.
    ///
    /// # Errors
    ///
    /// Returns [`StageTransitionError`] unless the step is in progress.
    pub fn complete(&mut self, output: String, duration_ms: u64) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Completed)?;
        self.output = output;
        self.duration_ms = Some(duration_ms);
        Ok(())
    }

    /// Moves in-progress → error, recording `message` as the output.
    ///
    /// # Errors
    ///
    /// Returns [`StageTransitionError`] unless the step is in progress.
    pub fn fail(&mut self, message: &str) -> Result<(), StageTransitionError> {
        self.transition(StageStatus::Error)?;
        message.clone_into(&mut self.output);
        Ok(())
    }

    /// Returns `true` when replacing `self` with `next` does not regress
    /// the lifecycle: same stage, and the same status or a legal successor.
    #[must_use]
    pub fn accepts_update(&self, next: &Self) -> bool {
        self.id == next.id
            && (self.status == next.status
                || self.status.can_transition_to(next.status)
                || (self.status == StageStatus::Pending && next.status.is_terminal()))
    }
}

/// Fresh pending snapshots for all six stages, in order.
#[must_use]
pub fn pending_steps() -> Vec<CompilationStep> {
    CompilationStage::ALL
        .into_iter()
        .map(CompilationStep::pending)
        .collect()
}
