//! Command-driven simulator state container.
//!
//! [`SimulatorState`] is only changed by applying a [`Command`] through the
//! pure [`apply_command`] reducer. [`SimulatorStore`] keeps the current
//! state behind an `Arc` and swaps in a whole new state per command, so
//! snapshots handed out earlier never change underneath their holders.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::ExecutionResult;
use crate::pipeline::{pending_steps, CompilationStep};
use crate::{CpuState, ExecutionStage, Instruction, ProgrammingLanguage, SimulatorConfig};

/// Everything the front end renders.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SimulatorState {
    /// Editor contents.
    pub source_code: String,
    /// Selected language.
    pub language: ProgrammingLanguage,
    /// Stage snapshots in pipeline order.
    pub compilation_stages: Vec<CompilationStep>,
    /// Compiled program.
    pub instructions: Vec<Instruction>,
    /// Instruction highlighted in the listing.
    pub current_instruction: Option<Instruction>,
    /// Latest CPU snapshot.
    pub cpu_state: CpuState,
    /// Stage most recently performed by the CPU.
    pub execution_stage: ExecutionStage,
    /// A run is active.
    pub is_running: bool,
    /// The active run is paused.
    pub is_paused: bool,
    /// Progress counter, never above `total_steps`.
    pub current_step: usize,
    /// Progress bound.
    pub total_steps: usize,
    /// Delay between automatic steps in milliseconds.
    pub speed: u64,
}

impl SimulatorState {
    /// Start-up snapshot described by `config`.
    #[must_use]
    pub fn initial(config: &SimulatorConfig) -> Self {
        Self {
            source_code: config.initial_source.clone(),
            language: config.language,
            compilation_stages: pending_steps(),
            instructions: Vec::new(),
            current_instruction: None,
            cpu_state: CpuState::default(),
            execution_stage: ExecutionStage::Fetch,
            is_running: false,
            is_paused: false,
            current_step: 0,
            total_steps: 0,
            speed: config.execution_speed_ms,
        }
    }
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self::initial(&SimulatorConfig::default())
    }
}

/// Named state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin a run: running, not paused, counter zeroed, stages pending.
    StartCompilation,
    /// Pause the active run.
    PauseExecution,
    /// Resume a paused run.
    ResumeExecution,
    /// End the run and zero the counter.
    StopExecution,
    /// Advance the counter while below the bound.
    StepForward,
    /// Restore the initial snapshot, stages included.
    Reset,
    /// Replace the editor contents.
    UpdateSourceCode(String),
    /// Select a language.
    UpdateLanguage(ProgrammingLanguage),
    /// Install a compiled program; the bound becomes its length.
    SetInstructions(Vec<Instruction>),
    /// Change the bound, clamping the counter.
    SetTotalSteps(usize),
    /// Replace the snapshot of one stage, unless that would regress it.
    RecordStage(CompilationStep),
    /// Ingest one CPU micro-step.
    ApplyExecution(Box<ExecutionResult>),
    /// Change the auto-step delay.
    SetSpeed(u64),
}

impl Command {
    /// Stable command name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartCompilation => "start_compilation",
            Self::PauseExecution => "pause_execution",
            Self::ResumeExecution => "resume_execution",
            Self::StopExecution => "stop_execution",
            Self::StepForward => "step_forward",
            Self::Reset => "reset",
            Self::UpdateSourceCode(_) => "update_source_code",
            Self::UpdateLanguage(_) => "update_language",
            Self::SetInstructions(_) => "set_instructions",
            Self::SetTotalSteps(_) => "set_total_steps",
            Self::RecordStage(_) => "record_stage",
            Self::ApplyExecution(_) => "apply_execution",
            Self::SetSpeed(_) => "set_speed",
        }
    }
}

/// Returns the state that results from applying `command` to `current`.
/// `initial` is the snapshot restored by [`Command::Reset`].
#[must_use]
pub fn apply_command(
    current: &SimulatorState,
    initial: &SimulatorState,
    command: Command,
) -> SimulatorState {
    let mut next = current.clone();
    match command {
        Command::StartCompilation => {
            next.is_running = true;
            next.is_paused = false;
            next.current_step = 0;
            next.compilation_stages = pending_steps();
        }
        Command::PauseExecution => next.is_paused = true,
        Command::ResumeExecution => {
            if next.is_running {
                next.is_paused = false;
            }
        }
        Command::StopExecution => {
            next.is_running = false;
            next.is_paused = false;
            next.current_step = 0;
        }
        Command::StepForward => {
            if next.current_step < next.total_steps {
                next.current_step += 1;
            }
        }
        Command::Reset => next = initial.clone(),
        Command::UpdateSourceCode(code) => next.source_code = code,
        Command::UpdateLanguage(language) => next.language = language,
        Command::SetInstructions(instructions) => {
            next.total_steps = instructions.len();
            next.current_step = 0;
            next.instructions = instructions;
        }
        Command::SetTotalSteps(total) => {
            next.total_steps = total;
            next.current_step = next.current_step.min(total);
        }
        Command::RecordStage(step) => {
            match next
                .compilation_stages
                .iter_mut()
                .find(|existing| existing.id() == step.id())
            {
                Some(existing) if existing.accepts_update(&step) => *existing = step,
                Some(existing) => warn!(
                    stage = step.id().id(),
                    from = existing.status().as_str(),
                    to = step.status().as_str(),
                    "ignored regressing stage update"
                ),
                None => warn!(stage = step.id().id(), "ignored unknown stage"),
            }
        }
        Command::ApplyExecution(result) => {
            let ExecutionResult {
                stage,
                instruction,
                cpu_state,
                ..
            } = *result;
            next.execution_stage = stage;
            next.current_instruction = instruction;
            next.cpu_state = cpu_state;
        }
        Command::SetSpeed(speed) => next.speed = speed,
    }
    next
}

/// Owner of the current [`SimulatorState`].
#[derive(Debug, Clone)]
pub struct SimulatorStore {
    current: Arc<SimulatorState>,
    initial: Arc<SimulatorState>,
    revision: u64,
}

impl Default for SimulatorStore {
    fn default() -> Self {
        Self::new(&SimulatorConfig::default())
    }
}

impl SimulatorStore {
    /// Store holding the initial snapshot for `config`.
    #[must_use]
    pub fn new(config: &SimulatorConfig) -> Self {
        let initial = Arc::new(SimulatorState::initial(config));
        Self {
            current: Arc::clone(&initial),
            initial,
            revision: 0,
        }
    }

    /// Current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SimulatorState> {
        Arc::clone(&self.current)
    }

    /// Commands applied so far.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Applies `command` and returns the new snapshot.
    pub fn dispatch(&mut self, command: Command) -> Arc<SimulatorState> {
        let name = command.name();
        self.current = Arc::new(apply_command(&self.current, &self.initial, command));
        self.revision += 1;
        debug!(
            command = name,
            revision = self.revision,
            step = self.current.current_step,
            total = self.current.total_steps,
            "store updated"
        );
        self.snapshot()
    }

    /// [`Command::StartCompilation`].
    pub fn start_compilation(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::StartCompilation)
    }

    /// [`Command::PauseExecution`].
    pub fn pause_execution(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::PauseExecution)
    }

    /// [`Command::ResumeExecution`].
    pub fn resume_execution(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::ResumeExecution)
    }

    /// [`Command::StopExecution`].
    pub fn stop_execution(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::StopExecution)
    }

    /// [`Command::StepForward`].
    pub fn step_forward(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::StepForward)
    }

    /// [`Command::Reset`].
    pub fn reset(&mut self) -> Arc<SimulatorState> {
        self.dispatch(Command::Reset)
    }

    /// [`Command::UpdateSourceCode`].
    pub fn update_source_code(&mut self, code: &str) -> Arc<SimulatorState> {
        self.dispatch(Command::UpdateSourceCode(code.to_owned()))
    }

    /// [`Command::UpdateLanguage`].
    pub fn update_language(&mut self, language: ProgrammingLanguage) -> Arc<SimulatorState> {
        self.dispatch(Command::UpdateLanguage(language))
    }

    /// [`Command::SetInstructions`].
    pub fn set_instructions(&mut self, instructions: Vec<Instruction>) -> Arc<SimulatorState> {
        self.dispatch(Command::SetInstructions(instructions))
    }

    /// [`Command::SetTotalSteps`].
    pub fn set_total_steps(&mut self, total: usize) -> Arc<SimulatorState> {
        self.dispatch(Command::SetTotalSteps(total))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{apply_command, Command, SimulatorState, SimulatorStore};
    use crate::pipeline::{CompilationStage, CompilationStep, StageStatus};
    use crate::{Instruction, InstructionType, ProgrammingLanguage};

    fn nops(count: usize) -> Vec<Instruction> {
        (0..count)
            .map(|i| {
                Instruction::builder(&format!("nop_{i}"), InstructionType::Control, "NOP")
                    .machine_code("90")
                    .build()
                    .expect("valid nop")
            })
            .collect()
    }

    #[test]
    fn step_forward_stops_at_the_bound() {
        let mut store = SimulatorStore::default();
        store.set_instructions(nops(2));
        store.step_forward();
        store.step_forward();
        let state = store.step_forward();
        assert_eq!(state.current_step, 2);
        assert_eq!(state.total_steps, 2);
        assert_eq!(store.revision(), 4);
    }

    #[test]
    fn reset_restores_every_stage_to_pending() {
        let mut store = SimulatorStore::default();
        let initial = store.snapshot();
        let mut step = CompilationStep::pending(CompilationStage::LexicalAnalysis);
        step.begin("int a;").expect("legal");
        store.start_compilation();
        store.dispatch(Command::RecordStage(step));
        store.update_source_code("int b;");
        store.update_language(ProgrammingLanguage::Python);

        let reset = store.reset();
        assert_eq!(*reset, *initial);
        assert!(reset
            .compilation_stages
            .iter()
            .all(|s| s.status() == StageStatus::Pending));
    }

    #[test]
    fn snapshots_are_not_mutated_by_later_commands() {
        let mut store = SimulatorStore::default();
        let before = store.snapshot();
        store.start_compilation();
        assert!(!before.is_running);
        assert!(store.snapshot().is_running);
    }

    #[test]
    fn start_pause_resume_stop() {
        let initial = SimulatorState::default();
        let started = apply_command(&initial, &initial, Command::StartCompilation);
        assert!(started.is_running && !started.is_paused);
        let paused = apply_command(&started, &initial, Command::PauseExecution);
        assert!(paused.is_paused);
        let resumed = apply_command(&paused, &initial, Command::ResumeExecution);
        assert!(!resumed.is_paused);
        let stopped = apply_command(&resumed, &initial, Command::StopExecution);
        assert!(!stopped.is_running && !stopped.is_paused);
        assert_eq!(stopped.current_step, 0);
    }

    #[test]
    fn regressing_stage_updates_are_ignored() {
        let initial = SimulatorState::default();
        let mut done = CompilationStep::pending(CompilationStage::Optimization);
        done.begin("ir").expect("legal");
        done.complete("ir'".into(), 1).expect("legal");
        let recorded = apply_command(&initial, &initial, Command::RecordStage(done));
        let regressed = apply_command(
            &recorded,
            &initial,
            Command::RecordStage(CompilationStep::pending(CompilationStage::Optimization)),
        );
        assert_eq!(regressed.compilation_stages[4].status(), StageStatus::Completed);
    }

    fn command_strategy() -> impl Strategy<Value = Command> {
        prop_oneof![
            Just(Command::StartCompilation),
            Just(Command::PauseExecution),
            Just(Command::StopExecution),
            Just(Command::StepForward),
            Just(Command::Reset),
            (0_usize..8).prop_map(|n| Command::SetInstructions(nops(n))),
            (0_usize..8).prop_map(Command::SetTotalSteps),
        ]
    }

    proptest! {
        #[test]
        fn current_step_never_exceeds_total(commands in prop::collection::vec(command_strategy(), 0..40)) {
            let mut store = SimulatorStore::default();
            for command in commands {
                let state = store.dispatch(command);
                prop_assert!(state.current_step <= state.total_steps);
            }
        }
    }
}
