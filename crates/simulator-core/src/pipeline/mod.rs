//! Compilation stage pipeline engine.
//!
//! [`StagePipeline`] drives a [`StageWork`] implementation through the six
//! [`CompilationStage`]s in order. It is a finite iterator: each `next()`
//! yields one snapshot per status transition, so a caller sees
//! `in-progress` before the stage's work runs and `completed` or `error`
//! after it. A failed stage ends the run. Cancellation is only observed
//! between stages.

mod stage;

pub use stage::{
    pending_steps, CompilationStage, CompilationStep, StageStatus, StageTransitionError,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a stage's work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StageFailure {
    /// Summary line.
    pub message: String,
    /// Individual diagnostics, e.g. `3:5: undeclared variable`.
    pub diagnostics: Vec<String>,
}

impl StageFailure {
    /// Failure with a summary and no diagnostics.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Attaches diagnostics.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Work performed for each stage.
pub trait StageWork {
    /// Runs `stage` over `input` (the previous stage's output, or the source
    /// text for the first stage) and returns this stage's output text.
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] to abort the pipeline at this stage.
    fn run(&mut self, stage: CompilationStage, input: &str) -> Result<String, StageFailure>;
}

impl<F> StageWork for F
where
    F: FnMut(CompilationStage, &str) -> Result<String, StageFailure>,
{
    fn run(&mut self, stage: CompilationStage, input: &str) -> Result<String, StageFailure> {
        self(stage, input)
    }
}

/// Shared cancellation flag checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation before the next stage starts.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Simulated pacing inserted before each stage's work.
///
/// Pacing only delays; stage durations are always measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum StagePacing {
    /// No delay.
    #[default]
    Immediate,
    /// Uniformly random delay in `min_ms..=max_ms`, seeded for reproducibility
    /// when `seed` is set.
    Randomized {
        /// Lower bound in milliseconds.
        min_ms: u64,
        /// Upper bound in milliseconds.
        max_ms: u64,
        /// Optional RNG seed.
        seed: Option<u64>,
    },
}

impl StagePacing {
    /// The delay range used by the interactive front end.
    #[must_use]
    pub const fn interactive() -> Self {
        Self::Randomized {
            min_ms: 500,
            max_ms: 1500,
            seed: None,
        }
    }
}

/// Millisecond timestamp source used to measure stage durations.
pub type Clock = fn() -> f64;

/// Monotonic milliseconds since the first call in this process.
#[must_use]
pub fn monotonic_ms() -> f64 {
    static BASE: OnceLock<Instant> = OnceLock::new();
    BASE.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

/// Pipeline run options.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Simulated pacing.
    pub pacing: StagePacing,
    /// Cancellation flag.
    pub cancel: CancelToken,
    /// Time source.
    pub clock: Clock,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            pacing: StagePacing::Immediate,
            cancel: CancelToken::new(),
            clock: monotonic_ms,
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage completed.
    Completed,
    /// A stage failed; later stages stayed pending.
    Failed {
        /// Failing stage.
        stage: CompilationStage,
        /// Reported failure.
        failure: StageFailure,
    },
    /// Cancellation was observed before `before` started.
    Cancelled {
        /// First stage that did not start.
        before: CompilationStage,
    },
}

/// Terminal record of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Final snapshot of every stage.
    pub steps: Vec<CompilationStep>,
    /// How the run ended.
    pub outcome: PipelineOutcome,
    /// Wall time of the whole run in milliseconds.
    pub elapsed_ms: u64,
}

impl PipelineReport {
    /// Returns `true` when every stage completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == PipelineOutcome::Completed
    }

    /// Error list for a failed or cancelled run: the failing stage's
    /// description followed by the failure and its diagnostics.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        match &self.outcome {
            PipelineOutcome::Completed => Vec::new(),
            PipelineOutcome::Failed { stage, failure } => {
                let mut errors = vec![
                    format!("{}: {}", stage.name_en(), stage.description()),
                    failure.message.clone(),
                ];
                errors.extend(failure.diagnostics.iter().cloned());
                errors
            }
            PipelineOutcome::Cancelled { before } => {
                vec![format!("compilation cancelled before {}", before.name_en())]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Begin,
    Work,
    Done,
}

/// Iterator over stage snapshots for one compilation run.
#[derive(Debug)]
pub struct StagePipeline<W> {
    work: W,
    steps: Vec<CompilationStep>,
    cursor: usize,
    phase: Phase,
    carry: String,
    options: PipelineOptions,
    rng: Option<StdRng>,
    outcome: Option<PipelineOutcome>,
    started: f64,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_ms(elapsed: f64) -> u64 {
    elapsed.max(0.0).round() as u64
}

/// Delay generator for `pacing`; unseeded runs draw from OS entropy.
fn pacing_rng(pacing: StagePacing) -> Option<StdRng> {
    match pacing {
        StagePacing::Immediate => None,
        StagePacing::Randomized { seed: Some(seed), .. } => Some(StdRng::seed_from_u64(seed)),
        StagePacing::Randomized { seed: None, .. } => Some(StdRng::from_entropy()),
    }
}

impl<W: StageWork> StagePipeline<W> {
    /// Prepares a run over `source` with default options.
    #[must_use]
    pub fn new(work: W, source: &str) -> Self {
        Self::with_options(work, source, PipelineOptions::default())
    }

    /// Prepares a run over `source`.
    #[must_use]
    pub fn with_options(work: W, source: &str, options: PipelineOptions) -> Self {
        let rng = pacing_rng(options.pacing);
        let started = (options.clock)();
        Self {
            work,
            steps: pending_steps(),
            cursor: 0,
            phase: Phase::Begin,
            carry: source.to_owned(),
            options,
            rng,
            outcome: None,
            started,
        }
    }

    /// Current snapshots of all stages.
    #[must_use]
    pub fn steps(&self) -> &[CompilationStep] {
        &self.steps
    }

    /// Stage work.
    #[must_use]
    pub const fn work(&self) -> &W {
        &self.work
    }

    /// Runs the remaining stages, calling `on_step` for every snapshot.
    pub fn drive<F: FnMut(&CompilationStep)>(mut self, mut on_step: F) -> (PipelineReport, W) {
        while let Some(step) = self.next() {
            on_step(&step);
        }
        self.into_report()
    }

    /// Runs the remaining stages and returns the report plus the stage work.
    pub fn into_report(mut self) -> (PipelineReport, W) {
        self.by_ref().for_each(drop);
        let elapsed_ms = to_ms((self.options.clock)() - self.started);
        let outcome = self.outcome.unwrap_or(PipelineOutcome::Completed);
        (
            PipelineReport {
                steps: self.steps,
                outcome,
                elapsed_ms,
            },
            self.work,
        )
    }

    fn pace(&mut self) {
        if let (StagePacing::Randomized { min_ms, max_ms, .. }, Some(rng)) =
            (self.options.pacing, self.rng.as_mut())
        {
            let delay = rng.gen_range(min_ms.min(max_ms)..=max_ms.max(min_ms));
            std::thread::sleep(Duration::from_millis(delay));
        }
    }

    fn begin_stage(&mut self) -> Option<CompilationStep> {
        let Some(step) = self.steps.get_mut(self.cursor) else {
            self.outcome = Some(PipelineOutcome::Completed);
            self.phase = Phase::Done;
            return None;
        };
        let stage = step.id();
        if self.options.cancel.is_cancelled() {
            warn!(before = stage.id(), "compilation cancelled");
            self.outcome = Some(PipelineOutcome::Cancelled { before: stage });
            self.phase = Phase::Done;
            return None;
        }
        if step.begin(&self.carry).is_err() {
            self.phase = Phase::Done;
            return None;
        }
        debug!(stage = stage.id(), "stage started");
        self.phase = Phase::Work;
        Some(step.clone())
    }

    fn run_stage(&mut self) -> Option<CompilationStep> {
        self.pace();
        let stage = self.steps.get(self.cursor)?.id();
        let clock = self.options.clock;
        let started = clock();
        let result = self.work.run(stage, &self.carry);
        let duration = to_ms(clock() - started);
        let step = self.steps.get_mut(self.cursor)?;

        match result {
            Ok(output) => {
                self.carry.clone_from(&output);
                step.complete(output, duration).ok()?;
                debug!(stage = stage.id(), duration_ms = duration, "stage completed");
                self.cursor += 1;
                self.phase = Phase::Begin;
            }
            Err(failure) => {
                step.fail(&failure.message).ok()?;
                debug!(stage = stage.id(), error = %failure, "stage failed");
                self.outcome = Some(PipelineOutcome::Failed { stage, failure });
                self.phase = Phase::Done;
            }
        }
        Some(step.clone())
    }
}

impl<W: StageWork> Iterator for StagePipeline<W> {
    type Item = CompilationStep;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Begin => self.begin_stage(),
            Phase::Work => self.run_stage(),
            Phase::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use rand::Rng;

    use super::{
        pacing_rng, CancelToken, CompilationStage, PipelineOptions, PipelineOutcome,
        StageFailure, StagePacing, StagePipeline, StageStatus,
    };

    fn echo(stage: CompilationStage, input: &str) -> Result<String, StageFailure> {
        Ok(format!("{input}>{}", stage.id()))
    }

    #[test]
    fn successful_run_emits_two_snapshots_per_stage_in_order() {
        let snapshots: Vec<_> = StagePipeline::new(echo, "src").collect();
        assert_eq!(snapshots.len(), 12);
        for (pair, stage) in snapshots.chunks(2).zip(CompilationStage::ALL) {
            assert_eq!(pair[0].id(), stage);
            assert_eq!(pair[0].status(), StageStatus::InProgress);
            assert_eq!(pair[1].status(), StageStatus::Completed);
            assert!(pair[1].duration_ms().is_some());
        }
        assert_eq!(snapshots[2].input(), "src>lexical_analysis");
    }

    #[test]
    fn failure_aborts_later_stages() {
        let work = |stage: CompilationStage, _input: &str| {
            if stage == CompilationStage::SemanticAnalysis {
                Err(StageFailure::new("undeclared variable `b`")
                    .with_diagnostics(vec!["2:9: undeclared variable `b`".into()]))
            } else {
                Ok(String::from("ok"))
            }
        };
        let (report, _) = StagePipeline::new(work, "int a = b;").into_report();
        assert!(!report.succeeded());
        assert_eq!(report.steps[2].status(), StageStatus::Error);
        assert_eq!(report.steps[2].output(), "undeclared variable `b`");
        assert!(report.steps[3..]
            .iter()
            .all(|s| s.status() == StageStatus::Pending));
        let errors = report.errors();
        assert!(errors[0].starts_with("Semantic Analysis"));
        assert_eq!(errors.last().map(String::as_str), Some("2:9: undeclared variable `b`"));
    }

    #[test]
    fn cancellation_is_observed_between_stages() {
        let cancel = CancelToken::new();
        let options = PipelineOptions {
            cancel: cancel.clone(),
            ..PipelineOptions::default()
        };
        let mut pipeline = StagePipeline::with_options(echo, "x", options);
        assert!(pipeline.next().is_some());
        cancel.cancel();
        let finished = pipeline.next().expect("in-flight stage still completes");
        assert_eq!(finished.status(), StageStatus::Completed);
        assert!(pipeline.next().is_none());
        let (report, _) = pipeline.into_report();
        assert_eq!(
            report.outcome,
            PipelineOutcome::Cancelled {
                before: CompilationStage::SyntaxAnalysis
            }
        );
    }

    #[test]
    fn seeded_pacing_still_measures_duration() {
        let options = PipelineOptions {
            pacing: StagePacing::Randomized {
                min_ms: 0,
                max_ms: 1,
                seed: Some(7),
            },
            ..PipelineOptions::default()
        };
        let (report, _) = StagePipeline::with_options(echo, "", options).into_report();
        assert!(report.succeeded());
        assert!(report.steps.iter().all(|s| s.duration_ms().is_some()));
    }

    #[test]
    fn pacing_seed_controls_reproducibility() {
        let seeded = |seed| StagePacing::Randomized {
            min_ms: 500,
            max_ms: 1500,
            seed,
        };
        let draws = |pacing| -> Vec<u64> {
            let mut rng = pacing_rng(pacing).expect("randomized pacing has a generator");
            (0..4).map(|_| rng.gen()).collect()
        };

        assert!(pacing_rng(StagePacing::Immediate).is_none());
        assert_eq!(draws(seeded(Some(7))), draws(seeded(Some(7))));
        assert_ne!(draws(seeded(None)), draws(seeded(None)));
    }

    proptest! {
        #[test]
        fn no_stage_starts_before_its_predecessor_completes(fail_at in 0_usize..7) {
            let work = move |stage: CompilationStage, _input: &str| {
                if CompilationStage::ALL.get(fail_at) == Some(&stage) {
                    Err(StageFailure::new("boom"))
                } else {
                    Ok(String::new())
                }
            };
            let mut seen = Vec::new();
            let (report, _) = StagePipeline::new(work, "").drive(|step| seen.push(step.clone()));
            for pair in seen.windows(2) {
                if pair[1].status() == StageStatus::InProgress {
                    prop_assert_eq!(pair[0].status(), StageStatus::Completed);
                    prop_assert!(pair[0].id() < pair[1].id());
                }
            }
            prop_assert_eq!(report.succeeded(), fail_at >= CompilationStage::ALL.len());
        }
    }
}
