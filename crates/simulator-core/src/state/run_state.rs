use crate::CpuFault;

/// Execution-state machine for host-observable CPU control flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    /// No program loaded.
    #[default]
    Idle,
    /// A program is loaded and has instructions left to retire.
    Running,
    /// The program ran off its end or retired `HLT`.
    Finished,
    /// Fault is latched and no further progress is possible without reset/reload.
    FaultLatched(CpuFault),
}

impl RunState {
    /// Returns the currently latched fault, if this state is fault-latched.
    #[must_use]
    pub const fn latched_fault(&self) -> Option<&CpuFault> {
        match self {
            Self::FaultLatched(fault) => Some(fault),
            Self::Idle | Self::Running | Self::Finished => None,
        }
    }

    /// Returns `true` when `step` has work to do.
    #[must_use]
    pub const fn can_step(&self) -> bool {
        matches!(self, Self::Running)
    }
}
