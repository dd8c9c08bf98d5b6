//! Architectural CPU state model primitives.

/// Register file types and storage model.
pub mod registers;
/// Host-observable run state of the CPU state machine.
pub mod run_state;

pub use registers::{
    GeneralRegister, Register, RegisterFile, SpecialRegister, GENERAL_REGISTER_COUNT,
    INITIAL_BASE_POINTER, INITIAL_STACK_POINTER, PROGRAM_BASE_ADDRESS, SPECIAL_REGISTER_COUNT,
};
pub use run_state::RunState;

use crate::{Instruction, MemoryState};

/// One micro-step of instruction processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExecutionStage {
    /// Read the instruction at `EIP` and advance `EIP`.
    #[default]
    Fetch,
    /// Resolve operand addressing.
    Decode,
    /// Compute the result and update flags.
    Execute,
    /// Perform loads, stores and stack transfers.
    MemoryAccess,
    /// Commit the destination register or branch target.
    WriteBack,
    /// Retire the instruction.
    Complete,
}

impl ExecutionStage {
    /// All stages in processing order.
    pub const ALL: [Self; 6] = [
        Self::Fetch,
        Self::Decode,
        Self::Execute,
        Self::MemoryAccess,
        Self::WriteBack,
        Self::Complete,
    ];

    /// Stage that follows this one within a single instruction.
    /// `Complete` wraps to `Fetch` for the next instruction.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Fetch => Self::Decode,
            Self::Decode => Self::Execute,
            Self::Execute => Self::MemoryAccess,
            Self::MemoryAccess => Self::WriteBack,
            Self::WriteBack => Self::Complete,
            Self::Complete => Self::Fetch,
        }
    }

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::Execute => "execute",
            Self::MemoryAccess => "memory_access",
            Self::WriteBack => "write_back",
            Self::Complete => "complete",
        }
    }
}

/// Single-bit condition indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct Flags {
    /// Result was zero.
    pub zero: bool,
    /// Unsigned carry out or borrow.
    pub carry: bool,
    /// Signed overflow.
    pub overflow: bool,
    /// Sign bit of the result.
    pub negative: bool,
    /// Low byte of the result has an even number of set bits.
    pub parity: bool,
}

/// Complete host-visible CPU snapshot.
///
/// The program counter and stack pointer are `EIP` and `ESP` in
/// [`RegisterFile`]; there is no second copy to keep in sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuState {
    /// General and special registers.
    pub registers: RegisterFile,
    /// Data, stack and heap spaces.
    pub memory: MemoryState,
    /// Condition flags.
    pub flags: Flags,
    /// Instruction most recently fetched, if any.
    pub current_instruction: Option<Instruction>,
    /// Stage the machine will perform next.
    pub execution_stage: ExecutionStage,
}

impl CpuState {
    /// Program counter (`EIP`).
    #[must_use]
    pub const fn program_counter(&self) -> i64 {
        self.registers.pc()
    }

    /// Stack pointer (`ESP`).
    #[must_use]
    pub const fn stack_pointer(&self) -> i64 {
        self.registers.sp()
    }

    /// Restores the boot snapshot: zeroed general registers,
    /// `ESP = EBP = 1000`, `EIP = 2048`, empty memory, cleared flags, and
    /// `fetch` as the next stage.
    pub fn reset_canonical(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CpuState, ExecutionStage, Flags, GeneralRegister, SpecialRegister, INITIAL_BASE_POINTER,
        INITIAL_STACK_POINTER, PROGRAM_BASE_ADDRESS,
    };

    #[test]
    fn stage_order_cycles_back_to_fetch() {
        let mut stage = ExecutionStage::Fetch;
        for expected in ExecutionStage::ALL.iter().skip(1) {
            stage = stage.next();
            assert_eq!(stage, *expected);
        }
        assert_eq!(stage.next(), ExecutionStage::Fetch);
    }

    #[test]
    fn default_state_is_the_boot_snapshot() {
        let state = CpuState::default();
        for reg in GeneralRegister::ALL {
            assert_eq!(state.registers.general(reg), 0);
        }
        assert_eq!(state.stack_pointer(), INITIAL_STACK_POINTER);
        assert_eq!(
            state.registers.special(SpecialRegister::Ebp),
            INITIAL_BASE_POINTER
        );
        assert_eq!(state.program_counter(), PROGRAM_BASE_ADDRESS);
        assert!(state.memory.is_empty());
        assert_eq!(state.flags, Flags::default());
        assert!(state.current_instruction.is_none());
        assert_eq!(state.execution_stage, ExecutionStage::Fetch);
    }

    #[test]
    fn canonical_reset_restores_boot_snapshot() {
        let mut state = CpuState::default();
        state.registers.set_general(GeneralRegister::Ecx, 42);
        state.registers.set_sp(996);
        state.registers.set_pc(4096);
        state.memory.stack.push(9);
        state.memory.data.insert(1000, 5);
        state.flags.carry = true;
        state.execution_stage = ExecutionStage::WriteBack;

        state.reset_canonical();

        assert_eq!(state, CpuState::default());
    }
}
