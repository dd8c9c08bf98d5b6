use thiserror::Error;

use crate::InstructionError;

/// Fault classes used for diagnostics aggregation and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Instruction shape or operand resolution failed.
    Decode,
    /// Arithmetic could not produce a result.
    Arithmetic,
    /// Data, heap or stack access violated the memory model.
    Memory,
    /// Control transfer left the loaded program.
    Control,
}

/// Reasons an instruction cannot be decoded against the toy ISA.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Mnemonic is not part of the instruction set.
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    /// Declared instruction type is not valid for the mnemonic.
    #[error("`{mnemonic}` cannot be declared as a {declared} instruction")]
    TypeMismatch {
        /// Mnemonic as written.
        mnemonic: String,
        /// Declared type name.
        declared: &'static str,
    },
    /// Wrong number of operands.
    #[error("expected {expected} operand(s), found {found}")]
    OperandCount {
        /// Operands the mnemonic takes.
        expected: usize,
        /// Operands supplied.
        found: usize,
    },
    /// Operand type not accepted in this position.
    #[error("operand {index} must be {expected}")]
    UnexpectedOperand {
        /// Zero-based operand position.
        index: usize,
        /// Human-readable list of accepted forms.
        expected: &'static str,
    },
    /// Register name does not exist.
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    /// Label does not name an instruction in the program.
    #[error("unknown label `{0}`")]
    UnknownLabel(String),
    /// Memory address lies outside the data and heap regions.
    #[error("address 0x{0:X} is outside addressable memory")]
    AddressOutOfRange(u64),
    /// Absolute branch target is not the start of an instruction.
    #[error("branch target 0x{0:X} is not an instruction boundary")]
    InvalidBranchTarget(i64),
}

/// Structured execution faults raised by the CPU state machine.
///
/// Every variant names the instruction that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuFault {
    /// Program failed load-time validation.
    #[error("program rejected: {0}")]
    Rejected(#[from] InstructionError),
    /// Instruction could not be decoded.
    #[error("instruction `{id}` is malformed: {reason}")]
    Malformed {
        /// Offending instruction id.
        id: String,
        /// Decode failure.
        #[source]
        reason: DecodeError,
    },
    /// Division by zero.
    #[error("instruction `{id}` divided by zero")]
    DivideByZero {
        /// Offending instruction id.
        id: String,
    },
    /// Pop or return from an empty stack.
    #[error("instruction `{id}` popped an empty stack")]
    StackUnderflow {
        /// Offending instruction id.
        id: String,
    },
    /// Push would move `ESP` below zero.
    #[error("instruction `{id}` overflowed the stack")]
    StackOverflow {
        /// Offending instruction id.
        id: String,
    },
    /// Program counter does not point at an instruction boundary.
    #[error("instruction `{id}` transferred control to 0x{pc:X}, which is not an instruction boundary")]
    InvalidProgramCounter {
        /// Instruction that produced the bad counter.
        id: String,
        /// Offending counter value.
        pc: i64,
    },
}

impl CpuFault {
    /// Id of the instruction that raised the fault.
    #[must_use]
    pub fn instruction_id(&self) -> Option<&str> {
        match self {
            Self::Rejected(InstructionError::EmptyId) => None,
            Self::Rejected(
                InstructionError::EmptyMnemonic { id }
                | InstructionError::ZeroCycles { id }
                | InstructionError::InvalidMachineCode { id, .. }
                | InstructionError::Operand { id, .. }
                | InstructionError::DuplicateId { id },
            )
            | Self::Malformed { id, .. }
            | Self::DivideByZero { id }
            | Self::StackUnderflow { id }
            | Self::StackOverflow { id }
            | Self::InvalidProgramCounter { id, .. } => Some(id),
        }
    }

    /// Returns the diagnostics fault class for this fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::Rejected(_) | Self::Malformed { .. } => FaultClass::Decode,
            Self::DivideByZero { .. } => FaultClass::Arithmetic,
            Self::StackUnderflow { .. } | Self::StackOverflow { .. } => FaultClass::Memory,
            Self::InvalidProgramCounter { .. } => FaultClass::Control,
        }
    }
}
