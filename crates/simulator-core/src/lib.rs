//! Core crate for the layered-systems simulator.

/// Instruction and operand data model.
pub mod instruction;
pub use instruction::{
    immediate_fits, Instruction, InstructionBuilder, InstructionError, InstructionType, Operand,
    OperandError, OperandType, OperandValue,
};

/// Memory model primitives and fixed region map.
pub mod memory;
pub use memory::{
    decode_memory_region, MemoryRegion, MemoryState, RegionDescriptor, DATA_END, DATA_START,
    FIXED_MEMORY_REGIONS, HEAP_END, HEAP_START, STACK_SLOT_BYTES,
};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{
    CpuState, ExecutionStage, Flags, GeneralRegister, Register, RegisterFile, RunState,
    SpecialRegister, GENERAL_REGISTER_COUNT, INITIAL_BASE_POINTER, INITIAL_STACK_POINTER,
    PROGRAM_BASE_ADDRESS, SPECIAL_REGISTER_COUNT,
};

/// Fault taxonomy for decode and runtime failures.
pub mod fault;
pub use fault::{CpuFault, DecodeError, FaultClass};

/// Deterministic instruction cycle-cost table and lookup helpers.
pub mod timing;
pub use timing::{cycle_cost, cycle_cost_kind, CycleCostKind, CYCLE_COST_TABLE};

/// Operand resolution and program layout.
pub mod decoder;
pub use decoder::{decode, DecodedInstruction, Opcode, OperandShape, ProgramLayout, Resolved};

/// Micro-staged CPU state machine.
pub mod execute;
pub use execute::{compute, AluOp, AluOutput, Cpu, FlagsUpdate};

/// Source languages accepted by the compiler front end.
pub mod language;
pub use language::{ProgrammingLanguage, UnknownLanguage};

/// Compilation stage pipeline engine.
pub mod pipeline;
pub use pipeline::{
    monotonic_ms, pending_steps, CancelToken, Clock, CompilationStage, CompilationStep,
    PipelineOptions, PipelineOutcome, PipelineReport, StageFailure, StagePacing, StagePipeline,
    StageStatus, StageTransitionError, StageWork,
};

/// Backend contract between a front end and the compiler/CPU.
pub mod api;
pub use api::{Backend, BackendClient, BackendError, CompilationResult, ExecutionResult};

/// Simulator configuration.
pub mod config;
pub use config::{ConfigError, SimulatorConfig, DEFAULT_EXECUTION_SPEED_MS, DEFAULT_SOURCE};

/// Command-driven simulator state container.
pub mod store;
pub use store::{apply_command, Command, SimulatorState, SimulatorStore};

/// Read-only layer, concept and interface catalog.
pub mod catalog;
pub use catalog::{
    hierarchy, CatalogError, Concept, HierarchyData, InterfaceDirection, LayerInterface,
    SystemLayer,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
