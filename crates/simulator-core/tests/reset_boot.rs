//! Reset and boot semantics.

use proptest as _;
use rand as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use simulator_core::{
    Cpu, CpuState, ExecutionStage, Flags, GeneralRegister, Instruction, InstructionType, Operand,
    RunState, SpecialRegister, INITIAL_BASE_POINTER, INITIAL_STACK_POINTER, PROGRAM_BASE_ADDRESS,
};

fn push_then_halt() -> Vec<Instruction> {
    vec![
        Instruction::builder("push_0", InstructionType::DataTransfer, "PUSH")
            .operand(Operand::immediate(7).expect("fits"))
            .machine_code("6A07")
            .build()
            .expect("valid"),
        Instruction::builder("hlt_1", InstructionType::Control, "HLT")
            .machine_code("F4")
            .build()
            .expect("valid"),
    ]
}

#[test]
fn boot_snapshot_matches_documented_defaults() {
    let state = CpuState::default();
    for reg in GeneralRegister::ALL {
        assert_eq!(state.registers.general(reg), 0);
    }
    assert_eq!(state.registers.special(SpecialRegister::Esp), INITIAL_STACK_POINTER);
    assert_eq!(state.registers.special(SpecialRegister::Ebp), INITIAL_BASE_POINTER);
    assert_eq!(state.program_counter(), PROGRAM_BASE_ADDRESS);
    assert_eq!(state.flags, Flags::default());
    assert!(state.memory.is_empty());
    assert!(state.current_instruction.is_none());
    assert_eq!(state.execution_stage, ExecutionStage::Fetch);
}

#[test]
fn reset_mid_instruction_restores_boot_and_rearms_program() {
    let mut cpu = Cpu::new();
    cpu.load_instructions(push_then_halt()).expect("valid program");
    for _ in 0..8 {
        cpu.step().expect("no fault");
    }
    assert_eq!(cpu.state().memory.stack, vec![7]);

    let snapshot = cpu.reset().clone();
    assert_eq!(snapshot, CpuState::default());
    assert_eq!(cpu.run_state(), &RunState::Running);
    assert_eq!(cpu.cycle_count(), 0);
    assert_eq!(cpu.retired(), 0);

    while cpu.run_state().can_step() {
        cpu.step().expect("no fault");
    }
    assert_eq!(cpu.run_state(), &RunState::Finished);
    assert_eq!(cpu.state().memory.stack, vec![7]);
    assert_eq!(cpu.retired(), 2);
}

#[test]
fn reset_without_a_program_stays_idle() {
    let mut cpu = Cpu::new();
    assert_eq!(cpu.reset(), &CpuState::default());
    assert_eq!(cpu.run_state(), &RunState::Idle);
}
