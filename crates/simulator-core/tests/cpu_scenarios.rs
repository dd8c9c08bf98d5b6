//! End-to-end CPU runs observed through the simulator store.

use proptest as _;
use rand as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

use rstest::rstest;
use simulator_core::{
    Command, Cpu, CpuFault, DecodeError, ExecutionStage, GeneralRegister, Instruction,
    InstructionType, Operand, RunState, SimulatorStore, HEAP_START, PROGRAM_BASE_ADDRESS,
};

fn instr(id: &str, kind: InstructionType, mnemonic: &str, operands: Vec<Operand>, code: &str) -> Instruction {
    operands
        .into_iter()
        .fold(Instruction::builder(id, kind, mnemonic), |builder, operand| {
            builder.operand(operand)
        })
        .machine_code(code)
        .build()
        .expect("valid instruction")
}

fn imm(value: i64) -> Operand {
    Operand::immediate(value).expect("fits")
}

/// `a = 5; b = 3; sum = a + b;` as the code generator lowers it.
fn sum_program() -> Vec<Instruction> {
    vec![
        instr("mov_0", InstructionType::DataTransfer, "MOV", vec![Operand::register("EAX"), imm(5)], "B805000000"),
        instr("mov_1", InstructionType::Memory, "MOV", vec![Operand::memory(1000), Operand::register("EAX")], "A3E8030000"),
        instr("mov_2", InstructionType::DataTransfer, "MOV", vec![Operand::register("EAX"), imm(3)], "B803000000"),
        instr("mov_3", InstructionType::Memory, "MOV", vec![Operand::memory(1004), Operand::register("EAX")], "A3EC030000"),
        instr("mov_4", InstructionType::Memory, "MOV", vec![Operand::register("EAX"), Operand::memory(1000)], "A1E8030000"),
        instr("add_5", InstructionType::Arithmetic, "ADD", vec![Operand::register("EAX"), Operand::memory(1004)], "0305EC030000"),
        instr("mov_6", InstructionType::Memory, "MOV", vec![Operand::memory(1008), Operand::register("EAX")], "A3F0030000"),
        instr("hlt_7", InstructionType::Control, "HLT", vec![], "F4"),
    ]
}

#[test]
fn sum_program_finishes_within_six_steps_per_instruction() {
    let program = sum_program();
    let mut cpu = Cpu::new();
    cpu.load_instructions(program.clone()).expect("valid program");

    let mut store = SimulatorStore::default();
    store.set_instructions(program.clone());
    store.start_compilation();

    let mut steps = 0;
    while cpu.run_state().can_step() {
        let result = cpu.step().expect("no fault");
        if result.stage == ExecutionStage::Complete {
            store.step_forward();
        }
        store.dispatch(Command::ApplyExecution(Box::new(result)));
        steps += 1;
        assert!(steps <= 6 * program.len());
    }

    let state = store.snapshot();
    assert_eq!(cpu.run_state(), &RunState::Finished);
    assert_eq!(state.current_step, program.len());
    assert_eq!(state.cpu_state.memory.data.get(&1008), Some(&8));
    assert_eq!(state.cpu_state.registers.general(GeneralRegister::Eax), 8);
    assert_eq!(state.execution_stage, ExecutionStage::Complete);
    assert_eq!(
        state.current_instruction.as_ref().map(Instruction::id),
        Some("hlt_7")
    );
}

#[test]
fn every_instruction_walks_the_six_stages_in_order() {
    let mut cpu = Cpu::new();
    cpu.load_instructions(sum_program()).expect("valid program");
    let mut stages = Vec::new();
    while cpu.run_state().can_step() {
        stages.push(cpu.step().expect("no fault").stage);
    }
    for chunk in stages.chunks(6) {
        assert_eq!(chunk, ExecutionStage::ALL);
    }
    assert_eq!(cpu.cycle_count(), stages.len() as u64);
}

#[test]
fn heap_addresses_are_writable() {
    let address = u16::try_from(HEAP_START + 4).expect("heap fits in 16 bits");
    let mut cpu = Cpu::new();
    cpu.load_instructions(vec![
        instr("mov_0", InstructionType::Memory, "MOV", vec![Operand::memory(address), imm(9)], "C70504800000"),
    ])
    .expect("valid program");
    while cpu.run_state().can_step() {
        cpu.step().expect("no fault");
    }
    assert_eq!(cpu.state().memory.heap.get(&(HEAP_START + 4)), Some(&9));
    assert!(cpu.state().memory.data.is_empty());
}

#[rstest]
#[case::unknown_mnemonic(
    instr("frob_0", InstructionType::Arithmetic, "FROB", vec![], "0F"),
    DecodeError::UnknownMnemonic("FROB".into())
)]
#[case::bad_register(
    instr("inc_0", InstructionType::Arithmetic, "INC", vec![Operand::register("RAX")], "40"),
    DecodeError::UnknownRegister("RAX".into())
)]
#[case::missing_operand(
    instr("add_0", InstructionType::Arithmetic, "ADD", vec![Operand::register("EAX")], "01"),
    DecodeError::OperandCount { expected: 2, found: 1 }
)]
fn malformed_instructions_never_reach_the_cpu(
    #[case] bad: Instruction,
    #[case] expected: DecodeError,
) {
    let mut cpu = Cpu::new();
    let fault = cpu.load_instructions(vec![bad]).expect_err("rejected");
    match fault {
        CpuFault::Malformed { reason, .. } => assert_eq!(reason, expected),
        other => panic!("unexpected fault {other:?}"),
    }
    assert_eq!(cpu.run_state(), &RunState::Idle);
    assert_eq!(cpu.state().program_counter(), PROGRAM_BASE_ADDRESS);
}
