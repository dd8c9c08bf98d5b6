//! Micro-staged CPU state machine for the toy ISA.
//!
//! Every instruction passes through six micro-stages, one per
//! [`Cpu::step`] call:
//! 1. fetch: read the instruction at `EIP`, advance `EIP` by its width
//! 2. decode: resolve operands
//! 3. execute: compute the result, update FLAGS, evaluate branch conditions
//! 4. memory access: explicit loads and stores, pushes and pops
//! 5. write back: commit the result to its register or memory destination, or
//!    the branch target to `EIP`
//! 6. complete: retire, then ready the next fetch or finish the program
//!
//! Faults are precise: a faulting instruction has committed nothing beyond
//! the fetch, and the fetch's `EIP` advance is rolled back.

mod alu;
mod flags;

pub use alu::{compute, AluOp, AluOutput};
pub use flags::{mask, sign_bit, sign_extend, FlagsUpdate};

use tracing::{debug, error, info};

use crate::api::ExecutionResult;
use crate::decoder::{decode, DecodedInstruction, Opcode, ProgramLayout, Resolved};
use crate::memory::STACK_SLOT_BYTES;
use crate::{
    CpuFault, CpuState, DecodeError, ExecutionStage, Instruction, Register, RunState,
};

/// Values carried between the micro-stages of one instruction.
#[derive(Debug, Clone, Default)]
struct Latch {
    index: usize,
    fetch_pc: i64,
    decoded: Option<DecodedInstruction>,
    result: Option<i64>,
    taken: bool,
    loaded: Option<i64>,
    return_to: Option<i64>,
}

/// The CPU: architectural state plus the loaded program.
#[derive(Debug, Clone, Default)]
pub struct Cpu {
    state: CpuState,
    program: Vec<Instruction>,
    layout: ProgramLayout,
    latch: Latch,
    run_state: RunState,
    cycle_count: u64,
    retired: u64,
}

impl Cpu {
    /// Creates an idle CPU in the boot snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current architectural state.
    #[must_use]
    pub const fn state(&self) -> &CpuState {
        &self.state
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Effective micro-steps performed since the last load or reset.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Instructions retired since the last load or reset.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Loaded program.
    #[must_use]
    pub fn program(&self) -> &[Instruction] {
        &self.program
    }

    /// Address layout of the loaded program.
    #[must_use]
    pub const fn layout(&self) -> &ProgramLayout {
        &self.layout
    }

    /// Validates, lays out and loads `program`, then resets the machine.
    ///
    /// A rejected program leaves the previously loaded one in place.
    ///
    /// # Errors
    ///
    /// Returns [`CpuFault::Rejected`] for shape violations or duplicate ids,
    /// and [`CpuFault::Malformed`] when an instruction does not decode.
    pub fn load_instructions(&mut self, program: Vec<Instruction>) -> Result<(), CpuFault> {
        for instr in &program {
            instr.validate()?;
        }
        let layout = ProgramLayout::new(&program)?;
        for instr in &program {
            decode(instr, &layout).map_err(|reason| CpuFault::Malformed {
                id: instr.id().to_owned(),
                reason,
            })?;
        }

        info!(
            instructions = program.len(),
            end = layout.end(),
            "program loaded"
        );
        self.program = program;
        self.layout = layout;
        self.reset();
        Ok(())
    }

    /// Restores the boot snapshot and re-arms the loaded program.
    pub fn reset(&mut self) -> &CpuState {
        self.state.reset_canonical();
        self.latch = Latch::default();
        self.cycle_count = 0;
        self.retired = 0;
        self.run_state = if self.program.is_empty() {
            RunState::Idle
        } else {
            RunState::Running
        };
        &self.state
    }

    /// Performs exactly one micro-stage.
    ///
    /// Stepping with nothing loaded or after the program finished is a no-op
    /// that reports `complete` with no instruction.
    ///
    /// # Errors
    ///
    /// Returns the runtime fault raised by this step, or the fault latched
    /// by an earlier step.
    pub fn step(&mut self) -> Result<ExecutionResult, CpuFault> {
        match &self.run_state {
            RunState::FaultLatched(fault) => return Err(fault.clone()),
            RunState::Idle => return Ok(self.no_op("no program loaded")),
            RunState::Finished => {
                return Ok(self.no_op("program finished; reset or load a new program"))
            }
            RunState::Running => {}
        }

        let stage = self.state.execution_stage;
        let outcome = match stage {
            ExecutionStage::Fetch => self.fetch(),
            ExecutionStage::Decode => self.decode(),
            ExecutionStage::Execute => self.execute(),
            ExecutionStage::MemoryAccess => self.memory_access(),
            ExecutionStage::WriteBack => self.write_back(),
            ExecutionStage::Complete => self.complete(),
        };

        match outcome {
            Ok(message) => {
                self.cycle_count += 1;
                debug!(
                    stage = stage.as_str(),
                    pc = self.state.program_counter(),
                    cycle = self.cycle_count,
                    "{message}"
                );
                Ok(ExecutionResult {
                    stage,
                    instruction: self.state.current_instruction.clone(),
                    cpu_state: self.state.clone(),
                    message,
                    cycle_count: self.cycle_count,
                })
            }
            Err(fault) => {
                self.state.registers.set_pc(self.latch.fetch_pc);
                error!(stage = stage.as_str(), %fault, "cpu fault latched");
                self.run_state = RunState::FaultLatched(fault.clone());
                Err(fault)
            }
        }
    }

    fn no_op(&self, message: &str) -> ExecutionResult {
        ExecutionResult {
            stage: ExecutionStage::Complete,
            instruction: None,
            cpu_state: self.state.clone(),
            message: message.to_owned(),
            cycle_count: self.cycle_count,
        }
    }

    fn current(&self) -> &Instruction {
        &self.program[self.latch.index]
    }

    fn current_id(&self) -> String {
        self.current().id().to_owned()
    }

    fn decoded(&self) -> Result<DecodedInstruction, CpuFault> {
        self.latch.decoded.ok_or_else(|| CpuFault::InvalidProgramCounter {
            id: self.current_id(),
            pc: self.latch.fetch_pc,
        })
    }

    fn fetch(&mut self) -> Result<String, CpuFault> {
        let pc = self.state.program_counter();
        let Some(index) = self.layout.index_at(pc) else {
            let id = self
                .state
                .current_instruction
                .as_ref()
                .map_or_else(String::new, |instr| instr.id().to_owned());
            self.latch.fetch_pc = pc;
            return Err(CpuFault::InvalidProgramCounter { id, pc });
        };
        let instr = self.program[index].clone();
        let width = i64::try_from(instr.encoded_width()).unwrap_or(i64::MAX);

        self.latch = Latch {
            index,
            fetch_pc: pc,
            ..Latch::default()
        };
        self.state.registers.set_pc(pc.saturating_add(width));
        let message = format!("fetch: read `{}` at 0x{pc:X}", instr.assembly());
        self.state.current_instruction = Some(instr);
        self.state.execution_stage = ExecutionStage::Decode;
        Ok(message)
    }

    fn decode(&mut self) -> Result<String, CpuFault> {
        let decoded = decode(self.current(), &self.layout).map_err(|reason| CpuFault::Malformed {
            id: self.current_id(),
            reason,
        })?;
        self.latch.decoded = Some(decoded);
        self.state.execution_stage = ExecutionStage::Execute;
        Ok(format!(
            "decode: {:?} with {} operand(s) at {} bits",
            decoded.opcode,
            self.current().operands().len(),
            decoded.width
        ))
    }

    fn read(&self, operand: Option<Resolved>) -> Result<i64, CpuFault> {
        match operand {
            Some(Resolved::Register(reg)) => Ok(self.state.registers.get(reg)),
            Some(Resolved::Immediate(value)) => Ok(value),
            Some(Resolved::Memory(addr)) => {
                self.state
                    .memory
                    .read(addr)
                    .ok_or_else(|| CpuFault::Malformed {
                        id: self.current_id(),
                        reason: DecodeError::AddressOutOfRange(addr),
                    })
            }
            None => Err(CpuFault::Malformed {
                id: self.current_id(),
                reason: DecodeError::OperandCount {
                    expected: 1,
                    found: 0,
                },
            }),
        }
    }

    fn execute(&mut self) -> Result<String, CpuFault> {
        let decoded = self.decoded()?;
        let width = decoded.width;
        let op = match decoded.opcode {
            Opcode::Add => Some(AluOp::Add),
            Opcode::Sub | Opcode::Cmp => Some(AluOp::Sub),
            Opcode::Mul => Some(AluOp::Mul),
            Opcode::Div => Some(AluOp::Div),
            Opcode::Inc => Some(AluOp::Inc),
            Opcode::Dec => Some(AluOp::Dec),
            Opcode::Neg => Some(AluOp::Neg),
            Opcode::Not => Some(AluOp::Not),
            Opcode::And | Opcode::Test => Some(AluOp::And),
            Opcode::Or => Some(AluOp::Or),
            Opcode::Xor => Some(AluOp::Xor),
            Opcode::Shl => Some(AluOp::Shl),
            Opcode::Shr => Some(AluOp::Shr),
            _ => None,
        };

        if let Some(op) = op {
            let a = self.read(decoded.destination)?;
            let b = match decoded.source {
                Some(_) => self.read(decoded.source)?,
                None => 0,
            };
            let output = compute(op, a, b, width).ok_or_else(|| CpuFault::DivideByZero {
                id: self.current_id(),
            })?;
            output.flags.apply(&mut self.state.flags);
            if decoded.opcode.writes_destination() {
                self.latch.result = Some(output.value);
            }
            self.state.execution_stage = ExecutionStage::MemoryAccess;
            return Ok(format!("execute: {op:?} produced {}", output.value));
        }

        let flags = self.state.flags;
        let message = match decoded.opcode {
            Opcode::Mov | Opcode::Store | Opcode::Push => {
                if decoded.source.and_then(Resolved::address).is_none() {
                    let value = self.read(decoded.source)?;
                    self.latch.result = Some(sign_extend(mask(value, width), width));
                }
                "execute: operand value latched".to_owned()
            }
            Opcode::Jmp | Opcode::Call => {
                self.latch.taken = true;
                "execute: unconditional transfer".to_owned()
            }
            Opcode::Jz | Opcode::Jnz | Opcode::Js | Opcode::Jns => {
                self.latch.taken = match decoded.opcode {
                    Opcode::Jz => flags.zero,
                    Opcode::Jnz => !flags.zero,
                    Opcode::Js => flags.negative,
                    _ => !flags.negative,
                };
                format!(
                    "execute: branch {}",
                    if self.latch.taken { "taken" } else { "not taken" }
                )
            }
            _ => "execute: nothing to compute".to_owned(),
        };
        self.state.execution_stage = ExecutionStage::MemoryAccess;
        Ok(message)
    }

    fn push(&mut self, value: i64) -> Result<(), CpuFault> {
        let sp = self.state.stack_pointer();
        if sp < STACK_SLOT_BYTES {
            return Err(CpuFault::StackOverflow {
                id: self.current_id(),
            });
        }
        self.state.memory.stack.push(value);
        self.state.registers.set_sp(sp - STACK_SLOT_BYTES);
        Ok(())
    }

    fn peek(&self) -> Result<i64, CpuFault> {
        self.state
            .memory
            .stack
            .last()
            .copied()
            .ok_or_else(|| CpuFault::StackUnderflow {
                id: self.current_id(),
            })
    }

    fn pop(&mut self) -> Result<i64, CpuFault> {
        let value = self.peek()?;
        self.state.memory.stack.pop();
        let sp = self.state.stack_pointer();
        self.state.registers.set_sp(sp + STACK_SLOT_BYTES);
        Ok(value)
    }

    fn store(&mut self, addr: u64, value: i64) -> Result<(), CpuFault> {
        if self.state.memory.write(addr, value) {
            Ok(())
        } else {
            Err(CpuFault::Malformed {
                id: self.current_id(),
                reason: DecodeError::AddressOutOfRange(addr),
            })
        }
    }

    fn memory_access(&mut self) -> Result<String, CpuFault> {
        let decoded = self.decoded()?;
        let destination = decoded.destination.and_then(Resolved::address);
        let source = decoded.source.and_then(Resolved::address);

        let message = match decoded.opcode {
            Opcode::Mov | Opcode::Load | Opcode::Store => {
                if let (Some(addr), Some(value)) = (destination, self.latch.result) {
                    self.store(addr, value)?;
                    format!("memory: stored {value} at 0x{addr:X}")
                } else if let Some(addr) = source {
                    let value = self.read(decoded.source)?;
                    self.latch.loaded = Some(value);
                    format!("memory: loaded {value} from 0x{addr:X}")
                } else {
                    "memory: no access".to_owned()
                }
            }
            Opcode::Push => {
                let value = match self.latch.result {
                    Some(value) => value,
                    None => self.read(decoded.source)?,
                };
                self.push(value)?;
                format!("memory: pushed {value}, ESP = {}", self.state.stack_pointer())
            }
            Opcode::Pop => {
                let value = self.peek()?;
                if let Some(addr) = destination {
                    self.store(addr, value)?;
                }
                self.pop()?;
                self.latch.loaded = Some(value);
                format!("memory: popped {value}, ESP = {}", self.state.stack_pointer())
            }
            Opcode::Call => {
                let return_to = self.state.program_counter();
                self.push(return_to)?;
                format!("memory: pushed return address 0x{return_to:X}")
            }
            Opcode::Ret => {
                let return_to = self.peek()?;
                if !self.layout.is_target(return_to) {
                    return Err(CpuFault::InvalidProgramCounter {
                        id: self.current_id(),
                        pc: return_to,
                    });
                }
                self.pop()?;
                self.latch.return_to = Some(return_to);
                format!("memory: popped return address 0x{return_to:X}")
            }
            _ => "memory: no access".to_owned(),
        };
        self.state.execution_stage = ExecutionStage::WriteBack;
        Ok(message)
    }

    fn write_back(&mut self) -> Result<String, CpuFault> {
        let decoded = self.decoded()?;
        let message = match decoded.opcode {
            Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Js | Opcode::Jns | Opcode::Call => {
                match decoded.target {
                    Some(target) if self.latch.taken => {
                        self.state.registers.set_pc(target);
                        format!("write back: EIP = 0x{target:X}")
                    }
                    _ => "write back: fall through".to_owned(),
                }
            }
            Opcode::Ret => match self.latch.return_to {
                Some(target) => {
                    self.state.registers.set_pc(target);
                    format!("write back: EIP = 0x{target:X}")
                }
                None => "write back: nothing to commit".to_owned(),
            },
            Opcode::Mov | Opcode::Store | Opcode::Push => {
                match (decoded.destination, self.latch.loaded.or(self.latch.result)) {
                    (Some(Resolved::Register(reg)), Some(value)) => self.commit_register(reg, value),
                    _ => "write back: nothing to commit".to_owned(),
                }
            }
            Opcode::Load | Opcode::Pop => {
                match (decoded.destination, self.latch.loaded) {
                    (Some(Resolved::Register(reg)), Some(value)) => self.commit_register(reg, value),
                    _ => "write back: nothing to commit".to_owned(),
                }
            }
            _ => match (decoded.destination, self.latch.result) {
                (Some(Resolved::Register(reg)), Some(value)) => self.commit_register(reg, value),
                (Some(Resolved::Memory(addr)), Some(value)) => {
                    self.store(addr, value)?;
                    format!("write back: [0x{addr:X}] = {value}")
                }
                _ => "write back: nothing to commit".to_owned(),
            },
        };
        self.state.execution_stage = ExecutionStage::Complete;
        Ok(message)
    }

    fn commit_register(&mut self, reg: Register, value: i64) -> String {
        self.state.registers.set(reg, value);
        format!("write back: {} = {value}", reg.name())
    }

    fn complete(&mut self) -> Result<String, CpuFault> {
        let decoded = self.decoded()?;
        self.retired += 1;
        let pc = self.state.program_counter();
        if decoded.opcode == Opcode::Hlt || pc == self.layout.end() {
            self.run_state = RunState::Finished;
            info!(
                retired = self.retired,
                cycles = self.cycle_count + 1,
                "program finished"
            );
            return Ok(format!(
                "complete: retired `{}`; program finished",
                self.current().assembly()
            ));
        }
        if self.layout.index_at(pc).is_none() {
            return Err(CpuFault::InvalidProgramCounter {
                id: self.current_id(),
                pc,
            });
        }
        self.state.execution_stage = ExecutionStage::Fetch;
        Ok(format!(
            "complete: retired `{}`; next fetch at 0x{pc:X}",
            self.current().assembly()
        ))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::Cpu;
    use crate::{
        CpuFault, CpuState, ExecutionStage, GeneralRegister, Instruction, InstructionType,
        Operand, RunState, INITIAL_STACK_POINTER, PROGRAM_BASE_ADDRESS,
    };

    fn build(
        id: &str,
        kind: InstructionType,
        mnemonic: &str,
        operands: Vec<Operand>,
        code: &str,
    ) -> Instruction {
        operands
            .into_iter()
            .fold(Instruction::builder(id, kind, mnemonic), |builder, operand| {
                builder.operand(operand)
            })
            .machine_code(code)
            .build()
            .expect("valid test instruction")
    }

    fn imm(value: i64) -> Operand {
        Operand::immediate(value).expect("fits in 32 bits")
    }

    fn run_to_end(cpu: &mut Cpu, limit: usize) {
        for _ in 0..limit {
            if !cpu.run_state().can_step() {
                return;
            }
            cpu.step().expect("no fault");
        }
    }

    #[test]
    fn add_eax_five_takes_six_steps() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![build(
            "add_0",
            InstructionType::Arithmetic,
            "ADD",
            vec![Operand::register("EAX"), imm(5)],
            "83C005",
        )])
        .expect("valid program");

        let stages: Vec<ExecutionStage> = (0..6)
            .map(|_| cpu.step().expect("no fault").stage)
            .collect();
        assert_eq!(stages, ExecutionStage::ALL.to_vec());
        assert_eq!(cpu.state().registers.general(GeneralRegister::Eax), 5);
        assert!(!cpu.state().flags.zero);
        assert!(!cpu.state().flags.negative);
        assert_eq!(cpu.state().program_counter(), PROGRAM_BASE_ADDRESS + 3);

        let before = cpu.state().clone();
        let seventh = cpu.step().expect("exhaustion is not a fault");
        assert_eq!(seventh.stage, ExecutionStage::Complete);
        assert!(seventh.instruction.is_none());
        assert_eq!(seventh.cycle_count, 6);
        assert_eq!(cpu.state(), &before);
    }

    #[test]
    fn stepping_an_empty_machine_is_a_no_op() {
        let mut cpu = Cpu::new();
        let result = cpu.step().expect("idle is not a fault");
        assert_eq!(result.stage, ExecutionStage::Complete);
        assert_eq!(result.cycle_count, 0);
        assert_eq!(cpu.state(), &CpuState::default());
    }

    #[test]
    fn loop_with_conditional_branch_counts_down() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![
            build(
                "mov_0",
                InstructionType::DataTransfer,
                "MOV",
                vec![Operand::register("ECX"), imm(3)],
                "B903000000",
            ),
            build(
                "dec_1",
                InstructionType::Arithmetic,
                "DEC",
                vec![Operand::register("ECX")],
                "49",
            ),
            build(
                "jnz_2",
                InstructionType::Control,
                "JNZ",
                vec![Operand::label("dec_1")],
                "75FB",
            ),
            build("hlt_3", InstructionType::Control, "HLT", vec![], "F4"),
        ])
        .expect("valid program");

        run_to_end(&mut cpu, 200);
        assert_eq!(cpu.run_state(), &RunState::Finished);
        assert_eq!(cpu.state().registers.general(GeneralRegister::Ecx), 0);
        assert!(cpu.state().flags.zero);
        assert_eq!(cpu.retired(), 1 + 3 * 2 + 1);
    }

    #[test]
    fn push_pop_and_memory_round_trip() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![
            build(
                "push_0",
                InstructionType::DataTransfer,
                "PUSH",
                vec![imm(42)],
                "6A2A",
            ),
            build(
                "pop_1",
                InstructionType::DataTransfer,
                "POP",
                vec![Operand::register("EBX")],
                "5B",
            ),
            build(
                "mov_2",
                InstructionType::Memory,
                "MOV",
                vec![Operand::memory(1000), Operand::register("EBX")],
                "891DE8030000",
            ),
            build(
                "load_3",
                InstructionType::Memory,
                "LOAD",
                vec![Operand::register("EDX"), Operand::memory(1000)],
                "8B15E8030000",
            ),
        ])
        .expect("valid program");

        for _ in 0..6 {
            cpu.step().expect("no fault");
        }
        assert_eq!(cpu.state().memory.stack, vec![42]);
        assert_eq!(cpu.state().stack_pointer(), INITIAL_STACK_POINTER - 4);

        run_to_end(&mut cpu, 100);
        assert!(cpu.state().memory.stack.is_empty());
        assert_eq!(cpu.state().stack_pointer(), INITIAL_STACK_POINTER);
        assert_eq!(cpu.state().memory.data.get(&1000), Some(&42));
        assert_eq!(cpu.state().registers.general(GeneralRegister::Edx), 42);
    }

    #[test]
    fn call_and_return_restore_the_fall_through_address() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![
            build(
                "call_0",
                InstructionType::Control,
                "CALL",
                vec![Operand::label("inc_2")],
                "E801000000",
            ),
            build("hlt_1", InstructionType::Control, "HLT", vec![], "F4"),
            build(
                "inc_2",
                InstructionType::Arithmetic,
                "INC",
                vec![Operand::register("EAX")],
                "40",
            ),
            build("ret_3", InstructionType::Control, "RET", vec![], "C3"),
        ])
        .expect("valid program");

        run_to_end(&mut cpu, 100);
        assert_eq!(cpu.run_state(), &RunState::Finished);
        assert_eq!(cpu.state().registers.general(GeneralRegister::Eax), 1);
        assert!(cpu.state().memory.stack.is_empty());
        assert_eq!(
            cpu.state().current_instruction.as_ref().map(Instruction::id),
            Some("hlt_1")
        );
    }

    #[test]
    fn divide_by_zero_latches_without_side_effects() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![
            build(
                "mov_0",
                InstructionType::DataTransfer,
                "MOV",
                vec![Operand::register("EAX"), imm(10)],
                "B80A000000",
            ),
            build(
                "div_1",
                InstructionType::Arithmetic,
                "DIV",
                vec![Operand::register("EAX"), Operand::register("EBX")],
                "F7F3",
            ),
        ])
        .expect("valid program");

        for _ in 0..6 {
            cpu.step().expect("mov retires");
        }
        let before = cpu.state().registers.clone();
        cpu.step().expect("fetch");
        cpu.step().expect("decode");
        let fault = cpu.step().expect_err("division by zero");
        assert_eq!(fault, CpuFault::DivideByZero { id: "div_1".into() });
        assert_eq!(cpu.state().registers, before);
        assert_eq!(cpu.step(), Err(fault));

        cpu.reset();
        assert_eq!(cpu.run_state(), &RunState::Running);
        assert_eq!(cpu.state(), &CpuState::default());
    }

    #[test]
    fn pop_on_empty_stack_underflows() {
        let mut cpu = Cpu::new();
        cpu.load_instructions(vec![build(
            "pop_0",
            InstructionType::DataTransfer,
            "POP",
            vec![Operand::register("EAX")],
            "58",
        )])
        .expect("valid program");
        for _ in 0..3 {
            cpu.step().expect("fetch, decode, execute");
        }
        assert_eq!(
            cpu.step(),
            Err(CpuFault::StackUnderflow { id: "pop_0".into() })
        );
        assert_eq!(cpu.state().program_counter(), PROGRAM_BASE_ADDRESS);
    }

    #[test]
    fn malformed_program_is_rejected_at_load_and_keeps_previous() {
        let mut cpu = Cpu::new();
        let good = build("nop_0", InstructionType::Control, "NOP", vec![], "90");
        cpu.load_instructions(vec![good]).expect("valid program");

        let bad = build(
            "jmp_0",
            InstructionType::Control,
            "JMP",
            vec![Operand::label("missing")],
            "EB00",
        );
        let err = cpu.load_instructions(vec![bad]).expect_err("dangling label");
        assert!(matches!(err, CpuFault::Malformed { ref id, .. } if id == "jmp_0"));
        assert_eq!(cpu.program().len(), 1);
        assert_eq!(cpu.program()[0].id(), "nop_0");
    }

    const WRITABLE: [&str; 6] = ["EAX", "EBX", "ECX", "EDX", "ESI", "EDI"];

    /// Instructions that neither branch nor fault.
    fn straight_line_op() -> impl Strategy<Value = (InstructionType, &'static str, Vec<Operand>)> {
        let reg = prop::sample::select(WRITABLE.to_vec());
        let value = -5000_i64..5000;
        prop_oneof![
            (reg.clone(), value.clone()).prop_map(|(r, v)| {
                (InstructionType::DataTransfer, "MOV", vec![Operand::register(r), imm(v)])
            }),
            (prop::sample::select(vec!["ADD", "SUB", "CMP"]), reg.clone(), value.clone())
                .prop_map(|(m, r, v)| {
                    (InstructionType::Arithmetic, m, vec![Operand::register(r), imm(v)])
                }),
            (prop::sample::select(vec!["AND", "OR", "XOR"]), reg.clone(), value).prop_map(
                |(m, r, v)| (InstructionType::Logic, m, vec![Operand::register(r), imm(v)])
            ),
            (prop::sample::select(vec!["INC", "DEC", "NEG"]), reg.clone())
                .prop_map(|(m, r)| (InstructionType::Arithmetic, m, vec![Operand::register(r)])),
            reg.clone()
                .prop_map(|r| (InstructionType::Logic, "NOT", vec![Operand::register(r)])),
            (0_u16..256, reg).prop_map(|(slot, r)| {
                (
                    InstructionType::Memory,
                    "MOV",
                    vec![Operand::memory(1000 + slot * 4), Operand::register(r)],
                )
            }),
            Just((InstructionType::Control, "NOP", Vec::new())),
        ]
    }

    fn straight_line_program() -> impl Strategy<Value = Vec<Instruction>> {
        prop::collection::vec((straight_line_op(), 1_usize..7), 1..24).prop_map(|ops| {
            ops.into_iter()
                .enumerate()
                .map(|(i, ((kind, mnemonic, operands), width))| {
                    let id = format!("{}_{i}", mnemonic.to_ascii_lowercase());
                    build(&id, kind, mnemonic, operands, &"90".repeat(width))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn straight_line_programs_complete_within_six_steps_each(
            program in straight_line_program(),
            extra in 1_usize..10,
        ) {
            let len = program.len();
            let mut cpu = Cpu::new();
            cpu.load_instructions(program).expect("valid program");
            for _ in 0..6 * len {
                cpu.step().expect("no fault");
            }
            prop_assert_eq!(cpu.run_state(), &RunState::Finished);
            prop_assert_eq!(cpu.state().execution_stage, ExecutionStage::Complete);

            let cycles = cpu.cycle_count();
            let before = cpu.state().clone();
            for _ in 0..extra {
                let idle = cpu.step().expect("finished machine never faults");
                prop_assert_eq!(idle.stage, ExecutionStage::Complete);
                prop_assert!(idle.instruction.is_none());
                prop_assert_eq!(idle.cycle_count, cycles);
            }
            prop_assert_eq!(cpu.cycle_count(), cycles);
            prop_assert_eq!(cpu.state(), &before);
        }

        #[test]
        fn reset_after_any_steps_restores_boot_state(
            program in straight_line_program(),
            steps in 0_usize..200,
        ) {
            let mut cpu = Cpu::new();
            cpu.load_instructions(program).expect("valid program");
            for _ in 0..steps {
                cpu.step().expect("no fault");
            }
            let state = cpu.reset().clone();
            prop_assert_eq!(&state, &CpuState::default());
            prop_assert_eq!(state.program_counter(), PROGRAM_BASE_ADDRESS);
            prop_assert_eq!(cpu.cycle_count(), 0);
            prop_assert_eq!(cpu.run_state(), &RunState::Running);
        }
    }
}
