//! Lowering of optimized IR to simulator instructions.
//!
//! Every value lives in memory: variables in their IR slots, temporaries in
//! the slots that follow. Each IR operation loads into `EAX`, computes, and
//! stores back, so the generated program shows one memory round trip per
//! operation. Division goes through `ECX`.

use simulator_core::{
    cycle_cost, cycle_cost_kind, GeneralRegister, Instruction, InstructionType, Operand,
};
use tracing::debug;

use crate::encoder::{encode, to_hex, Arg};
use crate::errors::{CompileError, CompileErrorKind};
use crate::ir::{slot_address, IrProgram, Place, Tac, Value};
use crate::parser::BinaryOp;

const ACC: GeneralRegister = GeneralRegister::Eax;
const DIVISOR: GeneralRegister = GeneralRegister::Ecx;

/// Instruction type implied by a mnemonic and its operands.
#[must_use]
pub fn instruction_type(mnemonic: &str, operands: &[Arg]) -> InstructionType {
    match mnemonic {
        "MOV" if operands.iter().any(|arg| matches!(arg, Arg::Mem(_))) => InstructionType::Memory,
        "MOV" | "PUSH" | "POP" => InstructionType::DataTransfer,
        "AND" | "OR" | "XOR" | "NOT" | "SHL" | "SHR" | "TEST" => InstructionType::Logic,
        "NOP" | "HLT" | "RET" | "JMP" | "CALL" => InstructionType::Control,
        _ => InstructionType::Arithmetic,
    }
}

/// Translates `ir` into a program ending in `HLT`.
///
/// # Errors
///
/// Returns a [`CompileError`] when variables and temporaries do not fit in
/// the data region or an operation has no encoding.
pub fn generate(ir: &IrProgram) -> Result<Vec<Instruction>, CompileError> {
    let temps = usize::try_from(ir.temps).unwrap_or(usize::MAX);
    let slots = ir.variables.len().saturating_add(temps);
    if slots > 0 && slot_address(slots - 1).is_none() {
        return Err(CompileError::new(CompileErrorKind::OutOfDataMemory(slots)));
    }

    let mut emitter = Emitter {
        ir,
        instructions: Vec::new(),
    };
    for tac in &ir.code {
        emitter.lower(tac)?;
        if matches!(tac, Tac::Return(_)) {
            break;
        }
    }
    if !matches!(emitter.instructions.last(), Some(last) if last.mnemonic() == "HLT") {
        emitter.emit("HLT", &[], "end of program".to_owned())?;
    }
    debug!(instructions = emitter.instructions.len(), "code generated");
    Ok(emitter.instructions)
}

struct Emitter<'a> {
    ir: &'a IrProgram,
    instructions: Vec<Instruction>,
}

impl Emitter<'_> {
    fn address(&self, place: Place) -> Result<u16, CompileError> {
        match place {
            Place::Var(index) => self.ir.variables.get(index).map(|v| v.address).ok_or_else(|| {
                CompileError::new(CompileErrorKind::Unencodable(format!("variable #{index}")))
            }),
            Place::Temp(t) => {
                let index = usize::try_from(t)
                    .unwrap_or(usize::MAX)
                    .saturating_add(self.ir.variables.len());
                slot_address(index).ok_or_else(|| {
                    CompileError::new(CompileErrorKind::OutOfDataMemory(index.saturating_add(1)))
                })
            }
        }
    }

    fn name(&self, place: Place) -> String {
        match place {
            Place::Var(index) => self
                .ir
                .variables
                .get(index)
                .map_or_else(|| format!("v{index}"), |v| v.name.clone()),
            Place::Temp(t) => format!("t{t}"),
        }
    }

    fn arg(&self, value: Value) -> Result<Arg, CompileError> {
        match value {
            Value::Const(c) => Ok(Arg::Imm(c)),
            Value::Place(place) => self.address(place).map(Arg::Mem),
        }
    }

    fn describe(&self, value: Value) -> String {
        match value {
            Value::Const(c) => c.to_string(),
            Value::Place(place) => self.name(place),
        }
    }

    fn emit(
        &mut self,
        mnemonic: &str,
        args: &[Arg],
        description: String,
    ) -> Result<(), CompileError> {
        let unencodable = |detail: String| CompileError::new(CompileErrorKind::Unencodable(detail));
        let bytes = encode(mnemonic, args).map_err(|err| unencodable(err.to_string()))?;

        let memory_destination = matches!(args.first(), Some(Arg::Mem(_)));
        let memory_source = matches!(args.get(1), Some(Arg::Mem(_)));
        let cycles = cycle_cost_kind(mnemonic, memory_destination, memory_source)
            .and_then(cycle_cost)
            .unwrap_or(1);

        let id = format!(
            "{}_{}",
            mnemonic.to_ascii_lowercase(),
            self.instructions.len() + 1
        );
        let mut builder = Instruction::builder(&id, instruction_type(mnemonic, args), mnemonic)
            .machine_code(&to_hex(&bytes))
            .description(&description)
            .cycles(cycles);
        for arg in args {
            let operand = match arg {
                Arg::Reg(reg) => Operand::register(reg.name()),
                Arg::Imm(value) => {
                    Operand::immediate(*value).map_err(|err| unencodable(err.to_string()))?
                }
                Arg::Mem(address) => Operand::memory(*address),
            };
            builder = builder.operand(operand);
        }
        let instruction = builder.build().map_err(|err| unencodable(err.to_string()))?;
        self.instructions.push(instruction);
        Ok(())
    }

    fn load(&mut self, reg: GeneralRegister, value: Value) -> Result<(), CompileError> {
        let source = self.arg(value)?;
        let description = format!("load {} into {}", self.describe(value), reg.name());
        self.emit("MOV", &[Arg::Reg(reg), source], description)
    }

    fn store(&mut self, dest: Place) -> Result<(), CompileError> {
        let address = self.address(dest)?;
        let description = format!("store {} into {}", ACC.name(), self.name(dest));
        self.emit("MOV", &[Arg::Mem(address), Arg::Reg(ACC)], description)
    }

    fn lower(&mut self, tac: &Tac) -> Result<(), CompileError> {
        match tac {
            Tac::Copy {
                dest,
                src: Value::Const(c),
            } => {
                let address = self.address(*dest)?;
                let description = format!("{} = {c}", self.name(*dest));
                self.emit("MOV", &[Arg::Mem(address), Arg::Imm(*c)], description)?;
            }
            Tac::Copy { dest, src } => {
                self.load(ACC, *src)?;
                self.store(*dest)?;
            }
            Tac::Binary {
                dest,
                op: BinaryOp::Div,
                lhs,
                rhs,
            } => {
                self.load(ACC, *lhs)?;
                self.load(DIVISOR, *rhs)?;
                let description = format!(
                    "{} = {} / {}",
                    self.name(*dest),
                    self.describe(*lhs),
                    self.describe(*rhs)
                );
                self.emit("DIV", &[Arg::Reg(ACC), Arg::Reg(DIVISOR)], description)?;
                self.store(*dest)?;
            }
            Tac::Binary { dest, op, lhs, rhs } => {
                let mnemonic = match op {
                    BinaryOp::Add => "ADD",
                    BinaryOp::Sub => "SUB",
                    BinaryOp::Mul | BinaryOp::Div => "MUL",
                };
                self.load(ACC, *lhs)?;
                let operand = self.arg(*rhs)?;
                let description = format!(
                    "{} = {} {} {}",
                    self.name(*dest),
                    self.describe(*lhs),
                    op.symbol(),
                    self.describe(*rhs)
                );
                self.emit(mnemonic, &[Arg::Reg(ACC), operand], description)?;
                self.store(*dest)?;
            }
            Tac::Negate { dest, src } => {
                self.load(ACC, *src)?;
                let description = format!("{} = -{}", self.name(*dest), self.describe(*src));
                self.emit("NEG", &[Arg::Reg(ACC)], description)?;
                self.store(*dest)?;
            }
            Tac::Call { dest, name, .. } => {
                self.emit("NOP", &[], format!("call to {name} is not executed"))?;
                if let Some(dest) = dest {
                    let address = self.address(*dest)?;
                    let description = format!("{} = 0 (result of {name})", self.name(*dest));
                    self.emit("MOV", &[Arg::Mem(address), Arg::Imm(0)], description)?;
                }
            }
            Tac::Return(value) => {
                if let Some(value) = value {
                    self.load(ACC, *value)?;
                }
                self.emit("HLT", &[], "return from main".to_owned())?;
            }
        }
        Ok(())
    }
}
