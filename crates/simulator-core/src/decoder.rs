//! Instruction decoder for the toy ISA.
//!
//! Decoding checks an [`Instruction`] against the operand shape of its
//! mnemonic and resolves every operand to a register, an immediate, a
//! mapped memory address or an absolute branch target. It never touches
//! registers or memory.

use std::collections::HashMap;

use crate::fault::DecodeError;
use crate::memory::decode_memory_region;
use crate::{
    Instruction, InstructionError, InstructionType, Operand, OperandType, Register,
    SpecialRegister, PROGRAM_BASE_ADDRESS,
};

/// Operations understood by the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    Neg,
    Cmp,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Test,
    Mov,
    Push,
    Pop,
    Load,
    Store,
    Jmp,
    Jz,
    Jnz,
    Js,
    Jns,
    Call,
    Ret,
    Nop,
    Hlt,
}

/// Operand layout expected by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operands.
    Nullary,
    /// One register or memory destination.
    Unary,
    /// One register, immediate or memory source.
    Source,
    /// Register or memory destination plus any source; at most one memory operand.
    Binary,
    /// Register destination, memory source.
    Load,
    /// Memory destination, register or immediate source.
    Store,
    /// Label or absolute address.
    Branch,
}

impl Opcode {
    /// Parses an upper- or lower-case mnemonic. `JE`/`JNE` alias `JZ`/`JNZ`.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        let opcode = match mnemonic.trim().to_ascii_uppercase().as_str() {
            "ADD" => Self::Add,
            "SUB" => Self::Sub,
            "MUL" => Self::Mul,
            "DIV" => Self::Div,
            "INC" => Self::Inc,
            "DEC" => Self::Dec,
            "NEG" => Self::Neg,
            "CMP" => Self::Cmp,
            "AND" => Self::And,
            "OR" => Self::Or,
            "XOR" => Self::Xor,
            "NOT" => Self::Not,
            "SHL" => Self::Shl,
            "SHR" => Self::Shr,
            "TEST" => Self::Test,
            "MOV" => Self::Mov,
            "PUSH" => Self::Push,
            "POP" => Self::Pop,
            "LOAD" => Self::Load,
            "STORE" => Self::Store,
            "JMP" => Self::Jmp,
            "JZ" | "JE" => Self::Jz,
            "JNZ" | "JNE" => Self::Jnz,
            "JS" => Self::Js,
            "JNS" => Self::Jns,
            "CALL" => Self::Call,
            "RET" => Self::Ret,
            "NOP" => Self::Nop,
            "HLT" => Self::Hlt,
            _ => return None,
        };
        Some(opcode)
    }

    /// Returns `true` when an instruction of `kind` may carry this opcode.
    #[must_use]
    pub const fn accepts(self, kind: InstructionType) -> bool {
        match self {
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Inc
            | Self::Dec
            | Self::Neg
            | Self::Cmp => matches!(kind, InstructionType::Arithmetic),
            Self::And | Self::Or | Self::Xor | Self::Not | Self::Shl | Self::Shr | Self::Test => {
                matches!(kind, InstructionType::Logic)
            }
            Self::Mov => matches!(
                kind,
                InstructionType::DataTransfer | InstructionType::Memory
            ),
            Self::Push | Self::Pop => matches!(kind, InstructionType::DataTransfer),
            Self::Load | Self::Store => matches!(kind, InstructionType::Memory),
            Self::Jmp
            | Self::Jz
            | Self::Jnz
            | Self::Js
            | Self::Jns
            | Self::Call
            | Self::Ret
            | Self::Nop
            | Self::Hlt => matches!(kind, InstructionType::Control),
        }
    }

    /// Operand layout for this opcode.
    #[must_use]
    pub const fn shape(self) -> OperandShape {
        match self {
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Cmp
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Shl
            | Self::Shr
            | Self::Test
            | Self::Mov => OperandShape::Binary,
            Self::Inc | Self::Dec | Self::Neg | Self::Not | Self::Pop => OperandShape::Unary,
            Self::Push => OperandShape::Source,
            Self::Load => OperandShape::Load,
            Self::Store => OperandShape::Store,
            Self::Jmp | Self::Jz | Self::Jnz | Self::Js | Self::Jns | Self::Call => {
                OperandShape::Branch
            }
            Self::Ret | Self::Nop | Self::Hlt => OperandShape::Nullary,
        }
    }

    /// Returns `false` for compare-style opcodes that only update flags.
    #[must_use]
    pub const fn writes_destination(self) -> bool {
        !matches!(self, Self::Cmp | Self::Test)
    }
}

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Register operand.
    Register(Register),
    /// Literal value.
    Immediate(i64),
    /// Mapped absolute address.
    Memory(u64),
}

impl Resolved {
    /// Memory address, if this is a memory operand.
    #[must_use]
    pub const fn address(self) -> Option<u64> {
        match self {
            Self::Memory(addr) => Some(addr),
            Self::Register(_) | Self::Immediate(_) => None,
        }
    }
}

/// Fully resolved instruction ready for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Operation.
    pub opcode: Opcode,
    /// Destination (or first source for compare-style opcodes).
    pub destination: Option<Resolved>,
    /// Source operand.
    pub source: Option<Resolved>,
    /// Absolute branch target.
    pub target: Option<i64>,
    /// Operand width in bits used for results and flags.
    pub width: u32,
}

/// Address layout of a loaded program.
///
/// Instructions are placed back to back from [`PROGRAM_BASE_ADDRESS`], each
/// occupying its encoded width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    starts: Vec<i64>,
    end: i64,
    ids: HashMap<String, usize>,
}

impl Default for ProgramLayout {
    fn default() -> Self {
        Self {
            starts: Vec::new(),
            end: PROGRAM_BASE_ADDRESS,
            ids: HashMap::new(),
        }
    }
}

impl ProgramLayout {
    /// Lays out `program` and indexes instruction ids.
    ///
    /// # Errors
    ///
    /// Returns [`InstructionError::DuplicateId`] when two instructions share an id.
    pub fn new(program: &[Instruction]) -> Result<Self, InstructionError> {
        let mut starts = Vec::with_capacity(program.len());
        let mut ids = HashMap::with_capacity(program.len());
        let mut addr = PROGRAM_BASE_ADDRESS;
        for (index, instr) in program.iter().enumerate() {
            if ids.insert(instr.id().to_owned(), index).is_some() {
                return Err(InstructionError::DuplicateId {
                    id: instr.id().to_owned(),
                });
            }
            starts.push(addr);
            addr = addr.saturating_add(i64::try_from(instr.encoded_width()).unwrap_or(i64::MAX));
        }
        Ok(Self {
            starts,
            end: addr,
            ids,
        })
    }

    /// Index of the instruction starting at `pc`.
    #[must_use]
    pub fn index_at(&self, pc: i64) -> Option<usize> {
        self.starts.binary_search(&pc).ok()
    }

    /// Start address of instruction `index`.
    #[must_use]
    pub fn address(&self, index: usize) -> Option<i64> {
        self.starts.get(index).copied()
    }

    /// Start address of the instruction with id `id`.
    #[must_use]
    pub fn address_of(&self, id: &str) -> Option<i64> {
        self.ids.get(id).and_then(|index| self.address(*index))
    }

    /// First address past the last instruction.
    #[must_use]
    pub const fn end(&self) -> i64 {
        self.end
    }

    /// Returns `true` when control may legally transfer to `addr`: an
    /// instruction boundary or the end of the program.
    #[must_use]
    pub fn is_target(&self, addr: i64) -> bool {
        addr == self.end || self.index_at(addr).is_some()
    }
}

/// Decodes `instr` against `layout`.
///
/// # Errors
///
/// Returns the first [`DecodeError`] found.
pub fn decode(instr: &Instruction, layout: &ProgramLayout) -> Result<DecodedInstruction, DecodeError> {
    let opcode = Opcode::from_mnemonic(instr.mnemonic())
        .ok_or_else(|| DecodeError::UnknownMnemonic(instr.mnemonic().to_owned()))?;
    if !opcode.accepts(instr.kind()) {
        return Err(DecodeError::TypeMismatch {
            mnemonic: instr.mnemonic().to_owned(),
            declared: instr.kind().as_str(),
        });
    }

    let operands = instr.operands();
    let shape = opcode.shape();
    let expected = match shape {
        OperandShape::Nullary => 0,
        OperandShape::Unary | OperandShape::Source | OperandShape::Branch => 1,
        OperandShape::Binary | OperandShape::Load | OperandShape::Store => 2,
    };
    if operands.len() != expected {
        return Err(DecodeError::OperandCount {
            expected,
            found: operands.len(),
        });
    }

    let mut decoded = DecodedInstruction {
        opcode,
        destination: None,
        source: None,
        target: None,
        width: operands.first().map_or(32, Operand::size),
    };

    match shape {
        OperandShape::Nullary => {}
        OperandShape::Unary => {
            decoded.destination = Some(destination(&operands[0], 0, opcode)?);
        }
        OperandShape::Source => {
            decoded.source = Some(resolve(&operands[0], 0)?);
        }
        OperandShape::Binary => {
            let dst = destination(&operands[0], 0, opcode)?;
            let src = resolve(&operands[1], 1)?;
            if dst.address().is_some() && src.address().is_some() {
                return Err(DecodeError::UnexpectedOperand {
                    index: 1,
                    expected: "a register or immediate when the destination is memory",
                });
            }
            decoded.destination = Some(dst);
            decoded.source = Some(src);
        }
        OperandShape::Load => {
            let dst = destination(&operands[0], 0, opcode)?;
            if dst.address().is_some() {
                return Err(DecodeError::UnexpectedOperand {
                    index: 0,
                    expected: "a register",
                });
            }
            let src = resolve(&operands[1], 1)?;
            if src.address().is_none() {
                return Err(DecodeError::UnexpectedOperand {
                    index: 1,
                    expected: "a memory address",
                });
            }
            decoded.destination = Some(dst);
            decoded.source = Some(src);
        }
        OperandShape::Store => {
            let dst = resolve(&operands[0], 0)?;
            if dst.address().is_none() {
                return Err(DecodeError::UnexpectedOperand {
                    index: 0,
                    expected: "a memory address",
                });
            }
            let src = resolve(&operands[1], 1)?;
            if src.address().is_some() {
                return Err(DecodeError::UnexpectedOperand {
                    index: 1,
                    expected: "a register or immediate",
                });
            }
            decoded.destination = Some(dst);
            decoded.source = Some(src);
        }
        OperandShape::Branch => {
            decoded.target = Some(branch_target(&operands[0], layout)?);
        }
    }
    Ok(decoded)
}

fn resolve(operand: &Operand, index: usize) -> Result<Resolved, DecodeError> {
    match operand.kind() {
        OperandType::Register => {
            let name = operand.text().unwrap_or_default();
            Register::from_name(name)
                .map(Resolved::Register)
                .ok_or_else(|| DecodeError::UnknownRegister(name.to_owned()))
        }
        OperandType::Immediate => Ok(Resolved::Immediate(operand.number().unwrap_or_default())),
        OperandType::Memory => {
            let addr = operand
                .memory_address()
                .ok_or(DecodeError::AddressOutOfRange(u64::MAX))?;
            decode_memory_region(addr)
                .map(|_| Resolved::Memory(addr))
                .ok_or(DecodeError::AddressOutOfRange(addr))
        }
        OperandType::Label => Err(DecodeError::UnexpectedOperand {
            index,
            expected: "a register, immediate or memory operand",
        }),
    }
}

/// Resolves operand `index` as something the instruction may write.
/// `ESP` and `EIP` only change through stack and branch instructions.
fn destination(operand: &Operand, index: usize, opcode: Opcode) -> Result<Resolved, DecodeError> {
    match resolve(operand, index) {
        Ok(Resolved::Immediate(_)) | Err(DecodeError::UnexpectedOperand { .. }) => Err(DecodeError::UnexpectedOperand {
            index,
            expected: "a register or memory operand",
        }),
        Ok(Resolved::Register(Register::Special(SpecialRegister::Esp | SpecialRegister::Eip)))
            if opcode.writes_destination() =>
        {
            Err(DecodeError::UnexpectedOperand {
                index,
                expected: "a writable register",
            })
        }
        other => other,
    }
}

fn branch_target(operand: &Operand, layout: &ProgramLayout) -> Result<i64, DecodeError> {
    match operand.kind() {
        OperandType::Label => {
            let label = operand.text().unwrap_or_default();
            layout
                .address_of(label)
                .ok_or_else(|| DecodeError::UnknownLabel(label.to_owned()))
        }
        OperandType::Immediate => {
            let addr = operand.number().unwrap_or_default();
            if layout.is_target(addr) {
                Ok(addr)
            } else {
                Err(DecodeError::InvalidBranchTarget(addr))
            }
        }
        OperandType::Register | OperandType::Memory => Err(DecodeError::UnexpectedOperand {
            index: 0,
            expected: "a label or absolute address",
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{decode, Opcode, ProgramLayout, Resolved};
    use crate::fault::DecodeError;
    use crate::{
        GeneralRegister, Instruction, InstructionError, InstructionType, Operand, Register,
        PROGRAM_BASE_ADDRESS,
    };

    fn instr(id: &str, kind: InstructionType, mnemonic: &str, operands: Vec<Operand>) -> Instruction {
        operands
            .into_iter()
            .fold(Instruction::builder(id, kind, mnemonic), |builder, operand| {
                builder.operand(operand)
            })
            .machine_code("9090")
            .build()
            .expect("valid test instruction")
    }

    fn imm(value: i64) -> Operand {
        Operand::immediate(value).expect("fits in 32 bits")
    }

    #[test]
    fn layout_places_instructions_by_encoded_width() {
        let program = vec![
            instr("a", InstructionType::Control, "NOP", vec![]),
            instr("b", InstructionType::Control, "NOP", vec![]),
        ];
        let layout = ProgramLayout::new(&program).expect("unique ids");
        assert_eq!(layout.address(0), Some(PROGRAM_BASE_ADDRESS));
        assert_eq!(layout.address_of("b"), Some(PROGRAM_BASE_ADDRESS + 2));
        assert_eq!(layout.end(), PROGRAM_BASE_ADDRESS + 4);
        assert_eq!(layout.index_at(PROGRAM_BASE_ADDRESS + 1), None);
        assert!(layout.is_target(layout.end()));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let program = vec![
            instr("x", InstructionType::Control, "NOP", vec![]),
            instr("x", InstructionType::Control, "HLT", vec![]),
        ];
        assert_eq!(
            ProgramLayout::new(&program),
            Err(InstructionError::DuplicateId { id: "x".into() })
        );
    }

    #[test]
    fn add_register_immediate_decodes() {
        let add = instr(
            "add_0",
            InstructionType::Arithmetic,
            "ADD",
            vec![Operand::register("EAX"), imm(5)],
        );
        let decoded = decode(&add, &ProgramLayout::default()).expect("decodes");
        assert_eq!(decoded.opcode, Opcode::Add);
        assert_eq!(
            decoded.destination,
            Some(Resolved::Register(Register::General(GeneralRegister::Eax)))
        );
        assert_eq!(decoded.source, Some(Resolved::Immediate(5)));
        assert_eq!(decoded.width, 32);
    }

    #[test]
    fn labels_resolve_to_instruction_addresses() {
        let program = vec![
            instr("top", InstructionType::Control, "NOP", vec![]),
            instr(
                "jmp_1",
                InstructionType::Control,
                "JMP",
                vec![Operand::label("top")],
            ),
        ];
        let layout = ProgramLayout::new(&program).expect("unique ids");
        let decoded = decode(&program[1], &layout).expect("decodes");
        assert_eq!(decoded.target, Some(PROGRAM_BASE_ADDRESS));

        let dangling = instr(
            "jmp_2",
            InstructionType::Control,
            "JMP",
            vec![Operand::label("nowhere")],
        );
        assert_eq!(
            decode(&dangling, &layout),
            Err(DecodeError::UnknownLabel("nowhere".into()))
        );
    }

    #[rstest]
    #[case::unknown_mnemonic(
        instr("u", InstructionType::Arithmetic, "FROB", vec![]),
        DecodeError::UnknownMnemonic("FROB".into())
    )]
    #[case::wrong_type(
        instr("t", InstructionType::Logic, "ADD", vec![Operand::register("EAX"), imm(1)]),
        DecodeError::TypeMismatch { mnemonic: "ADD".into(), declared: "logic" }
    )]
    #[case::missing_operand(
        instr("m", InstructionType::Arithmetic, "ADD", vec![Operand::register("EAX")]),
        DecodeError::OperandCount { expected: 2, found: 1 }
    )]
    #[case::unknown_register(
        instr("r", InstructionType::Arithmetic, "INC", vec![Operand::register("R9")]),
        DecodeError::UnknownRegister("R9".into())
    )]
    #[case::immediate_destination(
        instr("i", InstructionType::Arithmetic, "ADD", vec![imm(1), imm(2)]),
        DecodeError::UnexpectedOperand { index: 0, expected: "a register or memory operand" }
    )]
    #[case::stack_pointer_destination(
        instr("s", InstructionType::DataTransfer, "MOV", vec![Operand::register("ESP"), imm(2)]),
        DecodeError::UnexpectedOperand { index: 0, expected: "a writable register" }
    )]
    #[case::memory_to_memory(
        instr("mm", InstructionType::Memory, "MOV", vec![Operand::memory(4), Operand::memory(8)]),
        DecodeError::UnexpectedOperand {
            index: 1,
            expected: "a register or immediate when the destination is memory",
        }
    )]
    fn malformed_instructions_report_reason(#[case] input: Instruction, #[case] expected: DecodeError) {
        assert_eq!(decode(&input, &ProgramLayout::default()), Err(expected));
    }

    #[test]
    fn unmapped_addresses_are_rejected() {
        let load = Instruction::builder("ld", InstructionType::Memory, "LOAD")
            .operand(Operand::register("EAX"))
            .operand(
                Operand::new(
                    crate::OperandType::Memory,
                    crate::OperandValue::Number(0x1_0000),
                    32,
                )
                .expect("address shape is valid"),
            )
            .build()
            .expect("valid instruction");
        assert_eq!(
            decode(&load, &ProgramLayout::default()),
            Err(DecodeError::AddressOutOfRange(0x1_0000))
        );
    }

    #[test]
    fn compare_may_read_the_stack_pointer() {
        let cmp = instr(
            "cmp_0",
            InstructionType::Arithmetic,
            "CMP",
            vec![Operand::register("ESP"), imm(1000)],
        );
        assert!(decode(&cmp, &ProgramLayout::default()).is_ok());
    }
}
