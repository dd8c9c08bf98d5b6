//! Instruction and operand data model shared by the compiler and the CPU.
//!
//! Instructions are immutable once built. Every constructor validates the
//! operand shape rules below, and [`Instruction::validate`] re-checks them
//! for values that arrive through deserialization.
//!
//! | Operand type | Value            | Valid sizes (bits) |
//! |--------------|------------------|--------------------|
//! | register     | text             | 8, 16, 32, 64      |
//! | immediate    | number           | 8, 16, 32, 64      |
//! | memory       | number or `[n]`  | 8, 16, 32, 64      |
//! | label        | text             | 32                 |

use std::fmt;

use thiserror::Error;

/// Operand widths accepted for register, immediate and memory operands.
pub const VALID_OPERAND_SIZES: [u32; 4] = [8, 16, 32, 64];
/// The only width accepted for label operands.
pub const LABEL_OPERAND_SIZE: u32 = 32;
/// Width used by the convenience operand constructors.
pub const DEFAULT_OPERAND_SIZE: u32 = 32;

/// Instruction class used for execute-stage dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InstructionType {
    /// Integer arithmetic (`ADD`, `SUB`, `MUL`, ...).
    Arithmetic,
    /// Bitwise logic and shifts.
    Logic,
    /// Explicit loads and stores.
    Memory,
    /// Branches, calls and machine control.
    Control,
    /// Register moves and stack transfers.
    DataTransfer,
}

impl InstructionType {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arithmetic => "arithmetic",
            Self::Logic => "logic",
            Self::Memory => "memory",
            Self::Control => "control",
            Self::DataTransfer => "data_transfer",
        }
    }
}

/// Operand kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OperandType {
    /// Named register (`EAX`, `ESP`, ...).
    Register,
    /// Literal value.
    Immediate,
    /// Absolute data-space address.
    Memory,
    /// Reference to an instruction id.
    Label,
}

impl OperandType {
    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Immediate => "immediate",
            Self::Memory => "memory",
            Self::Label => "label",
        }
    }
}

/// Operand payload; numeric or textual depending on the operand type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum OperandValue {
    /// Numeric payload.
    Number(i64),
    /// Textual payload.
    Text(String),
}

impl fmt::Display for OperandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Operand shape violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandError {
    /// Width is not a valid encoding for the operand type.
    #[error("{kind} operand cannot be {size} bits wide")]
    InvalidSize {
        /// Declared operand type name.
        kind: &'static str,
        /// Offending width.
        size: u32,
    },
    /// Payload variant does not match the operand type.
    #[error("{kind} operand requires a {expected} value")]
    ValueMismatch {
        /// Declared operand type name.
        kind: &'static str,
        /// Required payload variant.
        expected: &'static str,
    },
    /// Immediate does not fit in the declared width.
    #[error("immediate {value} does not fit in {size} bits")]
    ImmediateOutOfRange {
        /// Literal value.
        value: i64,
        /// Declared width.
        size: u32,
    },
    /// Memory operand payload is not a non-negative address.
    #[error("memory operand `{0}` is not a valid address")]
    InvalidAddress(String),
    /// Register or label name is empty.
    #[error("{kind} operand name is empty")]
    EmptyName {
        /// Declared operand type name.
        kind: &'static str,
    },
}

/// A single instruction argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Operand {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    kind: OperandType,
    value: OperandValue,
    size: u32,
}

impl Operand {
    /// Builds an operand after checking type, payload and width consistency.
    ///
    /// # Errors
    ///
    /// Returns an [`OperandError`] describing the first violated rule.
    pub fn new(kind: OperandType, value: OperandValue, size: u32) -> Result<Self, OperandError> {
        let operand = Self { kind, value, size };
        operand.validate()?;
        Ok(operand)
    }

    /// 32-bit register operand.
    #[must_use]
    pub fn register(name: &str) -> Self {
        Self {
            kind: OperandType::Register,
            value: OperandValue::Text(name.to_ascii_uppercase()),
            size: DEFAULT_OPERAND_SIZE,
        }
    }

    /// 32-bit immediate operand.
    ///
    /// # Errors
    ///
    /// Returns [`OperandError::ImmediateOutOfRange`] when `value` does not fit in 32 bits.
    pub fn immediate(value: i64) -> Result<Self, OperandError> {
        Self::new(
            OperandType::Immediate,
            OperandValue::Number(value),
            DEFAULT_OPERAND_SIZE,
        )
    }

    /// 32-bit memory operand addressing `address` directly.
    #[must_use]
    pub fn memory(address: u16) -> Self {
        Self {
            kind: OperandType::Memory,
            value: OperandValue::Number(i64::from(address)),
            size: DEFAULT_OPERAND_SIZE,
        }
    }

    /// Label operand naming a target instruction id.
    #[must_use]
    pub fn label(target: &str) -> Self {
        Self {
            kind: OperandType::Label,
            value: OperandValue::Text(target.to_owned()),
            size: LABEL_OPERAND_SIZE,
        }
    }

    /// Operand type tag.
    #[must_use]
    pub const fn kind(&self) -> OperandType {
        self.kind
    }

    /// Raw payload.
    #[must_use]
    pub const fn value(&self) -> &OperandValue {
        &self.value
    }

    /// Width in bits.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Textual payload, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            OperandValue::Text(text) => Some(text),
            OperandValue::Number(_) => None,
        }
    }

    /// Numeric payload, if any.
    #[must_use]
    pub const fn number(&self) -> Option<i64> {
        match self.value {
            OperandValue::Number(value) => Some(value),
            OperandValue::Text(_) => None,
        }
    }

    /// Resolves a memory operand to its absolute address.
    ///
    /// Accepts a non-negative number or bracketed decimal/hex text such as
    /// `[1000]` or `[0x3E8]`.
    #[must_use]
    pub fn memory_address(&self) -> Option<u64> {
        if self.kind != OperandType::Memory {
            return None;
        }
        match &self.value {
            OperandValue::Number(value) => u64::try_from(*value).ok(),
            OperandValue::Text(text) => parse_bracketed_address(text),
        }
    }

    /// Checks this operand against the shape table in the module docs.
    ///
    /// # Errors
    ///
    /// Returns an [`OperandError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), OperandError> {
        let kind = self.kind.as_str();
        let size_ok = match self.kind {
            OperandType::Label => self.size == LABEL_OPERAND_SIZE,
            _ => VALID_OPERAND_SIZES.contains(&self.size),
        };
        if !size_ok {
            return Err(OperandError::InvalidSize {
                kind,
                size: self.size,
            });
        }

        match (self.kind, &self.value) {
            (OperandType::Register | OperandType::Label, OperandValue::Text(name)) => {
                if name.trim().is_empty() {
                    return Err(OperandError::EmptyName { kind });
                }
            }
            (OperandType::Register | OperandType::Label, OperandValue::Number(_)) => {
                return Err(OperandError::ValueMismatch {
                    kind,
                    expected: "text",
                });
            }
            (OperandType::Immediate, OperandValue::Number(value)) => {
                if !immediate_fits(*value, self.size) {
                    return Err(OperandError::ImmediateOutOfRange {
                        value: *value,
                        size: self.size,
                    });
                }
            }
            (OperandType::Immediate, OperandValue::Text(_)) => {
                return Err(OperandError::ValueMismatch {
                    kind,
                    expected: "numeric",
                });
            }
            (OperandType::Memory, value) => {
                if self.memory_address().is_none() {
                    return Err(OperandError::InvalidAddress(value.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.value) {
            (OperandType::Memory, OperandValue::Number(address)) => write!(f, "[{address}]"),
            _ => write!(f, "{}", self.value),
        }
    }
}

/// Returns `true` when `value` is representable in `size` bits, signed or unsigned.
#[must_use]
pub fn immediate_fits(value: i64, size: u32) -> bool {
    if size >= 64 {
        return true;
    }
    let signed_min = -(1_i128 << (size - 1));
    let unsigned_max = (1_i128 << size) - 1;
    let value = i128::from(value);
    value >= signed_min && value <= unsigned_max
}

fn parse_bracketed_address(text: &str) -> Option<u64> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    inner
        .strip_prefix("0x")
        .or_else(|| inner.strip_prefix("0X"))
        .map_or_else(
            || inner.parse::<u64>().ok(),
            |hex| u64::from_str_radix(hex, 16).ok(),
        )
}

/// Instruction-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    /// Instruction id is empty.
    #[error("instruction id is empty")]
    EmptyId,
    /// Mnemonic is empty.
    #[error("instruction `{id}` has an empty mnemonic")]
    EmptyMnemonic {
        /// Offending instruction id.
        id: String,
    },
    /// Cycle cost must be positive.
    #[error("instruction `{id}` has a zero cycle cost")]
    ZeroCycles {
        /// Offending instruction id.
        id: String,
    },
    /// Machine code is not an even-length hex string.
    #[error("instruction `{id}` has invalid machine code `{code}`")]
    InvalidMachineCode {
        /// Offending instruction id.
        id: String,
        /// Rejected encoding text.
        code: String,
    },
    /// One operand violates the shape rules.
    #[error("instruction `{id}` operand {index}: {source}")]
    Operand {
        /// Offending instruction id.
        id: String,
        /// Zero-based operand position.
        index: usize,
        /// Underlying operand error.
        #[source]
        source: OperandError,
    },
    /// Two instructions in one program share an id.
    #[error("instruction id `{id}` is used more than once")]
    DuplicateId {
        /// Repeated id.
        id: String,
    },
}

/// A decoded operation with mnemonic, operands, encoding and cycle cost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Instruction {
    id: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    kind: InstructionType,
    mnemonic: String,
    operands: Vec<Operand>,
    #[cfg_attr(feature = "serde", serde(default))]
    machine_code: String,
    #[cfg_attr(feature = "serde", serde(default))]
    description: String,
    cycles: u32,
}

impl Instruction {
    /// Starts building an instruction.
    #[must_use]
    pub fn builder(id: &str, kind: InstructionType, mnemonic: &str) -> InstructionBuilder {
        InstructionBuilder {
            id: id.to_owned(),
            kind,
            mnemonic: mnemonic.to_ascii_uppercase(),
            operands: Vec::new(),
            machine_code: String::new(),
            description: String::new(),
            cycles: 1,
        }
    }

    /// Unique instruction id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Instruction class.
    #[must_use]
    pub const fn kind(&self) -> InstructionType {
        self.kind
    }

    /// Upper-case mnemonic.
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Ordered operands.
    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Hex machine-code encoding.
    #[must_use]
    pub fn machine_code(&self) -> &str {
        &self.machine_code
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Cycle cost.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Encoded width in bytes (two hex digits per byte). Instructions
    /// without an encoding occupy one byte.
    #[must_use]
    pub fn encoded_width(&self) -> u64 {
        (self.machine_code.len() / 2).max(1) as u64
    }

    /// Assembly-style rendering, e.g. `ADD EAX, 5`.
    #[must_use]
    pub fn assembly(&self) -> String {
        if self.operands.is_empty() {
            return self.mnemonic.clone();
        }
        let operands: Vec<String> = self.operands.iter().map(ToString::to_string).collect();
        format!("{} {}", self.mnemonic, operands.join(", "))
    }

    /// Re-checks every construction invariant.
    ///
    /// # Errors
    ///
    /// Returns an [`InstructionError`] naming this instruction.
    pub fn validate(&self) -> Result<(), InstructionError> {
        if self.id.trim().is_empty() {
            return Err(InstructionError::EmptyId);
        }
        if self.mnemonic.trim().is_empty() {
            return Err(InstructionError::EmptyMnemonic {
                id: self.id.clone(),
            });
        }
        if self.cycles == 0 {
            return Err(InstructionError::ZeroCycles {
                id: self.id.clone(),
            });
        }
        let code = &self.machine_code;
        if code.len() % 2 != 0 || !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InstructionError::InvalidMachineCode {
                id: self.id.clone(),
                code: code.clone(),
            });
        }
        for (index, operand) in self.operands.iter().enumerate() {
            operand
                .validate()
                .map_err(|source| InstructionError::Operand {
                    id: self.id.clone(),
                    index,
                    source,
                })?;
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.assembly())
    }
}

/// Incremental constructor for [`Instruction`].
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    id: String,
    kind: InstructionType,
    mnemonic: String,
    operands: Vec<Operand>,
    machine_code: String,
    description: String,
    cycles: u32,
}

impl InstructionBuilder {
    /// Appends an operand.
    #[must_use]
    pub fn operand(mut self, operand: Operand) -> Self {
        self.operands.push(operand);
        self
    }

    /// Sets the hex machine-code encoding.
    #[must_use]
    pub fn machine_code(mut self, code: &str) -> Self {
        self.machine_code = code.to_ascii_uppercase();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_owned();
        self
    }

    /// Sets the cycle cost.
    #[must_use]
    pub const fn cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }

    /// Validates and freezes the instruction.
    ///
    /// # Errors
    ///
    /// Returns the first [`InstructionError`] found.
    pub fn build(self) -> Result<Instruction, InstructionError> {
        let instruction = Instruction {
            id: self.id,
            kind: self.kind,
            mnemonic: self.mnemonic,
            operands: self.operands,
            machine_code: self.machine_code,
            description: self.description,
            cycles: self.cycles,
        };
        instruction.validate()?;
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        immediate_fits, Instruction, InstructionError, InstructionType, Operand, OperandError,
        OperandType, OperandValue,
    };

    fn add_eax_5() -> Instruction {
        Instruction::builder("add_0", InstructionType::Arithmetic, "add")
            .operand(Operand::register("eax"))
            .operand(Operand::immediate(5).expect("5 fits in 32 bits"))
            .machine_code("83c005")
            .cycles(1)
            .build()
            .expect("valid instruction")
    }

    #[test]
    fn builder_normalizes_case_and_reports_width() {
        let instr = add_eax_5();
        assert_eq!(instr.mnemonic(), "ADD");
        assert_eq!(instr.machine_code(), "83C005");
        assert_eq!(instr.encoded_width(), 3);
        assert_eq!(instr.assembly(), "ADD EAX, 5");
    }

    #[rstest]
    #[case(OperandType::Register, 12)]
    #[case(OperandType::Immediate, 0)]
    #[case(OperandType::Memory, 128)]
    #[case(OperandType::Label, 16)]
    fn invalid_widths_are_rejected(#[case] kind: OperandType, #[case] size: u32) {
        let value = match kind {
            OperandType::Register => OperandValue::Text("EAX".into()),
            OperandType::Label => OperandValue::Text("loop".into()),
            OperandType::Immediate | OperandType::Memory => OperandValue::Number(4),
        };
        assert!(matches!(
            Operand::new(kind, value, size),
            Err(OperandError::InvalidSize { .. })
        ));
    }

    #[test]
    fn payload_must_match_operand_type() {
        assert!(matches!(
            Operand::new(OperandType::Register, OperandValue::Number(1), 32),
            Err(OperandError::ValueMismatch { .. })
        ));
        assert!(matches!(
            Operand::new(OperandType::Immediate, OperandValue::Text("5".into()), 32),
            Err(OperandError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn immediate_range_follows_width() {
        assert!(immediate_fits(255, 8));
        assert!(immediate_fits(-128, 8));
        assert!(!immediate_fits(256, 8));
        assert!(!immediate_fits(-129, 8));
        assert!(immediate_fits(i64::MIN, 64));
    }

    #[test]
    fn memory_operands_accept_bracketed_text() {
        let decimal = Operand::new(
            OperandType::Memory,
            OperandValue::Text("[1000]".into()),
            32,
        )
        .expect("bracketed decimal address");
        assert_eq!(decimal.memory_address(), Some(1000));

        let hex = Operand::new(OperandType::Memory, OperandValue::Text("[0x3E8]".into()), 32)
            .expect("bracketed hex address");
        assert_eq!(hex.memory_address(), Some(1000));

        assert!(matches!(
            Operand::new(OperandType::Memory, OperandValue::Number(-4), 32),
            Err(OperandError::InvalidAddress(_))
        ));
    }

    #[test]
    fn zero_cycles_and_bad_encodings_name_the_instruction() {
        let zero = Instruction::builder("nop_1", InstructionType::Control, "NOP")
            .machine_code("90")
            .cycles(0)
            .build();
        assert_eq!(
            zero,
            Err(InstructionError::ZeroCycles { id: "nop_1".into() })
        );

        let odd = Instruction::builder("nop_2", InstructionType::Control, "NOP")
            .machine_code("909")
            .build();
        assert!(matches!(odd, Err(InstructionError::InvalidMachineCode { id, .. }) if id == "nop_2"));
    }

    #[test]
    fn instructions_without_encoding_occupy_one_byte() {
        let bare = Instruction::builder("hlt_0", InstructionType::Control, "HLT")
            .build()
            .expect("encoding is optional");
        assert_eq!(bare.encoded_width(), 1);
    }
}
