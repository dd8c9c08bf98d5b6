//! x86-style machine-code encoding for generated instructions.
//!
//! Only the forms code generation emits are covered. Memory operands are
//! absolute `disp32` (ModRM `mod=00 rm=101`); immediates and displacements
//! are little-endian.

use std::fmt;
use std::fmt::Write as _;

use simulator_core::GeneralRegister;
use thiserror::Error;

/// ModRM `mod` field values.
mod modrm {
    pub const DISP32: u8 = 0b00;
    pub const REGISTER: u8 = 0b11;
    /// `rm` value selecting an absolute 32-bit displacement.
    pub const RM_DISP32: u8 = 0b101;
}

/// An encodable operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// General register.
    Reg(GeneralRegister),
    /// 32-bit immediate.
    Imm(i64),
    /// Absolute data address.
    Mem(u16),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => f.write_str(reg.name()),
            Self::Imm(value) => write!(f, "{value}"),
            Self::Mem(address) => write!(f, "[{address}]"),
        }
    }
}

/// Operand combination with no encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no encoding for `{mnemonic}` with operands ({operands})")]
pub struct EncodeError {
    /// Mnemonic as requested.
    pub mnemonic: String,
    /// Rendered operand list.
    pub operands: String,
}

impl EncodeError {
    fn new(mnemonic: &str, operands: &[Arg]) -> Self {
        let operands: Vec<String> = operands.iter().map(ToString::to_string).collect();
        Self {
            mnemonic: mnemonic.to_owned(),
            operands: operands.join(", "),
        }
    }
}

/// Packs a ModRM byte.
///
/// Bit layout: `[mod:2][reg:3][rm:3]`
#[must_use]
pub const fn encode_modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    ((mode & 0b11) << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn imm32(bytes: &mut Vec<u8>, value: i64) {
    bytes.extend_from_slice(&(value as u32).to_le_bytes());
}

fn disp32(bytes: &mut Vec<u8>, address: u16) {
    bytes.extend_from_slice(&u32::from(address).to_le_bytes());
}

/// Opcode bytes and `/digit` extension of an ALU group instruction.
fn alu_group(mnemonic: &str) -> Option<(u8, u8, u8)> {
    // (r/m, r) form, (r, r/m) form, 0x81 extension
    let entry = match mnemonic {
        "ADD" => (0x01, 0x03, 0),
        "OR" => (0x09, 0x0B, 1),
        "AND" => (0x21, 0x23, 4),
        "SUB" => (0x29, 0x2B, 5),
        "XOR" => (0x31, 0x33, 6),
        "CMP" => (0x39, 0x3B, 7),
        _ => return None,
    };
    Some(entry)
}

/// Encodes `mnemonic` with up to two operands.
///
/// # Errors
///
/// Returns an [`EncodeError`] for operand combinations outside the
/// supported forms.
pub fn encode(mnemonic: &str, operands: &[Arg]) -> Result<Vec<u8>, EncodeError> {
    let upper = mnemonic.to_ascii_uppercase();
    let mut bytes = Vec::with_capacity(11);
    let unsupported = || EncodeError::new(mnemonic, operands);

    match (upper.as_str(), operands) {
        ("NOP", []) => bytes.push(0x90),
        ("HLT", []) => bytes.push(0xF4),
        ("RET", []) => bytes.push(0xC3),

        ("MOV", [Arg::Reg(dst), Arg::Imm(value)]) => {
            bytes.push(0xB8 + dst.encoding());
            imm32(&mut bytes, *value);
        }
        ("MOV", [Arg::Reg(dst), Arg::Reg(src)]) => {
            bytes.push(0x89);
            bytes.push(encode_modrm(modrm::REGISTER, src.encoding(), dst.encoding()));
        }
        ("MOV", [Arg::Reg(dst), Arg::Mem(address)]) => {
            bytes.push(0x8B);
            bytes.push(encode_modrm(modrm::DISP32, dst.encoding(), modrm::RM_DISP32));
            disp32(&mut bytes, *address);
        }
        ("MOV", [Arg::Mem(address), Arg::Reg(src)]) => {
            bytes.push(0x89);
            bytes.push(encode_modrm(modrm::DISP32, src.encoding(), modrm::RM_DISP32));
            disp32(&mut bytes, *address);
        }
        ("MOV", [Arg::Mem(address), Arg::Imm(value)]) => {
            bytes.push(0xC7);
            bytes.push(encode_modrm(modrm::DISP32, 0, modrm::RM_DISP32));
            disp32(&mut bytes, *address);
            imm32(&mut bytes, *value);
        }

        ("MUL", [Arg::Reg(dst), Arg::Reg(src)]) => {
            bytes.extend_from_slice(&[0x0F, 0xAF]);
            bytes.push(encode_modrm(modrm::REGISTER, dst.encoding(), src.encoding()));
        }
        ("MUL", [Arg::Reg(dst), Arg::Mem(address)]) => {
            bytes.extend_from_slice(&[0x0F, 0xAF]);
            bytes.push(encode_modrm(modrm::DISP32, dst.encoding(), modrm::RM_DISP32));
            disp32(&mut bytes, *address);
        }
        ("MUL", [Arg::Reg(dst), Arg::Imm(value)]) => {
            bytes.push(0x69);
            bytes.push(encode_modrm(modrm::REGISTER, dst.encoding(), dst.encoding()));
            imm32(&mut bytes, *value);
        }
        ("DIV", [Arg::Reg(GeneralRegister::Eax), Arg::Reg(src)]) => {
            bytes.push(0xF7);
            bytes.push(encode_modrm(modrm::REGISTER, 6, src.encoding()));
        }
        ("NEG", [Arg::Reg(dst)]) => {
            bytes.push(0xF7);
            bytes.push(encode_modrm(modrm::REGISTER, 3, dst.encoding()));
        }
        ("INC", [Arg::Reg(dst)]) => bytes.push(0x40 + dst.encoding()),
        ("DEC", [Arg::Reg(dst)]) => bytes.push(0x48 + dst.encoding()),
        ("PUSH", [Arg::Reg(src)]) => bytes.push(0x50 + src.encoding()),
        ("PUSH", [Arg::Imm(value)]) => {
            bytes.push(0x68);
            imm32(&mut bytes, *value);
        }
        ("POP", [Arg::Reg(dst)]) => bytes.push(0x58 + dst.encoding()),

        (name, [Arg::Reg(dst), src]) => {
            let (rm_r, r_rm, ext) = alu_group(name).ok_or_else(unsupported)?;
            match src {
                Arg::Reg(src) => {
                    bytes.push(rm_r);
                    bytes.push(encode_modrm(modrm::REGISTER, src.encoding(), dst.encoding()));
                }
                Arg::Mem(address) => {
                    bytes.push(r_rm);
                    bytes.push(encode_modrm(modrm::DISP32, dst.encoding(), modrm::RM_DISP32));
                    disp32(&mut bytes, *address);
                }
                Arg::Imm(value) => {
                    bytes.push(0x81);
                    bytes.push(encode_modrm(modrm::REGISTER, ext, dst.encoding()));
                    imm32(&mut bytes, *value);
                }
            }
        }
        _ => return Err(unsupported()),
    }
    Ok(bytes)
}

/// Upper-case hex, two digits per byte, no separators.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02X}");
        out
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use simulator_core::GeneralRegister::{Eax, Ebx, Ecx, Edx};

    use super::{encode, encode_modrm, to_hex, Arg};

    #[test]
    fn modrm_layout() {
        let byte = encode_modrm(0b11, 0b010, 0b101);
        assert_eq!(byte >> 6, 0b11);
        assert_eq!((byte >> 3) & 0b111, 0b010);
        assert_eq!(byte & 0b111, 0b101);
    }

    #[rstest]
    #[case("NOP", vec![], "90")]
    #[case("HLT", vec![], "F4")]
    #[case("MOV", vec![Arg::Reg(Eax), Arg::Imm(5)], "B805000000")]
    #[case("MOV", vec![Arg::Reg(Ebx), Arg::Imm(-1)], "BBFFFFFFFF")]
    #[case("MOV", vec![Arg::Mem(1000), Arg::Reg(Eax)], "8905E8030000")]
    #[case("MOV", vec![Arg::Reg(Eax), Arg::Mem(1004)], "8B05EC030000")]
    #[case("MOV", vec![Arg::Mem(1008), Arg::Imm(8)], "C705F003000008000000")]
    #[case("MOV", vec![Arg::Reg(Ecx), Arg::Reg(Eax)], "89C1")]
    #[case("ADD", vec![Arg::Reg(Eax), Arg::Mem(1004)], "0305EC030000")]
    #[case("ADD", vec![Arg::Reg(Eax), Arg::Imm(5)], "81C005000000")]
    #[case("SUB", vec![Arg::Reg(Eax), Arg::Reg(Ecx)], "29C8")]
    #[case("CMP", vec![Arg::Reg(Edx), Arg::Imm(0)], "81FA00000000")]
    #[case("MUL", vec![Arg::Reg(Eax), Arg::Reg(Ecx)], "0FAFC1")]
    #[case("MUL", vec![Arg::Reg(Eax), Arg::Imm(3)], "69C003000000")]
    #[case("DIV", vec![Arg::Reg(Eax), Arg::Reg(Ecx)], "F7F1")]
    #[case("NEG", vec![Arg::Reg(Eax)], "F7D8")]
    #[case("INC", vec![Arg::Reg(Ecx)], "41")]
    #[case("PUSH", vec![Arg::Reg(Ebx)], "53")]
    #[case("POP", vec![Arg::Reg(Edx)], "5A")]
    fn encodes_x86_forms(#[case] mnemonic: &str, #[case] operands: Vec<Arg>, #[case] hex: &str) {
        let bytes = encode(mnemonic, &operands).expect("encodable");
        assert_eq!(to_hex(&bytes), hex);
    }

    #[rstest]
    #[case("MOV", vec![Arg::Mem(1000), Arg::Mem(1004)])]
    #[case("DIV", vec![Arg::Reg(Ecx), Arg::Reg(Eax)])]
    #[case("JMP", vec![Arg::Imm(0)])]
    #[case("SHL", vec![Arg::Reg(Eax), Arg::Imm(1)])]
    fn rejects_forms_without_encoding(#[case] mnemonic: &str, #[case] operands: Vec<Arg>) {
        let err = encode(mnemonic, &operands).expect_err("no encoding");
        assert_eq!(err.mnemonic, mnemonic);
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(encode("hlt", &[]).expect("encodable"), vec![0xF4]);
    }
}
