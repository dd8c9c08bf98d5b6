//! Width-aware integer ALU.
//!
//! Operands arrive as sign-extended `i64` values. Results are truncated to
//! the destination width and sign-extended again; flags are computed at that
//! width.

use super::flags::{mask, sign_bit, sign_extend, FlagsUpdate};

/// ALU operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    Neg,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Result value plus the flag update it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutput {
    /// Sign-extended result.
    pub value: i64,
    /// Flags to commit.
    pub flags: FlagsUpdate,
}

/// Computes `op` over `a` and `b` at `width` bits. Returns `None` on division by zero.
#[must_use]
pub fn compute(op: AluOp, a: i64, b: i64, width: u32) -> Option<AluOutput> {
    let output = match op {
        AluOp::Add => add(a, b, width),
        AluOp::Sub => sub(a, b, width),
        AluOp::Inc => without_carry(add(a, 1, width)),
        AluOp::Dec => without_carry(sub(a, 1, width)),
        AluOp::Neg => sub(0, a, width),
        AluOp::Mul => mul(a, b, width),
        AluOp::Div => return div(a, b, width),
        AluOp::Not => AluOutput {
            value: sign_extend(!mask(a, width), width),
            flags: FlagsUpdate::None,
        },
        AluOp::And => logic(mask(a, width) & mask(b, width), width),
        AluOp::Or => logic(mask(a, width) | mask(b, width), width),
        AluOp::Xor => logic(mask(a, width) ^ mask(b, width), width),
        AluOp::Shl => shift_left(a, b, width),
        AluOp::Shr => shift_right(a, b, width),
    };
    Some(output)
}

fn width_max(width: u32) -> u128 {
    if width >= 64 {
        u128::from(u64::MAX)
    } else {
        (1_u128 << width) - 1
    }
}

fn finish(raw: u64, width: u32, carry: Option<bool>, overflow: Option<bool>) -> AluOutput {
    let value = sign_extend(raw, width);
    AluOutput {
        value,
        flags: FlagsUpdate::from_result(value, width, carry, overflow),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn add(a: i64, b: i64, width: u32) -> AluOutput {
    let (au, bu) = (mask(a, width), mask(b, width));
    let full = u128::from(au) + u128::from(bu);
    let raw = (full & width_max(width)) as u64;
    let (sa, sb, sr) = (
        sign_bit(au, width),
        sign_bit(bu, width),
        sign_bit(raw, width),
    );
    finish(
        raw,
        width,
        Some(full > width_max(width)),
        Some(sa == sb && sr != sa),
    )
}

#[allow(clippy::cast_possible_truncation)]
fn sub(a: i64, b: i64, width: u32) -> AluOutput {
    let (au, bu) = (mask(a, width), mask(b, width));
    let raw = (u128::from(au).wrapping_sub(u128::from(bu)) & width_max(width)) as u64;
    let (sa, sb, sr) = (
        sign_bit(au, width),
        sign_bit(bu, width),
        sign_bit(raw, width),
    );
    finish(raw, width, Some(au < bu), Some(sa != sb && sr != sa))
}

const fn without_carry(output: AluOutput) -> AluOutput {
    let flags = match output.flags {
        FlagsUpdate::Update {
            zero,
            negative,
            parity,
            overflow,
            ..
        } => FlagsUpdate::Update {
            zero,
            negative,
            parity,
            carry: None,
            overflow,
        },
        FlagsUpdate::None => FlagsUpdate::None,
    };
    AluOutput {
        value: output.value,
        flags,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn mul(a: i64, b: i64, width: u32) -> AluOutput {
    let product = i128::from(sign_extend(mask(a, width), width))
        * i128::from(sign_extend(mask(b, width), width));
    let raw = mask(product as i64, width);
    let fits = i128::from(sign_extend(raw, width)) == product;
    finish(raw, width, Some(!fits), Some(!fits))
}

#[allow(clippy::cast_possible_truncation)]
fn div(a: i64, b: i64, width: u32) -> Option<AluOutput> {
    let divisor = i128::from(sign_extend(mask(b, width), width));
    if divisor == 0 {
        return None;
    }
    let quotient = i128::from(sign_extend(mask(a, width), width)) / divisor;
    let raw = mask(quotient as i64, width);
    let fits = i128::from(sign_extend(raw, width)) == quotient;
    Some(finish(raw, width, Some(!fits), Some(!fits)))
}

fn logic(raw: u64, width: u32) -> AluOutput {
    finish(raw, width, Some(false), Some(false))
}

const fn shift_count(b: i64, width: u32) -> u32 {
    let limit = if width >= 64 { 63 } else { 31 };
    (b as u64 & limit) as u32
}

#[allow(clippy::cast_possible_truncation)]
fn shift_left(a: i64, b: i64, width: u32) -> AluOutput {
    let count = shift_count(b, width);
    if count == 0 {
        return AluOutput {
            value: a,
            flags: FlagsUpdate::None,
        };
    }
    let shifted = u128::from(mask(a, width)) << count;
    let raw = (shifted & width_max(width)) as u64;
    let carry = (shifted >> width) & 1 == 1;
    let overflow = count == 1 && sign_bit(raw, width) != carry;
    finish(raw, width, Some(carry), Some(overflow))
}

fn shift_right(a: i64, b: i64, width: u32) -> AluOutput {
    let count = shift_count(b, width);
    if count == 0 {
        return AluOutput {
            value: a,
            flags: FlagsUpdate::None,
        };
    }
    let au = mask(a, width);
    let carry = (au >> (count - 1)) & 1 == 1;
    let overflow = count == 1 && sign_bit(au, width);
    finish(au >> count, width, Some(carry), Some(overflow))
}
