//! FLAGS update behaviors for different instruction classes.

use crate::Flags;

/// Describes how FLAGS should be updated after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change to FLAGS.
    #[default]
    None,
    /// Update result flags; `None` leaves carry or overflow untouched.
    Update {
        /// Zero flag.
        zero: bool,
        /// Negative flag.
        negative: bool,
        /// Parity flag.
        parity: bool,
        /// Carry flag.
        carry: Option<bool>,
        /// Overflow flag.
        overflow: Option<bool>,
    },
}

impl FlagsUpdate {
    /// Result flags for `result` at `width` bits with explicit carry/overflow.
    #[must_use]
    pub fn from_result(result: i64, width: u32, carry: Option<bool>, overflow: Option<bool>) -> Self {
        let masked = mask(result, width);
        Self::Update {
            zero: masked == 0,
            negative: sign_bit(masked, width),
            parity: (masked & 0xFF).count_ones() % 2 == 0,
            carry,
            overflow,
        }
    }

    /// Writes this update into `flags`.
    pub const fn apply(self, flags: &mut Flags) {
        if let Self::Update {
            zero,
            negative,
            parity,
            carry,
            overflow,
        } = self
        {
            flags.zero = zero;
            flags.negative = negative;
            flags.parity = parity;
            if let Some(carry) = carry {
                flags.carry = carry;
            }
            if let Some(overflow) = overflow {
                flags.overflow = overflow;
            }
        }
    }
}

/// Truncates `value` to its low `width` bits.
#[must_use]
pub const fn mask(value: i64, width: u32) -> u64 {
    if width >= 64 {
        value as u64
    } else {
        (value as u64) & ((1_u64 << width) - 1)
    }
}

/// Sign-extends the low `width` bits of `value`.
#[must_use]
pub const fn sign_extend(value: u64, width: u32) -> i64 {
    if width >= 64 {
        value as i64
    } else {
        let shift = 64 - width;
        ((value << shift) as i64) >> shift
    }
}

/// Returns the sign bit of a `width`-bit value.
#[must_use]
pub const fn sign_bit(value: u64, width: u32) -> bool {
    let top = if width >= 64 { 63 } else { width - 1 };
    (value >> top) & 1 == 1
}
