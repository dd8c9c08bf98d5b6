/// Number of general-purpose registers (`EAX..EDI`).
pub const GENERAL_REGISTER_COUNT: usize = 6;
/// Number of special registers (`ESP`, `EBP`, `EIP`).
pub const SPECIAL_REGISTER_COUNT: usize = 3;
/// Reset value of `ESP`.
pub const INITIAL_STACK_POINTER: i64 = 1000;
/// Reset value of `EBP`.
pub const INITIAL_BASE_POINTER: i64 = 1000;
/// Reset value of `EIP`; the first loaded instruction lives here.
pub const PROGRAM_BASE_ADDRESS: i64 = 2048;

/// General-purpose register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum GeneralRegister {
    Eax = 0,
    Ebx = 1,
    Ecx = 2,
    Edx = 3,
    Esi = 4,
    Edi = 5,
}

impl GeneralRegister {
    /// Ordered list of all general-purpose registers.
    pub const ALL: [Self; GENERAL_REGISTER_COUNT] = [
        Self::Eax,
        Self::Ebx,
        Self::Ecx,
        Self::Edx,
        Self::Esi,
        Self::Edi,
    ];

    /// Array index for this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eax => "EAX",
            Self::Ebx => "EBX",
            Self::Ecx => "ECX",
            Self::Edx => "EDX",
            Self::Esi => "ESI",
            Self::Edi => "EDI",
        }
    }

    /// 3-bit register number used in ModR/M encodings.
    #[must_use]
    pub const fn encoding(self) -> u8 {
        match self {
            Self::Eax => 0,
            Self::Ecx => 1,
            Self::Edx => 2,
            Self::Ebx => 3,
            Self::Esi => 6,
            Self::Edi => 7,
        }
    }

    /// Case-insensitive name lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Special register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
#[repr(u8)]
pub enum SpecialRegister {
    /// Stack pointer.
    Esp = 0,
    /// Base pointer.
    Ebp = 1,
    /// Instruction pointer; the architectural program counter.
    Eip = 2,
}

impl SpecialRegister {
    /// Ordered list of all special registers.
    pub const ALL: [Self; SPECIAL_REGISTER_COUNT] = [Self::Esp, Self::Ebp, Self::Eip];

    /// Array index for this register.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Esp => "ESP",
            Self::Ebp => "EBP",
            Self::Eip => "EIP",
        }
    }

    /// Case-insensitive name lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Any architecturally named register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// General-purpose register.
    General(GeneralRegister),
    /// Special register.
    Special(SpecialRegister),
}

impl Register {
    /// Case-insensitive name lookup across both register files.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        GeneralRegister::from_name(name)
            .map(Self::General)
            .or_else(|| SpecialRegister::from_name(name).map(Self::Special))
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::General(reg) => reg.name(),
            Self::Special(reg) => reg.name(),
        }
    }
}

/// General and special register storage.
///
/// `EIP` and `ESP` are the only program-counter and stack-pointer storage in
/// the machine; everything else reads them through this file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    general: [i64; GENERAL_REGISTER_COUNT],
    special: [i64; SPECIAL_REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            general: [0; GENERAL_REGISTER_COUNT],
            special: [
                INITIAL_STACK_POINTER,
                INITIAL_BASE_POINTER,
                PROGRAM_BASE_ADDRESS,
            ],
        }
    }
}

impl RegisterFile {
    /// Reads a general-purpose register.
    #[must_use]
    pub const fn general(&self, reg: GeneralRegister) -> i64 {
        self.general[reg.index()]
    }

    /// Writes a general-purpose register.
    pub const fn set_general(&mut self, reg: GeneralRegister, value: i64) {
        self.general[reg.index()] = value;
    }

    /// Reads a special register.
    #[must_use]
    pub const fn special(&self, reg: SpecialRegister) -> i64 {
        self.special[reg.index()]
    }

    /// Writes a special register.
    pub const fn set_special(&mut self, reg: SpecialRegister, value: i64) {
        self.special[reg.index()] = value;
    }

    /// Reads any register.
    #[must_use]
    pub const fn get(&self, reg: Register) -> i64 {
        match reg {
            Register::General(reg) => self.general(reg),
            Register::Special(reg) => self.special(reg),
        }
    }

    /// Writes any register.
    pub const fn set(&mut self, reg: Register, value: i64) {
        match reg {
            Register::General(reg) => self.set_general(reg, value),
            Register::Special(reg) => self.set_special(reg, value),
        }
    }

    /// Program counter (`EIP`).
    #[must_use]
    pub const fn pc(&self) -> i64 {
        self.special(SpecialRegister::Eip)
    }

    /// Writes the program counter (`EIP`).
    pub const fn set_pc(&mut self, value: i64) {
        self.set_special(SpecialRegister::Eip, value);
    }

    /// Stack pointer (`ESP`).
    #[must_use]
    pub const fn sp(&self) -> i64 {
        self.special(SpecialRegister::Esp)
    }

    /// Writes the stack pointer (`ESP`).
    pub const fn set_sp(&mut self, value: i64) {
        self.set_special(SpecialRegister::Esp, value);
    }

    /// `(name, value)` pairs of the general registers in file order.
    pub fn general_entries(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        GeneralRegister::ALL
            .into_iter()
            .map(|reg| (reg.name(), self.general(reg)))
    }

    /// `(name, value)` pairs of the special registers in file order.
    pub fn special_entries(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        SpecialRegister::ALL
            .into_iter()
            .map(|reg| (reg.name(), self.special(reg)))
    }
}
