use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Source languages accepted by the compile operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProgrammingLanguage {
    /// C.
    #[default]
    C,
    /// C++.
    Cpp,
    /// Java.
    Java,
    /// Python.
    Python,
    /// JavaScript.
    #[cfg_attr(feature = "serde", serde(rename = "javascript"))]
    JavaScript,
}

impl ProgrammingLanguage {
    /// Every supported language in menu order.
    pub const ALL: [Self; 5] = [
        Self::C,
        Self::Cpp,
        Self::Java,
        Self::Python,
        Self::JavaScript,
    ];

    /// Lower-case wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::Python => "python",
            Self::JavaScript => "javascript",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Java => "Java",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
        }
    }

    /// Returns `true` for the language the front end parses natively.
    #[must_use]
    pub const fn is_native(self) -> bool {
        matches!(self, Self::C)
    }
}

impl fmt::Display for ProgrammingLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language tag that names no supported language.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language `{0}`")]
pub struct UnknownLanguage(pub String);

impl FromStr for ProgrammingLanguage {
    type Err = UnknownLanguage;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" => Ok(Self::JavaScript),
            _ => Err(UnknownLanguage(tag.to_owned())),
        }
    }
}
