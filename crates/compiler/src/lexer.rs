//! Tokenizer for the C subset.

use std::fmt;

use crate::errors::{CompileError, CompileErrorKind, SourceLocation};

/// Reserved words recognised as keywords.
pub const KEYWORDS: &[&str] = &[
    "int", "char", "short", "long", "unsigned", "signed", "float", "double", "void", "const",
    "static", "return", "if", "else", "while", "for", "do", "break", "continue", "struct",
];

/// Type keywords that may start a declaration or function definition.
pub const TYPE_KEYWORDS: &[&str] = &[
    "int", "char", "short", "long", "unsigned", "signed", "float", "double", "void", "const",
    "static",
];

/// Multi-character operators, longest first.
const LONG_OPERATORS: &[&str] = &[
    "<<=", ">>=", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "%=",
    "<<", ">>", "->",
];

const SINGLE_OPERATORS: &str = "+-*/%=<>!&|^~?:";
const DELIMITERS: &str = "(){}[];,.";

/// Token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Reserved word.
    Keyword,
    /// Name.
    Identifier,
    /// Integer literal.
    Number,
    /// String literal; the token text is the unescaped content.
    String,
    /// Operator.
    Operator,
    /// Punctuation.
    Delimiter,
    /// Whole `#...` line.
    Preprocessor,
}

impl TokenKind {
    /// Lower-case class name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::String => "string",
            Self::Operator => "operator",
            Self::Delimiter => "delimiter",
            Self::Preprocessor => "preprocessor",
        }
    }
}

/// One lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Class.
    pub kind: TokenKind,
    /// Source text (unescaped content for strings).
    pub text: String,
    /// Position of the first character.
    pub location: SourceLocation,
}

impl Token {
    /// Returns `true` for a keyword, operator or delimiter spelled `text`.
    #[must_use]
    pub fn is(&self, text: &str) -> bool {
        matches!(
            self.kind,
            TokenKind::Keyword | TokenKind::Operator | TokenKind::Delimiter
        ) && self.text == text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::String => write!(f, "{} {:?}", self.kind.as_str(), self.text),
            _ => write!(f, "{} {}", self.kind.as_str(), self.text),
        }
    }
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl Cursor<'_> {
    const fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, mut keep: impl FnMut(char) -> bool, out: &mut String) {
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
    }
}

/// Splits `source` into tokens, skipping whitespace and comments.
///
/// # Errors
///
/// Returns a [`CompileError`] for unknown characters, unterminated strings
/// or comments, and malformed numbers.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut cursor = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    let mut line_start = true;

    while let Some(c) = cursor.peek() {
        let location = cursor.location();
        if c == '\n' {
            cursor.bump();
            line_start = true;
            continue;
        }
        if c.is_whitespace() {
            cursor.bump();
            continue;
        }
        if c == '#' && line_start {
            let mut text = String::new();
            cursor.take_while(|c| c != '\n', &mut text);
            tokens.push(Token {
                kind: TokenKind::Preprocessor,
                text: text.trim_end().to_owned(),
                location,
            });
            continue;
        }
        line_start = false;

        if c == '/' && skip_comment(&mut cursor, location)? {
            continue;
        }

        let token = if c.is_ascii_alphabetic() || c == '_' {
            let mut text = String::new();
            cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_', &mut text);
            let kind = if KEYWORDS.contains(&text.as_str()) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            };
            Token {
                kind,
                text,
                location,
            }
        } else if c.is_ascii_digit() {
            let mut text = String::new();
            cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '.', &mut text);
            if parse_number(&text).is_none() {
                return Err(CompileError::at(
                    CompileErrorKind::InvalidNumber(text),
                    location,
                ));
            }
            Token {
                kind: TokenKind::Number,
                text,
                location,
            }
        } else if c == '"' {
            Token {
                kind: TokenKind::String,
                text: string_literal(&mut cursor, location)?,
                location,
            }
        } else if DELIMITERS.contains(c) {
            cursor.bump();
            Token {
                kind: TokenKind::Delimiter,
                text: c.to_string(),
                location,
            }
        } else if SINGLE_OPERATORS.contains(c) {
            Token {
                kind: TokenKind::Operator,
                text: operator(&mut cursor),
                location,
            }
        } else {
            return Err(CompileError::at(
                CompileErrorKind::UnexpectedCharacter(c),
                location,
            ));
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Parses a decimal or `0x` hexadecimal integer literal.
#[must_use]
pub fn parse_number(text: &str) -> Option<i64> {
    let value = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<i64>().ok()?,
    };
    (i64::from(i32::MIN)..=i64::from(u32::MAX))
        .contains(&value)
        .then_some(value)
}

/// Consumes a comment if one starts here. Returns `false` for a lone `/`.
fn skip_comment(cursor: &mut Cursor<'_>, start: SourceLocation) -> Result<bool, CompileError> {
    let mut lookahead = cursor.chars.clone();
    lookahead.next();
    match lookahead.next() {
        Some('/') => {
            let mut discard = String::new();
            cursor.take_while(|c| c != '\n', &mut discard);
            Ok(true)
        }
        Some('*') => {
            cursor.bump();
            cursor.bump();
            let mut star = false;
            while let Some(c) = cursor.bump() {
                if star && c == '/' {
                    return Ok(true);
                }
                star = c == '*';
            }
            Err(CompileError::at(
                CompileErrorKind::UnterminatedComment,
                start,
            ))
        }
        _ => Ok(false),
    }
}

fn string_literal(cursor: &mut Cursor<'_>, start: SourceLocation) -> Result<String, CompileError> {
    cursor.bump();
    let mut text = String::new();
    loop {
        match cursor.bump() {
            None | Some('\n') => {
                return Err(CompileError::at(
                    CompileErrorKind::UnterminatedString,
                    start,
                ))
            }
            Some('"') => return Ok(text),
            Some('\\') => match cursor.bump() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('0') => text.push('\0'),
                Some(other) => text.push(other),
                None => {
                    return Err(CompileError::at(
                        CompileErrorKind::UnterminatedString,
                        start,
                    ))
                }
            },
            Some(c) => text.push(c),
        }
    }
}

fn operator(cursor: &mut Cursor<'_>) -> String {
    let rest: String = cursor.chars.clone().take(3).collect();
    let text = LONG_OPERATORS
        .iter()
        .find(|op| rest.starts_with(*op))
        .map_or_else(|| rest.chars().take(1).collect(), |op| (*op).to_owned());
    for _ in 0..text.chars().count() {
        cursor.bump();
    }
    text
}
