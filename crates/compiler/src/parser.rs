//! Recursive-descent parser for the C subset.
//!
//! Grammar:
//! ```text
//! program    = { function | statement }
//! function   = type IDENT "(" [ params ] ")" block
//! params     = "void" | type IDENT { "," type IDENT }
//! block      = "{" { statement } "}"
//! statement  = type IDENT [ "=" expr ] ";"
//!            | IDENT assign-op expr ";"
//!            | "return" [ expr ] ";"
//!            | block
//!            | expr ";"
//! expr       = term { ("+" | "-") term }
//! term       = unary { ("*" | "/") unary }
//! unary      = "-" unary | primary
//! primary    = NUMBER | STRING | IDENT [ "(" [ expr { "," expr } ] ")" ] | "(" expr ")"
//! ```
//! `type` is one or more type keywords, optionally followed by `*`.
//! Preprocessor lines are ignored.

use std::fmt;

use crate::errors::{CompileError, CompileErrorKind, SourceLocation};
use crate::lexer::{parse_number, Token, TokenKind, TYPE_KEYWORDS};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    /// C spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }
}

/// Expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Number {
        /// Value.
        value: i64,
        /// Position.
        location: SourceLocation,
    },
    /// String literal.
    Str {
        /// Unescaped content.
        value: String,
        /// Position.
        location: SourceLocation,
    },
    /// Variable read.
    Variable {
        /// Name.
        name: String,
        /// Position.
        location: SourceLocation,
    },
    /// Unary minus.
    Negate {
        /// Operand.
        operand: Box<Expr>,
        /// Position of the `-`.
        location: SourceLocation,
    },
    /// Binary arithmetic.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
        /// Position of the operator.
        location: SourceLocation,
    },
    /// Function call.
    Call {
        /// Callee.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
        /// Position of the callee name.
        location: SourceLocation,
    },
}

impl Expr {
    /// Position of this expression.
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        match self {
            Self::Number { location, .. }
            | Self::Str { location, .. }
            | Self::Variable { location, .. }
            | Self::Negate { location, .. }
            | Self::Binary { location, .. }
            | Self::Call { location, .. } => *location,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number { value, .. } => write!(f, "{value}"),
            Self::Str { value, .. } => write!(f, "{value:?}"),
            Self::Variable { name, .. } => f.write_str(name),
            Self::Negate { operand, .. } => write!(f, "(-{operand})"),
            Self::Binary { op, lhs, rhs, .. } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Self::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `type name [= init];`
    Declaration {
        /// Declared type as written.
        ty: String,
        /// Name.
        name: String,
        /// Initializer.
        init: Option<Expr>,
        /// Position of the name.
        location: SourceLocation,
    },
    /// `name = value;`, compound forms desugared.
    Assignment {
        /// Target.
        name: String,
        /// New value.
        value: Expr,
        /// Position of the target.
        location: SourceLocation,
    },
    /// `return [value];`
    Return {
        /// Returned value.
        value: Option<Expr>,
        /// Position of `return`.
        location: SourceLocation,
    },
    /// `expr;`
    Expression(Expr),
    /// `{ ... }`
    Block(Vec<Stmt>),
}

/// Function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Declared type.
    pub ty: String,
    /// Name.
    pub name: String,
    /// Position of the name.
    pub location: SourceLocation,
}

/// Function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Return type.
    pub return_type: String,
    /// Name.
    pub name: String,
    /// Parameters.
    pub params: Vec<Param>,
    /// Body.
    pub body: Vec<Stmt>,
    /// Position of the name.
    pub location: SourceLocation,
}

/// Top-level item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Function definition.
    Function(Function),
    /// Statement outside any function.
    Statement(Stmt),
}

/// Parsed translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    /// Items in source order.
    pub items: Vec<Item>,
}

impl Program {
    /// Function definitions in source order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(function) => Some(function),
            Item::Statement(_) => None,
        })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                Item::Function(function) => {
                    let params: Vec<String> = function
                        .params
                        .iter()
                        .map(|p| format!("{} {}", p.ty, p.name))
                        .collect();
                    writeln!(
                        f,
                        "function {} {}({})",
                        function.return_type,
                        function.name,
                        params.join(", ")
                    )?;
                    write_statements(f, &function.body, 1)?;
                }
                Item::Statement(stmt) => write_statement(f, stmt, 0)?,
            }
        }
        Ok(())
    }
}

fn write_statements(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], depth: usize) -> fmt::Result {
    stmts.iter().try_for_each(|stmt| write_statement(f, stmt, depth))
}

fn write_statement(f: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match stmt {
        Stmt::Declaration { ty, name, init, .. } => match init {
            Some(init) => writeln!(f, "{indent}declare {ty} {name} = {init}"),
            None => writeln!(f, "{indent}declare {ty} {name}"),
        },
        Stmt::Assignment { name, value, .. } => writeln!(f, "{indent}assign {name} = {value}"),
        Stmt::Return { value, .. } => match value {
            Some(value) => writeln!(f, "{indent}return {value}"),
            None => writeln!(f, "{indent}return"),
        },
        Stmt::Expression(expr) => writeln!(f, "{indent}eval {expr}"),
        Stmt::Block(body) => {
            writeln!(f, "{indent}block")?;
            write_statements(f, body, depth + 1)
        }
    }
}

/// Parses a token stream into a [`Program`].
///
/// # Errors
///
/// Returns the first syntax error with its location.
pub fn parse(tokens: &[Token]) -> Result<Program, CompileError> {
    let tokens: Vec<&Token> = tokens
        .iter()
        .filter(|t| t.kind != TokenKind::Preprocessor)
        .collect();
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut program = Program::default();
    while parser.peek().is_some() {
        program.items.push(parser.item()?);
    }
    Ok(program)
}

/// Deepest syntax tree the parser builds; later passes walk it recursively.
pub const MAX_NESTING: usize = 256;

struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
    depth: usize,
}

fn unexpected(expected: &'static str, token: Option<&Token>) -> CompileError {
    match token {
        Some(token) => CompileError::at(
            CompileErrorKind::UnexpectedToken {
                expected,
                found: token.text.clone(),
            },
            token.location,
        ),
        None => CompileError::new(CompileErrorKind::UnexpectedEof(expected)),
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset).copied()
    }

    fn descend(&mut self, location: SourceLocation) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(CompileError::at(
                CompileErrorKind::NestingTooDeep(MAX_NESTING),
                location,
            ));
        }
        Ok(())
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn check(&self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is(text))
    }

    fn eat(&mut self, text: &str) -> bool {
        let found = self.check(text);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, text: &str, expected: &'static str) -> Result<&'a Token, CompileError> {
        if self.check(text) {
            self.advance().ok_or_else(|| unexpected(expected, None))
        } else {
            Err(unexpected(expected, self.peek()))
        }
    }

    fn identifier(&mut self) -> Result<&'a Token, CompileError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.pos += 1;
                Ok(token)
            }
            other => Err(unexpected("an identifier", other)),
        }
    }

    fn at_type(&self) -> bool {
        self.peek()
            .is_some_and(|t| t.kind == TokenKind::Keyword && TYPE_KEYWORDS.contains(&t.text.as_str()))
    }

    fn type_name(&mut self) -> String {
        let mut parts = Vec::new();
        while self.at_type() {
            if let Some(token) = self.advance() {
                parts.push(token.text.clone());
            }
        }
        let mut ty = parts.join(" ");
        while self.eat("*") {
            ty.push('*');
        }
        ty
    }

    fn item(&mut self) -> Result<Item, CompileError> {
        if self.at_type() {
            let start = self.pos;
            self.type_name();
            let is_function = self
                .peek()
                .is_some_and(|t| t.kind == TokenKind::Identifier)
                && self.peek_at(1).is_some_and(|t| t.is("("));
            self.pos = start;
            if is_function {
                return self.function().map(Item::Function);
            }
        }
        self.statement().map(Item::Statement)
    }

    fn function(&mut self) -> Result<Function, CompileError> {
        let return_type = self.type_name();
        let name = self.identifier()?;
        self.expect("(", "`(`")?;
        let mut params = Vec::new();
        if self.check("void") && self.peek_at(1).is_some_and(|t| t.is(")")) {
            self.pos += 1;
        } else if !self.check(")") {
            loop {
                if !self.at_type() {
                    return Err(unexpected("a parameter type", self.peek()));
                }
                let ty = self.type_name();
                let param = self.identifier()?;
                params.push(Param {
                    ty,
                    name: param.text.clone(),
                    location: param.location,
                });
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.expect(")", "`)`")?;
        if !self.check("{") {
            return Err(CompileError::at(
                CompileErrorKind::Unsupported(format!("declaration of `{}` without a body", name.text)),
                name.location,
            ));
        }
        let body = self.block()?;
        Ok(Function {
            return_type,
            name: name.text.clone(),
            params,
            body,
            location: name.location,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let open = self.expect("{", "`{`")?;
        self.descend(open.location)?;
        let mut body = Vec::new();
        while !self.check("}") {
            if self.peek().is_none() {
                return Err(unexpected("`}`", None));
            }
            body.push(self.statement()?);
        }
        self.expect("}", "`}`")?;
        self.depth -= 1;
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        let Some(token) = self.peek() else {
            return Err(unexpected("a statement", None));
        };

        if self.at_type() {
            let ty = self.type_name();
            let name = self.identifier()?;
            if self.check("[") {
                return Err(CompileError::at(
                    CompileErrorKind::Unsupported("arrays".into()),
                    name.location,
                ));
            }
            let init = if self.eat("=") {
                Some(self.expr()?)
            } else {
                None
            };
            self.expect(";", "`;`")?;
            return Ok(Stmt::Declaration {
                ty,
                name: name.text.clone(),
                init,
                location: name.location,
            });
        }

        if token.is("return") {
            self.pos += 1;
            let value = if self.check(";") {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect(";", "`;`")?;
            return Ok(Stmt::Return {
                value,
                location: token.location,
            });
        }

        if token.is("{") {
            return self.block().map(Stmt::Block);
        }

        if token.kind == TokenKind::Keyword {
            return Err(CompileError::at(
                CompileErrorKind::Unsupported(format!("`{}` statements", token.text)),
                token.location,
            ));
        }

        if token.kind == TokenKind::Identifier {
            if let Some(op) = self.peek_at(1).filter(|t| t.kind == TokenKind::Operator) {
                let compound = match op.text.as_str() {
                    "=" => Some(None),
                    "+=" => Some(Some(BinaryOp::Add)),
                    "-=" => Some(Some(BinaryOp::Sub)),
                    "*=" => Some(Some(BinaryOp::Mul)),
                    "/=" => Some(Some(BinaryOp::Div)),
                    _ => None,
                };
                if let Some(compound) = compound {
                    self.pos += 2;
                    let rhs = self.expr()?;
                    self.expect(";", "`;`")?;
                    let value = match compound {
                        None => rhs,
                        Some(op_kind) => Expr::Binary {
                            op: op_kind,
                            lhs: Box::new(Expr::Variable {
                                name: token.text.clone(),
                                location: token.location,
                            }),
                            rhs: Box::new(rhs),
                            location: op.location,
                        },
                    };
                    return Ok(Stmt::Assignment {
                        name: token.text.clone(),
                        value,
                        location: token.location,
                    });
                }
            }
        }

        let expr = self.expr()?;
        self.expect(";", "`;`")?;
        Ok(Stmt::Expression(expr))
    }

    fn expr(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut lhs = self.term()?;
        while let Some((op, location)) = self.binary_op(&[BinaryOp::Add, BinaryOp::Sub]) {
            self.descend(location)?;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                location,
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        while let Some((op, location)) = self.binary_op(&[BinaryOp::Mul, BinaryOp::Div]) {
            self.descend(location)?;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                location,
            };
        }
        self.depth = base;
        Ok(lhs)
    }

    fn binary_op(&mut self, allowed: &[BinaryOp]) -> Option<(BinaryOp, SourceLocation)> {
        let token = self.peek().filter(|t| t.kind == TokenKind::Operator)?;
        let op = BinaryOp::from_symbol(&token.text).filter(|op| allowed.contains(op))?;
        self.pos += 1;
        Some((op, token.location))
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if let Some(token) = self.peek().filter(|t| t.is("-")) {
            self.pos += 1;
            self.descend(token.location)?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Negate {
                operand: Box::new(operand),
                location: token.location,
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self
            .advance()
            .ok_or_else(|| unexpected("an expression", None))?;
        match token.kind {
            TokenKind::Number => {
                let value = parse_number(&token.text).ok_or_else(|| {
                    CompileError::at(
                        CompileErrorKind::InvalidNumber(token.text.clone()),
                        token.location,
                    )
                })?;
                Ok(Expr::Number {
                    value,
                    location: token.location,
                })
            }
            TokenKind::String => Ok(Expr::Str {
                value: token.text.clone(),
                location: token.location,
            }),
            TokenKind::Identifier if self.check("(") => {
                self.pos += 1;
                self.descend(token.location)?;
                let mut args = Vec::new();
                if !self.check(")") {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(",") {
                            break;
                        }
                    }
                }
                self.expect(")", "`)`")?;
                self.depth -= 1;
                Ok(Expr::Call {
                    name: token.text.clone(),
                    args,
                    location: token.location,
                })
            }
            TokenKind::Identifier => Ok(Expr::Variable {
                name: token.text.clone(),
                location: token.location,
            }),
            _ if token.is("(") => {
                self.descend(token.location)?;
                let inner = self.expr()?;
                self.expect(")", "`)`")?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => Err(unexpected("an expression", Some(token))),
        }
    }
}
