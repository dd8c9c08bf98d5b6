//! Three-address code and AST lowering.
//!
//! Every variable gets a 4-byte slot in the data region starting at
//! [`VARIABLE_BASE_ADDRESS`]. Top-level statements run first, in source
//! order, followed by the body of `main`. Other function bodies are not
//! lowered.

use std::collections::HashMap;
use std::fmt;

use simulator_core::DATA_END;

use crate::errors::{CompileError, CompileErrorKind, CompileWarning, WarningKind};
use crate::parser::{BinaryOp, Expr, Item, Program, Stmt};

/// Data address of the first variable slot.
pub const VARIABLE_BASE_ADDRESS: u16 = 1000;
/// Bytes per variable slot.
pub const SLOT_BYTES: u16 = 4;

/// Storage written by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Place {
    /// Index into [`IrProgram::variables`].
    Var(usize),
    /// Compiler temporary.
    Temp(u32),
}

/// Operand read by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Constant.
    Const(i64),
    /// Current content of a place.
    Place(Place),
}

/// Call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Computed value.
    Value(Value),
    /// String literal.
    Str(String),
}

/// One three-address instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tac {
    /// `dest = src`
    Copy {
        /// Destination.
        dest: Place,
        /// Source.
        src: Value,
    },
    /// `dest = lhs op rhs`
    Binary {
        /// Destination.
        dest: Place,
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Value,
        /// Right operand.
        rhs: Value,
    },
    /// `dest = -src`
    Negate {
        /// Destination.
        dest: Place,
        /// Operand.
        src: Value,
    },
    /// `[dest =] call name(args)`
    Call {
        /// Result destination.
        dest: Option<Place>,
        /// Callee.
        name: String,
        /// Arguments.
        args: Vec<Arg>,
    },
    /// `return [value]`
    Return(Option<Value>),
}

impl Tac {
    /// Place written, if any.
    #[must_use]
    pub const fn dest(&self) -> Option<Place> {
        match self {
            Self::Copy { dest, .. } | Self::Binary { dest, .. } | Self::Negate { dest, .. } => {
                Some(*dest)
            }
            Self::Call { dest, .. } => *dest,
            Self::Return(_) => None,
        }
    }

    /// Values read, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<Value> {
        match self {
            Self::Copy { src, .. } | Self::Negate { src, .. } => vec![*src],
            Self::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Call { args, .. } => args
                .iter()
                .filter_map(|arg| match arg {
                    Arg::Value(value) => Some(*value),
                    Arg::Str(_) => None,
                })
                .collect(),
            Self::Return(value) => value.iter().copied().collect(),
        }
    }
}

/// A variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Unique display name; shadowing declarations get a `.N` suffix.
    pub name: String,
    /// Data-region address.
    pub address: u16,
}

/// Lowered program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrProgram {
    /// Straight-line code.
    pub code: Vec<Tac>,
    /// Variable slots in declaration order.
    pub variables: Vec<Variable>,
    /// Number of temporaries allocated.
    pub temps: u32,
}

impl IrProgram {
    fn place_name(&self, place: Place) -> String {
        match place {
            Place::Var(index) => self
                .variables
                .get(index)
                .map_or_else(|| format!("v{index}"), |v| v.name.clone()),
            Place::Temp(t) => format!("t{t}"),
        }
    }

    fn value_name(&self, value: Value) -> String {
        match value {
            Value::Const(c) => c.to_string(),
            Value::Place(place) => self.place_name(place),
        }
    }

    /// Renders one instruction with variable names.
    #[must_use]
    pub fn render(&self, tac: &Tac) -> String {
        match tac {
            Tac::Copy { dest, src } => {
                format!("{} = {}", self.place_name(*dest), self.value_name(*src))
            }
            Tac::Binary { dest, op, lhs, rhs } => format!(
                "{} = {} {} {}",
                self.place_name(*dest),
                self.value_name(*lhs),
                op.symbol(),
                self.value_name(*rhs)
            ),
            Tac::Negate { dest, src } => {
                format!("{} = -{}", self.place_name(*dest), self.value_name(*src))
            }
            Tac::Call { dest, name, args } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Value(value) => self.value_name(*value),
                        Arg::Str(text) => format!("{text:?}"),
                    })
                    .collect();
                let call = format!("call {name}({})", args.join(", "));
                match dest {
                    Some(dest) => format!("{} = {call}", self.place_name(*dest)),
                    None => call,
                }
            }
            Tac::Return(Some(value)) => format!("return {}", self.value_name(*value)),
            Tac::Return(None) => "return".to_owned(),
        }
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for variable in &self.variables {
            writeln!(f, "; {} @ [{}]", variable.name, variable.address)?;
        }
        for tac in &self.code {
            writeln!(f, "{}", self.render(tac))?;
        }
        Ok(())
    }
}

/// Largest number of 4-byte slots that fit in the data region above the
/// variable base.
#[must_use]
pub fn slot_capacity() -> usize {
    let span = DATA_END + 1 - u64::from(VARIABLE_BASE_ADDRESS);
    usize::try_from(span / u64::from(SLOT_BYTES)).unwrap_or(usize::MAX)
}

/// Address of slot `index`, if it fits in the data region.
#[must_use]
pub fn slot_address(index: usize) -> Option<u16> {
    if index >= slot_capacity() {
        return None;
    }
    u16::try_from(index)
        .ok()
        .and_then(|i| i.checked_mul(SLOT_BYTES))
        .and_then(|offset| offset.checked_add(VARIABLE_BASE_ADDRESS))
}

/// Lowers `program` to three-address code.
///
/// # Errors
///
/// Returns a [`CompileError`] when the program needs more slots than the
/// data region holds or uses a string literal as a value.
pub fn lower(program: &Program) -> Result<(IrProgram, Vec<CompileWarning>), CompileError> {
    let mut lowering = Lowering {
        ir: IrProgram::default(),
        scopes: vec![HashMap::new()],
        counts: HashMap::new(),
    };
    let mut warnings = Vec::new();

    for item in &program.items {
        match item {
            Item::Statement(stmt) => lowering.statement(stmt)?,
            Item::Function(function) if function.name != "main" => warnings.push(
                CompileWarning::at(
                    WarningKind::FunctionNotLowered(function.name.clone()),
                    function.location,
                ),
            ),
            Item::Function(_) => {}
        }
    }
    if let Some(main) = program.functions().find(|f| f.name == "main") {
        lowering.scopes.push(HashMap::new());
        for param in &main.params {
            lowering.declare(&param.name)?;
        }
        for stmt in &main.body {
            lowering.statement(stmt)?;
        }
    }
    Ok((lowering.ir, warnings))
}

struct Lowering {
    ir: IrProgram,
    scopes: Vec<HashMap<String, usize>>,
    counts: HashMap<String, usize>,
}

impl Lowering {
    fn declare(&mut self, name: &str) -> Result<Place, CompileError> {
        let index = self.ir.variables.len();
        let address = slot_address(index)
            .ok_or_else(|| CompileError::new(CompileErrorKind::OutOfDataMemory(index + 1)))?;
        let seen = self.counts.entry(name.to_owned()).or_insert(0);
        let display = if *seen == 0 {
            name.to_owned()
        } else {
            format!("{name}.{seen}")
        };
        *seen += 1;
        self.ir.variables.push(Variable {
            name: display,
            address,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), index);
        }
        Ok(Place::Var(index))
    }

    fn resolve(&self, name: &str) -> Option<Place> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).map(|&index| Place::Var(index)))
    }

    fn temp(&mut self) -> Place {
        let t = self.ir.temps;
        self.ir.temps += 1;
        Place::Temp(t)
    }

    /// Stores `value` into `dest`, retargeting the instruction that just
    /// produced it when `value` is a fresh temporary.
    fn assign(&mut self, dest: Place, value: Value) {
        if let Value::Place(Place::Temp(t)) = value {
            if let Some(last) = self.ir.code.last_mut() {
                let retarget = match last {
                    Tac::Copy { dest: d, .. }
                    | Tac::Binary { dest: d, .. }
                    | Tac::Negate { dest: d, .. } => Some(d),
                    Tac::Call { dest: Some(d), .. } => Some(d),
                    Tac::Call { dest: None, .. } | Tac::Return(_) => None,
                };
                if let Some(d) = retarget.filter(|d| **d == Place::Temp(t)) {
                    *d = dest;
                    return;
                }
            }
        }
        self.ir.code.push(Tac::Copy { dest, src: value });
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Declaration { name, init, .. } => {
                let value = init.as_ref().map(|init| self.expr(init)).transpose()?;
                let dest = self.declare(name)?;
                if let Some(value) = value {
                    self.assign(dest, value);
                }
            }
            Stmt::Assignment { name, value, location } => {
                let value = self.expr(value)?;
                let dest = self.resolve(name).ok_or_else(|| {
                    CompileError::at(
                        CompileErrorKind::AssignmentToUndeclared(name.clone()),
                        *location,
                    )
                })?;
                self.assign(dest, value);
            }
            Stmt::Return { value, .. } => {
                let value = value.as_ref().map(|v| self.expr(v)).transpose()?;
                self.ir.code.push(Tac::Return(value));
            }
            Stmt::Expression(Expr::Call { name, args, .. }) => {
                let args = self.args(args)?;
                self.ir.code.push(Tac::Call {
                    dest: None,
                    name: name.clone(),
                    args,
                });
            }
            Stmt::Expression(expr) => {
                self.expr(expr)?;
            }
            Stmt::Block(body) => {
                self.scopes.push(HashMap::new());
                for stmt in body {
                    self.statement(stmt)?;
                }
                self.scopes.pop();
            }
        }
        Ok(())
    }

    fn args(&mut self, args: &[Expr]) -> Result<Vec<Arg>, CompileError> {
        args.iter()
            .map(|arg| match arg {
                Expr::Str { value, .. } => Ok(Arg::Str(value.clone())),
                other => self.expr(other).map(Arg::Value),
            })
            .collect()
    }

    fn expr(&mut self, expr: &Expr) -> Result<Value, CompileError> {
        match expr {
            Expr::Number { value, .. } => Ok(Value::Const(*value)),
            Expr::Str { location, .. } => Err(CompileError::at(
                CompileErrorKind::StringAsValue,
                *location,
            )),
            Expr::Variable { name, location } => self.resolve(name).map(Value::Place).ok_or_else(|| {
                CompileError::at(
                    CompileErrorKind::UndeclaredVariable(name.clone()),
                    *location,
                )
            }),
            Expr::Negate { operand, .. } => {
                let src = self.expr(operand)?;
                let dest = self.temp();
                self.ir.code.push(Tac::Negate { dest, src });
                Ok(Value::Place(dest))
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                let dest = self.temp();
                self.ir.code.push(Tac::Binary {
                    dest,
                    op: *op,
                    lhs,
                    rhs,
                });
                Ok(Value::Place(dest))
            }
            Expr::Call { name, args, .. } => {
                let args = self.args(args)?;
                let dest = self.temp();
                self.ir.code.push(Tac::Call {
                    dest: Some(dest),
                    name: name.clone(),
                    args,
                });
                Ok(Value::Place(dest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{lower, slot_address, slot_capacity, IrProgram, VARIABLE_BASE_ADDRESS};
    use crate::errors::WarningKind;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn lower_source(source: &str) -> IrProgram {
        lower(&parse(&tokenize(source).expect("lexes")).expect("parses"))
            .expect("lowers")
            .0
    }

    fn listing(ir: &IrProgram) -> Vec<String> {
        ir.code.iter().map(|tac| ir.render(tac)).collect()
    }

    #[test]
    fn default_example_lowers_to_tac() {
        let ir = lower_source(simulator_core::DEFAULT_SOURCE);
        assert_eq!(
            listing(&ir),
            vec![
                "a = 5",
                "b = 3",
                "sum = a + b",
                "call printf(\"result: %d\\n\", sum)",
                "return 0",
            ]
        );
        let addresses: Vec<u16> = ir.variables.iter().map(|v| v.address).collect();
        assert_eq!(addresses, vec![1000, 1004, 1008]);
    }

    #[test]
    fn nested_expressions_use_temporaries() {
        let ir = lower_source("int x = 2; int y = -(x + 1) * 3;");
        assert_eq!(
            listing(&ir),
            vec!["x = 2", "t0 = x + 1", "t1 = -t0", "y = t1 * 3"]
        );
    }

    #[test]
    fn shadowed_names_get_distinct_slots() {
        let ir = lower_source("int a = 1; { int a = 2; a = a + 1; } a = a * 4;");
        assert_eq!(
            listing(&ir),
            vec!["a = 1", "a.1 = 2", "a.1 = a.1 + 1", "a = a * 4"]
        );
    }

    #[test]
    fn top_level_runs_before_main_and_helpers_are_skipped() {
        let tokens = tokenize("int g = 7; int helper() { return 1; } int main() { g = g + 1; return g; }")
            .expect("lexes");
        let (ir, warnings) = lower(&parse(&tokens).expect("parses")).expect("lowers");
        assert_eq!(listing(&ir), vec!["g = 7", "g = g + 1", "return g"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].kind,
            WarningKind::FunctionNotLowered("helper".into())
        );
    }

    #[test]
    fn slots_stay_inside_the_data_region() {
        assert_eq!(slot_address(0), Some(VARIABLE_BASE_ADDRESS));
        let last = slot_capacity() - 1;
        let address = slot_address(last).expect("last slot fits");
        assert!(u64::from(address) + 3 <= simulator_core::DATA_END);
        assert_eq!(slot_address(slot_capacity()), None);
    }
}
