//! IR rewrites: constant folding and propagation, then dead temporary
//! elimination.
//!
//! The code is straight-line, so a single forward pass sees every write
//! before the reads it reaches. Folding uses the CPU's own 32-bit ALU so a
//! folded value matches what the program would have computed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use simulator_core::{compute, AluOp};
use tracing::debug;

use crate::errors::{CompileWarning, WarningKind};
use crate::ir::{Arg, IrProgram, Place, Tac, Value};
use crate::parser::BinaryOp;

/// Operand width of the target.
const WORD_BITS: u32 = 32;

/// Counts of applied rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeStats {
    /// Operations replaced by their constant result.
    pub folded: usize,
    /// Operand reads replaced by a known constant.
    pub propagated: usize,
    /// Instructions deleted because their result was never read.
    pub removed: usize,
    /// Instructions dropped after the first `return`.
    pub unreachable: usize,
}

impl fmt::Display for OptimizeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "folded {}, propagated {}, removed {}, unreachable {}",
            self.folded, self.propagated, self.removed, self.unreachable
        )
    }
}

/// Output of [`optimize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimized {
    /// Rewritten program.
    pub ir: IrProgram,
    /// Rewrite counts.
    pub stats: OptimizeStats,
    /// Diagnostics found while folding.
    pub warnings: Vec<CompileWarning>,
}

const fn alu_op(op: BinaryOp) -> AluOp {
    match op {
        BinaryOp::Add => AluOp::Add,
        BinaryOp::Sub => AluOp::Sub,
        BinaryOp::Mul => AluOp::Mul,
        BinaryOp::Div => AluOp::Div,
    }
}

/// Optimizes `ir`.
#[must_use]
pub fn optimize(ir: IrProgram) -> Optimized {
    let mut stats = OptimizeStats::default();
    let mut warnings = Vec::new();
    let IrProgram {
        code, variables, ..
    } = ir;

    let code = fold(code, &mut stats, &mut warnings);
    let code = eliminate_dead_temps(code, &mut stats);
    let (code, temps) = renumber_temps(code);
    debug!(%stats, instructions = code.len(), "optimized");

    Optimized {
        ir: IrProgram {
            code,
            variables,
            temps,
        },
        stats,
        warnings,
    }
}

fn substitute(value: Value, known: &HashMap<Place, i64>, propagated: &mut usize) -> Value {
    match value {
        Value::Place(place) => known.get(&place).map_or(value, |&c| {
            *propagated += 1;
            Value::Const(c)
        }),
        Value::Const(_) => value,
    }
}

fn fold(code: Vec<Tac>, stats: &mut OptimizeStats, warnings: &mut Vec<CompileWarning>) -> Vec<Tac> {
    let mut known: HashMap<Place, i64> = HashMap::new();
    let mut out = Vec::with_capacity(code.len());
    let total = code.len();

    for tac in code {
        let rewritten = match tac {
            Tac::Copy { dest, src } => Tac::Copy {
                dest,
                src: substitute(src, &known, &mut stats.propagated),
            },
            Tac::Negate { dest, src } => match substitute(src, &known, &mut stats.propagated) {
                Value::Const(c) => {
                    stats.folded += 1;
                    let value = compute(AluOp::Neg, c, 0, WORD_BITS).map_or(c, |out| out.value);
                    Tac::Copy {
                        dest,
                        src: Value::Const(value),
                    }
                }
                src => Tac::Negate { dest, src },
            },
            Tac::Binary { dest, op, lhs, rhs } => {
                let lhs = substitute(lhs, &known, &mut stats.propagated);
                let rhs = substitute(rhs, &known, &mut stats.propagated);
                match (lhs, rhs) {
                    (Value::Const(a), Value::Const(b)) => {
                        match compute(alu_op(op), a, b, WORD_BITS) {
                            Some(out) => {
                                stats.folded += 1;
                                Tac::Copy {
                                    dest,
                                    src: Value::Const(out.value),
                                }
                            }
                            None => {
                                warnings.push(CompileWarning::new(WarningKind::DivisionByZero));
                                Tac::Binary { dest, op, lhs, rhs }
                            }
                        }
                    }
                    (_, Value::Const(0)) if op == BinaryOp::Div => {
                        warnings.push(CompileWarning::new(WarningKind::DivisionByZero));
                        Tac::Binary { dest, op, lhs, rhs }
                    }
                    _ => Tac::Binary { dest, op, lhs, rhs },
                }
            }
            Tac::Call { dest, name, args } => Tac::Call {
                dest,
                name,
                args: args
                    .into_iter()
                    .map(|arg| match arg {
                        Arg::Value(value) => {
                            Arg::Value(substitute(value, &known, &mut stats.propagated))
                        }
                        Arg::Str(text) => Arg::Str(text),
                    })
                    .collect(),
            },
            Tac::Return(value) => {
                Tac::Return(value.map(|v| substitute(v, &known, &mut stats.propagated)))
            }
        };

        match &rewritten {
            Tac::Copy {
                dest,
                src: Value::Const(c),
            } => {
                known.insert(*dest, *c);
            }
            other => {
                if let Some(dest) = other.dest() {
                    known.remove(&dest);
                }
            }
        }

        let is_return = matches!(rewritten, Tac::Return(_));
        out.push(rewritten);
        if is_return {
            stats.unreachable = total - out.len();
            break;
        }
    }
    out
}

fn eliminate_dead_temps(code: Vec<Tac>, stats: &mut OptimizeStats) -> Vec<Tac> {
    let mut live: HashSet<Place> = HashSet::new();
    let mut kept = Vec::with_capacity(code.len());

    for mut tac in code.into_iter().rev() {
        match tac.dest() {
            Some(dest @ Place::Temp(_)) if !live.contains(&dest) => {
                if let Tac::Call { dest, .. } = &mut tac {
                    *dest = None;
                } else {
                    stats.removed += 1;
                    continue;
                }
            }
            Some(dest) => {
                live.remove(&dest);
            }
            None => {}
        }
        for value in tac.uses() {
            if let Value::Place(place @ Place::Temp(_)) = value {
                live.insert(place);
            }
        }
        kept.push(tac);
    }
    kept.reverse();
    kept
}

/// Renumbers temporaries densely in order of definition.
fn renumber_temps(mut code: Vec<Tac>) -> (Vec<Tac>, u32) {
    let mut map: HashMap<u32, u32> = HashMap::new();
    let mut rename = |place: &mut Place| {
        if let Place::Temp(t) = place {
            let next = u32::try_from(map.len()).unwrap_or(u32::MAX);
            *t = *map.entry(*t).or_insert(next);
        }
    };
    let rename_value = |value: &mut Value, rename: &mut dyn FnMut(&mut Place)| {
        if let Value::Place(place) = value {
            rename(place);
        }
    };

    for tac in &mut code {
        match tac {
            Tac::Copy { dest, src } | Tac::Negate { dest, src } => {
                rename_value(src, &mut rename);
                rename(dest);
            }
            Tac::Binary { dest, lhs, rhs, .. } => {
                rename_value(lhs, &mut rename);
                rename_value(rhs, &mut rename);
                rename(dest);
            }
            Tac::Call { dest, args, .. } => {
                for arg in args {
                    if let Arg::Value(value) = arg {
                        rename_value(value, &mut rename);
                    }
                }
                if let Some(dest) = dest {
                    rename(dest);
                }
            }
            Tac::Return(value) => {
                if let Some(value) = value {
                    rename_value(value, &mut rename);
                }
            }
        }
    }
    let temps = u32::try_from(map.len()).unwrap_or(u32::MAX);
    (code, temps)
}
