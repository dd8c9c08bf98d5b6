//! Scoped name resolution and usage checks.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::errors::{CompileError, CompileErrorKind, CompileWarning, SourceLocation, WarningKind};
use crate::parser::{Expr, Item, Program, Stmt};

/// One declared variable or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Name.
    pub name: String,
    /// Declared type.
    pub ty: String,
    /// Nesting depth; 0 is file scope.
    pub depth: usize,
    /// Declaring function, `None` at file scope.
    pub function: Option<String>,
    /// Position of the declaration.
    pub location: SourceLocation,
    /// Number of reads.
    pub reads: usize,
}

/// Result of a successful analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Analysis {
    /// Every declaration in source order.
    pub symbols: Vec<Symbol>,
    /// Defined function names in source order.
    pub functions: Vec<String>,
    /// Non-fatal diagnostics.
    pub warnings: Vec<CompileWarning>,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "functions: {}", self.functions.join(", "))?;
        for symbol in &self.symbols {
            writeln!(
                f,
                "{} {} {} scope {} in {} (read {}x)",
                symbol.location,
                symbol.ty,
                symbol.name,
                symbol.depth,
                symbol.function.as_deref().unwrap_or("<file>"),
                symbol.reads
            )?;
        }
        Ok(())
    }
}

/// Resolves every name in `program`.
///
/// # Errors
///
/// Returns every error found: undeclared reads and assignments,
/// redeclarations in one scope, and string literals used as values.
pub fn analyze(program: &Program) -> Result<Analysis, Vec<CompileError>> {
    let mut analyzer = Analyzer {
        defined: program.functions().map(|f| f.name.as_str()).collect(),
        scopes: vec![HashMap::new()],
        function: None,
        analysis: Analysis {
            functions: program.functions().map(|f| f.name.clone()).collect(),
            ..Analysis::default()
        },
        errors: Vec::new(),
        reported_calls: HashSet::new(),
    };

    for item in &program.items {
        match item {
            Item::Statement(stmt) => analyzer.statement(stmt),
            Item::Function(function) => {
                analyzer.function = Some(function.name.clone());
                analyzer.scopes.push(HashMap::new());
                for param in &function.params {
                    analyzer.declare(&param.name, &param.ty, param.location);
                }
                analyzer.statements(&function.body);
                analyzer.pop_scope();
                analyzer.function = None;
            }
        }
    }
    analyzer.pop_scope();

    if analyzer.errors.is_empty() {
        Ok(analyzer.analysis)
    } else {
        Err(analyzer.errors)
    }
}

struct Analyzer<'p> {
    defined: HashSet<&'p str>,
    scopes: Vec<HashMap<String, usize>>,
    function: Option<String>,
    analysis: Analysis,
    errors: Vec<CompileError>,
    reported_calls: HashSet<String>,
}

impl Analyzer<'_> {
    fn lookup(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declare(&mut self, name: &str, ty: &str, location: SourceLocation) {
        let depth = self.scopes.len() - 1;
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(name) {
            self.errors.push(CompileError::at(
                CompileErrorKind::Redeclaration(name.to_owned()),
                location,
            ));
            return;
        }
        scope.insert(name.to_owned(), self.analysis.symbols.len());
        self.analysis.symbols.push(Symbol {
            name: name.to_owned(),
            ty: ty.to_owned(),
            depth,
            function: self.function.clone(),
            location,
            reads: 0,
        });
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        let mut unused: Vec<&Symbol> = scope
            .values()
            .map(|&index| &self.analysis.symbols[index])
            .filter(|symbol| symbol.reads == 0)
            .collect();
        unused.sort_by_key(|symbol| symbol.location);
        let warnings: Vec<CompileWarning> = unused
            .into_iter()
            .map(|symbol| {
                CompileWarning::at(WarningKind::UnusedVariable(symbol.name.clone()), symbol.location)
            })
            .collect();
        self.analysis.warnings.extend(warnings);
    }

    fn statements(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Declaration {
                ty,
                name,
                init,
                location,
            } => {
                if let Some(init) = init {
                    self.value(init);
                }
                self.declare(name, ty, *location);
            }
            Stmt::Assignment {
                name,
                value,
                location,
            } => {
                self.value(value);
                if self.lookup(name).is_none() {
                    self.errors.push(CompileError::at(
                        CompileErrorKind::AssignmentToUndeclared(name.clone()),
                        *location,
                    ));
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.value(value);
                }
            }
            Stmt::Expression(expr) => self.value(expr),
            Stmt::Block(body) => {
                self.scopes.push(HashMap::new());
                self.statements(body);
                self.pop_scope();
            }
        }
    }

    fn value(&mut self, expr: &Expr) {
        if let Expr::Str { location, .. } = expr {
            self.errors.push(CompileError::at(
                CompileErrorKind::StringAsValue,
                *location,
            ));
            return;
        }
        self.expr(expr);
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number { .. } | Expr::Str { .. } => {}
            Expr::Variable { name, location } => match self.lookup(name) {
                Some(index) => self.analysis.symbols[index].reads += 1,
                None => self.errors.push(CompileError::at(
                    CompileErrorKind::UndeclaredVariable(name.clone()),
                    *location,
                )),
            },
            Expr::Negate { operand, .. } => self.value(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.value(lhs);
                self.value(rhs);
            }
            Expr::Call {
                name,
                args,
                location,
            } => {
                for arg in args {
                    self.expr(arg);
                }
                if !self.defined.contains(name.as_str()) && self.reported_calls.insert(name.clone())
                {
                    self.analysis.warnings.push(CompileWarning::at(
                        WarningKind::UndefinedFunction(name.clone()),
                        *location,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{analyze, Analysis};
    use crate::errors::{CompileError, CompileErrorKind, SourceLocation, WarningKind};
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn run(source: &str) -> Result<Analysis, Vec<CompileError>> {
        analyze(&parse(&tokenize(source).expect("lexes")).expect("parses"))
    }

    #[test]
    fn default_example_only_warns_about_printf() {
        let analysis = run(simulator_core::DEFAULT_SOURCE).expect("valid");
        let kinds: Vec<WarningKind> = analysis.warnings.into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::UndefinedFunction("printf".into())]);
        let names: Vec<&str> = analysis.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "sum"]);
    }

    #[test]
    fn unused_variables_warn_in_declaration_order() {
        let analysis = run("int x = 1; int y = 2; int z = x;").expect("valid");
        let unused: Vec<WarningKind> = analysis.warnings.into_iter().map(|w| w.kind).collect();
        assert_eq!(
            unused,
            vec![
                WarningKind::UnusedVariable("y".into()),
                WarningKind::UnusedVariable("z".into()),
            ]
        );
    }

    #[test]
    fn inner_scopes_may_shadow() {
        let analysis = run("int a = 1; { int a = 2; int b = a; b = b + 1; } int c = a + c0();")
            .expect("valid");
        assert_eq!(analysis.symbols.iter().filter(|s| s.name == "a").count(), 2);
        assert!(analysis.symbols.iter().any(|s| s.name == "b" && s.depth == 1));
    }

    #[rstest]
    #[case("int a = b;", CompileErrorKind::UndeclaredVariable("b".into()), (1, 9))]
    #[case("int a; int a;", CompileErrorKind::Redeclaration("a".into()), (1, 12))]
    #[case("q = 3;", CompileErrorKind::AssignmentToUndeclared("q".into()), (1, 1))]
    #[case("int s = \"text\";", CompileErrorKind::StringAsValue, (1, 9))]
    fn semantic_errors(
        #[case] source: &str,
        #[case] kind: CompileErrorKind,
        #[case] at: (usize, usize),
    ) {
        let errors = run(source).expect_err("rejected");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, kind);
        assert_eq!(errors[0].location, Some(SourceLocation::new(at.0, at.1)));
    }

    #[test]
    fn every_error_is_reported() {
        let errors = run("int main() { x = 1; return y; }").expect_err("rejected");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn parameters_are_in_scope() {
        let analysis = run("int twice(int n) { return n + n; }").expect("valid");
        assert_eq!(analysis.symbols[0].reads, 2);
        assert_eq!(analysis.symbols[0].function.as_deref(), Some("twice"));
    }
}
