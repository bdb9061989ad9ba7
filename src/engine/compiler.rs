//! Restricted compilation: parse, then statically reject disallowed
//! constructs before anything runs.
//!
//! Pure and idempotent, so it backs both the standalone syntax check and
//! the first stage of every execution attempt. Rejection is separate from
//! a syntax error: rejected source parsed fine but asked for something the
//! capability set forbids.

use super::caps::CapabilitySet;
use super::parser::parse_source;
use super::types::{AssignTarget, CompiledUnit, Expr, Stmt, SyntaxDiagnostic};
use crate::audit::fingerprint;

/// Why a template failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// The source is not well-formed.
    Syntax(SyntaxDiagnostic),
    /// The source is well-formed but uses a forbidden construct.
    Rejected { message: String },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(d) => write!(f, "syntax error: {}", d),
            Self::Rejected { message } => write!(f, "rejected: {}", message),
        }
    }
}

/// Check syntax without compiling against a capability set and without
/// executing anything.
pub fn validate_syntax(source: &str) -> Result<(), SyntaxDiagnostic> {
    parse_source(source).map(|_| ())
}

/// Compile a template against a capability set. Empty and
/// whitespace/comment-only sources compile to an empty, runnable unit.
pub fn compile(source: &str, caps: &CapabilitySet) -> Result<CompiledUnit, CompileError> {
    let program = parse_source(source).map_err(CompileError::Syntax)?;

    let mut imports = Vec::new();
    check_block(&program, caps, &mut imports)?;

    Ok(CompiledUnit {
        program,
        imports,
        fingerprint: fingerprint::hash_source(source),
    })
}

fn rejected(message: impl Into<String>) -> CompileError {
    CompileError::Rejected { message: message.into() }
}

fn check_name(name: &str) -> Result<(), CompileError> {
    if name.starts_with('_') {
        Err(rejected(format!(
            "names beginning with '_' are not allowed ('{}')",
            name
        )))
    } else {
        Ok(())
    }
}

fn check_block(
    block: &[Stmt],
    caps: &CapabilitySet,
    imports: &mut Vec<String>,
) -> Result<(), CompileError> {
    for stmt in block {
        check_stmt(stmt, caps, imports)?;
    }
    Ok(())
}

fn check_stmt(
    stmt: &Stmt,
    caps: &CapabilitySet,
    imports: &mut Vec<String>,
) -> Result<(), CompileError> {
    match stmt {
        Stmt::Expr(expr) => check_expr(expr),
        Stmt::Assign { target, value } => {
            check_target(target)?;
            check_expr(value)
        }
        Stmt::AugAssign { target, value, .. } => {
            check_target(target)?;
            check_expr(value)
        }
        Stmt::If { branches, else_body } => {
            for (cond, body) in branches {
                check_expr(cond)?;
                check_block(body, caps, imports)?;
            }
            if let Some(body) = else_body {
                check_block(body, caps, imports)?;
            }
            Ok(())
        }
        Stmt::While { cond, body } => {
            check_expr(cond)?;
            check_block(body, caps, imports)
        }
        Stmt::For { var, iter, body } => {
            check_name(var)?;
            check_expr(iter)?;
            check_block(body, caps, imports)
        }
        Stmt::FuncDef(func) => {
            check_name(&func.name)?;
            for param in &func.params {
                check_name(param)?;
            }
            check_block(&func.body, caps, imports)
        }
        Stmt::Return(expr) => match expr {
            Some(expr) => check_expr(expr),
            None => Ok(()),
        },
        Stmt::Break | Stmt::Continue => Ok(()),
        Stmt::Import(name) => {
            if !caps.has_module(name) {
                return Err(rejected(format!(
                    "import of '{}' is not allowed (allowed modules: math, random)",
                    name
                )));
            }
            if !imports.contains(name) {
                imports.push(name.clone());
            }
            Ok(())
        }
    }
}

fn check_target(target: &AssignTarget) -> Result<(), CompileError> {
    match target {
        AssignTarget::Name(name) => check_name(name),
        AssignTarget::Index { obj, index } => {
            check_expr(obj)?;
            check_expr(index)
        }
    }
}

fn check_expr(expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => Ok(()),
        Expr::Ident(name) => check_name(name),
        Expr::List(items) => {
            for item in items {
                check_expr(item)?;
            }
            Ok(())
        }
        Expr::Map(entries) => {
            for (_, value) in entries {
                check_expr(value)?;
            }
            Ok(())
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Logic { lhs, rhs, .. } => {
            check_expr(lhs)?;
            check_expr(rhs)
        }
        Expr::Unary { operand, .. } => check_expr(operand),
        Expr::Call { callee, args } => {
            check_expr(callee)?;
            for arg in args {
                check_expr(arg)?;
            }
            Ok(())
        }
        Expr::Index { obj, index } => {
            check_expr(obj)?;
            check_expr(index)
        }
        Expr::Member { obj, name } => {
            check_name(name)?;
            check_expr(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> CapabilitySet {
        CapabilitySet::standard()
    }

    #[test]
    fn compile_well_formed_template() {
        let unit = compile("import random\nx = random.randint(1, 6)", &caps()).unwrap();
        assert_eq!(unit.imports, vec!["random"]);
        assert_eq!(unit.program.len(), 2);
        assert!(unit.fingerprint.starts_with("blake3:"));
    }

    #[test]
    fn compile_empty_source_is_noop_unit() {
        let unit = compile("", &caps()).unwrap();
        assert!(unit.program.is_empty());
        assert!(unit.imports.is_empty());

        let unit = compile("   \n# only a comment\n", &caps()).unwrap();
        assert!(unit.program.is_empty());
    }

    #[test]
    fn compile_rejects_disallowed_import() {
        let err = compile("import os", &caps()).unwrap_err();
        let CompileError::Rejected { message } = err else { panic!("expected rejection") };
        assert!(message.contains("'os'"));
        assert!(message.contains("allowed modules"));
    }

    #[test]
    fn compile_rejects_nested_disallowed_import() {
        let err = compile("fn f() {\n  import subprocess\n}", &caps()).unwrap_err();
        assert!(matches!(err, CompileError::Rejected { .. }));
    }

    #[test]
    fn compile_rejects_underscore_names() {
        for src in ["_x = 1", "x = _y", "fn _f() { return 1 }", "fn f(_a) { return 1 }", "x = a._b"] {
            let err = compile(src, &caps()).unwrap_err();
            assert!(
                matches!(err, CompileError::Rejected { .. }),
                "{:?} should be rejected, got {:?}",
                src,
                err
            );
        }
    }

    #[test]
    fn compile_syntax_error_is_not_rejection() {
        let err = compile("x = (", &caps()).unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
    }

    #[test]
    fn compile_dedupes_imports() {
        let unit = compile("import math\nimport math", &caps()).unwrap();
        assert_eq!(unit.imports, vec!["math"]);
    }

    #[test]
    fn validate_syntax_ok_and_error() {
        assert!(validate_syntax("answer = 1").is_ok());
        assert!(validate_syntax("").is_ok());
        let d = validate_syntax("if x {").unwrap_err();
        assert!(!d.message.is_empty());
    }

    #[test]
    fn validate_syntax_idempotent() {
        let src = "fn f( {";
        let a = validate_syntax(src).unwrap_err();
        let b = validate_syntax(src).unwrap_err();
        assert_eq!(a, b, "identical input must yield the identical diagnostic");
    }

    #[test]
    fn validate_syntax_does_not_apply_capability_policy() {
        // Syntax-only check: a policy violation still parses.
        assert!(validate_syntax("import os").is_ok());
    }

    #[test]
    fn compile_idempotent() {
        let src = "import random\nx = random.randint(1, 6)";
        let a = compile(src, &caps()).unwrap();
        let b = compile(src, &caps()).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.program, b.program);
        assert_eq!(a.imports, b.imports);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn validate_syntax_never_panics(source in "\\PC*") {
            let _ = validate_syntax(&source);
        }

        #[test]
        fn validate_syntax_idempotent(source in "\\PC*") {
            prop_assert_eq!(validate_syntax(&source), validate_syntax(&source));
        }

        #[test]
        fn simple_assignments_always_valid(
            // 'q' prefix keeps generated names clear of keywords
            name in "q[a-z0-9]{0,8}",
            value in -1_000_000i64..1_000_000,
        ) {
            let source = format!("{} = {}", name, value);
            prop_assert!(validate_syntax(&source).is_ok());
        }
    }
}
