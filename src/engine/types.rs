//! Shared types for the template engine.
//!
//! Defines the script AST, runtime values, compiled units, execution
//! outcomes, the validated question payload, engine errors, and the engine
//! configuration. Payload types derive Serialize/Deserialize and JsonSchema.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Syntax diagnostics
// ============================================================================

/// A syntax-level diagnostic: the template never compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxDiagnostic {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

// ============================================================================
// Engine errors
// ============================================================================

/// Classified failure of one engine call.
///
/// Syntax and CompileRejected never executed and are safe to show the
/// template author. ContractViolation ran but produced the wrong shape.
/// Execution is a runtime failure inside otherwise legal code. Timeout is
/// classified separately because the fix (bound loops) differs from a logic
/// fix.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Syntax(SyntaxDiagnostic),
    CompileRejected { message: String },
    ContractViolation { message: String },
    Execution { message: String },
    Timeout { elapsed: Duration },
}

impl EngineError {
    /// Stable lowercase tag for trace events and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "syntax_error",
            Self::CompileRejected { .. } => "compile_rejected",
            Self::ContractViolation { .. } => "contract_violation",
            Self::Execution { .. } => "execution_error",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(d) => write!(f, "syntax error: {}", d),
            Self::CompileRejected { message } => write!(f, "compile rejected: {}", message),
            Self::ContractViolation { message } => write!(f, "contract violation: {}", message),
            Self::Execution { message } => write!(f, "execution error: {}", message),
            Self::Timeout { elapsed } => {
                write!(f, "timeout after {:.3}s", elapsed.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for EngineError {}

// ============================================================================
// Script AST
// ============================================================================

/// A user-defined function bound in the namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Assignment target: a plain name or a subscript slot.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index { obj: Expr, index: Expr },
}

/// One statement of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: AssignTarget, value: Expr },
    AugAssign { target: AssignTarget, op: BinOp, value: Expr },
    If { branches: Vec<(Expr, Vec<Stmt>)>, else_body: Option<Vec<Stmt>> },
    While { cond: Expr, body: Vec<Stmt> },
    For { var: String, iter: Expr, body: Vec<Stmt> },
    FuncDef(Arc<Function>),
    Return(Option<Expr>),
    Break,
    Continue,
    Import(String),
}

/// One expression of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    Ident(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Logic { op: LogicOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, operand: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { obj: Box<Expr>, index: Box<Expr> },
    Member { obj: Box<Expr>, name: String },
}

/// Binary operators (arithmetic and comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Short-circuit logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

// ============================================================================
// Runtime values
// ============================================================================

/// Recursion bound for walking runtime data (display, equality, JSON
/// conversion). Templates can build arbitrarily deep or even cyclic
/// structures at runtime; walks must terminate instead of taking out the
/// host stack.
const MAX_DATA_DEPTH: usize = 32;

/// A runtime value. Lists and maps are shared mutable cells so that
/// in-place methods (append, shuffle) behave like the scripting languages
/// template authors know. Values never leave the worker thread; payloads
/// crossing back to the caller are converted to plain data first.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<IndexMap<String, Value>>>),
    Range { start: i64, stop: i64, step: i64 },
    Func(Arc<Function>),
    Builtin(&'static str),
    Module(&'static str),
    ModuleFn(&'static str, &'static str),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    /// The type name shown in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Range { .. } => "range",
            Self::Func(_) => "function",
            Self::Builtin(_) => "builtin",
            Self::Module(_) => "module",
            Self::ModuleFn(..) => "function",
        }
    }

    /// Truthiness: none, false, zero, and empty strings/collections are
    /// false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Map(entries) => !entries.borrow().is_empty(),
            Self::Range { start, stop, step } => {
                if *step >= 0 { start < stop } else { start > stop }
            }
            Self::Func(_) | Self::Builtin(_) | Self::Module(_) | Self::ModuleFn(..) => true,
        }
    }

    /// Convert to plain JSON data. Functions and modules have no data
    /// representation and yield None, as do structures nested past the
    /// data-depth bound; non-finite floats map to null.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.to_json_depth(MAX_DATA_DEPTH)
    }

    fn to_json_depth(&self, depth: usize) -> Option<serde_json::Value> {
        match self {
            Self::None => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Self::Int(n) => Some(serde_json::Value::from(*n)),
            Self::Float(x) => Some(
                serde_json::Number::from_f64(*x)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            ),
            Self::Str(s) => Some(serde_json::Value::String(s.clone())),
            Self::List(items) => {
                let depth = depth.checked_sub(1)?;
                let mut out = Vec::new();
                for v in items.borrow().iter() {
                    out.push(v.to_json_depth(depth)?);
                }
                Some(serde_json::Value::Array(out))
            }
            Self::Map(entries) => {
                let depth = depth.checked_sub(1)?;
                let mut out = serde_json::Map::new();
                for (k, v) in entries.borrow().iter() {
                    out.insert(k.clone(), v.to_json_depth(depth)?);
                }
                Some(serde_json::Value::Object(out))
            }
            Self::Range { start, stop, step } => {
                let mut out = Vec::new();
                let mut i = *start;
                while (*step >= 0 && i < *stop) || (*step < 0 && i > *stop) {
                    out.push(serde_json::Value::from(i));
                    i += *step;
                }
                Some(serde_json::Value::Array(out))
            }
            Self::Func(_) | Self::Builtin(_) | Self::Module(_) | Self::ModuleFn(..) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other, MAX_DATA_DEPTH)
    }
}

/// Structural equality with a depth bound; structures nested past the
/// bound (including cycles) compare unequal rather than recursing forever.
fn value_eq(lhs: &Value, rhs: &Value, depth: usize) -> bool {
    match (lhs, rhs) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let Some(depth) = depth.checked_sub(1) else { return false };
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| value_eq(x, y, depth))
        }
        (Value::Map(a), Value::Map(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let Some(depth) = depth.checked_sub(1) else { return false };
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| value_eq(x, y, depth)))
        }
        (
            Value::Range { start: a1, stop: a2, step: a3 },
            Value::Range { start: b1, stop: b2, step: b3 },
        ) => a1 == b1 && a2 == b2 && a3 == b3,
        (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Module(a), Value::Module(b)) => a == b,
        (Value::ModuleFn(am, af), Value::ModuleFn(bm, bf)) => am == bm && af == bf,
        _ => false,
    }
}

impl fmt::Display for Value {
    /// The `str()` form: strings bare, collections in literal notation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, MAX_DATA_DEPTH)
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, v: &Value, depth: usize) -> fmt::Result {
    match v {
        Value::None => write!(f, "none"),
        Value::Bool(b) => write!(f, "{}", b),
        Value::Int(n) => write!(f, "{}", n),
        Value::Float(x) => write!(f, "{}", x),
        Value::Str(s) => write!(f, "{}", s),
        Value::List(items) => {
            let Some(depth) = depth.checked_sub(1) else { return write!(f, "[...]") };
            write!(f, "[")?;
            for (i, v) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_repr(f, v, depth)?;
            }
            write!(f, "]")
        }
        Value::Map(entries) => {
            let Some(depth) = depth.checked_sub(1) else { return write!(f, "{{...}}") };
            write!(f, "{{")?;
            for (i, (k, v)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}: ", k)?;
                write_repr(f, v, depth)?;
            }
            write!(f, "}}")
        }
        Value::Range { start, stop, step } => {
            if *step == 1 {
                write!(f, "range({}, {})", start, stop)
            } else {
                write!(f, "range({}, {}, {})", start, stop, step)
            }
        }
        Value::Func(func) => write!(f, "<function {}>", func.name),
        Value::Builtin(name) => write!(f, "<builtin {}>", name),
        Value::Module(name) => write!(f, "<module {}>", name),
        Value::ModuleFn(module, name) => write!(f, "<function {}.{}>", module, name),
    }
}

/// Inside collections, strings print quoted so `["a", "b"]` round-trips
/// visually.
fn write_repr(f: &mut fmt::Formatter<'_>, v: &Value, depth: usize) -> fmt::Result {
    match v {
        Value::Str(s) => write!(f, "{:?}", s),
        other => write_value(f, other, depth),
    }
}

/// The per-attempt name-to-value mapping (order-preserving).
pub type Namespace = IndexMap<String, Value>;

// ============================================================================
// Compiled unit
// ============================================================================

/// The restricted-compiled, not-yet-executed form of a template. Owned by
/// the attempt that produced it and never cached: templates embed randomness
/// and are meant to be re-rolled each call.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Parsed program.
    pub program: Vec<Stmt>,

    /// Modules the template imports (already allowlist-checked).
    pub imports: Vec<String>,

    /// BLAKE3 fingerprint of the source, `"blake3:{hex}"`.
    pub fingerprint: String,
}

// ============================================================================
// Execution outcome
// ============================================================================

/// Tagged result of one execution attempt, consumed immediately by the
/// calling adapter.
#[derive(Debug)]
pub enum Outcome {
    Success(Namespace),
    Error(String),
    Timeout(Duration),
}

// ============================================================================
// Question payload
// ============================================================================

/// Validated generator output. `question` and `answer` are always present
/// and correctly typed once validation succeeds; absent optional fields are
/// omitted from serialization, never emitted as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionPayload {
    pub question: String,

    pub answer: Answer,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<IndexMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<QuestionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// A correct answer: string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Answer {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Question presentation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    FreeInput,
    ImageBased,
    CodeBased,
}

impl QuestionType {
    pub const ALL: [Self; 4] = [
        Self::MultipleChoice,
        Self::FreeInput,
        Self::ImageBased,
        Self::CodeBased,
    ];
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MultipleChoice => "multiple-choice",
            Self::FreeInput => "free-input",
            Self::ImageBased => "image-based",
            Self::CodeBased => "code-based",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple-choice" => Ok(Self::MultipleChoice),
            "free-input" => Ok(Self::FreeInput),
            "image-based" => Ok(Self::ImageBased),
            "code-based" => Ok(Self::CodeBased),
            other => Err(format!(
                "unknown question type '{}' (expected one of: multiple-choice, free-input, image-based, code-based)",
                other
            )),
        }
    }
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Deployment knobs for the engine. The deadline is not part of the
/// template contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock deadline per attempt, in seconds.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: f64,

    /// Interpreter reduction-step budget per attempt. Exhaustion is
    /// classified as a timeout.
    #[serde(default = "default_step_budget")]
    pub step_budget: u64,

    /// Maximum script call depth (host stack protection).
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Fixed RNG seed for deterministic generation (testing/replay).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: default_deadline_seconds(),
            step_budget: default_step_budget(),
            max_call_depth: default_max_call_depth(),
            seed: None,
        }
    }
}

fn default_deadline_seconds() -> f64 {
    5.0
}

fn default_step_budget() -> u64 {
    5_000_000
}

fn default_max_call_depth() -> usize {
    64
}

impl EngineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs_f64(self.deadline_seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_without_absent_optionals() {
        let p = QuestionPayload {
            question: "What is 2+2?".to_string(),
            answer: Answer::Text("4".to_string()),
            variables: None,
            options: None,
            question_type: None,
            topic: None,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"question":"What is 2+2?","answer":"4"}"#);
        assert!(!json.contains("null"));
    }

    #[test]
    fn payload_serializes_present_optionals() {
        let p = QuestionPayload {
            question: "Pick one".to_string(),
            answer: Answer::Int(3),
            variables: None,
            options: Some(vec!["1".to_string(), "3".to_string()]),
            question_type: Some(QuestionType::MultipleChoice),
            topic: Some("arithmetic".to_string()),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["answer"], 3);
        assert_eq!(json["type"], "multiple-choice");
        assert_eq!(json["options"][1], "3");
        assert_eq!(json["topic"], "arithmetic");
    }

    #[test]
    fn answer_untagged_roundtrip() {
        let a: Answer = serde_json::from_str("42").unwrap();
        assert_eq!(a, Answer::Int(42));
        let a: Answer = serde_json::from_str("2.5").unwrap();
        assert_eq!(a, Answer::Float(2.5));
        let a: Answer = serde_json::from_str(r#""23""#).unwrap();
        assert_eq!(a, Answer::Text("23".to_string()));
    }

    #[test]
    fn question_type_parse_and_display() {
        for qt in QuestionType::ALL {
            let parsed: QuestionType = qt.to_string().parse().unwrap();
            assert_eq!(parsed, qt);
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.deadline(), Duration::from_secs(5));
        assert_eq!(cfg.step_budget, 5_000_000);
        assert_eq!(cfg.max_call_depth, 64);
        assert!(cfg.seed.is_none());
    }

    #[test]
    fn config_from_yaml() {
        let cfg: EngineConfig = serde_yaml_ng::from_str("deadline_seconds: 1.5\nstep_budget: 1000\n").unwrap();
        assert_eq!(cfg.deadline(), Duration::from_millis(1500));
        assert_eq!(cfg.step_budget, 1000);
        assert_eq!(cfg.max_call_depth, 64);
    }

    #[test]
    fn value_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(!Value::Range { start: 3, stop: 3, step: 1 }.truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::Float(0.5).truthy());
        assert!(Value::Str("x".to_string()).truthy());
        assert!(Value::list(vec![Value::None]).truthy());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Str("hi".to_string()).to_string(), "hi");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        let xs = Value::list(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(xs.to_string(), r#"[1, "a"]"#);
        let mut entries = IndexMap::new();
        entries.insert("k".to_string(), Value::Int(1));
        assert_eq!(Value::map(entries).to_string(), r#"{"k": 1}"#);
    }

    #[test]
    fn value_numeric_cross_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_ne!(Value::Int(1), Value::Str("1".to_string()));
    }

    #[test]
    fn value_to_json_data_only() {
        let xs = Value::list(vec![Value::Int(1), Value::Bool(true)]);
        assert_eq!(xs.to_json().unwrap(), serde_json::json!([1, true]));
        assert!(Value::Builtin("len").to_json().is_none());
        assert_eq!(
            Value::Range { start: 0, stop: 3, step: 1 }.to_json().unwrap(),
            serde_json::json!([0, 1, 2])
        );
        assert_eq!(Value::Float(f64::NAN).to_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn cyclic_values_terminate_all_walks() {
        let cell = Value::list(vec![Value::Int(1)]);
        let Value::List(items) = &cell else { unreachable!() };
        items.borrow_mut().push(cell.clone());

        // Display truncates, JSON conversion declines, equality
        // short-circuits on identity.
        let rendered = cell.to_string();
        assert!(rendered.ends_with(']'));
        assert!(cell.to_json().is_none());
        assert_eq!(cell, cell.clone());
    }

    #[test]
    fn deeply_nested_values_are_bounded() {
        let mut v = Value::Int(0);
        for _ in 0..100 {
            v = Value::list(vec![v]);
        }
        assert!(v.to_json().is_none(), "past the data-depth bound");
        let _ = v.to_string();
        assert_ne!(v, Value::Int(0));
    }

    #[test]
    fn engine_error_display_and_kind() {
        let e = EngineError::Timeout { elapsed: Duration::from_millis(5250) };
        assert_eq!(e.to_string(), "timeout after 5.250s");
        assert_eq!(e.kind(), "timeout");

        let e = EngineError::Syntax(SyntaxDiagnostic {
            message: "unexpected token".to_string(),
            line: 3,
            column: 7,
        });
        assert!(e.to_string().contains("line 3, column 7"));
        assert_eq!(e.kind(), "syntax_error");
    }
}
