//! Guarded execution: per-attempt namespace plus the tree-walking
//! evaluator.
//!
//! The namespace is built fresh for every attempt and never reused, so no
//! capability or data leaks across unrelated templates. Every member
//! access, subscript, iteration, and in-place compound assignment is routed
//! through the [`CapabilitySet`](super::caps::CapabilitySet) guards — the
//! evaluator performs none of those primitives directly. Each evaluation
//! step decrements a reduction budget; exhaustion aborts cooperatively,
//! bounding CPU deterministically even for templates that never yield.

use super::caps::{self, CapabilitySet};
use super::types::{AssignTarget, Expr, LogicOp, Namespace, Stmt, UnOp, Value};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Per-attempt execution limits.
#[derive(Debug, Clone, Copy)]
pub struct ExecLimits {
    pub step_budget: u64,
    pub max_call_depth: usize,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A runtime failure inside the template (or a guard denial).
    Runtime(String),
    /// The reduction-step budget ran out.
    BudgetExhausted,
}

/// Non-local control flow during evaluation. Break/Continue/Return unwind
/// to their construct; Error and Budget unwind to the attempt boundary.
enum Signal {
    Error(String),
    Budget,
    Return(Value),
    Break,
    Continue,
}

impl Signal {
    fn err(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// One execution attempt over a fresh (or pipeline-shared) namespace.
pub struct Interp<'a> {
    caps: &'a CapabilitySet,
    limits: ExecLimits,
    steps: u64,
    call_depth: usize,
    rng: StdRng,
    globals: Namespace,
    locals: Vec<Namespace>,
}

impl<'a> Interp<'a> {
    /// Build the guarded namespace for one attempt. `initial` carries
    /// bindings from earlier pipeline fragments and is empty otherwise.
    pub fn new(
        caps: &'a CapabilitySet,
        limits: ExecLimits,
        seed: Option<u64>,
        initial: Namespace,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            caps,
            limits,
            steps: 0,
            call_depth: 0,
            rng,
            globals: initial,
            locals: Vec::new(),
        }
    }

    /// Execute a program to completion. The namespace (and the RNG and
    /// budget position) stay live for a follow-up entry-point call.
    pub fn run(&mut self, program: &[Stmt]) -> Result<(), ExecError> {
        for stmt in program {
            match self.exec(stmt) {
                Ok(()) => {}
                Err(Signal::Error(message)) => return Err(ExecError::Runtime(message)),
                Err(Signal::Budget) => return Err(ExecError::BudgetExhausted),
                Err(Signal::Return(_)) => {
                    return Err(ExecError::Runtime("'return' outside a function".to_string()));
                }
                Err(Signal::Break) => {
                    return Err(ExecError::Runtime("'break' outside a loop".to_string()));
                }
                Err(Signal::Continue) => {
                    return Err(ExecError::Runtime("'continue' outside a loop".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Call a function the program bound, continuing on the same budget and
    /// RNG. Used by the contract adapters for entry-point conventions.
    pub fn call_entry(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
        let func = match self.globals.get(name) {
            Some(Value::Func(func)) => func.clone(),
            _ => {
                return Err(ExecError::Runtime(format!("'{}' is not a function", name)));
            }
        };
        match self.call_function(&func, args) {
            Ok(v) => Ok(v),
            Err(Signal::Error(message)) => Err(ExecError::Runtime(message)),
            Err(Signal::Budget) => Err(ExecError::BudgetExhausted),
            Err(_) => Err(ExecError::Runtime("stray control flow".to_string())),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.globals
    }

    pub fn into_namespace(self) -> Namespace {
        self.globals
    }

    fn step(&mut self) -> Result<(), Signal> {
        self.steps += 1;
        if self.steps > self.limits.step_budget {
            Err(Signal::Budget)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(locals) = self.locals.last() {
            if let Some(v) = locals.get(name) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Some(v.clone());
        }
        if self.caps.has_builtin(name) {
            // Borrow the 'static key through the set.
            return Some(Value::Builtin(builtin_key(self.caps, name)));
        }
        None
    }

    fn bind(&mut self, name: &str, value: Value) {
        let scope = self.locals.last_mut().unwrap_or(&mut self.globals);
        scope.insert(name.to_string(), value);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec(&mut self, stmt: &Stmt) -> Result<(), Signal> {
        self.step()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)
            }
            Stmt::AugAssign { target, op, value } => {
                let operand = self.eval(value)?;
                match target {
                    AssignTarget::Name(name) => {
                        let current = self
                            .lookup(name)
                            .ok_or_else(|| Signal::err(format!("name '{}' is not defined", name)))?;
                        let updated =
                            self.caps.inplace(*op, &current, &operand).map_err(Signal::Error)?;
                        self.bind(name, updated);
                        Ok(())
                    }
                    AssignTarget::Index { obj, index } => {
                        let obj = self.eval(obj)?;
                        let index = self.eval(index)?;
                        let current = self.caps.index(&obj, &index).map_err(Signal::Error)?;
                        let updated =
                            self.caps.inplace(*op, &current, &operand).map_err(Signal::Error)?;
                        self.caps.index_set(&obj, &index, updated).map_err(Signal::Error)
                    }
                }
            }
            Stmt::If { branches, else_body } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = else_body {
                    return self.exec_block(body);
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.exec_block(body) {
                        Ok(()) | Err(Signal::Continue) => {}
                        Err(Signal::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::For { var, iter, body } => {
                let source = self.eval(iter)?;
                let source = self.caps.iterate(&source).map_err(Signal::Error)?;
                for item in source.into_iter() {
                    self.step()?;
                    self.bind(var, item);
                    match self.exec_block(body) {
                        Ok(()) | Err(Signal::Continue) => {}
                        Err(Signal::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
                Ok(())
            }
            Stmt::FuncDef(func) => {
                self.bind(&func.name, Value::Func(func.clone()));
                Ok(())
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Err(Signal::Return(value))
            }
            Stmt::Break => Err(Signal::Break),
            Stmt::Continue => Err(Signal::Continue),
            Stmt::Import(name) => match self.caps.module_key(name) {
                Some(key) => {
                    self.bind(name, Value::Module(key));
                    Ok(())
                }
                None => Err(Signal::err(format!("'{}' is not an allowed module", name))),
            },
        }
    }

    fn exec_block(&mut self, body: &[Stmt]) -> Result<(), Signal> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<(), Signal> {
        match target {
            AssignTarget::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            AssignTarget::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.caps.index_set(&obj, &index, value).map_err(Signal::Error)
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval(&mut self, expr: &Expr) -> Result<Value, Signal> {
        self.step()?;
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::Ident(name) => self
                .lookup(name)
                .ok_or_else(|| Signal::err(format!("name '{}' is not defined", name))),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::list(out))
            }
            Expr::Map(entries) => {
                let mut out = indexmap::IndexMap::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::map(out))
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                caps::binary(*op, &lhs, &rhs).map_err(Signal::Error)
            }
            Expr::Logic { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                match op {
                    LogicOp::And if !lhs.truthy() => Ok(lhs),
                    LogicOp::Or if lhs.truthy() => Ok(lhs),
                    _ => self.eval(rhs),
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!operand.truthy())),
                    UnOp::Neg => match operand {
                        Value::Int(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| Signal::err("integer overflow")),
                        Value::Float(x) => Ok(Value::Float(-x)),
                        other => {
                            Err(Signal::err(format!("cannot negate {}", other.type_name())))
                        }
                    },
                }
            }
            Expr::Index { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                self.caps.index(&obj, &index).map_err(Signal::Error)
            }
            Expr::Member { obj, name } => {
                let obj = self.eval(obj)?;
                self.caps.attr(&obj, name).map_err(Signal::Error)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, Signal> {
        // Method-call form: receiver.name(args). Module members fall
        // through to ordinary call dispatch via the attr guard.
        if let Expr::Member { obj, name } = callee {
            let recv = self.eval(obj)?;
            if !matches!(recv, Value::Module(_)) {
                let args = self.eval_args(args)?;
                return self.caps.call_method(&recv, name, &args).map_err(Signal::Error);
            }
            let target = self.caps.attr(&recv, name).map_err(Signal::Error)?;
            let args = self.eval_args(args)?;
            return self.call_value(target, args);
        }

        let target = self.eval(callee)?;
        let args = self.eval_args(args)?;
        self.call_value(target, args)
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, Signal> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.eval(arg)?);
        }
        Ok(out)
    }

    fn call_value(&mut self, target: Value, args: Vec<Value>) -> Result<Value, Signal> {
        match target {
            Value::Func(func) => self.call_function(&func, args),
            Value::Builtin(name) => self.caps.call_builtin(name, &args).map_err(Signal::Error),
            Value::ModuleFn(module, name) => self
                .caps
                .call_module_fn(module, name, &mut self.rng, &args)
                .map_err(Signal::Error),
            other => Err(Signal::err(format!("{} is not callable", other.type_name()))),
        }
    }

    fn call_function(
        &mut self,
        func: &super::types::Function,
        args: Vec<Value>,
    ) -> Result<Value, Signal> {
        if args.len() != func.params.len() {
            return Err(Signal::err(format!(
                "{}() takes {} argument(s), got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }
        if self.call_depth >= self.limits.max_call_depth {
            return Err(Signal::err(format!(
                "call depth exceeds the limit of {}",
                self.limits.max_call_depth
            )));
        }

        let mut locals = Namespace::new();
        for (param, arg) in func.params.iter().zip(args) {
            locals.insert(param.clone(), arg);
        }
        self.locals.push(locals);
        self.call_depth += 1;

        let mut result = Ok(Value::None);
        for stmt in &func.body {
            match self.exec(stmt) {
                Ok(()) => {}
                Err(Signal::Return(v)) => {
                    result = Ok(v);
                    break;
                }
                Err(other) => {
                    result = Err(other);
                    break;
                }
            }
        }

        self.call_depth -= 1;
        self.locals.pop();
        result
    }
}

/// Re-borrow a builtin name as its 'static table key.
fn builtin_key(caps: &CapabilitySet, name: &str) -> &'static str {
    caps.builtin_key(name).expect("checked by has_builtin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::parse_source;

    const LIMITS: ExecLimits = ExecLimits { step_budget: 100_000, max_call_depth: 16 };

    fn run_src(src: &str) -> Result<Namespace, ExecError> {
        let caps = CapabilitySet::standard();
        let program = parse_source(src).unwrap();
        let mut interp = Interp::new(&caps, LIMITS, Some(99), Namespace::new());
        interp.run(&program)?;
        Ok(interp.into_namespace())
    }

    fn get(ns: &Namespace, name: &str) -> Value {
        ns.get(name).cloned().unwrap_or_else(|| panic!("'{}' not bound", name))
    }

    #[test]
    fn arithmetic_and_bindings() {
        let ns = run_src("a = 2 + 3 * 4\nb = (2 + 3) * 4\nc = 7 / 2\nd = \"x\" + \"y\"").unwrap();
        assert_eq!(get(&ns, "a"), Value::Int(14));
        assert_eq!(get(&ns, "b"), Value::Int(20));
        assert_eq!(get(&ns, "c"), Value::Float(3.5));
        assert_eq!(get(&ns, "d"), Value::Str("xy".to_string()));
    }

    #[test]
    fn for_loop_accumulates() {
        let ns = run_src("total = 0\nfor i in range(1, 11) {\n  total += i\n}").unwrap();
        assert_eq!(get(&ns, "total"), Value::Int(55));
    }

    #[test]
    fn while_with_break_and_continue() {
        let src = "n = 0\nodd = 0\nwhile true {\n  n += 1\n  if n > 10 { break }\n  if n % 2 == 0 { continue }\n  odd += n\n}";
        let ns = run_src(src).unwrap();
        assert_eq!(get(&ns, "odd"), Value::Int(25));
    }

    #[test]
    fn function_call_and_scoping() {
        let src = "fn double(x) {\n  tmp = x * 2\n  return tmp\n}\nresult = double(21)";
        let ns = run_src(src).unwrap();
        assert_eq!(get(&ns, "result"), Value::Int(42));
        assert!(ns.get("tmp").is_none(), "locals must not leak into the namespace");
        assert!(ns.get("x").is_none());
    }

    #[test]
    fn function_reads_globals() {
        let src = "base = 10\nfn shifted(x) { return base + x }\ny = shifted(5)";
        let ns = run_src(src).unwrap();
        assert_eq!(get(&ns, "y"), Value::Int(15));
    }

    #[test]
    fn recursion_depth_limited() {
        let err = run_src("fn f(n) { return f(n + 1) }\nf(0)").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("call depth"));
    }

    #[test]
    fn infinite_loop_hits_budget() {
        let err = run_src("while true { x = 1 }").unwrap_err();
        assert_eq!(err, ExecError::BudgetExhausted);
    }

    #[test]
    fn undefined_name() {
        let err = run_src("x = nope + 1").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("'nope'"));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let err = run_src("x = 1 / 0").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("division by zero"));
    }

    #[test]
    fn import_and_seeded_random() {
        let src = "import random\na = random.randint(1, 1000000)";
        let a1 = get(&run_src(src).unwrap(), "a");
        let a2 = get(&run_src(src).unwrap(), "a");
        assert_eq!(a1, a2, "same seed, same draw");
    }

    #[test]
    fn import_disallowed_module_fails_at_runtime() {
        // The compiler rejects this earlier; the namespace still refuses.
        let err = run_src("import os").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("not an allowed module"));
    }

    #[test]
    fn guarded_member_access() {
        let err = run_src("x = (5).bits").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("no member"));

        let ns = run_src("import math\np = math.pi").unwrap();
        assert_eq!(get(&ns, "p"), Value::Float(std::f64::consts::PI));
    }

    #[test]
    fn method_calls_mutate_shared_list() {
        let src = "xs = [3, 1]\nxs.append(2)\nxs.sort()\nfirst = xs[0]\nn = len(xs)";
        let ns = run_src(src).unwrap();
        assert_eq!(get(&ns, "first"), Value::Int(1));
        assert_eq!(get(&ns, "n"), Value::Int(3));
        assert_eq!(get(&ns, "xs").to_string(), "[1, 2, 3]");
    }

    #[test]
    fn subscript_assignment_and_augassign() {
        let src = "xs = [1, 2, 3]\nxs[0] = 10\nxs[1] += 5\nm = {\"k\": 1}\nm[\"k\"] += 1\nm[\"new\"] = true";
        let ns = run_src(src).unwrap();
        assert_eq!(get(&ns, "xs").to_string(), "[10, 7, 3]");
        assert_eq!(get(&ns, "m").to_string(), r#"{"k": 2, "new": true}"#);
    }

    #[test]
    fn logic_short_circuits() {
        // The right side would raise if evaluated.
        let ns = run_src("a = false and missing\nb = true or missing").unwrap();
        assert_eq!(get(&ns, "a"), Value::Bool(false));
        assert_eq!(get(&ns, "b"), Value::Bool(true));
    }

    #[test]
    fn logic_returns_operand_values() {
        let ns = run_src("x = none or \"fallback\"\ny = 1 and 2").unwrap();
        assert_eq!(get(&ns, "x"), Value::Str("fallback".to_string()));
        assert_eq!(get(&ns, "y"), Value::Int(2));
    }

    #[test]
    fn return_outside_function() {
        let err = run_src("return 1").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("outside a function"));
    }

    #[test]
    fn break_outside_loop() {
        let err = run_src("break").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("outside a loop"));
    }

    #[test]
    fn builtins_are_first_class_but_shadowable() {
        let ns = run_src("measure = len\nn = measure(\"abc\")").unwrap();
        assert_eq!(get(&ns, "n"), Value::Int(3));

        let err = run_src("len = 5\nx = len(\"abc\")").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("not callable"));
    }

    #[test]
    fn call_entry_continues_attempt() {
        let caps = CapabilitySet::standard();
        let program = parse_source("fn add(a, b) { return a + b }").unwrap();
        let mut interp = Interp::new(&caps, LIMITS, None, Namespace::new());
        interp.run(&program).unwrap();
        let result = interp.call_entry("add", vec![Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn call_entry_missing_function() {
        let caps = CapabilitySet::standard();
        let mut interp = Interp::new(&caps, LIMITS, None, Namespace::new());
        let err = interp.call_entry("validate", vec![]).unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("not a function"));
    }

    #[test]
    fn pipeline_namespace_carries_forward() {
        let caps = CapabilitySet::standard();
        let first = parse_source("base = 20").unwrap();
        let mut interp = Interp::new(&caps, LIMITS, None, Namespace::new());
        interp.run(&first).unwrap();
        let ns = interp.into_namespace();

        let second = parse_source("answer = base + 3").unwrap();
        let mut interp = Interp::new(&caps, LIMITS, None, ns);
        interp.run(&second).unwrap();
        assert_eq!(interp.namespace().get("answer"), Some(&Value::Int(23)));
    }

    #[test]
    fn wrong_arity_user_function() {
        let err = run_src("fn f(a) { return a }\nf(1, 2)").unwrap_err();
        let ExecError::Runtime(message) = err else { panic!("expected runtime error") };
        assert!(message.contains("takes 1 argument"));
    }
}
