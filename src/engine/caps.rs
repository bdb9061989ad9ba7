//! Capability allowlist — the single source of truth for what a template
//! may touch.
//!
//! Holds the safe builtin table, the importable pseudo-modules (`random`,
//! `math`), and the guarded wrappers for the four operations a runtime
//! would otherwise perform unchecked: member access, subscript access,
//! iteration, and in-place compound assignment. The interpreter has no path
//! to these primitives except through this type, and the set is passed
//! explicitly into the compiler and namespace constructors rather than
//! living as a module-level singleton.

use super::types::Value;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashMap;

type BuiltinFn = fn(&[Value]) -> Result<Value, String>;
type ModuleFn = fn(&mut StdRng, &[Value]) -> Result<Value, String>;

/// One importable pseudo-module: pure functions plus numeric constants.
/// Values stay out of this table so the set is Send + Sync and can be
/// shared with worker threads.
struct ModuleDef {
    functions: FxHashMap<&'static str, ModuleFn>,
    constants: FxHashMap<&'static str, f64>,
}

/// The fixed, read-only capability table. Construct once, share by
/// reference across attempts.
pub struct CapabilitySet {
    builtins: FxHashMap<&'static str, BuiltinFn>,
    modules: FxHashMap<&'static str, ModuleDef>,
}

/// What a `for` loop walks over, produced only by the iteration guard.
pub enum IterSource {
    Items(Vec<Value>),
    Range { start: i64, stop: i64, step: i64 },
}

impl IterSource {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Value>> {
        match self {
            Self::Items(items) => Box::new(items.into_iter()),
            Self::Range { start, stop, step } => Box::new(RangeIter { next: start, stop, step }),
        }
    }
}

struct RangeIter {
    next: i64,
    stop: i64,
    step: i64,
}

impl Iterator for RangeIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let live = if self.step >= 0 { self.next < self.stop } else { self.next > self.stop };
        if !live {
            return None;
        }
        let v = self.next;
        self.next = self.next.checked_add(self.step)?;
        Some(Value::Int(v))
    }
}

impl CapabilitySet {
    /// The standard deployment tier: safe builtins, `random`, and `math`.
    pub fn standard() -> Self {
        let mut builtins: FxHashMap<&'static str, BuiltinFn> = FxHashMap::default();
        builtins.insert("len", builtin_len);
        builtins.insert("str", builtin_str);
        builtins.insert("int", builtin_int);
        builtins.insert("float", builtin_float);
        builtins.insert("bool", builtin_bool);
        builtins.insert("abs", builtin_abs);
        builtins.insert("min", builtin_min);
        builtins.insert("max", builtin_max);
        builtins.insert("round", builtin_round);
        builtins.insert("sum", builtin_sum);
        builtins.insert("range", builtin_range);
        builtins.insert("sorted", builtin_sorted);
        builtins.insert("attrs", builtin_attrs);
        builtins.insert("has_attr", builtin_has_attr);

        let mut modules = FxHashMap::default();
        modules.insert("random", random_module());
        modules.insert("math", math_module());

        Self { builtins, modules }
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// The 'static key for a builtin, used to hand out first-class handles.
    pub fn builtin_key(&self, name: &str) -> Option<&'static str> {
        self.builtins.get_key_value(name).map(|(k, _)| *k)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// The 'static key for an allowed module, used to bind `import` results.
    pub fn module_key(&self, name: &str) -> Option<&'static str> {
        self.modules.get_key_value(name).map(|(k, _)| *k)
    }

    pub fn call_builtin(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let f = self
            .builtins
            .get(name)
            .ok_or_else(|| format!("'{}' is not an allowed builtin", name))?;
        f(args)
    }

    pub fn call_module_fn(
        &self,
        module: &str,
        name: &str,
        rng: &mut StdRng,
        args: &[Value],
    ) -> Result<Value, String> {
        let def = self
            .modules
            .get(module)
            .ok_or_else(|| format!("'{}' is not an allowed module", module))?;
        let f = def
            .functions
            .get(name)
            .ok_or_else(|| format!("module '{}' has no function '{}'", module, name))?;
        f(rng, args)
    }

    // ------------------------------------------------------------------
    // Guarded operations
    // ------------------------------------------------------------------

    /// Member access guard. Resolves module constants and module function
    /// handles; data-type methods are callable only (see `call_method`).
    pub fn attr(&self, value: &Value, name: &str) -> Result<Value, String> {
        deny_underscore(name)?;
        match value {
            Value::Module(module) => {
                let module: &'static str = module;
                let def = self
                    .modules
                    .get(module)
                    .ok_or_else(|| format!("'{}' is not an allowed module", module))?;
                if let Some(v) = def.constants.get(name) {
                    return Ok(Value::Float(*v));
                }
                // Table keys are 'static; re-borrow the caller's transient name.
                if let Some((&fname, _)) = def.functions.get_key_value(name) {
                    return Ok(Value::ModuleFn(module, fname));
                }
                Err(format!("module '{}' has no member '{}'", module, name))
            }
            other => {
                if method_names(other).iter().any(|m| *m == name) {
                    Err(format!("method '{}' on {} must be called", name, other.type_name()))
                } else {
                    Err(format!("{} has no member '{}'", other.type_name(), name))
                }
            }
        }
    }

    /// Method-call guard for the data types. The per-type tables below are
    /// the complete surface; anything else is denied.
    pub fn call_method(
        &self,
        recv: &Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value, String> {
        deny_underscore(name)?;
        match recv {
            Value::Str(s) => str_method(s, name, args),
            Value::List(items) => list_method(items, name, args),
            Value::Map(entries) => map_method(entries, name, args),
            other => Err(format!("{} has no methods", other.type_name())),
        }
    }

    /// Subscript read guard.
    pub fn index(&self, obj: &Value, index: &Value) -> Result<Value, String> {
        match (obj, index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.borrow();
                let idx = resolve_index(*i, items.len())
                    .ok_or_else(|| format!("list index {} out of range (len {})", i, items.len()))?;
                Ok(items[idx].clone())
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = resolve_index(*i, chars.len())
                    .ok_or_else(|| format!("string index {} out of range (len {})", i, chars.len()))?;
                Ok(Value::Str(chars[idx].to_string()))
            }
            (Value::Map(entries), Value::Str(key)) => entries
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| format!("key '{}' not found", key)),
            (Value::Map(_), other) => {
                Err(format!("map keys are strings, not {}", other.type_name()))
            }
            (obj, index) => Err(format!(
                "cannot index {} with {}",
                obj.type_name(),
                index.type_name()
            )),
        }
    }

    /// Subscript write guard.
    pub fn index_set(&self, obj: &Value, index: &Value, value: Value) -> Result<(), String> {
        match (obj, index) {
            (Value::List(items), Value::Int(i)) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let idx = resolve_index(*i, len)
                    .ok_or_else(|| format!("list index {} out of range (len {})", i, len))?;
                items[idx] = value;
                Ok(())
            }
            (Value::Map(entries), Value::Str(key)) => {
                entries.borrow_mut().insert(key.clone(), value);
                Ok(())
            }
            (Value::Map(_), other) => {
                Err(format!("map keys are strings, not {}", other.type_name()))
            }
            (obj, index) => Err(format!(
                "cannot assign into {} with {} subscript",
                obj.type_name(),
                index.type_name()
            )),
        }
    }

    /// Iteration guard: only lists, maps (keys), strings (characters), and
    /// ranges are iterable.
    pub fn iterate(&self, value: &Value) -> Result<IterSource, String> {
        match value {
            Value::List(items) => Ok(IterSource::Items(items.borrow().clone())),
            Value::Map(entries) => Ok(IterSource::Items(
                entries.borrow().keys().map(|k| Value::Str(k.clone())).collect(),
            )),
            Value::Str(s) => {
                Ok(IterSource::Items(s.chars().map(|c| Value::Str(c.to_string())).collect()))
            }
            Value::Range { start, stop, step } => {
                Ok(IterSource::Range { start: *start, stop: *stop, step: *step })
            }
            other => Err(format!("{} is not iterable", other.type_name())),
        }
    }

    /// In-place compound assignment guard (`x += y` and friends).
    pub fn inplace(&self, op: super::types::BinOp, current: &Value, operand: &Value) -> Result<Value, String> {
        binary(op, current, operand)
    }
}

fn deny_underscore(name: &str) -> Result<(), String> {
    if name.starts_with('_') {
        Err(format!("member names beginning with '_' are not allowed ('{}')", name))
    } else {
        Ok(())
    }
}

/// Negative indices count from the end.
fn resolve_index(i: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if i < 0 { i + len } else { i };
    if (0..len).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

/// Inspectable member names per type, for the reflection builtins.
fn method_names(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Str(_) => &["endswith", "join", "lower", "replace", "split", "startswith", "strip", "upper"],
        Value::List(_) => &["append", "contains", "pop", "reverse", "sort"],
        Value::Map(_) => &["get", "has", "keys", "values"],
        _ => &[],
    }
}

// ============================================================================
// Value operations (arithmetic, comparison)
// ============================================================================

/// Evaluate a binary operator. Shared by plain expressions and the
/// in-place guard.
pub fn binary(op: super::types::BinOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    use super::types::BinOp::*;
    match op {
        Eq => Ok(Value::Bool(lhs == rhs)),
        Ne => Ok(Value::Bool(lhs != rhs)),
        Lt | Le | Gt | Ge => compare(op, lhs, rhs),
        Add => add(lhs, rhs),
        Sub => arith(op, lhs, rhs),
        Mul => mul(lhs, rhs),
        Div => div(lhs, rhs),
        Mod => rem(lhs, rhs),
    }
}

fn type_mismatch(op: super::types::BinOp, lhs: &Value, rhs: &Value) -> String {
    format!("unsupported operand types for '{}': {} and {}", op, lhs.type_name(), rhs.type_name())
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.borrow().clone();
            out.extend(b.borrow().iter().cloned());
            Ok(Value::list(out))
        }
        _ => arith(super::types::BinOp::Add, lhs, rhs),
    }
}

fn mul(lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
            if *n < 0 {
                Ok(Value::Str(String::new()))
            } else {
                Ok(Value::Str(s.repeat(*n as usize)))
            }
        }
        _ => arith(super::types::BinOp::Mul, lhs, rhs),
    }
}

fn div(lhs: &Value, rhs: &Value) -> Result<Value, String> {
    let (a, b) = both_floats(super::types::BinOp::Div, lhs, rhs)?;
    if b == 0.0 {
        return Err("division by zero".to_string());
    }
    Ok(Value::Float(a / b))
}

fn rem(lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                Err("modulo by zero".to_string())
            } else {
                Ok(Value::Int(a.rem_euclid(*b)))
            }
        }
        _ => {
            let (a, b) = both_floats(super::types::BinOp::Mod, lhs, rhs)?;
            if b == 0.0 {
                Err("modulo by zero".to_string())
            } else {
                Ok(Value::Float(a.rem_euclid(b)))
            }
        }
    }
}

/// Int-preserving subtraction/multiplication fallback for numeric pairs.
fn arith(op: super::types::BinOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    use super::types::BinOp::*;
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let out = match op {
            Add => a.checked_add(*b),
            Sub => a.checked_sub(*b),
            Mul => a.checked_mul(*b),
            _ => unreachable!("non-arithmetic op in arith"),
        };
        return out.map(Value::Int).ok_or_else(|| "integer overflow".to_string());
    }
    let (a, b) = both_floats(op, lhs, rhs)?;
    let out = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        _ => unreachable!("non-arithmetic op in arith"),
    };
    Ok(Value::Float(out))
}

fn both_floats(op: super::types::BinOp, lhs: &Value, rhs: &Value) -> Result<(f64, f64), String> {
    match (numeric(lhs), numeric(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(type_mismatch(op, lhs, rhs)),
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn compare(op: super::types::BinOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    use super::types::BinOp::*;
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            let (a, b) = both_floats(op, lhs, rhs)?;
            a.partial_cmp(&b)
                .ok_or_else(|| "cannot order nan".to_string())?
        }
    };
    let out = match op {
        Lt => ordering.is_lt(),
        Le => ordering.is_le(),
        Gt => ordering.is_gt(),
        Ge => ordering.is_ge(),
        _ => unreachable!("non-ordering op in compare"),
    };
    Ok(Value::Bool(out))
}

// ============================================================================
// Builtins
// ============================================================================

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!("{}() takes {} argument(s), got {}", name, expected, args.len()))
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, String> {
    arity("len", args, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count() as i64,
        Value::List(items) => items.borrow().len() as i64,
        Value::Map(entries) => entries.borrow().len() as i64,
        Value::Range { start, stop, step } => range_len(*start, *stop, *step),
        other => return Err(format!("len() does not apply to {}", other.type_name())),
    };
    Ok(Value::Int(n))
}

fn range_len(start: i64, stop: i64, step: i64) -> i64 {
    if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, String> {
    arity("str", args, 1)?;
    Ok(Value::Str(args[0].to_string()))
}

fn builtin_int(args: &[Value]) -> Result<Value, String> {
    arity("int", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => {
            if x.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&x.trunc()) {
                Ok(Value::Int(x.trunc() as i64))
            } else {
                Err(format!("cannot convert {} to int", x))
            }
        }
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("invalid integer literal '{}'", s)),
        other => Err(format!("int() does not apply to {}", other.type_name())),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value, String> {
    arity("float", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid float literal '{}'", s)),
        other => Err(format!("float() does not apply to {}", other.type_name())),
    }
}

fn builtin_bool(args: &[Value]) -> Result<Value, String> {
    arity("bool", args, 1)?;
    Ok(Value::Bool(args[0].truthy()))
}

fn builtin_abs(args: &[Value]) -> Result<Value, String> {
    arity("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(format!("abs() does not apply to {}", other.type_name())),
    }
}

/// min/max accept either one list or two-plus scalars.
fn extremum(name: &str, args: &[Value], want_max: bool) -> Result<Value, String> {
    let candidates: Vec<Value> = match args {
        [] => return Err(format!("{}() expects arguments", name)),
        [Value::List(items)] => {
            let items = items.borrow();
            if items.is_empty() {
                return Err(format!("{}() of an empty list", name));
            }
            items.clone()
        }
        [single] => return Err(format!("{}() does not apply to {}", name, single.type_name())),
        many => many.to_vec(),
    };
    let mut best = candidates[0].clone();
    for v in &candidates[1..] {
        let gt = compare(super::types::BinOp::Gt, v, &best)?;
        let replace = if want_max { gt.truthy() } else { !gt.truthy() && v != &best };
        if replace {
            best = v.clone();
        }
    }
    Ok(best)
}

fn builtin_min(args: &[Value]) -> Result<Value, String> {
    extremum("min", args, false)
}

fn builtin_max(args: &[Value]) -> Result<Value, String> {
    extremum("max", args, true)
}

fn builtin_round(args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Int(n)] => Ok(Value::Int(*n)),
        [Value::Float(x)] => {
            let r = x.round();
            if r.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&r) {
                Ok(Value::Int(r as i64))
            } else {
                Err(format!("cannot round {}", x))
            }
        }
        [Value::Float(x), Value::Int(digits)] => {
            let factor = 10f64.powi((*digits).clamp(-18, 18) as i32);
            Ok(Value::Float((x * factor).round() / factor))
        }
        [Value::Int(n), Value::Int(_)] => Ok(Value::Float(*n as f64)),
        _ => Err("round() takes a number and an optional digit count".to_string()),
    }
}

fn builtin_sum(args: &[Value]) -> Result<Value, String> {
    arity("sum", args, 1)?;
    let items: Vec<Value> = match &args[0] {
        Value::List(items) => items.borrow().clone(),
        Value::Range { start, stop, step } => {
            IterSource::Range { start: *start, stop: *stop, step: *step }.into_iter().collect()
        }
        other => return Err(format!("sum() does not apply to {}", other.type_name())),
    };
    let mut acc = Value::Int(0);
    for v in &items {
        acc = add(&acc, v)?;
    }
    Ok(acc)
}

fn builtin_range(args: &[Value]) -> Result<Value, String> {
    let as_i = |v: &Value| match v {
        Value::Int(n) => Ok(*n),
        other => Err(format!("range() expects integers, got {}", other.type_name())),
    };
    let (start, stop, step) = match args {
        [stop] => (0, as_i(stop)?, 1),
        [start, stop] => (as_i(start)?, as_i(stop)?, 1),
        [start, stop, step] => (as_i(start)?, as_i(stop)?, as_i(step)?),
        _ => return Err(format!("range() takes 1 to 3 arguments, got {}", args.len())),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }
    Ok(Value::Range { start, stop, step })
}

fn builtin_sorted(args: &[Value]) -> Result<Value, String> {
    let (source, reverse) = match args {
        [source] => (source, false),
        [source, Value::Bool(rev)] => (source, *rev),
        _ => return Err("sorted() takes a list and an optional reverse flag".to_string()),
    };
    let mut items: Vec<Value> = match source {
        Value::List(items) => items.borrow().clone(),
        Value::Range { start, stop, step } => {
            IterSource::Range { start: *start, stop: *stop, step: *step }.into_iter().collect()
        }
        other => return Err(format!("sorted() does not apply to {}", other.type_name())),
    };
    let mut failure = None;
    items.sort_by(|a, b| match compare(super::types::BinOp::Lt, a, b) {
        Ok(v) if v.truthy() => std::cmp::Ordering::Less,
        Ok(_) if a == b => std::cmp::Ordering::Equal,
        Ok(_) => std::cmp::Ordering::Greater,
        Err(e) => {
            failure.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if reverse {
        items.reverse();
    }
    Ok(Value::list(items))
}

fn builtin_attrs(args: &[Value]) -> Result<Value, String> {
    arity("attrs", args, 1)?;
    let names: Vec<&str> = match &args[0] {
        Value::Module(_) => {
            // Module members depend on the capability table; the
            // interpreter answers those through the attr guard. Here only
            // data types are inspectable.
            return Err("attrs() does not apply to modules; use the module directly".to_string());
        }
        other => method_names(other).to_vec(),
    };
    Ok(Value::list(names.into_iter().map(|n| Value::Str(n.to_string())).collect()))
}

fn builtin_has_attr(args: &[Value]) -> Result<Value, String> {
    arity("has_attr", args, 2)?;
    let Value::Str(name) = &args[1] else {
        return Err("has_attr() expects a string member name".to_string());
    };
    Ok(Value::Bool(method_names(&args[0]).iter().any(|m| *m == name)))
}

// ============================================================================
// Methods on str / list / map
// ============================================================================

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, String> {
    match name {
        "upper" => {
            arity("upper", args, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "lower" => {
            arity("lower", args, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "strip" => {
            arity("strip", args, 0)?;
            Ok(Value::Str(s.trim().to_string()))
        }
        "split" => match args {
            [] => Ok(Value::list(
                s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
            )),
            [Value::Str(sep)] if !sep.is_empty() => Ok(Value::list(
                s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect(),
            )),
            _ => Err("split() takes an optional non-empty string separator".to_string()),
        },
        "replace" => match args {
            [Value::Str(from), Value::Str(to)] => Ok(Value::Str(s.replace(from.as_str(), to))),
            _ => Err("replace() takes two strings".to_string()),
        },
        "join" => match args {
            [Value::List(items)] => {
                let mut parts = Vec::new();
                for v in items.borrow().iter() {
                    match v {
                        Value::Str(p) => parts.push(p.clone()),
                        other => {
                            return Err(format!("join() expects a list of strings, got {}", other.type_name()));
                        }
                    }
                }
                Ok(Value::Str(parts.join(s)))
            }
            _ => Err("join() takes a list of strings".to_string()),
        },
        "startswith" => match args {
            [Value::Str(prefix)] => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
            _ => Err("startswith() takes a string".to_string()),
        },
        "endswith" => match args {
            [Value::Str(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
            _ => Err("endswith() takes a string".to_string()),
        },
        other => Err(format!("str has no method '{}'", other)),
    }
}

fn list_method(
    items: &std::rc::Rc<std::cell::RefCell<Vec<Value>>>,
    name: &str,
    args: &[Value],
) -> Result<Value, String> {
    match name {
        "append" => {
            arity("append", args, 1)?;
            items.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }
        "pop" => match args {
            [] => items.borrow_mut().pop().ok_or_else(|| "pop from empty list".to_string()),
            [Value::Int(i)] => {
                let mut items = items.borrow_mut();
                let len = items.len();
                let idx = resolve_index(*i, len)
                    .ok_or_else(|| format!("list index {} out of range (len {})", i, len))?;
                Ok(items.remove(idx))
            }
            _ => Err("pop() takes an optional integer index".to_string()),
        },
        "contains" => {
            arity("contains", args, 1)?;
            Ok(Value::Bool(items.borrow().contains(&args[0])))
        }
        "reverse" => {
            arity("reverse", args, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            arity("sort", args, 0)?;
            let sorted = builtin_sorted(&[Value::List(items.clone())])?;
            if let Value::List(sorted) = sorted {
                *items.borrow_mut() = sorted.borrow().clone();
            }
            Ok(Value::None)
        }
        other => Err(format!("list has no method '{}'", other)),
    }
}

fn map_method(
    entries: &std::rc::Rc<std::cell::RefCell<IndexMap<String, Value>>>,
    name: &str,
    args: &[Value],
) -> Result<Value, String> {
    match name {
        "keys" => {
            arity("keys", args, 0)?;
            Ok(Value::list(entries.borrow().keys().map(|k| Value::Str(k.clone())).collect()))
        }
        "values" => {
            arity("values", args, 0)?;
            Ok(Value::list(entries.borrow().values().cloned().collect()))
        }
        "get" => match args {
            [Value::Str(key)] => {
                Ok(entries.borrow().get(key).cloned().unwrap_or(Value::None))
            }
            [Value::Str(key), default] => {
                Ok(entries.borrow().get(key).cloned().unwrap_or_else(|| default.clone()))
            }
            _ => Err("get() takes a string key and an optional default".to_string()),
        },
        "has" => match args {
            [Value::Str(key)] => Ok(Value::Bool(entries.borrow().contains_key(key))),
            _ => Err("has() takes a string key".to_string()),
        },
        other => Err(format!("map has no method '{}'", other)),
    }
}

// ============================================================================
// Modules: random, math
// ============================================================================

fn random_module() -> ModuleDef {
    let mut functions: FxHashMap<&'static str, ModuleFn> = FxHashMap::default();
    functions.insert("randint", random_randint);
    functions.insert("random", random_random);
    functions.insert("uniform", random_uniform);
    functions.insert("choice", random_choice);
    functions.insert("shuffle", random_shuffle);
    functions.insert("sample", random_sample);
    ModuleDef { functions, constants: FxHashMap::default() }
}

fn random_randint(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::Int(a), Value::Int(b)] if a <= b => Ok(Value::Int(rng.gen_range(*a..=*b))),
        [Value::Int(a), Value::Int(b)] => {
            Err(format!("randint({}, {}): lower bound exceeds upper bound", a, b))
        }
        _ => Err("randint() takes two integers".to_string()),
    }
}

fn random_random(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    arity("random", args, 0)?;
    Ok(Value::Float(rng.gen::<f64>()))
}

fn random_uniform(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    match (args.first().and_then(numeric), args.get(1).and_then(numeric)) {
        (Some(a), Some(b)) if args.len() == 2 => {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if lo == hi {
                return Ok(Value::Float(lo));
            }
            Ok(Value::Float(rng.gen_range(lo..=hi)))
        }
        _ => Err("uniform() takes two numbers".to_string()),
    }
}

fn random_choice(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    arity("choice", args, 1)?;
    match &args[0] {
        Value::List(items) => {
            let items = items.borrow();
            items
                .choose(rng)
                .cloned()
                .ok_or_else(|| "choice() from an empty list".to_string())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            chars
                .choose(rng)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| "choice() from an empty string".to_string())
        }
        other => Err(format!("choice() does not apply to {}", other.type_name())),
    }
}

fn random_shuffle(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    arity("shuffle", args, 1)?;
    match &args[0] {
        Value::List(items) => {
            items.borrow_mut().shuffle(rng);
            Ok(Value::None)
        }
        other => Err(format!("shuffle() does not apply to {}", other.type_name())),
    }
}

fn random_sample(rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    match args {
        [Value::List(items), Value::Int(k)] => {
            let items = items.borrow();
            let k = usize::try_from(*k).map_err(|_| "sample() count must be non-negative".to_string())?;
            if k > items.len() {
                return Err(format!("sample() count {} exceeds list length {}", k, items.len()));
            }
            Ok(Value::list(items.choose_multiple(rng, k).cloned().collect()))
        }
        _ => Err("sample() takes a list and a count".to_string()),
    }
}

fn math_module() -> ModuleDef {
    let mut functions: FxHashMap<&'static str, ModuleFn> = FxHashMap::default();
    functions.insert("floor", math_floor);
    functions.insert("ceil", math_ceil);
    functions.insert("sqrt", math_sqrt);
    functions.insert("pow", math_pow);
    functions.insert("log", math_log);
    functions.insert("sin", math_sin);
    functions.insert("cos", math_cos);
    functions.insert("tan", math_tan);

    let mut constants = FxHashMap::default();
    constants.insert("pi", std::f64::consts::PI);
    constants.insert("e", std::f64::consts::E);
    ModuleDef { functions, constants }
}

fn one_number(name: &str, args: &[Value]) -> Result<f64, String> {
    arity(name, args, 1)?;
    numeric(&args[0]).ok_or_else(|| format!("{}() expects a number, got {}", name, args[0].type_name()))
}

fn to_int_value(name: &str, x: f64) -> Result<Value, String> {
    if x.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&x) {
        Ok(Value::Int(x as i64))
    } else {
        Err(format!("{}() result out of integer range", name))
    }
}

fn math_floor(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    to_int_value("floor", one_number("floor", args)?.floor())
}

fn math_ceil(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    to_int_value("ceil", one_number("ceil", args)?.ceil())
}

fn math_sqrt(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let x = one_number("sqrt", args)?;
    if x < 0.0 {
        return Err(format!("sqrt() of negative number {}", x));
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_pow(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    match (args.first().and_then(numeric), args.get(1).and_then(numeric)) {
        (Some(base), Some(exp)) if args.len() == 2 => {
            let out = base.powf(exp);
            if out.is_finite() {
                Ok(Value::Float(out))
            } else {
                Err(format!("pow({}, {}) is not finite", base, exp))
            }
        }
        _ => Err("pow() takes two numbers".to_string()),
    }
}

fn math_log(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    let (x, base) = match (args.first().and_then(numeric), args.get(1).and_then(numeric)) {
        (Some(x), None) if args.len() == 1 => (x, std::f64::consts::E),
        (Some(x), Some(b)) if args.len() == 2 => (x, b),
        _ => return Err("log() takes a number and an optional base".to_string()),
    };
    if x <= 0.0 {
        return Err(format!("log() of non-positive number {}", x));
    }
    if base <= 0.0 || base == 1.0 {
        return Err(format!("log() base {} is invalid", base));
    }
    Ok(Value::Float(x.log(base)))
}

fn math_sin(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Float(one_number("sin", args)?.sin()))
}

fn math_cos(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Float(one_number("cos", args)?.cos()))
}

fn math_tan(_rng: &mut StdRng, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Float(one_number("tan", args)?.tan()))
}

// ============================================================================
// Tests
// ============================================================================
