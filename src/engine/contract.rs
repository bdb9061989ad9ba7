//! Contract adapters and the public engine facade.
//!
//! Orchestration per attempt: compile → build namespace → execute under
//! the deadline supervisor → resolve the template's convention → validate
//! the output shape. Each attempt starts from scratch, so a template that
//! consults `random` independently re-rolls on every call — bulk
//! generation is N calls.

use super::caps::CapabilitySet;
use super::compiler::{self, CompileError};
use super::interp::{ExecError, ExecLimits, Interp};
use super::supervisor::{self, SupervisorError};
use super::types::{
    Answer, CompiledUnit, EngineConfig, EngineError, Namespace, Outcome, QuestionPayload,
    QuestionType, SyntaxDiagnostic, Value,
};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Instant;

/// Names harvested from a pipeline's shared namespace, in output order.
const HARVEST_KEYS: [&str; 7] =
    ["question", "answer", "solution", "options", "type", "topic", "variables"];

/// The template engine. Holds the read-only capability set and the
/// deployment configuration; everything else is per-attempt.
pub struct Engine {
    caps: Arc<CapabilitySet>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine with the standard capability tier.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_capabilities(CapabilitySet::standard(), config)
    }

    /// Engine with an explicit capability set, e.g. a stricter tier for
    /// public untrusted authors.
    pub fn with_capabilities(caps: CapabilitySet, config: EngineConfig) -> Self {
        Self { caps: Arc::new(caps), config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check template syntax without executing anything. Pure: identical
    /// input yields the identical verdict on every call.
    pub fn validate_syntax(&self, source: &str) -> Result<(), SyntaxDiagnostic> {
        compiler::validate_syntax(source)
    }

    /// Run a generator template and return one validated question payload.
    pub fn run_generator(&self, source: &str) -> Result<QuestionPayload, EngineError> {
        let unit = self.compile(source)?;
        let caps = Arc::clone(&self.caps);
        let limits = self.limits();
        let seed = self.config.seed;
        self.supervised(move || generator_attempt(&caps, limits, seed, &unit))
    }

    /// Run a validator template against a learner answer and the canonical
    /// answer. Both are passed through raw and uncoerced so authors can
    /// implement their own tolerance.
    pub fn run_validator(
        &self,
        source: &str,
        learner_answer: &str,
        correct_answer: &str,
    ) -> Result<bool, EngineError> {
        let unit = self.compile(source)?;
        let caps = Arc::clone(&self.caps);
        let limits = self.limits();
        let seed = self.config.seed;
        let learner = learner_answer.to_string();
        let correct = correct_answer.to_string();
        self.supervised(move || validator_attempt(&caps, limits, seed, &unit, learner, correct))
    }

    /// Run an ordered list of fragments in one shared namespace and harvest
    /// the conventional output names. All fragments are compiled up front,
    /// so a late syntax error is reported before anything runs.
    pub fn run_pipeline(&self, sources: &[&str]) -> Result<IndexMap<String, String>, EngineError> {
        let mut units = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter().enumerate() {
            let unit = self.compile(source).map_err(|e| prefix_fragment(i, e))?;
            units.push(unit);
        }
        let caps = Arc::clone(&self.caps);
        let limits = self.limits();
        let seed = self.config.seed;
        self.supervised(move || pipeline_attempt(&caps, limits, seed, &units))
    }

    fn compile(&self, source: &str) -> Result<CompiledUnit, EngineError> {
        compiler::compile(source, &self.caps).map_err(|e| match e {
            CompileError::Syntax(d) => EngineError::Syntax(d),
            CompileError::Rejected { message } => EngineError::CompileRejected { message },
        })
    }

    fn limits(&self) -> ExecLimits {
        ExecLimits {
            step_budget: self.config.step_budget,
            max_call_depth: self.config.max_call_depth,
        }
    }

    /// Run one attempt on an isolated worker under the wall-clock deadline.
    fn supervised<T, F>(&self, thunk: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    {
        match supervisor::supervise(self.config.deadline(), thunk) {
            Ok(result) => result,
            Err(SupervisorError::Timeout(elapsed)) => Err(EngineError::Timeout { elapsed }),
            Err(SupervisorError::Worker(message)) => {
                Err(EngineError::Execution { message: format!("worker failed: {}", message) })
            }
        }
    }
}

fn prefix_fragment(index: usize, error: EngineError) -> EngineError {
    match error {
        EngineError::Syntax(d) => EngineError::Syntax(SyntaxDiagnostic {
            message: format!("fragment {}: {}", index + 1, d.message),
            line: d.line,
            column: d.column,
        }),
        EngineError::CompileRejected { message } => {
            EngineError::CompileRejected { message: format!("fragment {}: {}", index + 1, message) }
        }
        other => other,
    }
}

// ============================================================================
// Attempt bodies (run on the worker thread)
// ============================================================================

fn contract_violation(message: impl Into<String>) -> EngineError {
    EngineError::ContractViolation { message: message.into() }
}

/// Execute a compiled unit on a fresh namespace, classifying the outcome.
fn execute(
    interp: &mut Interp<'_>,
    unit: &CompiledUnit,
    start: Instant,
) -> Result<(), EngineError> {
    map_exec(interp.run(&unit.program), start)
}

fn map_exec<T>(result: Result<T, ExecError>, start: Instant) -> Result<T, EngineError> {
    result.map_err(|e| match e {
        ExecError::Runtime(message) => EngineError::Execution { message },
        ExecError::BudgetExhausted => EngineError::Timeout { elapsed: start.elapsed() },
    })
}

/// The closed set of generator conventions, detected once after a
/// successful execution.
#[derive(Debug, PartialEq, Eq)]
enum GeneratorConvention {
    /// A zero-argument `generate` function: call it, use its return value.
    EntryPoint,
    /// Top-level `question` and `answer` bindings plus optional fields.
    ImplicitBindings,
}

fn detect_convention(namespace: &Namespace) -> Result<GeneratorConvention, EngineError> {
    if let Some(Value::Func(func)) = namespace.get("generate") {
        if !func.params.is_empty() {
            return Err(contract_violation(format!(
                "generate() must take no arguments, found {} parameter(s)",
                func.params.len()
            )));
        }
        return Ok(GeneratorConvention::EntryPoint);
    }
    if namespace.contains_key("question") && namespace.contains_key("answer") {
        return Ok(GeneratorConvention::ImplicitBindings);
    }
    Err(contract_violation(
        "template follows neither generator convention: define fn generate() returning the \
         question map, or bind top-level 'question' and 'answer' variables",
    ))
}

fn generator_attempt(
    caps: &CapabilitySet,
    limits: ExecLimits,
    seed: Option<u64>,
    unit: &CompiledUnit,
) -> Result<QuestionPayload, EngineError> {
    let start = Instant::now();
    let mut interp = Interp::new(caps, limits, seed, Namespace::new());
    execute(&mut interp, unit, start)?;

    match detect_convention(interp.namespace())? {
        GeneratorConvention::EntryPoint => {
            let result = map_exec(interp.call_entry("generate", vec![]), start)?;
            payload_from_value(&result)
        }
        GeneratorConvention::ImplicitBindings => {
            payload_from_namespace(interp.namespace())
        }
    }
}

fn validator_attempt(
    caps: &CapabilitySet,
    limits: ExecLimits,
    seed: Option<u64>,
    unit: &CompiledUnit,
    learner: String,
    correct: String,
) -> Result<bool, EngineError> {
    let start = Instant::now();
    let mut interp = Interp::new(caps, limits, seed, Namespace::new());
    execute(&mut interp, unit, start)?;

    match interp.namespace().get("validate") {
        Some(Value::Func(func)) if func.params.len() == 2 => {}
        Some(Value::Func(func)) => {
            return Err(contract_violation(format!(
                "validate() must take exactly (learner_answer, correct_answer), found {} parameter(s)",
                func.params.len()
            )));
        }
        _ => {
            return Err(contract_violation(
                "validator template must define fn validate(learner_answer, correct_answer)",
            ));
        }
    }

    let verdict = map_exec(
        interp.call_entry("validate", vec![Value::Str(learner), Value::Str(correct)]),
        start,
    )?;
    Ok(verdict.truthy())
}

fn pipeline_attempt(
    caps: &CapabilitySet,
    limits: ExecLimits,
    seed: Option<u64>,
    units: &[CompiledUnit],
) -> Result<IndexMap<String, String>, EngineError> {
    let start = Instant::now();
    let mut interp = Interp::new(caps, limits, seed, Namespace::new());
    // A runtime failure here discards the whole namespace: earlier
    // fragments' bindings die with the attempt, never with the engine.
    let outcome = run_fragments(&mut interp, units, start);
    match outcome {
        Outcome::Success(namespace) => Ok(harvest(&namespace)),
        Outcome::Error(message) => Err(EngineError::Execution { message }),
        Outcome::Timeout(elapsed) => Err(EngineError::Timeout { elapsed }),
    }
}

fn run_fragments(interp: &mut Interp<'_>, units: &[CompiledUnit], start: Instant) -> Outcome {
    for (i, unit) in units.iter().enumerate() {
        match interp.run(&unit.program) {
            Ok(()) => {}
            Err(ExecError::Runtime(message)) => {
                return Outcome::Error(format!("fragment {}: {}", i + 1, message));
            }
            Err(ExecError::BudgetExhausted) => return Outcome::Timeout(start.elapsed()),
        }
    }
    Outcome::Success(interp.namespace().clone())
}

/// Harvest the conventional names from a pipeline namespace as strings.
/// Scalars use their display form; collections serialize as JSON; bound
/// functions and modules are not data and are dropped.
fn harvest(namespace: &Namespace) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for key in HARVEST_KEYS {
        let Some(value) = namespace.get(key) else { continue };
        let rendered = match value {
            Value::List(_) | Value::Map(_) | Value::Range { .. } => match value.to_json() {
                Some(json) => json.to_string(),
                None => continue,
            },
            Value::Func(_) | Value::Builtin(_) | Value::Module(_) | Value::ModuleFn(..) => continue,
            scalar => scalar.to_string(),
        };
        out.insert(key.to_string(), rendered);
    }
    out
}

// ============================================================================
// Payload validation
// ============================================================================

fn payload_from_namespace(namespace: &Namespace) -> Result<QuestionPayload, EngineError> {
    let mut entries = IndexMap::new();
    for key in ["question", "answer", "variables", "options", "type", "topic"] {
        if let Some(v) = namespace.get(key) {
            entries.insert(key.to_string(), v.clone());
        }
    }
    payload_from_value(&Value::map(entries))
}

fn payload_from_value(value: &Value) -> Result<QuestionPayload, EngineError> {
    let Value::Map(entries) = value else {
        return Err(contract_violation(format!(
            "generator result must be a map, got {}",
            value.type_name()
        )));
    };
    let entries = entries.borrow();

    let question = match entries.get("question") {
        Some(Value::Str(q)) => q.clone(),
        Some(other) => {
            return Err(contract_violation(format!(
                "'question' must be a string, got {}",
                other.type_name()
            )));
        }
        None => return Err(contract_violation("missing required key 'question'")),
    };

    let answer = match entries.get("answer") {
        Some(Value::Str(s)) => Answer::Text(s.clone()),
        Some(Value::Int(n)) => Answer::Int(*n),
        Some(Value::Float(x)) => Answer::Float(*x),
        Some(other) => {
            return Err(contract_violation(format!(
                "'answer' must be a string or number, got {}",
                other.type_name()
            )));
        }
        None => return Err(contract_violation("missing required key 'answer'")),
    };

    let options = match entries.get("options") {
        None => None,
        Some(Value::List(items)) => {
            let mut out = Vec::new();
            for item in items.borrow().iter() {
                match item {
                    Value::Str(s) => out.push(s.clone()),
                    other => {
                        return Err(contract_violation(format!(
                            "'options' must be a sequence of strings, found {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Some(out)
        }
        Some(other) => {
            return Err(contract_violation(format!(
                "'options' must be a sequence of strings, got {}",
                other.type_name()
            )));
        }
    };

    let question_type = match entries.get("type") {
        None => None,
        Some(Value::Str(s)) => {
            let parsed = s
                .parse::<QuestionType>()
                .map_err(|message| EngineError::ContractViolation { message })?;
            Some(parsed)
        }
        Some(other) => {
            return Err(contract_violation(format!(
                "'type' must be a string, got {}",
                other.type_name()
            )));
        }
    };

    let topic = match entries.get("topic") {
        None => None,
        Some(Value::Str(s)) => Some(s.clone()),
        Some(other) => {
            return Err(contract_violation(format!(
                "'topic' must be a string, got {}",
                other.type_name()
            )));
        }
    };

    let variables = match entries.get("variables") {
        None => None,
        Some(Value::Map(vars)) => {
            let mut out = IndexMap::new();
            for (k, v) in vars.borrow().iter() {
                if let Some(json) = v.to_json() {
                    out.insert(k.clone(), json);
                }
            }
            Some(out)
        }
        Some(other) => {
            return Err(contract_violation(format!(
                "'variables' must be a map, got {}",
                other.type_name()
            )));
        }
    };

    Ok(QuestionPayload { question, answer, variables, options, question_type, topic })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> Engine {
        Engine::new(EngineConfig { seed: Some(1234), ..EngineConfig::default() })
    }

    fn fast_engine() -> Engine {
        // Small budget and deadline so timeout tests finish quickly.
        Engine::new(EngineConfig {
            deadline_seconds: 2.0,
            step_budget: 50_000,
            ..EngineConfig::default()
        })
    }

    const ENTRY_POINT_TEMPLATE: &str = r#"
import random

fn generate() {
    a = random.randint(2, 9)
    b = random.randint(2, 9)
    return {
        "question": "What is " + str(a) + " * " + str(b) + "?",
        "answer": str(a * b),
        "variables": {"a": a, "b": b},
        "topic": "multiplication",
    }
}
"#;

    const IMPLICIT_TEMPLATE: &str = r#"
import random
a = random.randint(1, 10)
question = "What is " + str(a) + " + 1?"
answer = str(a + 1)
options = [str(a), str(a + 1), str(a + 2)]
"#;

    #[test]
    fn generator_entry_point_convention() {
        let payload = engine().run_generator(ENTRY_POINT_TEMPLATE).unwrap();
        assert!(payload.question.starts_with("What is "));
        let Answer::Text(answer) = &payload.answer else { panic!("answer is a string") };
        assert!(answer.parse::<i64>().is_ok());
        assert_eq!(payload.topic.as_deref(), Some("multiplication"));
        let vars = payload.variables.unwrap();
        assert!(vars.contains_key("a") && vars.contains_key("b"));
        assert!(payload.options.is_none());
        assert!(payload.question_type.is_none());
    }

    #[test]
    fn generator_implicit_convention_exact_keys() {
        let payload = engine().run_generator(IMPLICIT_TEMPLATE).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["question", "answer", "options"]);
    }

    #[test]
    fn generator_rerolls_across_calls() {
        // Entropy-seeded engine: draws must vary across repeated calls.
        let engine = Engine::new(EngineConfig::default());
        let template = "import random\nquestion = \"q\"\nanswer = str(random.randint(1, 1000000))";
        let mut seen = std::collections::HashSet::new();
        for _ in 0..8 {
            let payload = engine.run_generator(template).unwrap();
            let Answer::Text(a) = payload.answer else { panic!("string answer") };
            seen.insert(a);
        }
        assert!(seen.len() > 1, "independent attempts must re-roll");
    }

    #[test]
    fn generator_seeded_is_deterministic() {
        let e = engine();
        let p1 = e.run_generator(ENTRY_POINT_TEMPLATE).unwrap();
        let p2 = e.run_generator(ENTRY_POINT_TEMPLATE).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn generator_neither_convention() {
        let err = engine().run_generator("x = 1").unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("generate()"), "must name the entry-point convention");
        assert!(message.contains("question"), "must name the implicit convention");
    }

    #[test]
    fn generator_entry_point_with_params_is_violation() {
        let err = engine().run_generator("fn generate(n) { return n }").unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("no arguments"));
    }

    #[test]
    fn generator_result_must_be_map() {
        let err = engine().run_generator("fn generate() { return 42 }").unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("must be a map"));
    }

    #[test]
    fn generator_missing_answer() {
        let err = engine()
            .run_generator("fn generate() { return {\"question\": \"q\"} }")
            .unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("'answer'"));
    }

    #[test]
    fn generator_numeric_answer_allowed_boolean_rejected() {
        let payload = engine()
            .run_generator("fn generate() { return {\"question\": \"q\", \"answer\": 7} }")
            .unwrap();
        assert_eq!(payload.answer, Answer::Int(7));

        let err = engine()
            .run_generator("fn generate() { return {\"question\": \"q\", \"answer\": true} }")
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[test]
    fn generator_bad_options_and_type() {
        let err = engine()
            .run_generator(
                "fn generate() { return {\"question\": \"q\", \"answer\": \"a\", \"options\": [1, 2]} }",
            )
            .unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("options"));

        let err = engine()
            .run_generator(
                "fn generate() { return {\"question\": \"q\", \"answer\": \"a\", \"type\": \"essay\"} }",
            )
            .unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("essay"));
    }

    #[test]
    fn generator_valid_type_accepted() {
        let payload = engine()
            .run_generator(
                "fn generate() { return {\"question\": \"q\", \"answer\": \"a\", \"type\": \"multiple-choice\"} }",
            )
            .unwrap();
        assert_eq!(payload.question_type, Some(QuestionType::MultipleChoice));
    }

    #[test]
    fn generator_compile_rejected_never_executes() {
        let err = engine().run_generator("import os\nquestion = \"q\"\nanswer = \"a\"").unwrap_err();
        assert!(matches!(err, EngineError::CompileRejected { .. }));
    }

    #[test]
    fn generator_execution_error_classified() {
        let err = engine().run_generator("question = \"q\"\nanswer = str(1 / 0)").unwrap_err();
        let EngineError::Execution { message } = err else { panic!("expected execution error") };
        assert!(message.contains("division by zero"));
    }

    #[test]
    fn generator_unbounded_loop_times_out() {
        let started = Instant::now();
        let err = fast_engine().run_generator("while true { x = 1 }").unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }), "got {:?}", err);
        // Budget abort, well under the wall-clock deadline.
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn validator_string_comparison() {
        let template = "fn validate(given, expected) { return given.strip() == expected.strip() }";
        let e = engine();
        assert!(e.run_validator(template, "23", "23").unwrap());
        assert!(!e.run_validator(template, "23", "24").unwrap());
        assert!(e.run_validator(template, " 23 ", "23").unwrap());
    }

    #[test]
    fn validator_truthy_coercion() {
        // A non-boolean return is coerced through truthiness.
        let template = "fn validate(given, expected) { return len(given) }";
        let e = engine();
        assert!(e.run_validator(template, "x", "ignored").unwrap());
        assert!(!e.run_validator(template, "", "ignored").unwrap());
    }

    #[test]
    fn validator_missing_entry_point() {
        let err = engine().run_validator("x = 1", "a", "b").unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("validate(learner_answer, correct_answer)"));
    }

    #[test]
    fn validator_wrong_arity() {
        let err = engine()
            .run_validator("fn validate(one) { return true }", "a", "b")
            .unwrap_err();
        let EngineError::ContractViolation { message } = err else { panic!("expected violation") };
        assert!(message.contains("1 parameter"));
    }

    #[test]
    fn pipeline_empty_fragment_is_noop() {
        let out = engine().run_pipeline(&["", "answer = 1"]).unwrap();
        let mut expected = IndexMap::new();
        expected.insert("answer".to_string(), "1".to_string());
        assert_eq!(out, expected);
    }

    #[test]
    fn pipeline_later_fragments_see_earlier_bindings() {
        let out = engine()
            .run_pipeline(&[
                "base = 6\nquestion = \"What is \" + str(base) + \" squared?\"",
                "answer = str(base * base)",
                "solution = question + \" -> \" + answer",
            ])
            .unwrap();
        assert_eq!(out["answer"], "36");
        assert_eq!(out["solution"], "What is 6 squared? -> 36");
        assert_eq!(
            out.keys().collect::<Vec<_>>(),
            vec!["question", "answer", "solution"]
        );
    }

    #[test]
    fn pipeline_harvests_collections_as_json() {
        let out = engine()
            .run_pipeline(&["options = [\"a\", \"b\"]\nvariables = {\"n\": 3}\nanswer = 1.5"])
            .unwrap();
        assert_eq!(out["options"], r#"["a","b"]"#);
        assert_eq!(out["variables"], r#"{"n":3}"#);
        assert_eq!(out["answer"], "1.5");
    }

    #[test]
    fn pipeline_ignores_unharvested_names() {
        let out = engine().run_pipeline(&["answer = 1\nscratch = 99"]).unwrap();
        assert!(!out.contains_key("scratch"));
    }

    #[test]
    fn pipeline_applies_no_schema() {
        // No question at all — deliberately weaker than the generator
        // contract.
        let out = engine().run_pipeline(&["solution = \"just notes\""]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["solution"], "just notes");
    }

    #[test]
    fn pipeline_syntax_error_reported_before_execution() {
        let err = engine().run_pipeline(&["a = 1", "if ("]).unwrap_err();
        let EngineError::Syntax(d) = err else { panic!("expected syntax error") };
        assert!(d.message.starts_with("fragment 2:"));
    }

    #[test]
    fn pipeline_runtime_error_discards_namespace() {
        let err = engine().run_pipeline(&["a = 1", "b = 1 / 0"]).unwrap_err();
        let EngineError::Execution { message } = err else { panic!("expected execution error") };
        assert!(message.starts_with("fragment 2:"));
    }

    #[test]
    fn pipeline_compile_rejection_names_fragment() {
        let err = engine().run_pipeline(&["a = 1", "import os"]).unwrap_err();
        let EngineError::CompileRejected { message } = err else { panic!("expected rejection") };
        assert!(message.starts_with("fragment 2:"));
    }

    #[test]
    fn validate_syntax_facade() {
        let e = engine();
        assert!(e.validate_syntax("answer = 1").is_ok());
        let d = e.validate_syntax("fn (").unwrap_err();
        assert!(!d.message.is_empty());
        // Idempotent
        assert_eq!(e.validate_syntax("fn ("), Err(d));
    }

    #[test]
    fn worker_survives_concurrent_attempts() {
        let e = std::sync::Arc::new(engine());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let e = std::sync::Arc::clone(&e);
                std::thread::spawn(move || e.run_generator(IMPLICIT_TEMPLATE).unwrap())
            })
            .collect();
        for h in handles {
            let payload = h.join().unwrap();
            assert!(!payload.question.is_empty());
        }
    }
}
