//! CLI subcommands — validate, generate, check, pipeline, schema, init.

use crate::audit::{eventlog, fingerprint};
use crate::engine::contract::Engine;
use crate::engine::types::{EngineConfig, EngineError, QuestionPayload};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a template workspace with a sample generator
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Check template syntax without executing it
    Validate {
        /// Path to the template file
        file: PathBuf,
    },

    /// Generate question instances from a template
    Generate {
        /// Path to the template file
        file: PathBuf,

        /// Number of instances (one attempt each)
        #[arg(short, long, default_value_t = 1)]
        count: u32,

        /// Fixed RNG seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,

        /// Engine configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the JSONL attempt trace
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },

    /// Run a validator template against a learner answer
    Check {
        /// Path to the template file
        file: PathBuf,

        /// The learner's submitted answer
        #[arg(long)]
        given: String,

        /// The canonical correct answer
        #[arg(long)]
        expected: String,

        /// Engine configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the JSONL attempt trace
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },

    /// Run fragment files in order against one shared namespace
    Pipeline {
        /// Fragment files, conventionally question / answer / solution
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,

        /// Engine configuration file (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the JSONL attempt trace
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },

    /// Print the JSON Schema of the question payload
    Schema,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Generate { file, count, seed, json, config, trace_dir } => {
            cmd_generate(&file, count, seed, json, config.as_deref(), trace_dir.as_deref())
        }
        Commands::Check { file, given, expected, config, trace_dir } => {
            cmd_check(&file, &given, &expected, config.as_deref(), trace_dir.as_deref())
        }
        Commands::Pipeline { files, json, config, trace_dir } => {
            cmd_pipeline(&files, json, config.as_deref(), trace_dir.as_deref())
        }
        Commands::Schema => cmd_schema(),
    }
}

const SAMPLE_TEMPLATE: &str = r#"# Sample generator: random multiplication.
import random

fn generate() {
    a = random.randint(2, 9)
    b = random.randint(2, 9)
    return {
        "question": "What is " + str(a) + " x " + str(b) + "?",
        "answer": str(a * b),
        "type": "free-input",
        "topic": "multiplication",
    }
}
"#;

const SAMPLE_CONFIG: &str = r#"# Engine deployment knobs.
deadline_seconds: 5.0
step_budget: 5000000
max_call_depth: 64
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let template_path = path.join("generator.qz");
    if template_path.exists() {
        return Err(format!("{} already exists", template_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&template_path, SAMPLE_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", template_path.display(), e))?;
    let config_path = path.join("engine.yaml");
    std::fs::write(&config_path, SAMPLE_CONFIG)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized template workspace at {}", path.display());
    println!("  Created: {}", template_path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let source = read_template(file)?;
    match crate::engine::compiler::validate_syntax(&source) {
        Ok(()) => {
            println!("OK: {} ({})", file.display(), fingerprint::short(&fingerprint::hash_source(&source)));
            Ok(())
        }
        Err(d) => {
            eprintln!("  ERROR: {}", d);
            Err("syntax validation failed".to_string())
        }
    }
}

fn cmd_generate(
    file: &Path,
    count: u32,
    seed: Option<u64>,
    json: bool,
    config: Option<&Path>,
    trace_dir: Option<&Path>,
) -> Result<(), String> {
    let source = read_template(file)?;
    let base_config = load_config(config)?;
    let payloads = generate_instances(&source, count, seed, &base_config, trace_dir)?;

    for (i, payload) in payloads.iter().enumerate() {
        if json {
            let line = serde_json::to_string(payload).map_err(|e| format!("JSON error: {}", e))?;
            println!("{}", line);
        } else {
            if count > 1 {
                println!("--- instance {} ---", i + 1);
            }
            print_payload(payload);
        }
    }
    Ok(())
}

/// Run N independent generation attempts. With a fixed base seed, each
/// instance derives its own seed so the batch still varies.
fn generate_instances(
    source: &str,
    count: u32,
    seed: Option<u64>,
    base_config: &EngineConfig,
    trace_dir: Option<&Path>,
) -> Result<Vec<QuestionPayload>, String> {
    let fp = fingerprint::hash_source(source);
    let mut payloads = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut config = base_config.clone();
        if let Some(base) = seed {
            config.seed = Some(base.wrapping_add(u64::from(i)));
        }
        let engine = Engine::new(config);

        trace(trace_dir, eventlog::AttemptEvent::AttemptStarted {
            mode: eventlog::AttemptMode::Generate,
            fingerprint: fp.clone(),
        });
        let started = std::time::Instant::now();
        match engine.run_generator(source) {
            Ok(payload) => {
                trace(trace_dir, eventlog::AttemptEvent::AttemptCompleted {
                    mode: eventlog::AttemptMode::Generate,
                    fingerprint: fp.clone(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                });
                payloads.push(payload);
            }
            Err(e) => {
                trace(trace_dir, failure_event(eventlog::AttemptMode::Generate, &fp, &e));
                return Err(format!("instance {}: {}", i + 1, e));
            }
        }
    }
    Ok(payloads)
}

fn cmd_check(
    file: &Path,
    given: &str,
    expected: &str,
    config: Option<&Path>,
    trace_dir: Option<&Path>,
) -> Result<(), String> {
    let source = read_template(file)?;
    let fp = fingerprint::hash_source(&source);
    let engine = Engine::new(load_config(config)?);

    trace(trace_dir, eventlog::AttemptEvent::AttemptStarted {
        mode: eventlog::AttemptMode::Validate,
        fingerprint: fp.clone(),
    });
    let started = std::time::Instant::now();
    match engine.run_validator(&source, given, expected) {
        Ok(verdict) => {
            trace(trace_dir, eventlog::AttemptEvent::AttemptCompleted {
                mode: eventlog::AttemptMode::Validate,
                fingerprint: fp,
                duration_seconds: started.elapsed().as_secs_f64(),
            });
            println!("{}", if verdict { "correct" } else { "incorrect" });
            Ok(())
        }
        Err(e) => {
            trace(trace_dir, failure_event(eventlog::AttemptMode::Validate, &fp, &e));
            Err(e.to_string())
        }
    }
}

fn cmd_pipeline(
    files: &[PathBuf],
    json: bool,
    config: Option<&Path>,
    trace_dir: Option<&Path>,
) -> Result<(), String> {
    let mut sources = Vec::with_capacity(files.len());
    for file in files {
        sources.push(read_template(file)?);
    }
    let refs: Vec<&str> = sources.iter().map(String::as_str).collect();
    let fp = fingerprint::hash_source(&sources.join("\n"));
    let engine = Engine::new(load_config(config)?);

    trace(trace_dir, eventlog::AttemptEvent::AttemptStarted {
        mode: eventlog::AttemptMode::Pipeline,
        fingerprint: fp.clone(),
    });
    let started = std::time::Instant::now();
    match engine.run_pipeline(&refs) {
        Ok(outputs) => {
            trace(trace_dir, eventlog::AttemptEvent::AttemptCompleted {
                mode: eventlog::AttemptMode::Pipeline,
                fingerprint: fp,
                duration_seconds: started.elapsed().as_secs_f64(),
            });
            if json {
                let line =
                    serde_json::to_string(&outputs).map_err(|e| format!("JSON error: {}", e))?;
                println!("{}", line);
            } else {
                for (key, value) in &outputs {
                    println!("{}: {}", key, value);
                }
            }
            Ok(())
        }
        Err(e) => {
            trace(trace_dir, failure_event(eventlog::AttemptMode::Pipeline, &fp, &e));
            Err(e.to_string())
        }
    }
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(QuestionPayload);
    let out = serde_json::to_string_pretty(&schema).map_err(|e| format!("JSON error: {}", e))?;
    println!("{}", out);
    Ok(())
}

// ------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------

fn read_template(file: &Path) -> Result<String, String> {
    std::fs::read_to_string(file).map_err(|e| format!("cannot read {}: {}", file.display(), e))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        None => Ok(EngineConfig::default()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            serde_yaml_ng::from_str(&content)
                .map_err(|e| format!("invalid engine config {}: {}", path.display(), e))
        }
    }
}

/// Tracing is best-effort; a failed append never fails the attempt.
fn trace(trace_dir: Option<&Path>, event: eventlog::AttemptEvent) {
    if let Some(dir) = trace_dir {
        let _ = eventlog::append_event(dir, event);
    }
}

fn failure_event(
    mode: eventlog::AttemptMode,
    fingerprint: &str,
    error: &EngineError,
) -> eventlog::AttemptEvent {
    eventlog::AttemptEvent::AttemptFailed {
        mode,
        fingerprint: fingerprint.to_string(),
        error_kind: error.kind().to_string(),
        message: error.to_string(),
    }
}

fn print_payload(payload: &QuestionPayload) {
    println!("Q: {}", payload.question);
    println!("A: {}", payload.answer);
    if let Some(options) = &payload.options {
        println!("options: {}", options.join(" | "));
    }
    if let Some(qt) = &payload.question_type {
        println!("type: {}", qt);
    }
    if let Some(topic) = &payload.topic {
        println!("topic: {}", topic);
    }
}
