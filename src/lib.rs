//! Quizforge — sandboxed template execution for randomized question
//! generation and answer validation.
//!
//! Untrusted, author-supplied scripts run against a fixed capability
//! allowlist, under a reduction-step budget and a wall-clock deadline,
//! with no file, network, process, or environment surface.

pub mod audit;
pub mod cli;
pub mod engine;

pub use engine::contract::Engine;
pub use engine::types::{
    Answer, EngineConfig, EngineError, QuestionPayload, QuestionType, SyntaxDiagnostic,
};
