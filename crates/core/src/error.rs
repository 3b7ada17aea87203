//! Typed error kinds for the analysis pipeline (spec §7).
//!
//! `ConfigInvalid` and `CollectorFatal` are fatal: the kernel aborts the run.
//! Everything else is non-fatal and causes a stage-skip (and, transitively,
//! exclusion of any finder whose `requires` set depends on that stage).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("collector failed fatally: {0}")]
    CollectorFatal(String),

    #[error("failed to parse {path}: {reason}")]
    FileParseFailure { path: String, reason: String },

    #[error("stage {stage} timed out after {elapsed_ms}ms")]
    StageTimeout { stage: String, elapsed_ms: u64 },

    #[error("stage {stage} missing required upstream input: {missing}")]
    StageDependencyMissing { stage: String, missing: String },

    #[error("invariant violated in {context}: {detail}")]
    InvariantViolation { context: String, detail: String },
}

impl EngineError {
    /// Fatal errors abort the whole pipeline; non-fatal errors skip a stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ConfigInvalid(_) | EngineError::CollectorFatal(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
