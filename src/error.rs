use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The workflow definition is unusable. Raised before a run starts, never during one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read workflow file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("{context} references unknown state '{state}'")]
    UnknownState { context: String, state: String },

    #[error("state '{0}' has no required elements")]
    NoRequiredElements(String),

    #[error("duplicate transition {from} -> {to}")]
    DuplicateTransition { from: String, to: String },

    #[error("fallback '{0}' has an empty action sequence")]
    EmptyFallback(String),

    #[error("{context}: invalid duration {seconds}s")]
    InvalidDuration { context: String, seconds: f64 },

    #[error("{context}: {message}")]
    InvalidAction { context: String, message: String },

    #[error("{context}: unrecognised element type in matcher {matcher}")]
    InvalidElementType { context: String, matcher: String },
}

/// A detector call failed. Recoverable: the engine treats it as an empty snapshot.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("detection backend error: {0}")]
    Backend(String),
}

/// An executor call failed. Recoverable: counted as no progress for the iteration.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("SUT unreachable: {0}")]
    Unreachable(String),

    #[error("SUT call timed out after {0:?}")]
    Timeout(Duration),

    #[error("SUT rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Fatal run failures. These end the run with `Outcome::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("ambiguous screen: states {candidates:?} are equally plausible")]
    AmbiguousState { candidates: Vec<String> },

    #[error("no transition defined from state '{state}'")]
    TransitionNotFound { state: String },

    #[error("stuck: fallback '{scope}' exhausted after {attempts} attempts")]
    StuckLoop { scope: String, attempts: u32 },

    #[error("iteration budget of {max_iterations} exceeded")]
    IterationBudgetExceeded { max_iterations: u32 },
}

/// A recoverable fault recorded in the trace. Distinguishes the error kinds
/// that the engine otherwise handles identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Fault {
    DetectionTimeout(String),
    DetectionBackend(String),
    ExecutorUnreachable(String),
    ExecutorTimeout(String),
    ExecutorRejected(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::DetectionTimeout(m)
            | Fault::DetectionBackend(m)
            | Fault::ExecutorUnreachable(m)
            | Fault::ExecutorTimeout(m)
            | Fault::ExecutorRejected(m) => f.write_str(m),
        }
    }
}

impl From<&DetectionError> for Fault {
    fn from(err: &DetectionError) -> Self {
        match err {
            DetectionError::Timeout(_) => Fault::DetectionTimeout(err.to_string()),
            DetectionError::Backend(_) => Fault::DetectionBackend(err.to_string()),
        }
    }
}

impl From<&ExecutorError> for Fault {
    fn from(err: &ExecutorError) -> Self {
        match err {
            ExecutorError::Unreachable(_) => Fault::ExecutorUnreachable(err.to_string()),
            ExecutorError::Timeout(_) => Fault::ExecutorTimeout(err.to_string()),
            ExecutorError::Rejected { .. } => Fault::ExecutorRejected(err.to_string()),
        }
    }
}
