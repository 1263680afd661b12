//! The evaluation contract between the shell and an evaluator.

use std::fmt;

use crate::error::EvalError;
use crate::value::Value;

/// Which scope an evaluation runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// The shared global context, visible to every evaluation and module.
    Global,
    /// The shell's own context.
    Shell,
    /// A module body being loaded, keyed by its module cache key.
    Module(String),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Global => write!(f, "global"),
            ContextId::Shell => write!(f, "shell"),
            ContextId::Module(key) => write!(f, "module:{key}"),
        }
    }
}

/// One submitted line or block.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub code: String,
    pub context: ContextId,
    /// Where the code came from, e.g. `repl` or a command name.
    pub source_label: String,
}

impl EvaluationRequest {
    pub fn new(code: impl Into<String>, context: ContextId, source_label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            context,
            source_label: source_label.into(),
        }
    }
}

/// The single result delivered for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Value(Value),
    Failure(EvalError),
}
