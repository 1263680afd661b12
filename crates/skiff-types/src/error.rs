//! Evaluation errors.
//!
//! Everything user code can do wrong ends up here. These errors are shown
//! inline by the shell and never terminate the session.

use thiserror::Error;

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors produced while evaluating skiff code, or carried by a rejected
/// deferred value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error: {message} (at {start}..{end})")]
    Syntax {
        message: String,
        start: usize,
        end: usize,
    },
    #[error("undefined: {0}")]
    Undefined(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0}")]
    Raised(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{name}() expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("module {key}: {message}")]
    Module { key: String, message: String },
    #[error("framework unavailable: {0}")]
    Framework(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Build a syntax error from a message and a byte span.
    pub fn syntax(message: impl Into<String>, span: std::ops::Range<usize>) -> Self {
        EvalError::Syntax {
            message: message.into(),
            start: span.start,
            end: span.end,
        }
    }

    /// Build a module error.
    pub fn module(key: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Module {
            key: key.into(),
            message: message.into(),
        }
    }
}
