//! skiff-kernel: the evaluating core of the skiff shell.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes skiff source using logos
//! - **Parser**: Recursive descent into the AST
//! - **Interpreter**: The real evaluator, including `require` over the module cache
//! - **Modules**: The module cache the loader owns and reload prunes
//! - **Framework**: Manifest bootstrap, project loading, the lazy project accessor
//! - **Session**: The explicit session state handed to every component
//! - **Intercept**: Deferred-value arbitration around the evaluator
//! - **Reload**: Invalidate-and-reacquire of the framework/project pair
//! - **Keys**: The key listener seam used for cancellation
//! - **Config / Paths**: Shell configuration and root resolution

pub mod accessor;
pub mod ast;
pub mod config;
pub mod framework;
pub mod intercept;
pub mod interpreter;
pub mod keys;
pub mod lexer;
pub mod modules;
pub mod parser;
pub mod paths;
pub mod reload;
pub mod session;

pub use accessor::ProjectAccessor;
pub use config::{Icon, ReloadFailurePolicy, ReloadHook, ReplConfig};
pub use framework::{Framework, FrameworkError, Manifest, Project};
pub use intercept::{
    Done, EvalInterceptor, EvalMode, InternalFault, LogNotices, ModeSwitch, Notice, NoticeSink,
};
pub use interpreter::{Evaluator, Interpreter, Scope};
pub use keys::{Key, KeyBus, KeyListener, KeySubscription, NullKeys};
pub use modules::{Module, ModuleCache};
pub use reload::{ExitHook, FailureReport, ReloadCoordinator, ReloadError, ReloadOutcome, ReloadReport};
pub use session::{ReloadState, SessionState};

// Re-export the data contract so embedders need only one dependency.
pub use skiff_types::{
    ContextId, Deferred, DeferredState, EvalError, EvalResult, EvaluationOutcome,
    EvaluationRequest, Resolver, Value,
};
