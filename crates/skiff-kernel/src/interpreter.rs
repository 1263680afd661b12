//! Interpreter module for skiff.
//!
//! # Architecture
//!
//! - **Evaluator**: the seam the interceptor wraps. Anything that turns an
//!   [`EvaluationRequest`] into a value or an error can sit behind it.
//! - **Interpreter**: the real evaluator. Parses the request, runs it
//!   against the session's scopes and returns the last statement's value.
//! - **Scope**: flat variable tables for the global, shell and module
//!   contexts.
//!
//! Builtins that produce deferred values spawn their timers on the current
//! tokio runtime and hand back the consumer half straight away; the
//! interpreter itself never waits on them.
//!
//! # Example
//!
//! ```no_run
//! use skiff_kernel::{ContextId, EvaluationRequest, Evaluator, Interpreter, SessionState};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = SessionState::bootstrap("/path/to/project", true)?;
//! let request = EvaluationRequest::new("1 + 2", ContextId::Global, "repl");
//! let value = Interpreter::new().eval(&request, &mut session).await?;
//! assert_eq!(value.to_string(), "3");
//! # Ok(())
//! # }
//! ```

mod builtins;
mod eval;
pub mod scope;

use async_trait::async_trait;

use skiff_types::{EvalError, EvaluationRequest, Value};

use crate::parser::parse;
use crate::session::SessionState;

pub use scope::Scope;

/// The wrapped evaluation step.
///
/// Implementations report user-code failures as `Err`; a deferred value is
/// an ordinary `Ok(Value::Deferred(..))` and is the caller's to await.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn eval(&self, request: &EvaluationRequest, session: &mut SessionState) -> Result<Value, EvalError>;
}

/// The skiff expression evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate synchronously; deferred results are returned unawaited.
    pub fn eval_now(&self, request: &EvaluationRequest, session: &mut SessionState) -> Result<Value, EvalError> {
        let program = parse(&request.code)?;
        tracing::trace!(source = %request.source_label, context = %request.context, stmts = program.stmts.len(), "evaluating");
        let mut loading = Vec::new();
        eval::Frame::new(session, request.context.clone(), &mut loading).run(&program)
    }
}

#[async_trait]
impl Evaluator for Interpreter {
    async fn eval(&self, request: &EvaluationRequest, session: &mut SessionState) -> Result<Value, EvalError> {
        self.eval_now(request, session)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::framework::MANIFEST_FILE;
    use skiff_types::{ContextId, DeferredState};

    fn project(manifest: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MANIFEST_FILE), manifest).expect("manifest");
        dir
    }

    fn session(dir: &Path, use_global: bool) -> SessionState {
        SessionState::bootstrap(dir, use_global).expect("bootstrap")
    }

    fn run(session: &mut SessionState, code: &str) -> Result<Value, EvalError> {
        let context = session.default_context();
        Interpreter::new().eval_now(&EvaluationRequest::new(code, context, "test"), session)
    }

    fn run_ok(session: &mut SessionState, code: &str) -> Value {
        run(session, code).unwrap_or_else(|e| panic!("{code}: {e}"))
    }

    #[test]
    fn arithmetic_and_precedence() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        assert_eq!(run_ok(&mut s, "1 + 2 * 3"), Value::Int(7));
        assert_eq!(run_ok(&mut s, "(1 + 2) * 3"), Value::Int(9));
        assert_eq!(run_ok(&mut s, "7 / 2"), Value::Int(3));
        assert_eq!(run_ok(&mut s, "7 % 4"), Value::Int(3));
        assert_eq!(run_ok(&mut s, "1.5 + 1"), Value::Float(2.5));
        assert_eq!(run_ok(&mut s, "-3 + 1"), Value::Int(-2));
        assert_eq!(run_ok(&mut s, "1 == 1.0"), Value::Bool(true));
        assert_eq!(run_ok(&mut s, "'a' + 'b'"), Value::from("ab"));
        assert_eq!(run_ok(&mut s, "'n=' + 4"), Value::from("n=4"));
        assert_eq!(run_ok(&mut s, "[1] + [2]"), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn evaluation_errors() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        assert_eq!(run(&mut s, "1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(run(&mut s, "nope"), Err(EvalError::Undefined("nope".into())));
        assert_eq!(run(&mut s, "fail('boom')"), Err(EvalError::Raised("boom".into())));
        assert_eq!(run(&mut s, "frob(1)"), Err(EvalError::UnknownFunction("frob".into())));
        assert!(matches!(run(&mut s, "1 +"), Err(EvalError::Syntax { .. })));
        assert!(matches!(run(&mut s, "true - 1"), Err(EvalError::Type(_))));
        assert!(matches!(run(&mut s, "len()"), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn long_chains_are_syntax_errors() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        let sum = format!("1{}", " + 1".repeat(10_000));
        assert!(matches!(run(&mut s, &sum), Err(EvalError::Syntax { .. })));
        let members = format!("project{}", ".name".repeat(10_000));
        assert!(matches!(run(&mut s, &members), Err(EvalError::Syntax { .. })));
        let short = format!("1{}", " + 1".repeat(150));
        assert_eq!(run_ok(&mut s, &short), Value::Int(151));
    }

    #[test]
    fn let_binds_and_yields_null() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        assert_eq!(run_ok(&mut s, "let x = 41"), Value::Null);
        assert_eq!(run_ok(&mut s, "x + 1"), Value::Int(42));
        assert_eq!(run_ok(&mut s, "let a = 1; let b = 2; a + b"), Value::Int(3));
        assert_eq!(s.globals().get("x"), Some(&Value::Int(41)));
    }

    #[test]
    fn shell_context_keeps_its_own_bindings() {
        let dir = project("");
        let mut s = session(dir.path(), false);
        run_ok(&mut s, "let x = 1");
        assert!(s.globals().get("x").is_none());
        assert_eq!(s.shell_scope().get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn records_and_builtins() {
        let dir = project("[project]\nname = \"demo\"\nversion = \"0.3.0\"\n");
        let mut s = session(dir.path(), true);
        assert_eq!(run_ok(&mut s, "project.name"), Value::from("demo"));
        assert_eq!(run_ok(&mut s, "project.version"), Value::from("0.3.0"));
        assert_eq!(run_ok(&mut s, "project.missing"), Value::Null);
        assert_eq!(run_ok(&mut s, "framework.name"), Value::from("skiff"));
        assert_eq!(run_ok(&mut s, "len('héllo')"), Value::Int(5));
        assert_eq!(run_ok(&mut s, "len([1, 2, 3])"), Value::Int(3));
        assert_eq!(run_ok(&mut s, "str(12)"), Value::from("12"));
        assert_eq!(run_ok(&mut s, "json([1, 'a', null])"), Value::from("[1,\"a\",null]"));
        assert_eq!(run_ok(&mut s, "len(keys(framework))"), Value::Int(4));
    }

    #[test]
    fn module_list_includes_manifest_and_prelude() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        let Value::List(keys) = run_ok(&mut s, "modules()") else {
            panic!("expected a list");
        };
        assert!(keys.contains(&Value::from("skiff:prelude")));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn require_loads_once_and_caches() {
        let dir = project("");
        std::fs::write(dir.path().join("util.sk"), "let answer = 40 + 2\nlet name = 'util'").expect("module");
        let mut s = session(dir.path(), true);

        assert_eq!(run_ok(&mut s, "require('util').answer"), Value::Int(42));
        let key = dir.path().join("util.sk").display().to_string();
        let first = s.modules().get(&key).expect("cached");

        std::fs::write(dir.path().join("util.sk"), "let answer = 0").expect("rewrite");
        assert_eq!(run_ok(&mut s, "require('util.sk').answer"), Value::Int(42));
        assert!(std::sync::Arc::ptr_eq(&first, &s.modules().get(&key).expect("still cached")));
    }

    #[test]
    fn require_internal_and_missing_modules() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        assert_eq!(run_ok(&mut s, "require('skiff:prelude').name"), Value::from("skiff"));
        assert!(matches!(run(&mut s, "require('skiff:nope')"), Err(EvalError::Module { .. })));
        assert!(matches!(run(&mut s, "require('absent')"), Err(EvalError::Module { .. })));
    }

    #[test]
    fn circular_require_is_an_error() {
        let dir = project("");
        std::fs::write(dir.path().join("a.sk"), "let b = require('b')").expect("a");
        std::fs::write(dir.path().join("b.sk"), "let a = require('a')").expect("b");
        let mut s = session(dir.path(), true);
        let err = run(&mut s, "require('a')").expect_err("cycle");
        assert!(err.to_string().contains("circular"), "{err}");
        assert!(s.modules().get(&dir.path().join("a.sk").display().to_string()).is_none());
    }

    #[test]
    fn modules_see_handles_only_with_use_global() {
        let dir = project("[project]\nname = \"demo\"\n");
        std::fs::write(dir.path().join("peek.sk"), "let who = project.name").expect("module");

        let mut global = session(dir.path(), true);
        assert_eq!(run_ok(&mut global, "require('peek').who"), Value::from("demo"));

        let mut scoped = session(dir.path(), false);
        assert_eq!(
            run(&mut scoped, "require('peek')"),
            Err(EvalError::module(
                dir.path().join("peek.sk").display().to_string(),
                "undefined: project"
            ))
        );
        assert_eq!(run_ok(&mut scoped, "project.name"), Value::from("demo"));
    }

    #[test]
    fn module_context_binds_locally() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        run_ok(&mut s, "let shared = 5");
        let request = EvaluationRequest::new("let local = shared + 1; local", ContextId::Module("scratch".into()), "test");
        let value = Interpreter::new().eval_now(&request, &mut s).expect("eval");
        assert_eq!(value, Value::Int(6));
        assert!(s.globals().get("local").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn after_settles_on_the_runtime() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        let value = run_ok(&mut s, "after(10, 42)");
        let deferred = value.as_deferred().expect("deferred").clone();
        assert!(deferred.is_pending());
        assert_eq!(deferred.settled().await, Ok(Value::Int(42)));

        let rejected = run_ok(&mut s, "reject(5, 'nope')");
        let deferred = rejected.as_deferred().expect("deferred").clone();
        assert_eq!(deferred.settled().await, Err(EvalError::Raised("nope".into())));

        let ready = run_ok(&mut s, "resolve('x')");
        assert_eq!(
            ready.as_deferred().expect("deferred").state(),
            DeferredState::Resolved(Value::from("x"))
        );
    }

    #[test]
    fn deferred_builtins_need_a_runtime() {
        let dir = project("");
        let mut s = session(dir.path(), true);
        assert!(matches!(run(&mut s, "sleep(1)"), Err(EvalError::Internal(_))));
        assert!(run_ok(&mut s, "pending()").as_deferred().is_some());
    }
}
