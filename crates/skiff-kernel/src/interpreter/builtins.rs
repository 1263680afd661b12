//! Builtin functions.
//!
//! | name | result |
//! |------|--------|
//! | `after(ms, v)` | deferred, resolves to `v` after `ms` |
//! | `sleep(ms)` | deferred, resolves to `null` after `ms` |
//! | `reject(ms, msg)` | deferred, rejects with `msg` after `ms` |
//! | `resolve(v)` | deferred, already resolved |
//! | `pending()` | deferred, never settles |
//! | `fail(msg)` | evaluation error |
//! | `require(path)` | module exports record |
//! | `modules()` | module cache keys |
//! | `len(x)`, `str(x)`, `json(x)`, `keys(r)` | utilities |

use std::path::{Path, PathBuf};
use std::time::Duration;

use skiff_types::{ContextId, Deferred, EvalError, EvalResult, Value};

use super::eval::Frame;
use crate::framework::module_key;
use crate::modules::{Module, INTERNAL_PREFIX};
use crate::parser::parse;

/// Extension appended to `require` paths that have none.
const MODULE_EXT: &str = "sk";

pub(super) fn call(frame: &mut Frame<'_>, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "after" => {
            let [ms, value] = arity::<2>(name, args)?;
            settle_later(delay(name, &ms)?, Ok(value))
        }
        "sleep" => {
            let [ms] = arity::<1>(name, args)?;
            settle_later(delay(name, &ms)?, Ok(Value::Null))
        }
        "reject" => {
            let [ms, message] = arity::<2>(name, args)?;
            settle_later(delay(name, &ms)?, Err(EvalError::Raised(message.to_string())))
        }
        "resolve" => {
            let [value] = arity::<1>(name, args)?;
            Ok(Value::Deferred(Deferred::resolved(value)))
        }
        "pending" => {
            let [] = arity::<0>(name, args)?;
            // The resolver is dropped; nothing can settle this one.
            let (deferred, _) = Deferred::channel();
            Ok(Value::Deferred(deferred))
        }
        "fail" => {
            let [message] = arity::<1>(name, args)?;
            Err(EvalError::Raised(message.to_string()))
        }
        "require" => {
            let [path] = arity::<1>(name, args)?;
            match path {
                Value::String(path) => require(frame, &path),
                other => Err(type_error(name, "a string path", &other)),
            }
        }
        "modules" => {
            let [] = arity::<0>(name, args)?;
            Ok(Value::List(
                frame.session.modules().keys().into_iter().map(Value::String).collect(),
            ))
        }
        "len" => {
            let [value] = arity::<1>(name, args)?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Record(fields) => fields.len(),
                other => return Err(type_error(name, "a string, list or record", other)),
            };
            Ok(Value::Int(len as i64))
        }
        "str" => {
            let [value] = arity::<1>(name, args)?;
            Ok(Value::String(value.to_string()))
        }
        "json" => {
            let [value] = arity::<1>(name, args)?;
            serde_json::to_string(&value.to_json())
                .map(Value::String)
                .map_err(|e| EvalError::Internal(e.to_string()))
        }
        "keys" => {
            let [value] = arity::<1>(name, args)?;
            match value {
                Value::Record(fields) => Ok(Value::List(fields.into_keys().map(Value::String).collect())),
                other => Err(type_error(name, "a record", &other)),
            }
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn arity<const N: usize>(name: &str, args: Vec<Value>) -> EvalResult<[Value; N]> {
    let got = args.len();
    args.try_into().map_err(|_| EvalError::Arity {
        name: name.to_string(),
        expected: N,
        got,
    })
}

fn type_error(name: &str, expected: &str, got: &Value) -> EvalError {
    EvalError::Type(format!("{name}() expects {expected}, got {}", got.type_name()))
}

fn delay(name: &str, ms: &Value) -> EvalResult<Duration> {
    match ms {
        Value::Int(ms) if *ms >= 0 => Ok(Duration::from_millis(*ms as u64)),
        other => Err(type_error(name, "a non-negative millisecond count", other)),
    }
}

/// Hand back a pending deferred value and settle it from a timer task.
fn settle_later(after: Duration, outcome: Result<Value, EvalError>) -> EvalResult<Value> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|_| EvalError::Internal("deferred values need a running event loop".into()))?;
    let (deferred, resolver) = Deferred::channel();
    handle.spawn(async move {
        tokio::time::sleep(after).await;
        let settled = match outcome {
            Ok(value) => resolver.resolve(value),
            Err(error) => resolver.reject(error),
        };
        tracing::trace!(id = resolver.deferred().id(), settled, "timer fired");
    });
    Ok(Value::Deferred(deferred))
}

/// Load a module through the cache.
///
/// `skiff:` keys only name modules the framework already registered. Other
/// paths resolve against the session root; a missing extension means `.sk`.
fn require(frame: &mut Frame<'_>, path: &str) -> EvalResult<Value> {
    if path.starts_with(INTERNAL_PREFIX) {
        return frame
            .session
            .modules()
            .get(path)
            .map(|module| module.exports_value())
            .ok_or_else(|| EvalError::module(path, "internal module is not loaded"));
    }

    let file = resolve(frame.session.root(), path);
    let key = module_key(&file);
    if let Some(module) = frame.session.modules().get(&key) {
        return Ok(module.exports_value());
    }
    if frame.loading.contains(&key) {
        return Err(EvalError::module(&key, "circular require"));
    }

    let source = std::fs::read_to_string(&file).map_err(|e| EvalError::module(&key, e.to_string()))?;
    let program = parse(&source).map_err(|e| EvalError::module(&key, e.to_string()))?;

    tracing::debug!(module = %key, from = %frame.context(), "loading module");
    frame.loading.push(key.clone());
    let result = {
        let mut nested = Frame::new(&mut *frame.session, ContextId::Module(key.clone()), &mut *frame.loading);
        nested.run(&program).map(|_| nested.into_locals())
    };
    frame.loading.pop();

    let locals = result.map_err(|e| EvalError::module(&key, e.to_string()))?;
    let module = Module::new(key, Some(file), source).with_exports(locals.into_bindings());
    let module = frame.session.modules_mut().insert(module);
    Ok(module.exports_value())
}

fn resolve(root: &Path, path: &str) -> PathBuf {
    let mut file = root.join(path);
    if file.extension().is_none() {
        file.set_extension(MODULE_EXT);
    }
    file
}
