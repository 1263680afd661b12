//! Statement and expression evaluation.
//!
//! A `Frame` is one running program: the session it reads and writes, the
//! context its `let` bindings land in, and the stack of modules currently
//! being loaded (for cycle detection across nested `require`s).

use std::cmp::Ordering;

use skiff_types::{ContextId, EvalError, EvalResult, Value};

use super::builtins;
use super::scope::Scope;
use crate::ast::{BinaryOp, Expr, Literal, Program, Stmt};
use crate::session::SessionState;

pub(crate) struct Frame<'a> {
    pub(super) session: &'a mut SessionState,
    context: ContextId,
    /// Bindings of a module body; unused for the global and shell contexts.
    locals: Scope,
    pub(super) loading: &'a mut Vec<String>,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(session: &'a mut SessionState, context: ContextId, loading: &'a mut Vec<String>) -> Self {
        Self {
            session,
            context,
            locals: Scope::new(),
            loading,
        }
    }

    /// Run every statement; the result is the last statement's value.
    pub(crate) fn run(&mut self, program: &Program) -> EvalResult<Value> {
        let mut last = Value::Null;
        for stmt in &program.stmts {
            last = match stmt {
                Stmt::Let { name, value } => {
                    let value = self.eval(value)?;
                    self.bind(name, value);
                    Value::Null
                }
                Stmt::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    /// The bindings a module body produced.
    pub(crate) fn into_locals(self) -> Scope {
        self.locals
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.context {
            ContextId::Global => self.session.globals_mut().set(name, value),
            ContextId::Shell => self.session.shell_scope_mut().set(name, value),
            ContextId::Module(_) => self.locals.set(name, value),
        }
    }

    fn lookup(&mut self, name: &str) -> EvalResult<Value> {
        let own = match self.context {
            ContextId::Global => None,
            ContextId::Shell => self.session.shell_scope().get(name),
            ContextId::Module(_) => self.locals.get(name),
        };
        if let Some(value) = own.or_else(|| self.session.globals().get(name)) {
            return Ok(value.clone());
        }

        if self.session.handles_visible(&self.context) {
            match name {
                "project" => {
                    let project = self
                        .session
                        .project()
                        .map_err(|e| EvalError::Framework(e.to_string()))?;
                    return Ok(project.to_value());
                }
                "framework" => {
                    let framework = self
                        .session
                        .framework()
                        .map_err(|e| EvalError::Framework(e.to_string()))?;
                    return Ok(framework.to_value());
                }
                _ => {}
            }
        }
        Err(EvalError::Undefined(name.to_string()))
    }

    pub(super) fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(literal(lit)),
            Expr::Ident(name) => self.lookup(name),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            Expr::Member { target, field } => {
                let target = self.eval(target)?;
                member(&target, field)
            }
            Expr::Call { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                builtins::call(self, name, args)
            }
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::Type("integer overflow".into())),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(EvalError::Type(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
        }
    }

    pub(super) fn context(&self) -> &ContextId {
        &self.context
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(x) => Value::Float(*x),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// Field access. Missing record fields read as `null`.
fn member(target: &Value, field: &str) -> EvalResult<Value> {
    match target {
        Value::Record(fields) => Ok(fields.get(field).cloned().unwrap_or(Value::Null)),
        other => Err(EvalError::Type(format!(
            "cannot read field '{field}' of {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equal(&lhs, &rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!equal(&lhs, &rhs))),
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, lhs, rhs),
    }
}

fn equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64).partial_cmp(b) == Some(Ordering::Equal)
        }
        _ => lhs == rhs,
    }
}

fn add(lhs: Value, rhs: Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Value::String(a), other) => Ok(Value::String(format!("{a}{other}"))),
        (other, Value::String(b)) => Ok(Value::String(format!("{other}{b}"))),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (lhs, rhs) => arithmetic(BinaryOp::Add, lhs, rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_op(op, as_float(&lhs), as_float(&rhs))
        }
        _ => Err(EvalError::Type(format!(
            "unsupported operands for {op}: {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::Eq | BinaryOp::NotEq => None,
    };
    result
        .map(Value::Int)
        .ok_or_else(|| EvalError::Type(format!("integer overflow in {a} {op} {b}")))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> EvalResult<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::Eq | BinaryOp::NotEq => {
            return Err(EvalError::Internal(format!("{op} is not arithmetic")))
        }
    };
    Ok(Value::Float(result))
}
