//! Evaluation interception.
//!
//! [`EvalInterceptor`] wraps an [`Evaluator`] and takes over the shell's
//! evaluation step. Immediate results and errors go straight to `done`.
//! A deferred result is arbitrated: whichever of resolution, rejection or
//! the cancel key reaches the settlement check first is delivered, and
//! everything after that is a no-op. `done` runs exactly once per request.
//!
//! ```text
//! evaluate ──▶ inner.eval ──┬── Err(e) ───────────────▶ done(Failure(e))
//!                           ├── Ok(v), v not deferred ─▶ done(Value(v))
//!                           └── Ok(deferred) ──▶ PendingWait
//!                                                 ├── resolved v ──▶ done(Value(v))
//!                                                 ├── rejected e ──▶ done(Failure(e))
//!                                                 ├── Escape ──────▶ done(Value(deferred))
//!                                                 └── hint timer ──▶ notice only
//! ```
//!
//! A panic while delivering a settled outcome is a defect in the host, not
//! a user error. It never reaches `done`; it goes to the internal fault
//! channel and the error log.

use std::fmt;
use std::future::pending;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;

use skiff_types::{Deferred, EvalError, EvaluationOutcome, EvaluationRequest, Value};

use crate::interpreter::Evaluator;
use crate::keys::{Key, KeyListener, KeySubscription, NullKeys};
use crate::session::SessionState;

/// Single-shot result callback.
pub type Done = Box<dyn FnOnce(EvaluationOutcome) + Send>;

const DEFAULT_HINT_DELAY: Duration = Duration::from_secs(5);

/// Stops the wait and delivers the deferred value itself.
const CANCEL_KEY: Key = Key::Escape;

/// How results are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Await deferred values.
    Intercept,
    /// Hand every result to `done` as is.
    PassThrough,
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMode::Intercept => write!(f, "intercept"),
            EvalMode::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// Shared, toggleable evaluation mode.
///
/// The interceptor reads it once per submission, so flipping it never
/// affects an evaluation already in flight.
#[derive(Debug, Clone)]
pub struct ModeSwitch(Arc<AtomicBool>);

impl ModeSwitch {
    pub fn new(mode: EvalMode) -> Self {
        Self(Arc::new(AtomicBool::new(mode == EvalMode::Intercept)))
    }

    pub fn get(&self) -> EvalMode {
        if self.0.load(Ordering::SeqCst) {
            EvalMode::Intercept
        } else {
            EvalMode::PassThrough
        }
    }

    pub fn set(&self, mode: EvalMode) {
        self.0.store(mode == EvalMode::Intercept, Ordering::SeqCst);
    }

    /// Flip the mode and return the new one.
    pub fn toggle(&self) -> EvalMode {
        let was_intercepting = self.0.fetch_xor(true, Ordering::SeqCst);
        if was_intercepting {
            EvalMode::PassThrough
        } else {
            EvalMode::Intercept
        }
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::new(EvalMode::Intercept)
    }
}

/// User-visible messages emitted during arbitration.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Still waiting after the hint delay.
    Hint { key: Key },
    /// The cancel key stopped the wait.
    Interrupted,
    /// The awaited value rejected.
    Rejected(EvalError),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Hint { key } => write!(f, "Waiting for a deferred value; press {key} to stop waiting"),
            Notice::Interrupted => write!(f, "Wait interrupted; returning the unresolved value"),
            Notice::Rejected(e) => write!(f, "Deferred value rejected: {e}"),
        }
    }
}

/// Where notices go.
pub trait NoticeSink: Send + Sync {
    fn notice(&self, notice: Notice);
}

impl<F> NoticeSink for F
where
    F: Fn(Notice) + Send + Sync,
{
    fn notice(&self, notice: Notice) {
        self(notice)
    }
}

/// Notices as log lines, for hosts without a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn notice(&self, notice: Notice) {
        tracing::info!("{notice}");
    }
}

/// A defect raised while delivering a settled outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalFault {
    pub source_label: String,
    pub message: String,
}

impl fmt::Display for InternalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "internal fault while handling {}: {}", self.source_label, self.message)
    }
}

/// State held while a deferred value is awaited.
///
/// Settling deactivates the key subscription and the hint timer and hands
/// out `done`; only the first settlement gets it.
struct PendingWait {
    deferred: Deferred,
    keys: Option<KeySubscription>,
    hint: Option<Pin<Box<Sleep>>>,
    done: Option<Done>,
}

impl PendingWait {
    fn new(deferred: Deferred, keys: KeySubscription, hint_delay: Duration, done: Done) -> Self {
        Self {
            deferred,
            keys: (!keys.is_closed()).then_some(keys),
            hint: Some(Box::pin(tokio::time::sleep(hint_delay))),
            done: Some(done),
        }
    }

    fn settle(&mut self) -> Option<Done> {
        let done = self.done.take()?;
        self.keys = None;
        self.hint = None;
        Some(done)
    }

    fn is_settled(&self) -> bool {
        self.done.is_none()
    }
}

async fn next_key(keys: &mut Option<KeySubscription>) -> Option<Key> {
    match keys {
        Some(sub) => sub.next().await,
        None => pending().await,
    }
}

async fn hint_elapsed(hint: &mut Option<Pin<Box<Sleep>>>) {
    match hint {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}

/// The evaluation step the shell calls.
pub struct EvalInterceptor<E> {
    inner: E,
    keys: Arc<dyn KeyListener>,
    notices: Arc<dyn NoticeSink>,
    mode: ModeSwitch,
    hint_delay: Duration,
    faults: mpsc::UnboundedSender<InternalFault>,
    fault_rx: Mutex<Option<mpsc::UnboundedReceiver<InternalFault>>>,
}

impl<E: Evaluator> EvalInterceptor<E> {
    /// Wrap `inner` in intercept mode, with no key source and notices going
    /// to the log.
    pub fn new(inner: E) -> Self {
        let (faults, fault_rx) = mpsc::unbounded_channel();
        Self {
            inner,
            keys: Arc::new(NullKeys),
            notices: Arc::new(LogNotices),
            mode: ModeSwitch::default(),
            hint_delay: DEFAULT_HINT_DELAY,
            faults,
            fault_rx: Mutex::new(Some(fault_rx)),
        }
    }

    pub fn with_keys(mut self, keys: impl KeyListener + 'static) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn with_notices(mut self, notices: impl NoticeSink + 'static) -> Self {
        self.notices = Arc::new(notices);
        self
    }

    pub fn with_mode_switch(mut self, mode: ModeSwitch) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hint_delay(mut self, delay: Duration) -> Self {
        self.hint_delay = delay;
        self
    }

    /// Handle for toggling from elsewhere (a shell command).
    pub fn mode_switch(&self) -> ModeSwitch {
        self.mode.clone()
    }

    pub fn toggle_mode(&self) -> EvalMode {
        self.mode.toggle()
    }

    /// Take the fault receiver, for hosts that watch it asynchronously.
    pub fn take_fault_receiver(&self) -> Option<mpsc::UnboundedReceiver<InternalFault>> {
        self.fault_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Faults reported since the last drain. Empty once the receiver has
    /// been taken.
    pub fn drain_faults(&self) -> Vec<InternalFault> {
        let mut guard = self.fault_rx.lock().unwrap_or_else(|e| e.into_inner());
        let mut drained = Vec::new();
        if let Some(rx) = guard.as_mut() {
            while let Ok(fault) = rx.try_recv() {
                drained.push(fault);
            }
        }
        drained
    }

    /// Evaluate `request` and deliver exactly one outcome to `done`.
    ///
    /// Immediate results are delivered before the real evaluator's result
    /// is dropped; nothing else is awaited. Deferred results are awaited
    /// here until settled or cancelled.
    pub async fn evaluate(&self, request: EvaluationRequest, session: &mut SessionState, done: Done) {
        let mode = self.mode.get();
        let result = self.inner.eval(&request, session).await;

        let deferred = match (mode, result) {
            (_, Err(error)) => {
                tracing::debug!(source = %request.source_label, "immediate failure");
                done(EvaluationOutcome::Failure(error));
                return;
            }
            (EvalMode::PassThrough, Ok(value)) => {
                done(EvaluationOutcome::Value(value));
                return;
            }
            (EvalMode::Intercept, Ok(Value::Deferred(deferred))) => deferred,
            (EvalMode::Intercept, Ok(value)) => {
                tracing::debug!(source = %request.source_label, kind = value.type_name(), "immediate value");
                done(EvaluationOutcome::Value(value));
                return;
            }
        };

        tracing::debug!(source = %request.source_label, id = deferred.id(), "awaiting deferred value");
        self.arbitrate(&request.source_label, deferred, done).await;
    }

    /// Evaluate and return the outcome instead of taking a callback.
    pub async fn evaluate_outcome(&self, request: EvaluationRequest, session: &mut SessionState) -> EvaluationOutcome {
        let (tx, rx) = oneshot::channel();
        let done: Done = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        self.evaluate(request, session, done).await;
        rx.await.unwrap_or_else(|_| {
            EvaluationOutcome::Failure(EvalError::Internal("no outcome was delivered".into()))
        })
    }

    async fn arbitrate(&self, source_label: &str, deferred: Deferred, done: Done) {
        let mut wait = PendingWait::new(deferred, self.keys.listen(), self.hint_delay, done);

        while !wait.is_settled() {
            let watched = wait.deferred.clone();
            tokio::select! {
                biased;

                settled = watched.settled() => {
                    let Some(done) = wait.settle() else { break };
                    match settled {
                        Ok(value) => {
                            self.deliver(source_label, None, done, EvaluationOutcome::Value(value));
                        }
                        Err(error) => {
                            let notice = Notice::Rejected(error.clone());
                            self.deliver(source_label, Some(notice), done, EvaluationOutcome::Failure(error));
                        }
                    }
                }

                key = next_key(&mut wait.keys) => match key {
                    Some(key) if key == CANCEL_KEY => {
                        let Some(done) = wait.settle() else { break };
                        tracing::debug!(id = wait.deferred.id(), "wait cancelled");
                        let unresolved = EvaluationOutcome::Value(Value::Deferred(wait.deferred.clone()));
                        self.deliver(source_label, Some(Notice::Interrupted), done, unresolved);
                    }
                    Some(_) => {}
                    None => {
                        tracing::debug!("key source closed; wait can no longer be cancelled");
                        wait.keys = None;
                    }
                },

                () = hint_elapsed(&mut wait.hint) => {
                    wait.hint = None;
                    self.notices.notice(Notice::Hint { key: CANCEL_KEY });
                }
            }
        }
    }

    /// Run the settlement side effects, routing any panic to the fault
    /// channel instead of `done`.
    fn deliver(&self, source_label: &str, notice: Option<Notice>, done: Done, outcome: EvaluationOutcome) {
        let notices = &self.notices;
        let result = catch_unwind(AssertUnwindSafe(move || {
            if let Some(notice) = notice {
                notices.notice(notice);
            }
            done(outcome);
        }));

        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            tracing::error!(source = %source_label, "internal fault while delivering a result: {message}");
            let _ = self.faults.send(InternalFault {
                source_label: source_label.to_string(),
                message,
            });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
