//! Deferred values: results that settle later.
//!
//! A `Deferred` is the consumer half, cloned freely and compared by
//! identity. A `Resolver` is the producer half. The first settlement wins;
//! every later `resolve`/`reject` is ignored.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::EvalError;
use crate::value::{display_nested, Value};

static NEXT_DEFERRED_ID: AtomicU64 = AtomicU64::new(1);

/// Settlement state of a deferred value.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState {
    Pending,
    Resolved(Value),
    Rejected(EvalError),
}

impl DeferredState {
    pub fn is_pending(&self) -> bool {
        matches!(self, DeferredState::Pending)
    }
}

struct Inner {
    id: u64,
    // Held by both halves, so the channel never closes while anyone can
    // still observe it.
    state: watch::Sender<DeferredState>,
}

impl Inner {
    fn settle(&self, next: DeferredState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_pending() {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

/// Handle to a value that may not be available yet.
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<Inner>,
}

/// Producer half of a [`Deferred`].
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Deferred {
    /// Create a pending deferred value and its resolver.
    pub fn channel() -> (Deferred, Resolver) {
        let (state, _) = watch::channel(DeferredState::Pending);
        let inner = Arc::new(Inner {
            id: NEXT_DEFERRED_ID.fetch_add(1, Ordering::Relaxed),
            state,
        });
        (
            Deferred {
                inner: inner.clone(),
            },
            Resolver { inner },
        )
    }

    /// A deferred value that is already resolved.
    pub fn resolved(value: Value) -> Deferred {
        let (deferred, resolver) = Deferred::channel();
        resolver.resolve(value);
        deferred
    }

    /// A deferred value that is already rejected.
    pub fn rejected(error: EvalError) -> Deferred {
        let (deferred, resolver) = Deferred::channel();
        resolver.reject(error);
        deferred
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> DeferredState {
        self.inner.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().is_pending()
    }

    /// Wait for settlement.
    ///
    /// Resolves to `Ok(value)` or `Err(error)` once the deferred value
    /// settles; never completes while it stays pending. Dropping the future
    /// is the way to stop listening.
    pub async fn settled(&self) -> Result<Value, EvalError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| !s.is_pending())
            .await
            .map(|state| state.clone());
        match state {
            Ok(DeferredState::Resolved(value)) => Ok(value),
            Ok(DeferredState::Rejected(error)) => Err(error),
            _ => std::future::pending().await,
        }
    }

    /// Whether two handles refer to the same deferred value.
    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Resolver {
    /// Resolve with a value. Returns false if already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.inner.settle(DeferredState::Resolved(value))
    }

    /// Reject with an error. Returns false if already settled.
    pub fn reject(&self, error: EvalError) -> bool {
        self.inner.settle(DeferredState::Rejected(error))
    }

    /// The consumer half this resolver settles.
    pub fn deferred(&self) -> Deferred {
        Deferred {
            inner: self.inner.clone(),
        }
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.inner.id).finish()
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            DeferredState::Pending => write!(f, "Deferred {{ <pending> }}"),
            DeferredState::Resolved(value) => write!(f, "Deferred {{ {} }}", display_nested(&value)),
            DeferredState::Rejected(error) => write!(f, "Deferred {{ <rejected> {error} }}"),
        }
    }
}
