//! Key events for cancelling a wait.
//!
//! The interceptor subscribes while it awaits a deferred value and drops the
//! subscription the moment the wait settles. Where the keys come from is the
//! host's business: the shell feeds them from the terminal, tests push them
//! through a [`KeyBus`].

use std::any::Any;
use std::fmt;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// A named key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    CtrlC,
    Char(char),
    Other,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Escape => write!(f, "Escape"),
            Key::Enter => write!(f, "Enter"),
            Key::CtrlC => write!(f, "Ctrl-C"),
            Key::Char(c) => write!(f, "{c}"),
            Key::Other => write!(f, "<key>"),
        }
    }
}

/// A live registration for key events.
///
/// Dropping it unregisters, and releases whatever the listener attached
/// (raw mode, a reader thread).
pub struct KeySubscription {
    rx: Option<broadcast::Receiver<Key>>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl KeySubscription {
    pub fn new(rx: broadcast::Receiver<Key>) -> Self {
        Self { rx: Some(rx), _guard: None }
    }

    /// A subscription that never yields a key.
    pub fn closed() -> Self {
        Self { rx: None, _guard: None }
    }

    /// Keep `guard` alive for as long as the subscription.
    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// The next key, or `None` once the source is gone.
    pub async fn next(&mut self) -> Option<Key> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(key) => return Some(key),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "key listener lagged");
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }
}

impl fmt::Debug for KeySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Source of key subscriptions.
pub trait KeyListener: Send + Sync {
    fn listen(&self) -> KeySubscription;
}

impl<T: KeyListener + ?Sized> KeyListener for std::sync::Arc<T> {
    fn listen(&self) -> KeySubscription {
        (**self).listen()
    }
}

/// In-process key source.
#[derive(Debug, Clone)]
pub struct KeyBus {
    tx: broadcast::Sender<Key>,
}

impl KeyBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Deliver a key to every live subscription; returns how many got it.
    pub fn press(&self, key: Key) -> usize {
        self.tx.send(key).unwrap_or(0)
    }

    /// Number of live subscriptions.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for KeyBus {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyListener for KeyBus {
    fn listen(&self) -> KeySubscription {
        KeySubscription::new(self.tx.subscribe())
    }
}

/// No keyboard: waits can't be cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullKeys;

impl KeyListener for NullKeys {
    fn listen(&self) -> KeySubscription {
        KeySubscription::closed()
    }
}
