//! Terminal side of the shell: raw key input while a deferred value is
//! awaited, notices under the prompt, and screen clearing.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, Clear, ClearType};
use tokio::sync::broadcast;

use skiff_kernel::{Key, KeyListener, KeySubscription, Notice, NoticeSink};

use crate::format::{self, Style};

/// Also the longest a stopped reader keeps running after its subscription
/// is dropped.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Keys read from the controlling terminal.
///
/// Each subscription switches the terminal to raw mode and starts a reader
/// thread. Dropping the subscription signals the thread and restores the
/// terminal at once; the thread notices within one poll interval and exits
/// on its own, so a settled wait never blocks on it. The line editor owns
/// the terminal the rest of the time.
///
/// Keys typed while a wait is in progress are consumed by the reader and do
/// not reach the next prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalKeys;

impl KeyListener for TerminalKeys {
    fn listen(&self) -> KeySubscription {
        if let Err(e) = terminal::enable_raw_mode() {
            tracing::warn!("Cannot read keys from the terminal: {}", e);
            return KeySubscription::closed();
        }

        let (tx, rx) = broadcast::channel(16);
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("skiff-keys".into())
                .spawn(move || read_keys(tx, &stop))
        };

        match reader {
            // Detached: the guard never joins it.
            Ok(_) => KeySubscription::new(rx).with_guard(RawModeGuard { stop }),
            Err(e) => {
                tracing::warn!("Failed to start key reader: {}", e);
                restore_terminal();
                KeySubscription::closed()
            }
        }
    }
}

fn read_keys(tx: broadcast::Sender<Key>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                tracing::debug!("key poll failed: {}", e);
                return;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                // No receivers just means the wait already settled.
                let _ = tx.send(map_key(key));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("key read failed: {}", e);
                return;
            }
        }
    }
}

pub fn map_key(key: KeyEvent) -> Key {
    match key.code {
        KeyCode::Esc => Key::Escape,
        KeyCode::Enter => Key::Enter,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::CtrlC,
        KeyCode::Char(c) => Key::Char(c),
        _ => Key::Other,
    }
}

struct RawModeGuard {
    stop: Arc<AtomicBool>,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        restore_terminal();
    }
}

fn restore_terminal() {
    if let Err(e) = terminal::disable_raw_mode() {
        tracing::warn!("Failed to restore the terminal: {}", e);
    }
}

/// Notices printed on their own line. Lines end in `\r\n` because the hint
/// can arrive while the terminal is raw.
#[derive(Debug, Clone, Copy)]
pub struct TerminalNotices {
    style: Style,
}

impl TerminalNotices {
    pub fn new(style: Style) -> Self {
        Self { style }
    }
}

impl NoticeSink for TerminalNotices {
    fn notice(&self, notice: Notice) {
        let mut out = std::io::stdout().lock();
        let line = format::notice(&notice, self.style);
        if let Err(e) = write!(out, "{line}\r\n").and_then(|()| out.flush()) {
            tracing::warn!("Failed to print notice: {}", e);
        }
    }
}

pub fn clear_screen() {
    let mut out = std::io::stdout();
    if let Err(e) = crossterm::execute!(out, Clear(ClearType::All), MoveTo(0, 0)) {
        tracing::warn!("Failed to clear the screen: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_map_key() {
        assert_eq!(map_key(press(KeyCode::Esc, KeyModifiers::NONE)), Key::Escape);
        assert_eq!(map_key(press(KeyCode::Enter, KeyModifiers::NONE)), Key::Enter);
        assert_eq!(map_key(press(KeyCode::Char('c'), KeyModifiers::CONTROL)), Key::CtrlC);
        assert_eq!(map_key(press(KeyCode::Char('c'), KeyModifiers::NONE)), Key::Char('c'));
        assert_eq!(map_key(press(KeyCode::F(1), KeyModifiers::NONE)), Key::Other);
    }

    #[test]
    fn test_guard_drop_signals_the_reader() {
        let stop = Arc::new(AtomicBool::new(false));
        let started = std::time::Instant::now();
        drop(RawModeGuard { stop: stop.clone() });
        assert!(stop.load(Ordering::Relaxed));
        assert!(started.elapsed() < POLL_INTERVAL * 10);
    }

    #[test]
    fn test_stopped_reader_returns_without_reading() {
        let (tx, mut rx) = broadcast::channel(1);
        read_keys(tx, &AtomicBool::new(true));
        assert!(rx.try_recv().is_err());
    }
}
