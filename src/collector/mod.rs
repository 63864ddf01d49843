//! Input capture adapters.
//!
//! Each adapter translates OS callbacks into canonical [`EventKind`]s and hands
//! them to an [`EventSink`]. Pointer capture always comes from the portable
//! `rdev` adapter; keyboard capture comes from exactly one strategy, chosen per
//! platform when a session starts.

pub mod keymap;
pub mod portable;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

use crate::error::{AdapterInstallError, TeardownError};
use crate::session::focus::PointerState;
use crate::session::queue::EventQueue;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Re-export commonly used types
pub use portable::PortableAdapter;
pub use types::{Button, Event, EventKind};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, NativeKeyboardAdapter};

/// Configuration for which event sources to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_mouse: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse: true,
        }
    }
}

/// Which adapter provides keyboard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardStrategy {
    /// The portable hook library reports keys itself
    Portable,
    /// A native monitor that can tell left/right modifiers apart
    Native,
}

impl KeyboardStrategy {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            KeyboardStrategy::Native
        } else {
            KeyboardStrategy::Portable
        }
    }
}

/// A source of input events with a start/stop lifecycle.
pub trait CaptureAdapter: Send {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Install the OS hook and begin delivering into `sink`.
    fn start(&mut self, sink: EventSink) -> Result<(), AdapterInstallError>;

    /// Remove the hook, waiting at most `timeout` for the listener to exit.
    fn stop(&mut self, timeout: Duration) -> Result<(), TeardownError>;
}

/// Delivery side of a session, handed to every adapter.
///
/// All methods only update pointer state and enqueue; none of them block.
#[derive(Clone)]
pub struct EventSink {
    queue: EventQueue,
    pointer: Arc<PointerState>,
}

impl EventSink {
    pub fn new(queue: EventQueue, pointer: Arc<PointerState>) -> Self {
        Self { queue, pointer }
    }

    pub fn on_move(&self, x: i32, y: i32) {
        self.pointer.set_position(x, y);
        self.queue.push_input(EventKind::Move { x, y });
    }

    /// Button edge at an explicit position.
    pub fn on_click(&self, x: i32, y: i32, button: Button, pressed: bool) {
        self.pointer.set_position(x, y);
        self.pointer.set_button(button, pressed);
        self.queue.push_input(EventKind::Click {
            x,
            y,
            button,
            pressed,
        });
    }

    /// Button edge at the last known pointer position.
    pub fn on_button(&self, button: Button, pressed: bool) {
        let (x, y) = self.pointer.position();
        self.on_click(x, y, button, pressed);
    }

    pub fn on_scroll(&self, dx: i64, dy: i64) {
        let (x, y) = self.pointer.position();
        self.queue.push_input(EventKind::Scroll { x, y, dx, dy });
    }

    pub fn on_key(&self, name: String, pressed: bool) {
        let kind = if pressed {
            EventKind::KeyPress { name }
        } else {
            EventKind::KeyRelease { name }
        };
        self.queue.push_input(kind);
    }
}

/// A listener thread that can be joined with a deadline.
///
/// OS hook loops are not always cancellable. If the thread has not finished
/// when the deadline passes it is detached and reported as abandoned.
pub struct ListenerThread {
    name: &'static str,
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl ListenerThread {
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = bounded(1);
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            body();
            let _ = done_tx.send(());
        })?;
        Ok(Self { name, handle, done })
    }

    /// Wait for the thread to exit, giving up after `timeout`.
    pub fn join_timeout(self, timeout: Duration) -> Result<(), TeardownError> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    tracing::warn!(adapter = self.name, "listener thread panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(TeardownError::AdapterTimeout {
                adapter: self.name,
                timeout,
            }),
        }
    }
}

/// Build the adapters for this platform.
pub fn platform_adapters(config: CollectorConfig) -> Vec<Box<dyn CaptureAdapter>> {
    let strategy = KeyboardStrategy::for_platform();
    let portable_keyboard = config.capture_keyboard && strategy == KeyboardStrategy::Portable;

    let mut adapters: Vec<Box<dyn CaptureAdapter>> = Vec::new();

    if config.capture_mouse || portable_keyboard {
        adapters.push(Box::new(PortableAdapter::new(CollectorConfig {
            capture_keyboard: portable_keyboard,
            capture_mouse: config.capture_mouse,
        })));
    }

    #[cfg(target_os = "macos")]
    if config.capture_keyboard && strategy == KeyboardStrategy::Native {
        adapters.push(Box::new(NativeKeyboardAdapter::new()));
    }

    adapters
}

/// Whether the process may install global input hooks.
#[cfg(not(target_os = "macos"))]
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::Clock;
    use crate::stats::create_shared_stats;

    fn sink() -> (EventQueue, Arc<PointerState>, EventSink) {
        let queue = EventQueue::new(Clock::new(), create_shared_stats());
        let pointer = Arc::new(PointerState::new());
        let sink = EventSink::new(queue.clone(), pointer.clone());
        (queue, pointer, sink)
    }

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert!(config.capture_keyboard);
        assert!(config.capture_mouse);
    }

    #[test]
    fn test_keyboard_strategy_per_platform() {
        let strategy = KeyboardStrategy::for_platform();
        if cfg!(target_os = "macos") {
            assert_eq!(strategy, KeyboardStrategy::Native);
        } else {
            assert_eq!(strategy, KeyboardStrategy::Portable);
        }
    }

    #[test]
    fn test_single_keyboard_strategy() {
        let adapters = platform_adapters(CollectorConfig::default());
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert!(names.contains(&"portable"));
        if cfg!(target_os = "macos") {
            assert_eq!(names, vec!["portable", "native-keyboard"]);
        } else {
            assert_eq!(names, vec!["portable"]);
        }
    }

    #[test]
    fn test_no_sources_no_adapters() {
        let adapters = platform_adapters(CollectorConfig {
            capture_keyboard: false,
            capture_mouse: false,
        });
        assert!(adapters.is_empty());
    }

    #[test]
    fn test_sink_uses_last_position_for_buttons_and_scroll() {
        let (queue, pointer, sink) = sink();
        sink.on_move(12, 34);
        sink.on_button(Button::Right, true);
        sink.on_scroll(0, -3);

        assert_eq!(pointer.held_button(), Some(Button::Right));
        let kinds: Vec<EventKind> = std::iter::from_fn(|| queue.try_pop()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Move { x: 12, y: 34 },
                EventKind::Click {
                    x: 12,
                    y: 34,
                    button: Button::Right,
                    pressed: true
                },
                EventKind::Scroll {
                    x: 12,
                    y: 34,
                    dx: 0,
                    dy: -3
                },
            ]
        );
    }

    #[test]
    fn test_listener_join_within_timeout() {
        let listener = ListenerThread::spawn("quick", || {}).unwrap();
        assert!(listener.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_stuck_listener_is_abandoned() {
        let listener = ListenerThread::spawn("stuck", || {
            thread::sleep(Duration::from_secs(5));
        })
        .unwrap();

        let start = std::time::Instant::now();
        let result = listener.join_timeout(Duration::from_millis(50));
        assert!(matches!(
            result,
            Err(TeardownError::AdapterTimeout {
                adapter: "stuck",
                ..
            })
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
