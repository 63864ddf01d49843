//! Portable pointer/keyboard capture built on `rdev`.
//!
//! `rdev::listen` installs a global hook and never returns, so a single listener
//! thread serves the whole process. Each adapter attaches its sink to that
//! listener on `start` and detaches it on `stop`; detached callbacks are
//! ignored.

use crate::collector::keymap;
use crate::collector::types::Button;
use crate::collector::{CaptureAdapter, CollectorConfig, EventSink};
use crate::error::{AdapterInstallError, TeardownError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use rdev::{EventType, Key};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

const ADAPTER_NAME: &str = "portable";

/// How long `start` waits for an immediate hook failure.
const INSTALL_GRACE: Duration = Duration::from_millis(250);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// The process-wide listener and the sink currently attached to it.
struct Hub {
    subscriber: Mutex<Option<Subscriber>>,
    listening: Mutex<bool>,
}

fn hub() -> &'static Hub {
    static HUB: OnceLock<Hub> = OnceLock::new();
    HUB.get_or_init(|| Hub {
        subscriber: Mutex::new(None),
        listening: Mutex::new(false),
    })
}

impl Hub {
    /// Spawn the listener thread once. Reports a hook that fails right away.
    fn ensure_listening(&self) -> Result<(), AdapterInstallError> {
        let mut listening = self.listening.lock();
        if *listening {
            return Ok(());
        }

        let (status_tx, status_rx) = bounded::<String>(1);
        thread::Builder::new()
            .name("rdev-listener".into())
            .spawn(move || {
                let result = rdev::listen(move |event| hub().dispatch(event));
                if let Err(e) = result {
                    tracing::warn!("rdev listener exited: {e:?}");
                    let _ = status_tx.send(format!("{e:?}"));
                    *hub().listening.lock() = false;
                }
            })
            .map_err(|e| AdapterInstallError::new(ADAPTER_NAME, e.to_string()))?;

        match status_rx.recv_timeout(INSTALL_GRACE) {
            Ok(reason) => Err(AdapterInstallError::new(ADAPTER_NAME, reason)),
            Err(RecvTimeoutError::Timeout) => {
                *listening = true;
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => Err(AdapterInstallError::new(
                ADAPTER_NAME,
                "listener thread exited",
            )),
        }
    }

    fn dispatch(&self, event: rdev::Event) {
        if let Some(subscriber) = self.subscriber.lock().as_mut() {
            subscriber.handle(event);
        }
    }
}

/// Translates raw `rdev` events for one attached sink.
struct Subscriber {
    id: u64,
    sink: EventSink,
    config: CollectorConfig,
    /// Names chosen at press time, reused for the matching release
    pressed_names: Vec<(Key, String)>,
}

impl Subscriber {
    fn new(sink: EventSink, config: CollectorConfig) -> Self {
        Self {
            id: NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed),
            sink,
            config,
            pressed_names: Vec::new(),
        }
    }

    fn handle(&mut self, event: rdev::Event) {
        match event.event_type {
            EventType::MouseMove { x, y } if self.config.capture_mouse => {
                self.sink.on_move(x.round() as i32, y.round() as i32);
            }
            EventType::ButtonPress(button) if self.config.capture_mouse => {
                self.sink.on_button(map_button(button), true);
            }
            EventType::ButtonRelease(button) if self.config.capture_mouse => {
                self.sink.on_button(map_button(button), false);
            }
            EventType::Wheel { delta_x, delta_y } if self.config.capture_mouse => {
                self.sink.on_scroll(delta_x, delta_y);
            }
            EventType::KeyPress(key) if self.config.capture_keyboard => {
                let name = press_name(key, event.name.as_deref());
                self.pressed_names.retain(|(k, _)| *k != key);
                self.pressed_names.push((key, name.clone()));
                self.sink.on_key(name, true);
            }
            EventType::KeyRelease(key) if self.config.capture_keyboard => {
                let name = match self.pressed_names.iter().position(|(k, _)| *k == key) {
                    Some(index) => self.pressed_names.swap_remove(index).1,
                    None => press_name(key, event.name.as_deref()),
                };
                self.sink.on_key(name, false);
            }
            _ => {}
        }
    }
}

fn map_button(button: rdev::Button) -> Button {
    match button {
        rdev::Button::Left => Button::Left,
        rdev::Button::Right => Button::Right,
        rdev::Button::Middle => Button::Middle,
        rdev::Button::Unknown(_) => Button::Other,
    }
}

fn press_name(key: Key, text: Option<&str>) -> String {
    match text {
        Some(text) if keymap::is_printable(text) => text.to_string(),
        _ => symbolic_name(key),
    }
}

/// Symbolic identifier for keys without a printable character.
pub fn symbolic_name(key: Key) -> String {
    let name = match key {
        Key::Alt => "left_alt",
        Key::AltGr => "right_alt",
        Key::Backspace => "backspace",
        Key::CapsLock => "caps_lock",
        Key::ControlLeft => "left_ctrl",
        Key::ControlRight => "right_ctrl",
        Key::Delete => "delete",
        Key::DownArrow => "down",
        Key::End => "end",
        Key::Escape => "esc",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::Home => "home",
        Key::LeftArrow => "left",
        Key::MetaLeft => "left_cmd",
        Key::MetaRight => "right_cmd",
        Key::PageDown => "page_down",
        Key::PageUp => "page_up",
        Key::Return | Key::KpReturn => "enter",
        Key::RightArrow => "right",
        Key::ShiftLeft => "left_shift",
        Key::ShiftRight => "right_shift",
        Key::Space => "space",
        Key::Tab => "tab",
        Key::UpArrow => "up",
        Key::PrintScreen => "print_screen",
        Key::ScrollLock => "scroll_lock",
        Key::Pause => "pause",
        Key::NumLock => "num_lock",
        Key::Insert => "insert",
        Key::Function => "fn",
        Key::Unknown(code) => return format!("key_{code}"),
        other => return format!("{other:?}").to_lowercase(),
    };
    name.to_string()
}

/// Pointer capture (and keyboard capture where no native monitor is used).
pub struct PortableAdapter {
    config: CollectorConfig,
    subscriber_id: Option<u64>,
}

impl PortableAdapter {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            subscriber_id: None,
        }
    }
}

impl CaptureAdapter for PortableAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn start(&mut self, sink: EventSink) -> Result<(), AdapterInstallError> {
        let hub = hub();
        hub.ensure_listening()?;

        let subscriber = Subscriber::new(sink, self.config);
        self.subscriber_id = Some(subscriber.id);
        *hub.subscriber.lock() = Some(subscriber);
        tracing::info!(
            keyboard = self.config.capture_keyboard,
            mouse = self.config.capture_mouse,
            "Portable input hook attached"
        );
        Ok(())
    }

    fn stop(&mut self, _timeout: Duration) -> Result<(), TeardownError> {
        // Detaching is immediate; the shared listener thread keeps running.
        if let Some(id) = self.subscriber_id.take() {
            let mut slot = hub().subscriber.lock();
            if slot.as_ref().is_some_and(|s| s.id == id) {
                *slot = None;
            }
        }
        Ok(())
    }
}

impl Drop for PortableAdapter {
    fn drop(&mut self) {
        let _ = self.stop(Duration::ZERO);
    }
}
