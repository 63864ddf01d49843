//! macOS keyboard capture using a listen-only CGEvent tap.
//!
//! The portable hook cannot tell left from right modifiers on macOS, so key
//! down/up and flags-changed events come from a native tap instead. Flags-changed
//! events only carry the new aggregate mask; [`ModifierTracker`] diffs it
//! against the previous one to recover each modifier edge. Requires Input
//! Monitoring permission.

use crate::collector::keymap::{self, ModifierTracker};
use crate::collector::{CaptureAdapter, EventSink, ListenerThread};
use crate::error::{AdapterInstallError, TeardownError};
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    CallbackResult, EventField,
};
use core_graphics::event_source::CGEventSourceStateID;
use crossbeam_channel::{bounded, Sender};
use foreign_types::ForeignType;
use std::cell::RefCell;
use std::os::raw::c_ulong;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ADAPTER_NAME: &str = "native-keyboard";

/// How long `start` waits for the tap thread to report.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventKeyboardGetUnicodeString(
        event: *mut core_graphics::sys::CGEvent,
        max_string_length: c_ulong,
        actual_string_length: *mut c_ulong,
        unicode_string: *mut u16,
    );
    fn CGEventSourceFlagsState(state_id: CGEventSourceStateID) -> u64;
}

/// Native key and modifier monitor. Owns its tap for its whole lifetime.
pub struct NativeKeyboardAdapter {
    running: Arc<AtomicBool>,
    listener: Option<ListenerThread>,
}

impl NativeKeyboardAdapter {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            listener: None,
        }
    }
}

impl Default for NativeKeyboardAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureAdapter for NativeKeyboardAdapter {
    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    fn start(&mut self, sink: EventSink) -> Result<(), AdapterInstallError> {
        if self.listener.is_some() {
            return Err(AdapterInstallError::new(ADAPTER_NAME, "already running"));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let (status_tx, status_rx) = bounded(1);

        let listener = ListenerThread::spawn(ADAPTER_NAME, move || {
            if let Err(e) = run_tap_loop(sink, running.clone(), status_tx) {
                tracing::warn!("Keyboard tap error: {e}");
            }
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| AdapterInstallError::new(ADAPTER_NAME, e.to_string()))?;

        match status_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(())) => {
                self.listener = Some(listener);
                tracing::info!("Native keyboard tap installed");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = listener.join_timeout(Duration::from_millis(200));
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(AdapterInstallError::new(
                    ADAPTER_NAME,
                    "event tap did not report readiness",
                ))
            }
        }
    }

    fn stop(&mut self, timeout: Duration) -> Result<(), TeardownError> {
        self.running.store(false, Ordering::SeqCst);
        match self.listener.take() {
            Some(listener) => listener.join_timeout(timeout),
            None => Ok(()),
        }
    }
}

impl Drop for NativeKeyboardAdapter {
    fn drop(&mut self) {
        let _ = self.stop(Duration::from_secs(1));
    }
}

/// Install the tap on the current thread and pump its run loop until stopped.
fn run_tap_loop(
    sink: EventSink,
    running: Arc<AtomicBool>,
    status: Sender<Result<(), AdapterInstallError>>,
) -> Result<(), AdapterInstallError> {
    // Modifiers already held when the tap installs release cleanly later
    let tracker = RefCell::new(ModifierTracker::with_mask(current_modifier_mask()));

    let callback = move |_proxy, event_type: CGEventType, event: &CGEvent| {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp => {
                let keycode =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                let text = unicode_string(event);
                let name = keymap::resolve_key_name(text.as_deref(), keycode);
                sink.on_key(name, matches!(event_type, CGEventType::KeyDown));
            }
            CGEventType::FlagsChanged => {
                let mask = event.get_flags().bits();
                for transition in tracker.borrow_mut().update(mask) {
                    sink.on_key(transition.name.to_string(), transition.pressed);
                }
            }
            _ => {}
        }
        // Listen-only: the event always passes through unchanged
        CallbackResult::Keep
    };

    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(()) => {
            return report_failure(
                &status,
                "failed to create CGEvent tap (Input Monitoring permission missing?)",
            )
        }
    };

    let source = match tap.mach_port().create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => return report_failure(&status, "failed to create run loop source"),
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    let _ = status.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopDefaultMode },
            Duration::from_millis(100),
            false,
        );
    }

    // The tap is disabled when dropped
    Ok(())
}

fn report_failure(
    status: &Sender<Result<(), AdapterInstallError>>,
    reason: &str,
) -> Result<(), AdapterInstallError> {
    let _ = status.send(Err(AdapterInstallError::new(ADAPTER_NAME, reason)));
    Err(AdapterInstallError::new(ADAPTER_NAME, reason))
}

/// Modifier flags the HID system currently reports as held.
fn current_modifier_mask() -> u64 {
    unsafe { CGEventSourceFlagsState(CGEventSourceStateID::HIDSystemState) }
}

/// Characters the key event would type, if any.
fn unicode_string(event: &CGEvent) -> Option<String> {
    let mut buffer = [0u16; 8];
    let mut length: c_ulong = 0;
    unsafe {
        CGEventKeyboardGetUnicodeString(
            event.as_ptr(),
            buffer.len() as c_ulong,
            &mut length,
            buffer.as_mut_ptr(),
        );
    }
    let length = (length as usize).min(buffer.len());
    if length == 0 {
        return None;
    }
    String::from_utf16(&buffer[..length]).ok()
}

/// Check if the application has Input Monitoring permission.
///
/// macOS has no direct query; creating a passive tap fails without it.
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_creation() {
        let adapter = NativeKeyboardAdapter::new();
        assert!(!adapter.running.load(Ordering::SeqCst));
        assert!(adapter.listener.is_none());
        assert_eq!(adapter.name(), "native-keyboard");
    }

    #[test]
    fn test_tracker_seeds_from_current_modifiers() {
        let mask = current_modifier_mask();
        let tracker = ModifierTracker::with_mask(mask);
        assert_eq!(tracker.previous_mask(), mask);
    }

    #[test]
    fn test_stop_without_start() {
        let mut adapter = NativeKeyboardAdapter::new();
        assert!(adapter.stop(Duration::from_millis(10)).is_ok());
    }
}
