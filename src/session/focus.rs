//! Window-focus correlation.
//!
//! The polling layer samples the active application and window title on its own
//! thread. [`FocusCorrelator`] turns those samples into change notifications and
//! hands them to the session over a channel; the session's writer thread then
//! reads the held-button set and pushes the `WindowFocus` event, so every queue
//! write for a focus change originates from the session itself.

use crate::collector::types::{Button, EventKind};
use crate::session::queue::{EventQueue, PushOutcome};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Pointer state shared between the pointer producer and the session.
#[derive(Debug, Default)]
pub struct PointerState {
    held_buttons: Mutex<BTreeSet<Button>>,
    position: Mutex<(i32, i32)>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&self, x: i32, y: i32) {
        *self.position.lock() = (x, y);
    }

    /// Last position seen by the pointer adapter.
    pub fn position(&self) -> (i32, i32) {
        *self.position.lock()
    }

    pub fn set_button(&self, button: Button, pressed: bool) {
        let mut held = self.held_buttons.lock();
        if pressed {
            held.insert(button);
        } else {
            held.remove(&button);
        }
    }

    /// First held button in `Button` order, if any.
    pub fn held_button(&self) -> Option<Button> {
        self.held_buttons.lock().iter().next().copied()
    }

    pub fn clear(&self) {
        self.held_buttons.lock().clear();
    }
}

/// One sample delivered by the polling layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSample {
    pub app_name: String,
    pub window_title: String,
    pub x: i32,
    pub y: i32,
}

/// Sending half of the focus hand-off. Cheap to clone, never blocks.
#[derive(Clone)]
pub struct FocusHandle {
    sender: Sender<FocusSample>,
    pointer: Arc<PointerState>,
    queue: EventQueue,
}

impl FocusHandle {
    /// Deliver a sample to the session. Returns false if the session is gone.
    pub fn submit(&self, sample: FocusSample) -> bool {
        self.sender.send(sample).is_ok()
    }

    /// Last known pointer position of the session.
    pub fn pointer_position(&self) -> (i32, i32) {
        self.pointer.position()
    }

    /// Whether the session currently records (neither paused nor stopped).
    pub fn is_capturing(&self) -> bool {
        self.queue.is_capturing()
    }
}

/// Receiving half, owned by the session's writer thread.
pub struct FocusInbox {
    receiver: Receiver<FocusSample>,
    pointer: Arc<PointerState>,
}

impl FocusInbox {
    /// Turn every pending sample into a `WindowFocus` event. Never blocks.
    pub fn drain_into(&self, queue: &EventQueue) -> usize {
        let mut queued = 0;
        while let Ok(sample) = self.receiver.try_recv() {
            if self.deliver(sample, queue) == PushOutcome::Queued {
                queued += 1;
            }
        }
        queued
    }

    fn deliver(&self, sample: FocusSample, queue: &EventQueue) -> PushOutcome {
        let button = self.pointer.held_button();
        let outcome = queue.push_input(EventKind::WindowFocus {
            app_name: sample.app_name,
            window_title: sample.window_title,
            x: sample.x,
            y: sample.y,
            button,
            pressed: button.is_some(),
        });
        tracing::debug!(?outcome, ?button, "window focus sample handled");
        outcome
    }
}

/// Create a connected handle/inbox pair for a session.
pub fn focus_channel(pointer: Arc<PointerState>, queue: EventQueue) -> (FocusHandle, FocusInbox) {
    let (sender, receiver) = unbounded();
    (
        FocusHandle {
            sender,
            pointer: pointer.clone(),
            queue,
        },
        FocusInbox { receiver, pointer },
    )
}

/// Detects focus changes between successive polls.
#[derive(Debug, Default)]
pub struct FocusCorrelator {
    last: Option<(String, String)>,
}

impl FocusCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last observed pair so the next sample is always reported.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Feed one poll result. On change, sends a sample through `handle` and
    /// returns true.
    ///
    /// `cursor` is the pointer position read at polling time; without one the
    /// last position seen by the pointer adapter is used.
    pub fn observe(
        &mut self,
        handle: &FocusHandle,
        app_name: &str,
        window_title: &str,
        cursor: Option<(i32, i32)>,
    ) -> bool {
        if !handle.is_capturing() {
            return false;
        }

        let unchanged = self
            .last
            .as_ref()
            .is_some_and(|(app, title)| app == app_name && title == window_title);
        if unchanged {
            return false;
        }
        self.last = Some((app_name.to_string(), window_title.to_string()));

        let (x, y) = cursor.unwrap_or_else(|| handle.pointer_position());
        handle.submit(FocusSample {
            app_name: app_name.to_string(),
            window_title: window_title.to_string(),
            x,
            y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::clock::Clock;
    use crate::stats::create_shared_stats;

    fn setup() -> (EventQueue, Arc<PointerState>, FocusHandle, FocusInbox) {
        let queue = EventQueue::new(Clock::new(), create_shared_stats());
        let pointer = Arc::new(PointerState::new());
        let (handle, inbox) = focus_channel(pointer.clone(), queue.clone());
        (queue, pointer, handle, inbox)
    }

    #[test]
    fn test_held_button_tracking() {
        let pointer = PointerState::new();
        assert_eq!(pointer.held_button(), None);
        pointer.set_button(Button::Right, true);
        pointer.set_button(Button::Left, true);
        assert_eq!(pointer.held_button(), Some(Button::Left));
        pointer.set_button(Button::Left, false);
        assert_eq!(pointer.held_button(), Some(Button::Right));
    }

    #[test]
    fn test_only_changes_are_reported() {
        let (queue, _pointer, handle, inbox) = setup();
        let mut correlator = FocusCorrelator::new();

        assert!(correlator.observe(&handle, "Safari", "Apple", None));
        assert!(!correlator.observe(&handle, "Safari", "Apple", None));
        assert!(correlator.observe(&handle, "Safari", "GitHub", None));
        assert!(correlator.observe(&handle, "Terminal", "GitHub", None));

        assert_eq!(inbox.drain_into(&queue), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_focus_event_reflects_held_button() {
        let (queue, pointer, handle, inbox) = setup();
        pointer.set_position(40, 50);
        pointer.set_button(Button::Left, true);

        let mut correlator = FocusCorrelator::new();
        correlator.observe(&handle, "Finder", "Downloads", None);
        inbox.drain_into(&queue);

        let event = queue.try_pop().unwrap();
        assert_eq!(
            event.kind,
            EventKind::WindowFocus {
                app_name: "Finder".into(),
                window_title: "Downloads".into(),
                x: 40,
                y: 50,
                button: Some(Button::Left),
                pressed: true,
            }
        );
    }

    #[test]
    fn test_polled_cursor_position_is_used() {
        let (queue, _pointer, handle, inbox) = setup();
        let mut correlator = FocusCorrelator::new();

        // No pointer event yet; the position comes from the poll itself
        assert!(correlator.observe(&handle, "Xcode", "main.rs", Some((640, 412))));
        inbox.drain_into(&queue);

        match queue.try_pop().unwrap().kind {
            EventKind::WindowFocus { x, y, button, .. } => {
                assert_eq!((x, y), (640, 412));
                assert_eq!(button, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_paused_session_is_not_sampled() {
        let (queue, _pointer, handle, inbox) = setup();
        let mut correlator = FocusCorrelator::new();

        queue.pause();
        assert!(!correlator.observe(&handle, "Mail", "Inbox", None));
        queue.resume();
        assert!(correlator.observe(&handle, "Mail", "Inbox", None));

        inbox.drain_into(&queue);
        let actions: Vec<&str> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.kind.action())
            .collect();
        assert_eq!(actions, vec!["pause", "resume", "window_focus"]);
    }

    #[test]
    fn test_reset_reports_same_window_again() {
        let (_queue, _pointer, handle, _inbox) = setup();
        let mut correlator = FocusCorrelator::new();
        assert!(correlator.observe(&handle, "Notes", "Todo", None));
        correlator.reset();
        assert!(correlator.observe(&handle, "Notes", "Todo", None));
    }
}
