//! Per-session event statistics.
//!
//! Counters are updated from the writer thread and the producer threads, and
//! read by the CLI and the metadata manager.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collector::types::EventKind;

/// Counters for one recording session.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Move/click/scroll events written
    pointer_events: AtomicU64,
    /// Key press/release events written
    keyboard_events: AtomicU64,
    /// Window focus events written
    focus_events: AtomicU64,
    /// Pause/resume markers written
    markers: AtomicU64,
    /// Input discarded because the session was paused
    dropped_while_paused: AtomicU64,
    /// Events that could not be encoded
    serialization_errors: AtomicU64,
    /// Lines that could not be written or flushed
    write_errors: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an event that reached the log.
    pub fn record_written(&self, kind: &EventKind) {
        let counter = if kind.is_pointer() {
            &self.pointer_events
        } else if kind.is_keyboard() {
            &self.keyboard_events
        } else if kind.is_marker() {
            &self.markers
        } else {
            &self.focus_events
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_while_paused(&self) {
        self.dropped_while_paused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_error(&self) {
        self.serialization_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pointer_events: self.pointer_events.load(Ordering::Relaxed),
            keyboard_events: self.keyboard_events.load(Ordering::Relaxed),
            focus_events: self.focus_events.load(Ordering::Relaxed),
            markers: self.markers.load(Ordering::Relaxed),
            dropped_while_paused: self.dropped_while_paused.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pointer_events: u64,
    pub keyboard_events: u64,
    pub focus_events: u64,
    pub markers: u64,
    pub dropped_while_paused: u64,
    pub serialization_errors: u64,
    pub write_errors: u64,
}

impl StatsSnapshot {
    /// Total number of lines written to the log.
    pub fn events_written(&self) -> u64 {
        self.pointer_events + self.keyboard_events + self.focus_events + self.markers
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Session Statistics:\n\
             - Pointer events: {}\n\
             - Keyboard events: {}\n\
             - Window focus events: {}\n\
             - Pause/resume markers: {}\n\
             - Dropped while paused: {}",
            self.pointer_events,
            self.keyboard_events,
            self.focus_events,
            self.markers,
            self.dropped_while_paused,
        );
        if self.serialization_errors + self.write_errors > 0 {
            summary.push_str(&format!(
                "\n- Errors: {} serialization, {} write",
                self.serialization_errors, self.write_errors
            ));
        }
        summary
    }
}

/// Thread-safe shared statistics.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::Button;

    #[test]
    fn test_counting_by_class() {
        let stats = SessionStats::new();
        stats.record_written(&EventKind::Move { x: 0, y: 0 });
        stats.record_written(&EventKind::Click {
            x: 0,
            y: 0,
            button: Button::Left,
            pressed: true,
        });
        stats.record_written(&EventKind::KeyPress { name: "a".into() });
        stats.record_written(&EventKind::Pause);
        stats.record_dropped_while_paused();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pointer_events, 2);
        assert_eq!(snapshot.keyboard_events, 1);
        assert_eq!(snapshot.markers, 1);
        assert_eq!(snapshot.dropped_while_paused, 1);
        assert_eq!(snapshot.events_written(), 4);
    }

    #[test]
    fn test_summary_format() {
        let stats = SessionStats::new();
        stats.record_written(&EventKind::Resume);
        let summary = stats.snapshot().summary();
        assert!(summary.contains("- Pause/resume markers: 1"));
        assert!(summary.contains("Dropped while paused"));
        assert!(!summary.contains("Errors"));

        stats.record_write_error();
        assert!(stats
            .snapshot()
            .summary()
            .ends_with("- Errors: 0 serialization, 1 write"));
    }
}
