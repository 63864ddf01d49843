//! The multiple-producer, single-consumer event queue.
//!
//! Producers never block: a push takes the gate lock, stamps the event and
//! sends it on an unbounded channel. Stamping under the gate makes the stamp
//! order equal to the dequeue order, so timestamps are non-decreasing in the
//! persisted log. Across producers this is arrival order, not real-time order.

use crate::collector::types::{Event, EventKind};
use crate::session::clock::Clock;
use crate::stats::SharedSessionStats;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Input arrived while the session was paused
    DroppedPaused,
    /// The session is no longer accepting events
    Closed,
}

#[derive(Debug)]
struct Gate {
    accepting: bool,
    paused: bool,
}

struct QueueInner {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
    gate: Mutex<Gate>,
    clock: Clock,
    stats: SharedSessionStats,
}

/// Cloneable handle to a session's event queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(clock: Clock, stats: SharedSessionStats) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            inner: Arc::new(QueueInner {
                sender,
                receiver,
                gate: Mutex::new(Gate {
                    accepting: true,
                    paused: false,
                }),
                clock,
                stats,
            }),
        }
    }

    pub fn clock(&self) -> Clock {
        self.inner.clock
    }

    /// Enqueue an input event. Discarded while paused or closed.
    pub fn push_input(&self, kind: EventKind) -> PushOutcome {
        let gate = self.inner.gate.lock();
        if !gate.accepting {
            return PushOutcome::Closed;
        }
        if gate.paused {
            self.inner.stats.record_dropped_while_paused();
            return PushOutcome::DroppedPaused;
        }
        self.send_stamped(kind)
    }

    /// Enter the paused state and enqueue the pause marker in one step.
    ///
    /// Returns false when already paused or closed.
    pub fn pause(&self) -> bool {
        self.set_paused(true)
    }

    /// Leave the paused state and enqueue the resume marker in one step.
    pub fn resume(&self) -> bool {
        self.set_paused(false)
    }

    fn set_paused(&self, paused: bool) -> bool {
        let mut gate = self.inner.gate.lock();
        if !gate.accepting || gate.paused == paused {
            return false;
        }
        gate.paused = paused;
        let marker = if paused {
            EventKind::Pause
        } else {
            EventKind::Resume
        };
        self.send_stamped(marker) == PushOutcome::Queued
    }

    // Caller holds the gate lock.
    fn send_stamped(&self, kind: EventKind) -> PushOutcome {
        let event = Event::new(self.inner.clock.now(), kind);
        match self.inner.sender.send(event) {
            Ok(()) => PushOutcome::Queued,
            Err(_) => PushOutcome::Closed,
        }
    }

    /// Stop accepting events. Already queued events stay poppable.
    pub fn close(&self) {
        self.inner.gate.lock().accepting = false;
    }

    pub fn is_paused(&self) -> bool {
        self.inner.gate.lock().paused
    }

    /// True while input would be queued rather than discarded.
    pub fn is_capturing(&self) -> bool {
        let gate = self.inner.gate.lock();
        gate.accepting && !gate.paused
    }

    /// Wait up to `timeout` for the next event.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.inner.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<Event> {
        self.inner.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;

    fn queue() -> EventQueue {
        EventQueue::new(Clock::new(), create_shared_stats())
    }

    #[test]
    fn test_fifo_order_and_stamps() {
        let queue = queue();
        for i in 0..5 {
            assert_eq!(queue.push_input(EventKind::Move { x: i, y: i }), PushOutcome::Queued);
        }

        let mut last = 0.0;
        for i in 0..5 {
            let event = queue.try_pop().unwrap();
            assert_eq!(event.kind, EventKind::Move { x: i, y: i });
            assert!(event.time_stamp >= last);
            last = event.time_stamp;
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_paused_input_is_dropped() {
        let stats = create_shared_stats();
        let queue = EventQueue::new(Clock::new(), stats.clone());

        assert!(queue.pause());
        assert!(!queue.pause());
        assert_eq!(
            queue.push_input(EventKind::Move { x: 1, y: 1 }),
            PushOutcome::DroppedPaused
        );
        assert!(queue.resume());
        assert_eq!(queue.push_input(EventKind::Move { x: 2, y: 2 }), PushOutcome::Queued);

        let kinds: Vec<EventKind> = std::iter::from_fn(|| queue.try_pop()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Pause,
                EventKind::Resume,
                EventKind::Move { x: 2, y: 2 }
            ]
        );
        assert_eq!(stats.snapshot().dropped_while_paused, 1);
    }

    #[test]
    fn test_closed_queue_rejects_but_keeps_backlog() {
        let queue = queue();
        queue.push_input(EventKind::Move { x: 0, y: 0 });
        queue.close();

        assert_eq!(queue.push_input(EventKind::Move { x: 1, y: 1 }), PushOutcome::Closed);
        assert!(!queue.pause());
        assert_eq!(queue.len(), 1);
        assert!(queue.try_pop().is_some());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = queue();
        let start = std::time::Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_concurrent_producers_keep_stamps_ordered() {
        let queue = queue();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        q.push_input(EventKind::Move { x: t, y: i });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stamps: Vec<f64> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.time_stamp)
            .collect();
        assert_eq!(stamps.len(), 1000);
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}
