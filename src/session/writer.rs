//! The session writer: sole consumer of the event queue and sole owner of the
//! append-only event log.

use crate::collector::types::Event;
use crate::error::{SerializationError, TeardownError};
use crate::session::focus::FocusInbox;
use crate::session::queue::EventQueue;
use crate::stats::SharedSessionStats;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// File name of the event log inside a session directory.
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Why a single event did not reach the log.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),
}

/// Newline-delimited JSON log opened for append.
pub struct EventLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl EventLog {
    /// Open (or create) the log for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize one event as a line. Does not flush.
    pub fn append(&mut self, event: &Event) -> Result<(), AppendError> {
        let line = event.to_json_line().map_err(|source| SerializationError {
            action: event.kind.action(),
            source,
        })?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Drains the queue into the log until told to stop.
pub struct SessionWriter {
    log: EventLog,
    queue: EventQueue,
    focus: FocusInbox,
    running: Arc<AtomicBool>,
    stats: SharedSessionStats,
    poll_timeout: Duration,
}

impl SessionWriter {
    pub fn new(
        log: EventLog,
        queue: EventQueue,
        focus: FocusInbox,
        stats: SharedSessionStats,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            log,
            queue,
            focus,
            running: Arc::new(AtomicBool::new(true)),
            stats,
            poll_timeout,
        }
    }

    /// Run the writer on its own thread.
    pub fn spawn(self) -> std::io::Result<WriterHandle> {
        let running = self.running.clone();
        let handle = thread::Builder::new()
            .name("event-writer".into())
            .spawn(move || self.run())?;
        Ok(WriterHandle { running, handle })
    }

    /// Consume events until the running flag drops, then drain and close.
    ///
    /// Returns the number of events written.
    pub fn run(mut self) -> u64 {
        let mut written = 0;

        while self.running.load(Ordering::SeqCst) {
            self.focus.drain_into(&self.queue);

            if let Some(event) = self.queue.pop_timeout(self.poll_timeout) {
                if self.persist(&event) {
                    written += 1;
                }
                if let Err(e) = self.log.flush() {
                    tracing::error!("Failed to flush event log: {e}");
                    self.stats.record_write_error();
                }
            }
        }

        written += self.final_drain();
        tracing::info!(written, path = ?self.log.path(), "Event log closed");
        written
    }

    fn persist(&mut self, event: &Event) -> bool {
        match self.log.append(event) {
            Ok(()) => {
                self.stats.record_written(&event.kind);
                true
            }
            Err(AppendError::Serialization(e)) => {
                tracing::error!("Dropping event: {e}");
                self.stats.record_serialization_error();
                false
            }
            Err(AppendError::Io(e)) => {
                tracing::error!("Error in writer loop: {e}");
                self.stats.record_write_error();
                false
            }
        }
    }

    fn final_drain(&mut self) -> u64 {
        let mut written = 0;
        while let Some(event) = self.queue.try_pop() {
            if self.persist(&event) {
                written += 1;
            }
        }
        if let Err(e) = self.log.flush() {
            tracing::error!("Failed to flush event log during drain: {e}");
            self.stats.record_write_error();
        }
        written
    }
}

/// Handle to a running writer thread.
pub struct WriterHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl WriterHandle {
    /// Signal the loop to exit and wait for the final drain.
    pub fn stop(self) -> Result<u64, TeardownError> {
        self.running.store(false, Ordering::SeqCst);
        self.handle.join().map_err(|_| TeardownError::WriterPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::EventKind;
    use crate::session::clock::Clock;
    use crate::session::focus::{focus_channel, PointerState};
    use crate::stats::create_shared_stats;

    fn read_lines(path: &Path) -> Vec<Event> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn writer_for(path: &Path) -> (EventQueue, SessionWriter, SharedSessionStats) {
        let stats = create_shared_stats();
        let queue = EventQueue::new(Clock::new(), stats.clone());
        let (_handle, inbox) = focus_channel(Arc::new(PointerState::new()), queue.clone());
        let log = EventLog::open(path).unwrap();
        let writer = SessionWriter::new(
            log,
            queue.clone(),
            inbox,
            stats.clone(),
            Duration::from_millis(10),
        );
        (queue, writer, stats)
    }

    #[test]
    fn test_append_reopens_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE_NAME);

        let mut log = EventLog::open(&path).unwrap();
        log.append(&Event::new(0.5, EventKind::Pause)).unwrap();
        log.flush().unwrap();
        drop(log);

        let mut log = EventLog::open(&path).unwrap();
        log.append(&Event::new(0.75, EventKind::Resume)).unwrap();
        log.flush().unwrap();

        let events = read_lines(&path);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::Resume);
    }

    #[test]
    fn test_writer_flushes_each_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE_NAME);
        let (queue, writer, _stats) = writer_for(&path);
        let handle = writer.spawn().unwrap();

        queue.push_input(EventKind::Move { x: 3, y: 4 });

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::fs::read_to_string(&path).unwrap().is_empty() {
            assert!(std::time::Instant::now() < deadline, "event was never flushed");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(read_lines(&path).len(), 1);

        assert_eq!(handle.stop().unwrap(), 1);
    }

    #[test]
    fn test_stop_drains_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVENTS_FILE_NAME);
        let (queue, writer, stats) = writer_for(&path);

        for i in 0..500 {
            queue.push_input(EventKind::Move { x: i, y: 0 });
        }
        let handle = writer.spawn().unwrap();
        queue.close();

        assert_eq!(handle.stop().unwrap(), 500);
        let events = read_lines(&path);
        assert_eq!(events.len(), 500);
        assert_eq!(events[499].kind, EventKind::Move { x: 499, y: 0 });
        assert_eq!(stats.snapshot().pointer_events, 500);
    }
}
