//! The recording session state machine.
//!
//! ```text
//! Idle ──start──▶ Recording ◀──resume── Paused
//!                     │ └─────pause────▶ │
//!                     └──────stop────────┴──▶ Stopped
//! ```
//!
//! A session owns its capture adapters, the screen recorder handle, the writer
//! thread and the metadata manager. Stopped is terminal; a new recording needs
//! a new session.

use crate::collector::{CaptureAdapter, EventSink};
use crate::config::Config;
use crate::error::{InitializationError, SessionError, TeardownError};
use crate::metadata::{session_dir_name, MetadataManager};
use crate::recorder::ScreenRecorder;
use crate::session::clock::Clock;
use crate::session::focus::{focus_channel, FocusHandle, PointerState};
use crate::session::queue::EventQueue;
use crate::session::writer::{EventLog, SessionWriter, WriterHandle, EVENTS_FILE_NAME};
use crate::stats::{create_shared_stats, SharedSessionStats, StatsSnapshot};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a [`RecordingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// Settings a session needs from the application configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub recordings_dir: PathBuf,
    pub writer_poll_timeout: Duration,
    pub adapter_stop_timeout: Duration,
    pub natural_scrolling: bool,
}

impl SessionConfig {
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            recordings_dir: recordings_dir.into(),
            writer_poll_timeout: defaults.writer_poll_timeout,
            adapter_stop_timeout: defaults.adapter_stop_timeout,
            natural_scrolling: defaults.natural_scrolling,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            recordings_dir: config.recordings_dir.clone(),
            writer_poll_timeout: config.writer_poll_timeout,
            adapter_stop_timeout: config.adapter_stop_timeout,
            natural_scrolling: config.natural_scrolling,
        }
    }
}

/// Outcome of a completed stop.
#[derive(Debug)]
pub struct StopReport {
    pub path: PathBuf,
    pub events_written: u64,
    pub stats: StatsSnapshot,
    pub duration: Duration,
    /// Problems hit during teardown; none of them aborted it
    pub teardown_errors: Vec<TeardownError>,
}

/// Resources that only exist between start and stop.
struct ActiveSession {
    path: PathBuf,
    queue: EventQueue,
    pointer: Arc<PointerState>,
    focus: FocusHandle,
    writer: WriterHandle,
    metadata: MetadataManager,
    started: Instant,
}

pub struct RecordingSession {
    config: SessionConfig,
    state: SessionState,
    adapters: Vec<Box<dyn CaptureAdapter>>,
    recorder: Box<dyn ScreenRecorder>,
    stats: SharedSessionStats,
    natural_scrolling: bool,
    active: Option<ActiveSession>,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        adapters: Vec<Box<dyn CaptureAdapter>>,
        recorder: Box<dyn ScreenRecorder>,
    ) -> Self {
        Self {
            natural_scrolling: config.natural_scrolling,
            config,
            state: SessionState::Idle,
            adapters,
            recorder,
            stats: create_shared_stats(),
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True from start until stop, including while paused.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording | SessionState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    /// Session directory, once started.
    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Hand-off for focus samples from the polling layer, once started.
    pub fn focus_handle(&self) -> Option<FocusHandle> {
        self.active.as_ref().map(|a| a.focus.clone())
    }

    pub fn stats(&self) -> SharedSessionStats {
        self.stats.clone()
    }

    pub fn natural_scrolling(&self) -> bool {
        self.natural_scrolling
    }

    pub fn set_natural_scrolling(&mut self, natural_scrolling: bool) {
        self.natural_scrolling = natural_scrolling;
        if let Some(active) = self.active.as_mut() {
            active.metadata.set_scroll_direction(natural_scrolling);
        }
    }

    /// Begin recording. Any initialization failure abandons the session.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }

        match self.initialize() {
            Ok(active) => {
                tracing::info!(path = ?active.path, "Recording started");
                self.active = Some(active);
                self.state = SessionState::Recording;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error initializing recorder: {e}");
                self.state = SessionState::Stopped;
                Err(e.into())
            }
        }
    }

    fn initialize(&mut self) -> Result<ActiveSession, InitializationError> {
        let path = create_session_dir(&self.config.recordings_dir)?;
        let log_path = path.join(EVENTS_FILE_NAME);
        let log = EventLog::open(&log_path).map_err(|source| InitializationError::OpenLog {
            path: log_path,
            source,
        })?;

        let clock = Clock::new();
        let queue = EventQueue::new(clock, self.stats.clone());
        let pointer = Arc::new(PointerState::new());
        let (focus, inbox) = focus_channel(pointer.clone(), queue.clone());

        let mut metadata = MetadataManager::new(&path, self.natural_scrolling, &clock);
        metadata.collect();
        metadata.set_screen_recorder(self.recorder.name());

        if let Err(e) = self.recorder.start_recording(&path, clock) {
            self.release_recorder();
            return Err(e.into());
        }

        let writer = SessionWriter::new(
            log,
            queue.clone(),
            inbox,
            self.stats.clone(),
            self.config.writer_poll_timeout,
        );
        let writer = match writer.spawn() {
            Ok(writer) => writer,
            Err(e) => {
                self.release_recorder();
                return Err(InitializationError::Writer(e));
            }
        };

        let sink = EventSink::new(queue.clone(), pointer.clone());
        for adapter in &mut self.adapters {
            match adapter.start(sink.clone()) {
                Ok(()) => tracing::info!(adapter = adapter.name(), "Capture adapter started"),
                Err(e) => tracing::warn!("{e}; recording continues without it"),
            }
        }

        Ok(ActiveSession {
            path,
            queue,
            pointer,
            focus,
            writer,
            metadata,
            started: Instant::now(),
        })
    }

    /// Best-effort undo of a recorder start that may have partly happened.
    fn release_recorder(&mut self) {
        if let Err(e) = self.recorder.stop_recording() {
            tracing::warn!("Could not stop screen recorder after failed start: {e}");
        }
        if let Err(e) = self.recorder.restore_profile() {
            tracing::warn!("Could not restore recorder settings after failed start: {e}");
        }
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            return Err(SessionError::InvalidTransition {
                operation: "pause",
                state: self.state,
            });
        }
        if let Some(active) = self.active.as_ref() {
            active.queue.pause();
        }
        if let Err(e) = self.recorder.pause_recording() {
            tracing::error!("Error pausing screen recorder: {e}");
        }
        self.state = SessionState::Paused;
        tracing::info!("Recording paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(SessionError::InvalidTransition {
                operation: "resume",
                state: self.state,
            });
        }
        if let Some(active) = self.active.as_ref() {
            active.queue.resume();
        }
        if let Err(e) = self.recorder.resume_recording() {
            tracing::error!("Error resuming screen recorder: {e}");
        }
        self.state = SessionState::Recording;
        tracing::info!("Recording resumed");
        Ok(())
    }

    /// Stop and finalize. Returns `None` if there was nothing to stop.
    pub fn stop(&mut self) -> Result<Option<StopReport>, SessionError> {
        if !self.is_recording() {
            return Ok(None);
        }
        let Some(mut active) = self.active.take() else {
            self.state = SessionState::Stopped;
            return Ok(None);
        };
        tracing::info!("Stopping recording...");

        let mut teardown_errors = Vec::new();

        for adapter in &mut self.adapters {
            if let Err(e) = adapter.stop(self.config.adapter_stop_timeout) {
                tracing::warn!("{e}; abandoning it");
                teardown_errors.push(e);
            }
        }

        active.queue.close();
        let events_written = match active.writer.stop() {
            Ok(written) => written,
            Err(e) => {
                tracing::error!("{e}");
                teardown_errors.push(e);
                0
            }
        };

        if let Err(e) = self.recorder.stop_recording() {
            tracing::error!("Error stopping screen recorder: {e}");
            teardown_errors.push(e.into());
        }
        active
            .metadata
            .add_obs_record_state_timings(self.recorder.record_state_events());
        if let Err(e) = self.recorder.restore_profile() {
            tracing::error!("Error restoring recorder profile: {e}");
            teardown_errors.push(e.into());
        }

        active.pointer.clear();
        let stats = self.stats.snapshot();
        active.metadata.end_collect();
        active.metadata.set_stats(stats);
        if let Err(e) = active.metadata.save_metadata() {
            tracing::error!("Error saving metadata: {e}");
            teardown_errors.push(e.into());
        }

        self.state = SessionState::Stopped;
        tracing::info!(events_written, path = ?active.path, "Recording stopped");

        Ok(Some(StopReport {
            path: active.path,
            events_written,
            stats,
            duration: active.started.elapsed(),
            teardown_errors,
        }))
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.is_recording() {
            let _ = self.stop();
        }
    }
}

/// Create a fresh timestamped directory under `root`.
fn create_session_dir(root: &Path) -> Result<PathBuf, InitializationError> {
    let base = session_dir_name(Local::now());
    let mut path = root.join(&base);
    let mut suffix = 2;
    // Two sessions within the same second must not share a log
    while path.exists() {
        path = root.join(format!("{base}-{suffix}"));
        suffix += 1;
    }
    std::fs::create_dir_all(&path).map_err(|source| InitializationError::CreateDirectory {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::EventKind;
    use crate::recorder::NullRecorder;

    fn session(dir: &Path) -> RecordingSession {
        let mut config = SessionConfig::new(dir);
        config.writer_poll_timeout = Duration::from_millis(10);
        RecordingSession::new(config, Vec::new(), Box::new(NullRecorder))
    }

    #[test]
    fn test_invalid_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());

        assert!(matches!(
            session.pause(),
            Err(SessionError::InvalidTransition {
                operation: "pause",
                state: SessionState::Idle
            })
        ));
        assert!(session.resume().is_err());

        session.start().unwrap();
        assert!(session.resume().is_err());
        assert!(matches!(
            session.start(),
            Err(SessionError::InvalidTransition { .. })
        ));

        session.stop().unwrap();
        assert!(session.start().is_err());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        assert!(session.stop().unwrap().is_none());

        session.start().unwrap();
        let report = session.stop().unwrap().unwrap();
        assert!(report.path.join(EVENTS_FILE_NAME).exists());
        assert!(report.path.join(crate::metadata::METADATA_FILE_NAME).exists());
        assert!(session.stop().unwrap().is_none());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_pause_round_trip_writes_markers() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.start().unwrap();
        session.pause().unwrap();
        assert!(session.is_paused());
        assert!(session.is_recording());
        session.resume().unwrap();

        let report = session.stop().unwrap().unwrap();
        assert_eq!(report.events_written, 2);
        let lines: Vec<EventKind> = std::fs::read_to_string(report.path.join(EVENTS_FILE_NAME))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<crate::collector::types::Event>(l).unwrap().kind)
            .collect();
        assert_eq!(lines, vec![EventKind::Pause, EventKind::Resume]);
    }

    #[test]
    fn test_unwritable_root_abandons_session() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let mut session = session(&blocker);
        let err = session.start().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Initialization(InitializationError::CreateDirectory { .. })
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stop().unwrap().is_none());
    }

    #[test]
    fn test_same_second_sessions_get_distinct_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_session_dir(dir.path()).unwrap();
        let second = create_session_dir(dir.path()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_natural_scrolling_reaches_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        session.set_natural_scrolling(false);
        session.start().unwrap();
        session.set_natural_scrolling(true);
        let report = session.stop().unwrap().unwrap();

        let metadata = crate::metadata::load_metadata(&report.path).unwrap();
        assert!(metadata.natural_scrolling);
    }
}
