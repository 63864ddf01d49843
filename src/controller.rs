//! Command surface for a UI or polling loop.
//!
//! The controller owns at most one live [`RecordingSession`]. Each
//! `toggle_recording` that starts a recording builds a fresh session with new
//! adapters and a new recorder handle from the factory.

use crate::collector::{platform_adapters, CaptureAdapter};
use crate::config::Config;
use crate::error::SessionError;
use crate::recorder::{self, ScreenRecorder};
use crate::session::{FocusCorrelator, FocusHandle, RecordingSession, SessionConfig, SessionState, StopReport};
use crate::window::cursor_position;
use std::path::{Path, PathBuf};

/// Builds the adapters and recorder for a new session.
pub type SessionFactory =
    Box<dyn FnMut() -> (Vec<Box<dyn CaptureAdapter>>, Box<dyn ScreenRecorder>) + Send>;

/// What `toggle_recording` did.
#[derive(Debug)]
pub enum RecordingToggle {
    Started { path: PathBuf },
    Stopped(Option<StopReport>),
}

pub struct RecorderController {
    config: SessionConfig,
    factory: SessionFactory,
    session: Option<RecordingSession>,
    correlator: FocusCorrelator,
    natural_scrolling: bool,
}

impl RecorderController {
    pub fn new(config: SessionConfig, factory: SessionFactory) -> Self {
        Self {
            natural_scrolling: config.natural_scrolling,
            config,
            factory,
            session: None,
            correlator: FocusCorrelator::new(),
        }
    }

    /// Controller using the platform's adapters and the configured recorder.
    pub fn from_config(config: &Config) -> Self {
        let sources = config.sources.into();
        let obs = config.obs.clone();
        Self::new(
            SessionConfig::from(config),
            Box::new(move || (platform_adapters(sources), recorder::from_config(&obs))),
        )
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_recording())
    }

    pub fn is_paused(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_paused())
    }

    /// Directory of the live session.
    pub fn session_path(&self) -> Option<&Path> {
        self.session.as_ref().and_then(|s| s.path())
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// Start a new session, or stop the live one.
    pub fn toggle_recording(&mut self) -> Result<RecordingToggle, SessionError> {
        if self.is_recording() {
            return Ok(RecordingToggle::Stopped(self.stop()?));
        }

        let (adapters, recorder) = (self.factory)();
        let mut config = self.config.clone();
        config.natural_scrolling = self.natural_scrolling;

        let mut session = RecordingSession::new(config, adapters, recorder);
        session.start()?;
        self.correlator.reset();

        let path = session.path().map(Path::to_path_buf).unwrap_or_default();
        self.session = Some(session);
        Ok(RecordingToggle::Started { path })
    }

    /// Pause or resume the live session. Returns whether it is now paused.
    pub fn toggle_pause(&mut self) -> Result<bool, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::InvalidTransition {
            operation: "pause",
            state: SessionState::Idle,
        })?;
        if session.is_paused() {
            session.resume()?;
            Ok(false)
        } else {
            session.pause()?;
            Ok(true)
        }
    }

    /// Stop the live session, if any.
    pub fn stop(&mut self) -> Result<Option<StopReport>, SessionError> {
        match self.session.take() {
            Some(mut session) => session.stop(),
            None => Ok(None),
        }
    }

    pub fn natural_scrolling(&self) -> bool {
        self.natural_scrolling
    }

    pub fn set_natural_scrolling(&mut self, natural_scrolling: bool) {
        self.natural_scrolling = natural_scrolling;
        if let Some(session) = self.session.as_mut() {
            session.set_natural_scrolling(natural_scrolling);
        }
    }

    /// Report the active window from a poll. Only changes reach the session.
    ///
    /// The pointer position is read from the OS at call time.
    pub fn submit_focus(&mut self, app_name: &str, window_title: &str) -> bool {
        self.submit_focus_at(app_name, window_title, cursor_position())
    }

    /// Like [`submit_focus`](Self::submit_focus) with an already sampled
    /// cursor position.
    pub fn submit_focus_at(
        &mut self,
        app_name: &str,
        window_title: &str,
        cursor: Option<(i32, i32)>,
    ) -> bool {
        match self.focus_handle() {
            Some(handle) => self
                .correlator
                .observe(&handle, app_name, window_title, cursor),
            None => false,
        }
    }

    pub fn focus_handle(&self) -> Option<FocusHandle> {
        self.session.as_ref().and_then(|s| s.focus_handle())
    }
}
