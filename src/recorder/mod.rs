//! The external screen recorder a session keeps in sync with.
//!
//! A session drives the recorder through [`ScreenRecorder`] and, once stopped,
//! folds the recorder's state transitions into the session metadata so the
//! event log can be aligned with the video.

pub mod obs;

use crate::config::ObsConfig;
use crate::error::RecorderError;
use crate::session::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use obs::ObsClient;

/// Output state reported by the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Starting,
    Started,
    Paused,
    Resumed,
    Stopping,
    Stopped,
    Unknown,
}

impl RecordState {
    /// Map an obs-websocket `outputState` string.
    pub fn from_output_state(state: &str) -> Self {
        match state {
            "OBS_WEBSOCKET_OUTPUT_STARTING" => RecordState::Starting,
            "OBS_WEBSOCKET_OUTPUT_STARTED" => RecordState::Started,
            "OBS_WEBSOCKET_OUTPUT_PAUSED" => RecordState::Paused,
            "OBS_WEBSOCKET_OUTPUT_RESUMED" => RecordState::Resumed,
            "OBS_WEBSOCKET_OUTPUT_STOPPING" => RecordState::Stopping,
            "OBS_WEBSOCKET_OUTPUT_STOPPED" => RecordState::Stopped,
            _ => RecordState::Unknown,
        }
    }
}

/// One recorder state transition, stamped on the session clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStateEvent {
    pub state: RecordState,
    pub time_stamp: f64,
    pub wall_time: DateTime<Utc>,
}

impl RecordStateEvent {
    pub fn now(state: RecordState, clock: &Clock) -> Self {
        Self {
            state,
            time_stamp: clock.now(),
            wall_time: Utc::now(),
        }
    }
}

/// Control surface of an external screen recorder.
pub trait ScreenRecorder: Send {
    /// Short identifier used in logs and metadata.
    fn name(&self) -> &'static str;

    /// Begin recording into `output_dir`. State changes are stamped with `clock`.
    fn start_recording(&mut self, output_dir: &Path, clock: Clock) -> Result<(), RecorderError>;

    fn pause_recording(&mut self) -> Result<(), RecorderError>;

    fn resume_recording(&mut self) -> Result<(), RecorderError>;

    fn stop_recording(&mut self) -> Result<(), RecorderError>;

    /// Put back whatever recorder settings `start_recording` changed.
    fn restore_profile(&mut self) -> Result<(), RecorderError>;

    /// State transitions observed so far.
    fn record_state_events(&self) -> Vec<RecordStateEvent>;
}

/// Recorder used when no video is wanted.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl ScreenRecorder for NullRecorder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn start_recording(&mut self, _output_dir: &Path, _clock: Clock) -> Result<(), RecorderError> {
        Ok(())
    }

    fn pause_recording(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }

    fn resume_recording(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }

    fn restore_profile(&mut self) -> Result<(), RecorderError> {
        Ok(())
    }

    fn record_state_events(&self) -> Vec<RecordStateEvent> {
        Vec::new()
    }
}

/// Build the recorder described by the configuration.
pub fn from_config(config: &ObsConfig) -> Box<dyn ScreenRecorder> {
    if config.enabled {
        Box::new(ObsClient::new(config.clone()))
    } else {
        Box::new(NullRecorder)
    }
}
