//! Error taxonomy for recording sessions.
//!
//! Only [`InitializationError`] ever reaches the user. Adapter install and
//! teardown failures degrade the session and are logged; serialization
//! failures drop a single event.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::metadata::MetadataError;
use crate::session::SessionState;

/// Setting up a session failed before any recording began.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to create session directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open event log {path:?}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start screen recorder: {0}")]
    Recorder(#[from] RecorderError),

    #[error("failed to spawn writer thread: {0}")]
    Writer(#[source] std::io::Error),
}

/// A capture strategy could not be installed.
#[derive(Debug, Error)]
#[error("{adapter} adapter could not be installed: {reason}")]
pub struct AdapterInstallError {
    pub adapter: &'static str,
    pub reason: String,
}

impl AdapterInstallError {
    pub fn new(adapter: &'static str, reason: impl Into<String>) -> Self {
        Self {
            adapter,
            reason: reason.into(),
        }
    }
}

/// A single event could not be encoded.
#[derive(Debug, Error)]
#[error("failed to serialize {action} event: {source}")]
pub struct SerializationError {
    pub action: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Something did not shut down cleanly. Teardown carries on regardless.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("{adapter} adapter did not stop within {timeout:?}")]
    AdapterTimeout {
        adapter: &'static str,
        timeout: Duration,
    },

    #[error("screen recorder failed to stop: {0}")]
    Recorder(#[from] RecorderError),

    #[error("writer thread panicked")]
    WriterPanicked,

    #[error("failed to save session metadata: {0}")]
    Metadata(#[from] MetadataError),
}

/// Errors talking to the external screen recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("could not connect to recorder: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("request {request} failed: {reason}")]
    Request { request: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("recorder is not connected")]
    NotConnected,
}

/// Errors returned by the recording session state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error("cannot {operation} while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },
}
