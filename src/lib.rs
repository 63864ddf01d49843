//! Activity Recorder - input activity capture synchronized with a screen recording.
//!
//! This library records what an operator did (pointer movement, clicks,
//! scrolling, key presses and window focus changes) as a timestamped event log,
//! kept in step with the start/pause/resume/stop lifecycle of an OBS recording
//! of what they saw.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Recording Session                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐                                                  │
//! │  │  Portable  │──┐                                               │
//! │  │  (rdev)    │  │   ┌────────────┐   ┌────────────┐             │
//! │  └────────────┘  ├──▶│   Event    │──▶│  Session   │──▶ events.jsonl
//! │  ┌────────────┐  │   │   Queue    │   │  Writer    │             │
//! │  │  Native    │──┤   └────────────┘   └────────────┘             │
//! │  │  keyboard  │  │         ▲                 │                   │
//! │  └────────────┘  │         │ pause/resume    ▼                   │
//! │  ┌────────────┐  │   ┌────────────┐   ┌────────────┐             │
//! │  │   Focus    │──┘   │   State    │──▶│  Metadata  │──▶ metadata.json
//! │  │  polling   │      │  Machine   │   └────────────┘             │
//! │  └────────────┘      └────────────┘                              │
//! │                            │                                     │
//! │                            ▼                                     │
//! │                     ┌────────────┐                               │
//! │                     │    OBS     │──▶ video                      │
//! │                     └────────────┘                               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use activity_recorder::{Config, RecorderController};
//!
//! let config = Config::load().expect("Failed to load config");
//! let mut controller = RecorderController::from_config(&config);
//!
//! // Start a session (requires input monitoring permission)
//! controller.toggle_recording().expect("Failed to start recording");
//!
//! // Feed window polls while recording
//! controller.submit_focus("Safari", "Apple");
//!
//! // Stop and finalize the event log and metadata
//! let report = controller.stop().expect("Failed to stop recording");
//! ```

pub mod collector;
pub mod config;
pub mod controller;
pub mod error;
pub mod metadata;
pub mod recorder;
pub mod session;
pub mod stats;
pub mod window;

// Re-export key types at crate root for convenience
pub use collector::{Button, CaptureAdapter, CollectorConfig, Event, EventKind, EventSink};
pub use config::{Config, ObsConfig, SourceConfig};
pub use controller::{RecorderController, RecordingToggle};
pub use error::{
    AdapterInstallError, InitializationError, RecorderError, SerializationError, SessionError,
    TeardownError,
};
pub use recorder::{NullRecorder, ObsClient, RecordState, RecordStateEvent, ScreenRecorder};
pub use session::{RecordingSession, SessionConfig, SessionState, StopReport};
pub use stats::{SessionStats, SharedSessionStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown before a recording starts.
pub const CAPTURE_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               ACTIVITY RECORDER - CAPTURE NOTICE                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  While a session is recording, this tool stores on this machine: ║
║                                                                  ║
║    • Pointer position, clicks and scrolling                      ║
║    • Every key pressed and released, including typed text        ║
║    • The name and title of the focused window                    ║
║    • A screen recording, if OBS is enabled                       ║
║                                                                  ║
║  Nothing is captured while paused. Pause any time with:          ║
║    activity-recorder pause                                       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_notice_contents() {
        assert!(CAPTURE_NOTICE.contains("CAPTURE NOTICE"));
        assert!(CAPTURE_NOTICE.contains("Every key pressed"));
        assert!(CAPTURE_NOTICE.contains("activity-recorder pause"));
    }
}
