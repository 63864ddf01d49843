//! Canonical event types written to the session event log.
//!
//! Every line of `events.jsonl` is one [`Event`]: a session-clock timestamp plus
//! an [`EventKind`] tagged by its `action` field.

use serde::{Deserialize, Serialize};

/// A pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Left,
    Right,
    Middle,
    Other,
}

impl Button {
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Right => "right",
            Button::Middle => "middle",
            Button::Other => "other",
        }
    }
}

/// What happened, without the timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EventKind {
    Move {
        x: i32,
        y: i32,
    },
    Click {
        x: i32,
        y: i32,
        button: Button,
        pressed: bool,
    },
    Scroll {
        x: i32,
        y: i32,
        dx: i64,
        dy: i64,
    },
    #[serde(rename = "press")]
    KeyPress { name: String },
    #[serde(rename = "release")]
    KeyRelease { name: String },
    WindowFocus {
        app_name: String,
        window_title: String,
        x: i32,
        y: i32,
        /// Held button at sampling time, not a new press
        button: Option<Button>,
        pressed: bool,
    },
    Pause,
    Resume,
}

impl EventKind {
    /// Pause/resume markers are the only kinds that survive a paused session.
    pub fn is_marker(&self) -> bool {
        matches!(self, EventKind::Pause | EventKind::Resume)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            EventKind::Move { .. } | EventKind::Click { .. } | EventKind::Scroll { .. }
        )
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(self, EventKind::KeyPress { .. } | EventKind::KeyRelease { .. })
    }

    /// The `action` tag as it appears in the log.
    pub fn action(&self) -> &'static str {
        match self {
            EventKind::Move { .. } => "move",
            EventKind::Click { .. } => "click",
            EventKind::Scroll { .. } => "scroll",
            EventKind::KeyPress { .. } => "press",
            EventKind::KeyRelease { .. } => "release",
            EventKind::WindowFocus { .. } => "window_focus",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
        }
    }
}

/// A timestamped event as persisted, one per log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the session clock origin
    pub time_stamp: f64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(time_stamp: f64, kind: EventKind) -> Self {
        Self { time_stamp, kind }
    }

    /// Encode as a single JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
