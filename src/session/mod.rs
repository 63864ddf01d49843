//! Recording sessions: the clock, the event queue, the writer thread, focus
//! correlation and the state machine tying them together.

pub mod clock;
pub mod focus;
pub mod queue;
pub mod state;
pub mod writer;

pub use clock::Clock;
pub use focus::{FocusCorrelator, FocusHandle, FocusSample, PointerState};
pub use queue::{EventQueue, PushOutcome};
pub use state::{RecordingSession, SessionConfig, SessionState, StopReport};
pub use writer::{EventLog, SessionWriter, WriterHandle, EVENTS_FILE_NAME};
