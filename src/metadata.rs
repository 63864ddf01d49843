//! Per-session metadata and browsing of past recordings.
//!
//! Every session directory holds a `metadata.json` next to its event log. It
//! records where and when the session ran, the clock origin needed to align
//! the log with the video, the recorder's state timings and event counts.

use crate::recorder::RecordStateEvent;
use crate::session::clock::Clock;
use crate::session::writer::EVENTS_FILE_NAME;
use crate::stats::StatsSnapshot;
use crate::VERSION;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// File name of the metadata document inside a session directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Format of session directory names (local time).
pub const SESSION_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: Uuid,
    pub recorder_version: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    /// Wall-clock time at which event timestamps were zero
    pub clock_origin: DateTime<Utc>,
    pub natural_scrolling: bool,
    /// Which screen recorder ran alongside the session
    pub screen_recorder: String,
    #[serde(default)]
    pub obs_record_state_timings: Vec<RecordStateEvent>,
    #[serde(default)]
    pub stats: Option<StatsSnapshot>,
}

impl SessionMetadata {
    /// Seconds between collection start and end, if both are known.
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some((stop - start).num_seconds()),
            _ => None,
        }
    }
}

/// Builds and persists the metadata of one session.
pub struct MetadataManager {
    recording_path: PathBuf,
    metadata: SessionMetadata,
}

impl MetadataManager {
    pub fn new(recording_path: &Path, natural_scrolling: bool, clock: &Clock) -> Self {
        Self {
            recording_path: recording_path.to_path_buf(),
            metadata: SessionMetadata {
                session_id: Uuid::new_v4(),
                recorder_version: VERSION.to_string(),
                hostname: String::new(),
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                start_time: None,
                stop_time: None,
                clock_origin: clock.origin_wall(),
                natural_scrolling,
                screen_recorder: String::new(),
                obs_record_state_timings: Vec::new(),
                stats: None,
            },
        }
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    /// Capture the environment and mark the start of collection.
    pub fn collect(&mut self) {
        self.metadata.hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        self.metadata.start_time = Some(Utc::now());
    }

    pub fn set_screen_recorder(&mut self, name: &str) {
        self.metadata.screen_recorder = name.to_string();
    }

    pub fn set_scroll_direction(&mut self, natural_scrolling: bool) {
        self.metadata.natural_scrolling = natural_scrolling;
    }

    pub fn add_obs_record_state_timings(&mut self, events: Vec<RecordStateEvent>) {
        self.metadata.obs_record_state_timings.extend(events);
    }

    pub fn set_stats(&mut self, stats: StatsSnapshot) {
        self.metadata.stats = Some(stats);
    }

    /// Mark the end of collection.
    pub fn end_collect(&mut self) {
        self.metadata.stop_time = Some(Utc::now());
    }

    /// Write `metadata.json` into the session directory.
    pub fn save_metadata(&self) -> Result<PathBuf, MetadataError> {
        let path = self.recording_path.join(METADATA_FILE_NAME);
        let content = serde_json::to_string_pretty(&self.metadata)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

/// Load the metadata of a session directory.
pub fn load_metadata(session_dir: &Path) -> Result<SessionMetadata, MetadataError> {
    let content = fs::read_to_string(session_dir.join(METADATA_FILE_NAME))?;
    Ok(serde_json::from_str(&content)?)
}

/// Directory name for a session started at `time`.
pub fn session_dir_name(time: DateTime<Local>) -> String {
    time.format(SESSION_DIR_FORMAT).to_string()
}

/// Start time encoded in a session directory name. Accepts a numeric suffix.
pub fn parse_session_dir_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.get(..19)?;
    NaiveDateTime::parse_from_str(stamp, SESSION_DIR_FORMAT).ok()
}

/// A recording found on disk.
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    pub name: String,
    pub path: PathBuf,
    pub started: NaiveDateTime,
    pub event_count: usize,
    pub metadata: Option<SessionMetadata>,
}

/// Every session directory under `recordings_dir`, newest first.
pub fn list_recordings(recordings_dir: &Path) -> std::io::Result<Vec<RecordingSummary>> {
    if !recordings_dir.exists() {
        return Ok(Vec::new());
    }

    let mut recordings = Vec::new();
    for entry in fs::read_dir(recordings_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(started) = parse_session_dir_name(&name) else {
            continue;
        };
        let path = entry.path();
        recordings.push(RecordingSummary {
            event_count: count_events(&path),
            metadata: load_metadata(&path).ok(),
            name,
            path,
            started,
        });
    }

    recordings.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(recordings)
}

/// The most recent session directory, if any.
pub fn latest_recording(recordings_dir: &Path) -> std::io::Result<Option<RecordingSummary>> {
    Ok(list_recordings(recordings_dir)?.into_iter().next())
}

fn count_events(session_dir: &Path) -> usize {
    match fs::File::open(session_dir.join(EVENTS_FILE_NAME)) {
        Ok(file) => BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.trim().is_empty())
            .count(),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecordState;
    use chrono::TimeZone;

    #[test]
    fn test_session_dir_name_format() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(session_dir_name(time), "2024-03-09_07-05-01");
        assert!(parse_session_dir_name("2024-03-09_07-05-01").is_some());
        assert!(parse_session_dir_name("2024-03-09_07-05-01-2").is_some());
        assert!(parse_session_dir_name("notes").is_none());
    }

    #[test]
    fn test_metadata_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Clock::new();
        let mut manager = MetadataManager::new(dir.path(), false, &clock);

        manager.collect();
        manager.set_screen_recorder("obs");
        manager.set_scroll_direction(true);
        manager.add_obs_record_state_timings(vec![RecordStateEvent::now(RecordState::Started, &clock)]);
        manager.end_collect();
        let path = manager.save_metadata().unwrap();
        assert_eq!(path, dir.path().join(METADATA_FILE_NAME));

        let loaded = load_metadata(dir.path()).unwrap();
        assert_eq!(loaded.session_id, manager.metadata().session_id);
        assert!(loaded.natural_scrolling);
        assert_eq!(loaded.screen_recorder, "obs");
        assert_eq!(loaded.clock_origin, clock.origin_wall());
        assert_eq!(loaded.obs_record_state_timings.len(), 1);
        assert!(loaded.start_time.unwrap() <= loaded.stop_time.unwrap());
        assert_eq!(loaded.recorder_version, VERSION);
    }

    #[test]
    fn test_list_recordings_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2024-01-01_10-00-00", "2024-02-01_09-00-00", "scratch"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(
            dir.path().join("2024-02-01_09-00-00").join(EVENTS_FILE_NAME),
            "{\"time_stamp\":0.1,\"action\":\"pause\"}\n{\"time_stamp\":0.2,\"action\":\"resume\"}\n",
        )
        .unwrap();

        let recordings = list_recordings(dir.path()).unwrap();
        let names: Vec<&str> = recordings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["2024-02-01_09-00-00", "2024-01-01_10-00-00"]);
        assert_eq!(recordings[0].event_count, 2);
        assert!(recordings[0].metadata.is_none());

        let latest = latest_recording(dir.path()).unwrap().unwrap();
        assert_eq!(latest.name, "2024-02-01_09-00-00");
    }

    #[test]
    fn test_missing_recordings_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_recordings(&dir.path().join("absent")).unwrap().is_empty());
    }
}
