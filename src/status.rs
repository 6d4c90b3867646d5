//! Polling-friendly status snapshot of the engine.
//!
//! The snapshot is rewritten on every state transition and periodically
//! while a transfer runs. Consumers read `{"data": [snapshot]}` from the
//! status file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::{format_clock, mib_per_sec, percent};
use crate::media::MediaInfo;
use crate::session::SessionProgress;

/// Coarse engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    Running,
    Done,
    Error,
}

impl EngineStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// One status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub date: String,
    pub datetime: String,
    pub status: EngineStatus,
    /// Title of the current job, empty when idle.
    pub sfdl: String,
    pub action: String,
    pub media_type: String,
    /// Files currently in flight.
    pub loading_mt_files: usize,
    pub loading_total_files: usize,
    /// `status|downloadedKB|totalKB|percent|speedMBps|HH:MM:SS` while transferring.
    pub loading: String,
    /// `name|size|downloaded` entries joined by `;` while transferring.
    pub loading_file_array: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_seasons: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_episodes: Option<u32>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::new(EngineStatus::Idle, "done", "")
    }
}

impl StatusSnapshot {
    /// Creates a snapshot stamped with the current local time.
    #[must_use]
    pub fn new(status: EngineStatus, action: impl Into<String>, sfdl: impl Into<String>) -> Self {
        let now = chrono::Local::now();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            datetime: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            status,
            sfdl: sfdl.into(),
            action: action.into(),
            media_type: "unknown".to_string(),
            loading_mt_files: 0,
            loading_total_files: 0,
            loading: String::new(),
            loading_file_array: String::new(),
            media_year: None,
            media_seasons: None,
            media_episodes: None,
        }
    }

    /// Adds the classification of the current job.
    #[must_use]
    pub fn with_media(mut self, media: &MediaInfo) -> Self {
        self.media_type = media.media_type().to_string();
        match media {
            MediaInfo::Movie { year, .. } => self.media_year.clone_from(year),
            MediaInfo::Series { seasons, episodes, .. } => {
                self.media_seasons = *seasons;
                self.media_episodes = *episodes;
            }
            MediaInfo::Unknown => {}
        }
        self
    }

    /// Adds file counts and, while transferring, the progress strings.
    #[must_use]
    pub fn with_session(mut self, progress: &SessionProgress) -> Self {
        self.loading_mt_files = progress.in_flight.len();
        self.loading_total_files = progress.total_files;
        if progress.transferring {
            self.loading = progress_line(self.status, progress);
            self.loading_file_array = file_array(progress);
        }
        self
    }
}

/// Builds the compact progress string.
#[must_use]
pub fn progress_line(status: EngineStatus, progress: &SessionProgress) -> String {
    let downloaded = progress.downloaded_bytes;
    let total = progress.total_bytes;
    let percent = percent(downloaded, total);
    let speed = mib_per_sec(downloaded, progress.elapsed);
    format!(
        "{}|{}|{}|{percent:.1}|{speed:.2}|{}",
        status.as_str(),
        downloaded / 1024,
        total / 1024,
        format_clock(progress.elapsed)
    )
}

/// Joins in-flight files as `name|size|downloaded` separated by `;`.
#[must_use]
pub fn file_array(progress: &SessionProgress) -> String {
    progress
        .in_flight
        .iter()
        .map(|f| format!("{}|{}|{}", f.name, f.size, f.downloaded))
        .collect::<Vec<_>>()
        .join(";")
}

/// On-disk wrapper around the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub data: Vec<StatusSnapshot>,
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

/// Keeps the latest snapshot and mirrors it to the status file.
#[derive(Debug)]
pub struct StatusPublisher {
    path: PathBuf,
    current: Mutex<StatusSnapshot>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            current: Mutex::new(StatusSnapshot::default()),
        }
    }

    fn current_guard(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the latest snapshot.
    #[must_use]
    pub fn current(&self) -> StatusSnapshot {
        self.current_guard().clone()
    }

    /// Stores `snapshot` and writes it to disk. Write failures are logged;
    /// the in-memory snapshot is updated regardless.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        let document = StatusDocument {
            data: vec![snapshot.clone()],
        };
        *self.current_guard() = snapshot;

        let written = serde_json::to_vec_pretty(&document)
            .map_err(io::Error::from)
            .and_then(|bytes| write_atomic(&self.path, &bytes));
        if let Err(e) = written {
            log::warn!("Could not write status file {}: {e}", self.path.display());
        }
    }

    /// Reads a status file written by a publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed or empty.
    pub fn read(path: &Path) -> Result<StatusSnapshot> {
        let text = std::fs::read_to_string(path)?;
        let document: StatusDocument = serde_json::from_str(&text)?;
        document
            .data
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::Config(format!("{} holds no snapshot", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileProgress;
    use std::time::Duration;
    use tempfile::TempDir;

    fn progress(transferring: bool) -> SessionProgress {
        SessionProgress {
            total_files: 4,
            downloaded_files: 1,
            failed_files: 0,
            total_bytes: 10 * 1024 * 1024,
            downloaded_bytes: 5 * 1024 * 1024,
            in_flight: vec![
                FileProgress {
                    name: "a.r00".to_string(),
                    size: 100,
                    downloaded: 40,
                },
                FileProgress {
                    name: "a.r01".to_string(),
                    size: 200,
                    downloaded: 0,
                },
            ],
            elapsed: Duration::from_secs(5),
            transferring,
        }
    }

    #[test]
    fn progress_line_format() {
        assert_eq!(
            progress_line(EngineStatus::Running, &progress(true)),
            "running|5120|10240|50.0|1.00|00:00:05"
        );
    }

    #[test]
    fn progress_line_without_totals() {
        let mut p = progress(true);
        p.total_bytes = 0;
        p.downloaded_bytes = 0;
        p.elapsed = Duration::ZERO;
        assert_eq!(progress_line(EngineStatus::Running, &p), "running|0|0|0.0|0.00|00:00:00");
    }

    #[test]
    fn snapshot_includes_transfer_fields_only_while_transferring() {
        let running = StatusSnapshot::new(EngineStatus::Running, "Downloading Job", "Job")
            .with_session(&progress(true));
        assert_eq!(running.loading_mt_files, 2);
        assert_eq!(running.loading_total_files, 4);
        assert_eq!(running.loading_file_array, "a.r00|100|40;a.r01|200|0");
        assert!(running.loading.starts_with("running|"));

        let post = StatusSnapshot::new(EngineStatus::Running, "Cleaning up", "Job")
            .with_session(&progress(false));
        assert!(post.loading.is_empty());
        assert!(post.loading_file_array.is_empty());
    }

    #[test]
    fn media_fields_follow_classification() {
        let movie = StatusSnapshot::default().with_media(&MediaInfo::Movie {
            name: "Dune".to_string(),
            year: Some("2021".to_string()),
        });
        assert_eq!(movie.media_type, "movie");
        assert_eq!(movie.media_year.as_deref(), Some("2021"));

        let json = serde_json::to_value(StatusSnapshot::default()).unwrap();
        assert!(json.get("media_year").is_none());
        assert_eq!(json["status"], "idle");
    }

    #[test]
    fn publisher_writes_wrapped_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status").join("status.json");
        let publisher = StatusPublisher::new(path.clone());

        publisher.publish(StatusSnapshot::new(EngineStatus::Error, "Error: boom", ""));

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["data"][0]["status"], "error");
        assert_eq!(raw["data"][0]["action"], "Error: boom");
        assert_eq!(StatusPublisher::read(&path).unwrap().status, EngineStatus::Error);
        assert_eq!(publisher.current().action, "Error: boom");
        assert!(!dir.path().join("status").join("status.json.tmp").exists());
    }

    #[test]
    fn unwritable_path_keeps_memory_snapshot() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("blocker"), b"x").unwrap();
        let publisher = StatusPublisher::new(dir.path().join("blocker").join("status.json"));
        publisher.publish(StatusSnapshot::new(EngineStatus::Running, "Parsing a.sfdl", ""));
        assert_eq!(publisher.current().status, EngineStatus::Running);
    }
}
