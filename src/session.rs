//! Live progress state of the active transfer job.
//!
//! Counters are relaxed atomics shared by all workers of one job. They feed
//! status display only; completion is decided by joining workers.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// A file currently being transferred.
#[derive(Debug)]
pub struct InFlightFile {
    name: String,
    size: u64,
    downloaded: AtomicU64,
}

impl InFlightFile {
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            downloaded: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Point-in-time copy of an in-flight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProgress {
    pub name: String,
    pub size: u64,
    pub downloaded: u64,
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total_files: usize,
    pub downloaded_files: usize,
    pub failed_files: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub in_flight: Vec<FileProgress>,
    pub elapsed: Duration,
    pub transferring: bool,
}

/// Aggregate state of one job, shared between the orchestrator and workers.
#[derive(Debug)]
pub struct DownloadSession {
    total_files: AtomicUsize,
    downloaded_files: AtomicUsize,
    failed_files: AtomicUsize,
    total_bytes: AtomicU64,
    downloaded_bytes: AtomicU64,
    in_flight: Mutex<Vec<Arc<InFlightFile>>>,
    start_time: Instant,
    transferring: AtomicBool,
    cancel: CancellationToken,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl DownloadSession {
    /// Creates a session that stops handing out work once `cancel` fires.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            total_files: AtomicUsize::new(0),
            downloaded_files: AtomicUsize::new(0),
            failed_files: AtomicUsize::new(0),
            total_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            in_flight: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            transferring: AtomicBool::new(false),
            cancel,
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Vec<Arc<InFlightFile>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_totals(&self, files: usize, bytes: u64) {
        self.total_files.store(files, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Registers a file as in flight and returns its shared handle.
    pub fn begin_file(&self, name: &str, size: u64) -> Arc<InFlightFile> {
        let file = Arc::new(InFlightFile::new(name, size));
        self.in_flight().push(Arc::clone(&file));
        file
    }

    /// Removes a file from the in-flight set.
    pub fn end_file(&self, file: &Arc<InFlightFile>) {
        self.in_flight().retain(|f| !Arc::ptr_eq(f, file));
    }

    /// Adds received bytes to the file and the session total.
    pub fn record_bytes(&self, file: &InFlightFile, bytes: u64) {
        file.record_bytes(bytes);
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn complete_file(&self) {
        self.downloaded_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fail_file(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies a bulk-mode directory scan. The byte counter never decreases.
    pub fn observe_scan(&self, local_bytes: u64, local_files: usize, files: Vec<Arc<InFlightFile>>) {
        self.downloaded_bytes.fetch_max(local_bytes, Ordering::Relaxed);
        self.downloaded_files.fetch_max(local_files, Ordering::Relaxed);
        *self.in_flight() = files;
    }

    /// Presents a finished bulk transfer as complete.
    pub fn finish_bulk(&self) {
        let downloaded = self.downloaded_bytes.load(Ordering::Relaxed);
        let total = self.total_bytes.fetch_max(downloaded, Ordering::Relaxed).max(downloaded);
        self.downloaded_bytes.store(total, Ordering::Relaxed);
        let files = self.total_files.load(Ordering::Relaxed);
        self.downloaded_files.store(files, Ordering::Relaxed);
        self.in_flight().clear();
    }

    pub fn set_transferring(&self, transferring: bool) {
        self.transferring.store(transferring, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_transferring(&self) -> bool {
        self.transferring.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copies the current counters and in-flight list.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let in_flight = self
            .in_flight()
            .iter()
            .map(|f| FileProgress {
                name: f.name().to_string(),
                size: f.size(),
                downloaded: f.downloaded(),
            })
            .collect();

        SessionProgress {
            total_files: self.total_files.load(Ordering::Relaxed),
            downloaded_files: self.downloaded_files.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes(),
            downloaded_bytes: self.downloaded_bytes(),
            in_flight,
            elapsed: self.elapsed(),
            transferring: self.is_transferring(),
        }
    }
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Files fully received.
    pub files_downloaded: usize,
    /// Files abandoned after an error.
    pub files_failed: usize,
    /// Entries dropped by the unwanted-file filter.
    pub files_filtered: usize,
    /// Bytes received.
    pub total_bytes: u64,
    /// Time spent transferring.
    pub elapsed: Duration,
    /// Bulk paths whose mirror process failed.
    pub failed_paths: Vec<String>,
}

impl TransferReport {
    /// Returns the average transfer speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}
