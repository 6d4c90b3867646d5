//! Transfer orchestration for a single descriptor.
//!
//! File lists are fetched by a pool of blocking workers popping from one
//! shared queue. Bulk folders are mirrored by `lftp` (see [`bulk`]).

pub mod bulk;
pub mod ftp;

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::{EngineConfig, ToolConfig};
use crate::descriptor::{Descriptor, Endpoint, FileEntry, Payload};
use crate::error::{Error, Result};
use crate::format::format_bytes;
use crate::session::{DownloadSession, TransferReport};

pub use bulk::BulkIndex;
pub use ftp::{FileTransport, FtpTransport};

/// Name suffixes never transferred.
pub const UNWANTED_SUFFIXES: [&str; 4] = [".nfo", ".jpg", ".sub", ".idx"];

/// Trait for receiving transfer progress updates.
///
/// All methods have default no-op implementations. Per-file callbacks are
/// invoked from worker threads.
pub trait DownloadProgress: Send + Sync {
    /// Called once the job's totals are known.
    fn on_job_start(&self, _title: &str, _total_files: usize, _total_bytes: u64) {}

    /// Called when a file transfer starts.
    fn on_file_start(&self, _name: &str, _size: u64) {}

    /// Called with the number of bytes received since the last call.
    fn on_progress(&self, _name: &str, _bytes_delta: u64) {}

    /// Called when a file transfer completes successfully.
    fn on_file_complete(&self, _name: &str, _size: u64) {}

    /// Called when a file is abandoned.
    fn on_error(&self, _name: &str, _error: &str) {}

    /// Called after each bulk-mode directory scan.
    fn on_bulk_progress(&self, _downloaded: u64, _total: u64) {}

    /// Called when the transfer phase of a job ends.
    fn on_job_complete(&self, _title: &str, _report: &TransferReport) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Returns true for files that are never transferred nor kept.
#[must_use]
pub fn is_unwanted(name: &str) -> bool {
    let lower = name.to_lowercase();
    UNWANTED_SUFFIXES.iter().any(|s| lower.ends_with(s)) || lower.contains("-sample")
}

/// Splits off unwanted entries, returning the kept files and the number dropped.
#[must_use]
pub fn filter_files(files: &[FileEntry]) -> (Vec<FileEntry>, usize) {
    let kept: Vec<FileEntry> = files.iter().filter(|f| !is_unwanted(&f.name)).cloned().collect();
    let dropped = files.len() - kept.len();
    (kept, dropped)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Local file name for a remote entry, without any directory components.
fn local_name(entry: &FileEntry) -> &str {
    entry.name.rsplit(['/', '\\']).next().unwrap_or(&entry.name)
}

/// Runs the transfer phase of a job.
pub struct Orchestrator {
    transport: Arc<dyn FileTransport>,
    progress: Arc<dyn DownloadProgress>,
    config: EngineConfig,
    tools: ToolConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        transport: Arc<dyn FileTransport>,
        progress: Arc<dyn DownloadProgress>,
        config: EngineConfig,
        tools: ToolConfig,
    ) -> Self {
        Self {
            transport,
            progress,
            config,
            tools,
        }
    }

    /// Downloads everything `descriptor` lists into `dest`.
    ///
    /// Per-file and per-path failures are recorded in the report rather than
    /// returned; an error means the job could not start at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination directory cannot be created.
    pub async fn download(
        &self,
        descriptor: &Descriptor,
        dest: &Path,
        session: &Arc<DownloadSession>,
    ) -> Result<TransferReport> {
        tokio::fs::create_dir_all(dest).await?;
        session.set_transferring(true);

        let report = match &descriptor.payload {
            Payload::FileList(files) => self.download_file_list(descriptor, files, dest, session).await,
            Payload::BulkFolder(paths) => self.download_bulk(descriptor, paths, dest, session).await,
        };

        session.set_transferring(false);
        self.progress.on_job_complete(&descriptor.name, &report);
        log::info!(
            "Transfer of {} finished: {} file(s), {} failed, {} in {:.1}s",
            descriptor.name,
            report.files_downloaded,
            report.files_failed,
            format_bytes(report.total_bytes),
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    async fn download_file_list(
        &self,
        descriptor: &Descriptor,
        files: &[FileEntry],
        dest: &Path,
        session: &Arc<DownloadSession>,
    ) -> TransferReport {
        let (files, filtered) = filter_files(files);
        if filtered > 0 {
            log::info!("Skipping {filtered} unwanted file(s)");
        }
        let total_bytes = files.iter().map(|f| f.size).sum();
        session.set_totals(files.len(), total_bytes);
        self.progress.on_job_start(&descriptor.name, files.len(), total_bytes);

        let workers = descriptor
            .effective_threads(self.config.max_threads)
            .min(files.len().max(1));
        log::info!(
            "Downloading {} file(s) ({}) with {workers} worker(s)",
            files.len(),
            format_bytes(total_bytes)
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(files)));
        let endpoint = Arc::new(descriptor.endpoint());
        let dest = Arc::new(dest.to_path_buf());

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&queue),
                    endpoint: Arc::clone(&endpoint),
                    dest: Arc::clone(&dest),
                    session: Arc::clone(session),
                    transport: Arc::clone(&self.transport),
                    progress: Arc::clone(&self.progress),
                };
                tokio::task::spawn_blocking(move || worker.run())
            })
            .collect();

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                log::error!("Transfer worker stopped abnormally: {e}");
            }
        }

        let progress = session.progress();
        TransferReport {
            files_downloaded: progress.downloaded_files,
            files_failed: progress.failed_files,
            files_filtered: filtered,
            total_bytes: progress.downloaded_bytes,
            elapsed: progress.elapsed,
            failed_paths: Vec::new(),
        }
    }

    async fn download_bulk(
        &self,
        descriptor: &Descriptor,
        paths: &[String],
        dest: &Path,
        session: &Arc<DownloadSession>,
    ) -> TransferReport {
        let mirror = bulk::BulkMirror {
            lftp: bulk::Lftp::new(&self.tools.lftp, descriptor.endpoint()),
            parallel: descriptor.effective_threads(self.config.max_threads),
            index_timeout: Duration::from_secs(self.config.index_timeout_secs),
            monitor_interval: Duration::from_millis(self.config.monitor_interval_ms),
            progress: Arc::clone(&self.progress),
        };
        self.progress
            .on_job_start(&descriptor.name, bulk::PLACEHOLDER_FILES, bulk::PLACEHOLDER_BYTES);
        mirror.run(paths, dest, session).await
    }
}

/// One blocking transfer worker.
struct Worker {
    id: usize,
    queue: Arc<Mutex<VecDeque<FileEntry>>>,
    endpoint: Arc<Endpoint>,
    dest: Arc<PathBuf>,
    session: Arc<DownloadSession>,
    transport: Arc<dyn FileTransport>,
    progress: Arc<dyn DownloadProgress>,
}

impl Worker {
    fn next(&self) -> Option<FileEntry> {
        if self.session.is_cancelled() {
            log::info!("Worker {} stopping: job cancelled", self.id);
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn run(self) {
        while let Some(entry) = self.next() {
            let file = self.session.begin_file(&entry.name, entry.size);
            self.progress.on_file_start(&entry.name, entry.size);
            log::debug!("Worker {} fetching {}", self.id, entry.name);

            let target = self.dest.join(local_name(&entry));
            let part = part_path(&target);
            let result = self
                .transport
                .fetch(&self.endpoint, &entry, &part, &mut |bytes| {
                    self.session.record_bytes(&file, bytes);
                    self.progress.on_progress(&entry.name, bytes);
                })
                .and_then(|_| std::fs::rename(&part, &target).map_err(Error::from));

            match result {
                Ok(()) => {
                    self.session.complete_file();
                    self.progress.on_file_complete(&entry.name, entry.size);
                    log::info!("Downloaded {} ({})", entry.name, format_bytes(file.downloaded()));
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&part);
                    self.session.fail_file();
                    self.progress.on_error(&entry.name, &e.to_string());
                    log::error!("Download of {} failed: {e}", entry.name);
                }
            }
            self.session.end_file(&file);
        }
    }
}
