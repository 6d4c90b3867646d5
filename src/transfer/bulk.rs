//! Bulk folder mirroring through `lftp`.
//!
//! Each remote path is first listed (`find -l`) to learn the expected file
//! sizes, then mirrored in a child process. While the mirror runs, a monitor
//! task scans the local destination and feeds the session counters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::DownloadProgress;
use crate::descriptor::Endpoint;
use crate::error::{Error, Result};
use crate::format::format_bytes;
use crate::session::{DownloadSession, InFlightFile, TransferReport};

/// Total shown until a listing succeeds.
pub const PLACEHOLDER_BYTES: u64 = 10 * 1024 * 1024 * 1024;
/// File count shown until a listing succeeds.
pub const PLACEHOLDER_FILES: usize = 1;

/// Patterns excluded from mirroring.
pub const EXCLUDE_GLOBS: [&str; 5] = ["*.nfo", "*-sample*", "*.jpg", "*.sub", "*.idx"];

const SESSION_SETTINGS: &str = "set ftp:use-feat no; set ssl:verify-certificate no; \
     set net:timeout 30; set net:reconnect-interval-base 5; set net:max-retries 2; \
     set ftp:ssl-allow no;";

/// Expected remote files and their sizes, keyed by base name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkIndex {
    pub files: HashMap<String, u64>,
    pub total_bytes: u64,
}

impl BulkIndex {
    /// Parses `find -l` output. Directory lines and empty files are skipped.
    #[must_use]
    pub fn parse(listing: &str) -> Self {
        let mut index = Self::default();
        for line in listing.lines() {
            if line.starts_with('d') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }
            let Ok(size) = parts[2].parse::<u64>() else {
                continue;
            };
            if size == 0 {
                continue;
            }
            let name = parts[parts.len() - 1].rsplit('/').next().unwrap_or_default();
            index.insert(name.to_string(), size);
        }
        index
    }

    fn insert(&mut self, name: String, size: u64) {
        if let Some(previous) = self.files.insert(name, size) {
            self.total_bytes -= previous;
        }
        self.total_bytes += size;
    }

    /// Adds another listing's files to this index.
    pub fn merge(&mut self, other: Self) {
        for (name, size) in other.files {
            self.insert(name, size);
        }
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Quotes a value for an lftp command script.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Builds lftp invocations for one endpoint.
#[derive(Debug, Clone)]
pub struct Lftp {
    program: String,
    endpoint: Endpoint,
}

impl Lftp {
    #[must_use]
    pub fn new(program: &str, endpoint: Endpoint) -> Self {
        Self {
            program: program.to_string(),
            endpoint,
        }
    }

    fn command(&self, script: String) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg(self.endpoint.port.to_string())
            .arg("-u")
            .arg(format!("{},{}", self.endpoint.username, self.endpoint.password))
            .arg("-e")
            .arg(script)
            .arg(&self.endpoint.host)
            .stdin(Stdio::null());
        cmd
    }

    /// Recursive long listing of `remote`.
    #[must_use]
    pub fn index_command(&self, remote: &str) -> Command {
        self.command(format!("{SESSION_SETTINGS} open && find -l {} && exit", quote(remote)))
    }

    /// Recursive mirror of `remote` into `local`.
    #[must_use]
    pub fn mirror_command(&self, remote: &str, local: &Path, parallel: usize) -> Command {
        let excludes: Vec<String> = EXCLUDE_GLOBS
            .iter()
            .map(|glob| format!("--exclude-glob {}", quote(glob)))
            .collect();
        self.command(format!(
            "{SESSION_SETTINGS} mirror --verbose --parallel={parallel} {} {} {}; exit",
            excludes.join(" "),
            quote(remote),
            quote(&local.to_string_lossy()),
        ))
    }

    /// Lists `remote`, killing the listing after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subprocess`] if lftp cannot be started, times out or
    /// exits unsuccessfully.
    pub async fn fetch_index(&self, remote: &str, timeout: Duration) -> Result<BulkIndex> {
        let mut cmd = self.index_command(remote);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| Error::Subprocess {
                tool: self.program.clone(),
                reason: format!("listing timed out after {}s", timeout.as_secs()),
            })?
            .map_err(|e| Error::Subprocess {
                tool: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::Subprocess {
                tool: self.program.clone(),
                reason: format!(
                    "listing exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(BulkIndex::parse(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Result of scanning the local destination.
#[derive(Debug, Default)]
pub struct LocalScan {
    /// Bytes present on disk.
    pub bytes: u64,
    /// Files that reached their expected size.
    pub complete: usize,
    /// Files still below their expected size.
    pub partial: Vec<Arc<InFlightFile>>,
}

/// Walks `dir` and compares file sizes against `index`.
#[must_use]
pub fn scan_local(dir: &Path, index: &BulkIndex) -> LocalScan {
    let mut scan = LocalScan::default();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let size = meta.len();
            let expected = index.files.get(&name).copied().unwrap_or(size);
            scan.bytes += size;
            if size >= expected {
                scan.complete += 1;
            } else {
                let file = InFlightFile::new(name, expected);
                file.record_bytes(size);
                scan.partial.push(Arc::new(file));
            }
        }
    }
    scan
}

/// Mirrors bulk paths one after another.
pub struct BulkMirror {
    pub lftp: Lftp,
    pub parallel: usize,
    pub index_timeout: Duration,
    pub monitor_interval: Duration,
    pub progress: Arc<dyn DownloadProgress>,
}

impl BulkMirror {
    /// Mirrors every path into `dest`. A failing path does not stop the rest.
    pub async fn run(&self, paths: &[String], dest: &Path, session: &Arc<DownloadSession>) -> TransferReport {
        let started = Instant::now();
        session.set_totals(PLACEHOLDER_FILES, PLACEHOLDER_BYTES);

        let mut index = BulkIndex::default();
        let mut indexed = false;
        let mut failed_paths = Vec::new();

        for path in paths {
            if session.is_cancelled() {
                log::info!("Bulk transfer cancelled before {path}");
                break;
            }

            match self.lftp.fetch_index(path, self.index_timeout).await {
                Ok(found) => {
                    log::info!(
                        "Index of {path}: {} file(s), {}",
                        found.file_count(),
                        format_bytes(found.total_bytes)
                    );
                    index.merge(found);
                    indexed = true;
                    session.set_totals(index.file_count(), index.total_bytes);
                }
                Err(e) => log::warn!("Could not index {path}, keeping estimated totals: {e}"),
            }
            if !indexed {
                session.set_totals(PLACEHOLDER_FILES, PLACEHOLDER_BYTES);
            }

            if let Err(e) = self.mirror(path, dest, Arc::new(index.clone()), session).await {
                log::error!("Mirroring {path} failed: {e}");
                failed_paths.push(path.clone());
            }
        }

        session.finish_bulk();
        let progress = session.progress();
        TransferReport {
            files_downloaded: progress.downloaded_files,
            files_failed: 0,
            files_filtered: 0,
            total_bytes: progress.downloaded_bytes,
            elapsed: started.elapsed(),
            failed_paths,
        }
    }

    async fn mirror(
        &self,
        remote: &str,
        dest: &Path,
        index: Arc<BulkIndex>,
        session: &Arc<DownloadSession>,
    ) -> Result<()> {
        let tool = self.lftp.program.clone();
        let mut cmd = self.lftp.mirror_command(remote, dest, self.parallel);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        log::info!("Mirroring {remote} -> {}", dest.display());
        let mut child = cmd.spawn().map_err(|e| Error::Subprocess {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;

        let stop = CancellationToken::new();
        let monitor = tokio::spawn(monitor(
            dest.to_path_buf(),
            index,
            Arc::clone(session),
            Arc::clone(&self.progress),
            self.monitor_interval,
            stop.clone(),
        ));

        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::warn!("lftp: {line}");
                }
            })
        });
        if let Some(out) = child.stdout.take() {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!("lftp: {line}");
            }
        }

        let status = child.wait().await;
        stop.cancel();
        let _ = monitor.await;
        if let Some(task) = stderr {
            let _ = task.await;
        }

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Subprocess {
                tool,
                reason: format!("mirror exited with {status}"),
            })
        }
    }
}

async fn monitor(
    dest: PathBuf,
    index: Arc<BulkIndex>,
    session: Arc<DownloadSession>,
    progress: Arc<dyn DownloadProgress>,
    every: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                let dir = dest.clone();
                let expected = Arc::clone(&index);
                match tokio::task::spawn_blocking(move || scan_local(&dir, &expected)).await {
                    Ok(scan) => {
                        session.observe_scan(scan.bytes, scan.complete, scan.partial);
                        progress.on_bulk_progress(session.downloaded_bytes(), session.total_bytes());
                    }
                    Err(e) => log::debug!("Directory scan of {} failed: {e}", dest.display()),
                }
            }
        }
    }
}
