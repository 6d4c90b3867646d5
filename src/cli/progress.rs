//! Progress bars and summaries for queue runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::engine::{JobOutcome, JobSummary};
use crate::library::LibraryEntry;
use crate::postprocess::Placement;
use crate::session::TransferReport;
use crate::transfer::DownloadProgress;
use crate::{format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single file transfer.
fn make_progress_bar(size: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// Creates the bar tracking a whole job.
fn make_total_progress_bar(size: u64, title: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "Total [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("template valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(title.to_string());
    bar
}

/// Renders transfer callbacks as indicatif bars.
pub struct IndicatifProgress {
    multi: MultiProgress,
    total: Mutex<Option<ProgressBar>>,
    files: Mutex<HashMap<String, ProgressBar>>,
}

impl IndicatifProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            total: Mutex::new(None),
            files: Mutex::new(HashMap::new()),
        }
    }

    fn total(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress for IndicatifProgress {
    fn on_job_start(&self, title: &str, total_files: usize, total_bytes: u64) {
        let _ = self.multi.println(format!(
            "{} {title} ({total_files} file(s), {})",
            style("Downloading").bold(),
            format_bytes(total_bytes)
        ));
        let bar = self.multi.add(make_total_progress_bar(total_bytes, title));
        bar.enable_steady_tick(Duration::from_millis(250));
        *self.total() = Some(bar);
    }

    fn on_file_start(&self, name: &str, size: u64) {
        let bar = make_progress_bar(size, name);
        let bar = match self.total().as_ref() {
            Some(total) => self.multi.insert_before(total, bar),
            None => self.multi.add(bar),
        };
        bar.enable_steady_tick(Duration::from_millis(250));
        self.files().insert(name.to_string(), bar);
    }

    fn on_progress(&self, name: &str, bytes_delta: u64) {
        if let Some(bar) = self.files().get(name) {
            bar.inc(bytes_delta);
        }
        if let Some(total) = self.total().as_ref() {
            total.inc(bytes_delta);
        }
    }

    fn on_file_complete(&self, name: &str, size: u64) {
        if let Some(bar) = self.files().remove(name) {
            let elapsed = bar.elapsed();
            bar.finish_and_clear();
            let _ = self.multi.println(format!(
                "  {name} - {} in {}",
                format_bytes(size),
                format_duration(elapsed)
            ));
        }
    }

    fn on_error(&self, name: &str, error: &str) {
        if let Some(bar) = self.files().remove(name) {
            bar.abandon();
        }
        let _ = self
            .multi
            .println(format!("  {} {name}: {error}", style("Failed").red()));
    }

    fn on_bulk_progress(&self, downloaded: u64, total: u64) {
        if let Some(bar) = self.total().as_ref() {
            bar.set_length(total.max(downloaded));
            bar.set_position(downloaded);
        }
    }

    fn on_job_complete(&self, _title: &str, _report: &TransferReport) {
        for (_, bar) in self.files().drain() {
            bar.finish_and_clear();
        }
        if let Some(bar) = self.total().take() {
            bar.finish_and_clear();
        }
    }
}

fn print_transfer(report: &TransferReport) {
    println!("  Files downloaded:  {}", report.files_downloaded);
    println!("  Total size:        {}", format_bytes(report.total_bytes));
    println!("  Total time:        {}", format_duration(report.elapsed));
    println!(
        "  Average speed:     {}/s",
        format_bytes(report.average_speed())
    );
    if report.files_filtered > 0 {
        println!("  Files filtered:    {}", report.files_filtered);
    }
    if report.files_failed > 0 {
        println!("  Files failed:      {}", report.files_failed);
    }
    for path in &report.failed_paths {
        println!("  Mirror failed:     {path}");
    }
}

fn print_post(summary: &JobSummary) {
    let post = &summary.post;
    if post.removed > 0 {
        println!("  Removed clutter:   {}", post.removed);
    }
    if post.extracted > 0 {
        println!("  Archives unpacked: {}", post.extracted);
    }
    for name in &post.failed_archives {
        println!("  Unpack failed:     {name}");
    }
    println!("  Media type:        {}", post.media.media_type());
    match &post.placement {
        Placement::Movie(path) => println!("  Moved to:          {}", path.display()),
        Placement::Series { folder, files } => {
            println!("  Moved to:          {} ({files} file(s))", folder.display());
        }
        Placement::Unchanged(path) => println!("  Left in:           {}", path.display()),
    }
    if let Some(archived) = &summary.archived {
        println!("  Descriptor:        {}", archived.display());
    }
}

/// Prints the outcome of one processed descriptor.
pub fn print_summary(outcome: &JobOutcome) {
    println!("\n{SEPARATOR}");
    match &outcome.result {
        Ok(summary) => {
            println!("{} {}", style("Finished").green().bold(), summary.title);
            println!("{SEPARATOR}");
            print_transfer(&summary.transfer);
            print_post(summary);
        }
        Err(e) => {
            println!(
                "{} {}",
                style("Failed").red().bold(),
                outcome.source.display()
            );
            println!("{SEPARATOR}");
            println!("  Error:             {e}");
        }
    }
    println!("{SEPARATOR}");
}

/// Prints the descriptor library, newest first.
pub fn print_library(entries: &[LibraryEntry]) {
    if entries.is_empty() {
        println!("No descriptors found.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Descriptors:");
    println!("{SEPARATOR}");

    for entry in entries {
        let media = match entry.media.year() {
            Some(year) => format!("{} {year}", entry.media.media_type()),
            None => entry.media.media_type().to_string(),
        };
        println!(
            "  {} ({}, {}, {media})",
            entry.name,
            format_bytes(entry.size),
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }

    println!("{SEPARATOR}");
    println!("  {} descriptor(s)", entries.len());
    println!("{SEPARATOR}\n");
}
