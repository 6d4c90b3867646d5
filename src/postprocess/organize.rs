//! Placement of finished jobs into the movie and series layout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::media::MediaInfo;

/// Extensions treated as video files.
pub const VIDEO_EXTENSIONS: [&str; 8] = ["mkv", "mp4", "avi", "m4v", "mov", "wmv", "ts", "m2ts"];

static SEASON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[Ss](\d{2})").expect("valid regex"));

/// Where a job's output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The main video was moved to this file.
    Movie(PathBuf),
    /// Episodes were moved below this series folder.
    Series { folder: PathBuf, files: usize },
    /// Nothing was moved.
    Unchanged(PathBuf),
}

#[must_use]
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Video files below `dir` in sorted walk order.
#[must_use]
pub fn video_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return found;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            found.extend(video_files(&path));
        } else if is_video(&path) {
            found.push(path);
        }
    }
    found
}

/// Season number from an `Sxx` marker in a file name.
#[must_use]
pub fn season_of(file_name: &str) -> Option<u32> {
    SEASON
        .captures(file_name)
        .and_then(|c| c[1].parse().ok())
}

/// Moves a file, replacing any existing destination. Falls back to
/// copy-and-delete across filesystems.
///
/// # Errors
///
/// Returns an I/O error if neither rename nor copy succeeds.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if to.exists() {
        std::fs::remove_file(to)?;
    }
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

fn remove_work_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => log::debug!("Removed {}", dir.display()),
        Err(e) => log::warn!("Could not remove {}: {e}", dir.display()),
    }
}

/// Replaces characters that cannot appear in a folder name.
pub(crate) fn folder_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Moves the job in `work_dir` according to its classification.
///
/// # Errors
///
/// Returns an I/O error if a move fails; the working directory is kept then.
pub fn organize(
    work_dir: &Path,
    downloads_root: &Path,
    media: &MediaConfig,
    info: &MediaInfo,
) -> Result<Placement> {
    match info {
        MediaInfo::Movie { .. } => organize_movie(work_dir, &downloads_root.join(&media.movies_dir)),
        MediaInfo::Series { name, .. } => organize_series(
            work_dir,
            &downloads_root.join(&media.series_dir).join(folder_name(name)),
        ),
        MediaInfo::Unknown => Ok(Placement::Unchanged(work_dir.to_path_buf())),
    }
}

fn organize_movie(work_dir: &Path, movies: &Path) -> Result<Placement> {
    let Some(video) = video_files(work_dir).into_iter().next() else {
        log::warn!("No video file found in {}", work_dir.display());
        return Ok(Placement::Unchanged(work_dir.to_path_buf()));
    };

    let mut file_name = work_dir.file_name().unwrap_or_default().to_os_string();
    if let Some(ext) = video.extension() {
        file_name.push(".");
        file_name.push(ext);
    }
    let target = movies.join(file_name);
    move_file(&video, &target)?;
    log::info!("Moved movie to {}", target.display());

    remove_work_dir(work_dir);
    Ok(Placement::Movie(target))
}

fn organize_series(work_dir: &Path, folder: &Path) -> Result<Placement> {
    let mut seasons: BTreeMap<Option<u32>, Vec<PathBuf>> = BTreeMap::new();
    for video in video_files(work_dir) {
        let season = video
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(season_of);
        seasons.entry(season).or_default().push(video);
    }

    let mut moved = 0;
    for (season, files) in seasons {
        let target_dir = match season {
            Some(n) => folder.join(format!("Season {n:02}")),
            None => folder.to_path_buf(),
        };
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            move_file(&file, &target_dir.join(name))?;
            moved += 1;
        }
        log::info!("Moved episodes to {}", target_dir.display());
    }

    remove_work_dir(work_dir);
    Ok(Placement::Series {
        folder: folder.to_path_buf(),
        files: moved,
    })
}
