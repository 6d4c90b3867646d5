//! Archive discovery and extraction through external tools.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ToolConfig;
use crate::error::{Error, Result};

const TAR_SUFFIXES: [&str; 5] = [".tar", ".tar.gz", ".tar.bz2", ".tgz", ".tbz"];

static RAR_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.part(\d+)\.rar$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Rar,
    Tar,
}

/// A primary archive found in a job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub kind: ArchiveKind,
}

impl Archive {
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Files belonging to this archive that go away with it.
    #[must_use]
    pub fn related_files(&self) -> Vec<PathBuf> {
        let mut related = vec![self.path.clone()];
        if self.kind != ArchiveKind::Rar {
            return related;
        }

        let path = self.path.to_string_lossy();
        if let Some(volume) = RAR_VOLUME.find(&path) {
            let stem = &path[..volume.start()];
            let width = volume.as_str().len() - ".part.rar".len();
            related.extend((2..1000).map(|n| PathBuf::from(format!("{stem}.part{n:0width$}.rar"))));
        } else if let Some(base) = path.get(..path.len().saturating_sub(4)) {
            related.extend((0..100).map(|n| PathBuf::from(format!("{base}.r{n:02}"))));
        }
        related
    }
}

/// Classifies a file name as a primary archive.
///
/// Split RAR volumes only count through their first part.
#[must_use]
pub fn archive_kind(name: &str) -> Option<ArchiveKind> {
    let lower = name.to_lowercase();
    if lower.ends_with(".rar") {
        let first_volume = RAR_VOLUME
            .captures(&lower)
            .and_then(|c| c[1].parse::<u32>().ok())
            .is_none_or(|n| n == 1);
        return first_volume.then_some(ArchiveKind::Rar);
    }
    TAR_SUFFIXES
        .iter()
        .any(|s| lower.ends_with(s))
        .then_some(ArchiveKind::Tar)
}

/// Lists primary archives below `dir`, RAR archives first, each group sorted.
#[must_use]
pub fn find_archives(dir: &Path) -> Vec<Archive> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Some(kind) = archive_kind(&entry.file_name().to_string_lossy()) {
                found.push(Archive { path, kind });
            }
        }
    }
    found.sort_by(|a, b| {
        (a.kind == ArchiveKind::Tar, &a.path).cmp(&(b.kind == ArchiveKind::Tar, &b.path))
    });
    found
}

/// Runs `unrar` and `tar` on archives.
#[derive(Debug, Clone)]
pub struct Extractor {
    unrar: String,
    tar: String,
    remove_archives: bool,
}

impl Extractor {
    #[must_use]
    pub fn new(tools: &ToolConfig, remove_archives: bool) -> Self {
        Self {
            unrar: tools.unrar.clone(),
            tar: tools.tar.clone(),
            remove_archives,
        }
    }

    /// Builds the extraction command for `archive`, unpacking next to it.
    #[must_use]
    pub fn command(&self, archive: &Archive) -> Command {
        let target = archive.path.parent().unwrap_or_else(|| Path::new("."));
        match archive.kind {
            ArchiveKind::Rar => {
                let mut dest = target.as_os_str().to_os_string();
                dest.push("/");
                let mut cmd = Command::new(&self.unrar);
                cmd.arg("x").arg("-o+").arg(&archive.path).arg(dest);
                cmd
            }
            ArchiveKind::Tar => {
                let mut cmd = Command::new(&self.tar);
                cmd.arg("-xf").arg(&archive.path).arg("-C").arg(target);
                cmd
            }
        }
    }

    /// Extracts one archive, then removes it and its volumes if configured.
    ///
    /// Blocks until the tool exits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subprocess`] if the tool cannot start or exits with
    /// a failure status.
    pub fn extract(&self, archive: &Archive) -> Result<()> {
        let mut cmd = self.command(archive);
        let tool = cmd.get_program().to_string_lossy().into_owned();
        log::debug!("Running {cmd:?}");

        let output = cmd.output().map_err(|e| Error::Subprocess {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(Error::Subprocess {
                tool,
                reason: format!(
                    "{} on {}: {}",
                    output.status,
                    archive.file_name(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        if self.remove_archives {
            for path in archive.related_files() {
                match std::fs::remove_file(&path) {
                    Ok(()) => log::debug!("Removed {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => log::warn!("Could not remove {}: {e}", path.display()),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn primary_archive_names() {
        assert_eq!(archive_kind("movie.rar"), Some(ArchiveKind::Rar));
        assert_eq!(archive_kind("Movie.RAR"), Some(ArchiveKind::Rar));
        assert_eq!(archive_kind("movie.r00"), None);
        assert_eq!(archive_kind("movie.part1.rar"), Some(ArchiveKind::Rar));
        assert_eq!(archive_kind("movie.part01.rar"), Some(ArchiveKind::Rar));
        assert_eq!(archive_kind("movie.part02.rar"), None);
        assert_eq!(archive_kind("backup.tar.gz"), Some(ArchiveKind::Tar));
        assert_eq!(archive_kind("backup.tbz"), Some(ArchiveKind::Tar));
        assert_eq!(archive_kind("movie.mkv"), None);
    }

    #[test]
    fn finds_archives_recursively() {
        let dir = TempDir::new().unwrap();
        let cd = dir.path().join("CD1");
        std::fs::create_dir_all(&cd).unwrap();
        for name in ["a.tgz", "b.rar", "b.r00", "b.r01"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(cd.join("c.rar"), b"x").unwrap();

        let found = find_archives(dir.path());
        let names: Vec<String> = found.iter().map(Archive::file_name).collect();
        assert_eq!(names, ["c.rar", "b.rar", "a.tgz"]);
        assert_eq!(found[0].kind, ArchiveKind::Rar);
        assert_eq!(found[2].kind, ArchiveKind::Tar);
    }

    #[test]
    fn related_files_cover_volumes() {
        let rar = Archive {
            path: PathBuf::from("/dl/movie.rar"),
            kind: ArchiveKind::Rar,
        };
        let related = rar.related_files();
        assert_eq!(related[0], PathBuf::from("/dl/movie.rar"));
        assert_eq!(related[1], PathBuf::from("/dl/movie.r00"));
        assert_eq!(related.last(), Some(&PathBuf::from("/dl/movie.r99")));

        let volume = Archive {
            path: PathBuf::from("/dl/movie.part01.rar"),
            kind: ArchiveKind::Rar,
        };
        assert!(volume.related_files().contains(&PathBuf::from("/dl/movie.part02.rar")));

        let tar = Archive {
            path: PathBuf::from("/dl/a.tar"),
            kind: ArchiveKind::Tar,
        };
        assert_eq!(tar.related_files(), [PathBuf::from("/dl/a.tar")]);
    }

    #[test]
    fn extraction_commands() {
        let extractor = Extractor::new(&ToolConfig::default(), true);
        let rar = Archive {
            path: PathBuf::from("/dl/job/movie.rar"),
            kind: ArchiveKind::Rar,
        };
        assert_eq!(args(&extractor.command(&rar)), ["x", "-o+", "/dl/job/movie.rar", "/dl/job/"]);

        let tar = Archive {
            path: PathBuf::from("/dl/job/a.tar.gz"),
            kind: ArchiveKind::Tar,
        };
        assert_eq!(args(&extractor.command(&tar)), ["-xf", "/dl/job/a.tar.gz", "-C", "/dl/job"]);
    }

    #[test]
    fn missing_tool_keeps_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("movie.rar");
        std::fs::write(&path, b"x").unwrap();
        let tools = ToolConfig {
            unrar: "/nonexistent/unrar-binary".to_string(),
            ..ToolConfig::default()
        };

        let result = Extractor::new(&tools, true).extract(&Archive {
            path: path.clone(),
            kind: ArchiveKind::Rar,
        });

        assert!(matches!(result, Err(Error::Subprocess { .. })));
        assert!(path.exists());
    }
}
