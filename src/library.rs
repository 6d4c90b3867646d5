//! The descriptor library: pending `.sfdl` files, their recorded
//! classifications and the archive of finished descriptors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::media::MediaInfo;
use crate::status::write_atomic;

/// Extension of descriptor files.
pub const EXTENSION: &str = ".sfdl";
/// Sidecar holding classifications keyed by file name.
pub const METADATA_FILE: &str = ".metadata.json";
/// Subdirectory receiving processed descriptors.
pub const DONE_DIR: &str = "done";

/// Manually assignable media kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Series,
}

impl std::str::FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" | "series" => Ok(Self::Series),
            other => Err(Error::Config(format!("unknown media type '{other}'"))),
        }
    }
}

/// One descriptor in the library listing.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Local>,
    pub media: MediaInfo,
}

/// Checks that `name` is a bare descriptor file name.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] for names without the `.sfdl` extension or
/// with path separators or `..`.
pub fn validate_name(name: &str) -> Result<()> {
    if !name.ends_with(EXTENSION)
        || name.len() == EXTENSION.len()
        || name.contains(['/', '\\'])
        || name.contains("..")
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Descriptor directory with its metadata sidecar.
#[derive(Debug, Clone)]
pub struct Library {
    dir: PathBuf,
}

impl Library {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn done_dir(&self) -> PathBuf {
        self.dir.join(DONE_DIR)
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    fn descriptor_names(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(EXTENSION) && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Descriptors waiting to be processed, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn pending(&self) -> Result<Vec<PathBuf>> {
        let mut names = self.descriptor_names()?;
        names.sort();
        Ok(names.into_iter().map(|n| self.dir.join(n)).collect())
    }

    /// Descriptors with size, modification time and classification, newest first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<LibraryEntry>> {
        let mut metadata = self.load_metadata();
        let mut entries = Vec::new();
        for name in self.descriptor_names()? {
            let path = self.dir.join(&name);
            let meta = std::fs::metadata(&path)?;
            let modified = meta.modified().map_or_else(|_| Local::now(), DateTime::from);
            entries.push(LibraryEntry {
                media: metadata.remove(&name).unwrap_or(MediaInfo::Unknown),
                name,
                path,
                size: meta.len(),
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Stores a descriptor under `name`, adding the extension if missing.
    /// Returns the stored path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for unsafe names, or an I/O error.
    pub fn import(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let name = if name.ends_with(EXTENSION) {
            name.to_string()
        } else {
            format!("{name}{EXTENSION}")
        };
        validate_name(&name)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&name);
        std::fs::write(&path, contents)?;
        log::info!("Stored descriptor {name}");
        Ok(path)
    }

    /// Removes a pending descriptor and its recorded classification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for unsafe names, or an I/O error if
    /// the file does not exist.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        std::fs::remove_file(self.dir.join(name))?;
        let mut metadata = self.load_metadata();
        if metadata.remove(name).is_some() {
            self.save_metadata(&metadata)?;
        }
        log::info!("Deleted descriptor {name}");
        Ok(())
    }

    /// Records a classification for `name` in the sidecar.
    ///
    /// # Errors
    ///
    /// Returns an error if the sidecar cannot be written.
    pub fn record(&self, name: &str, media: &MediaInfo) -> Result<()> {
        let mut metadata = self.load_metadata();
        metadata.insert(name.to_string(), media.clone());
        self.save_metadata(&metadata)
    }

    /// Overrides the classification of a pending descriptor by hand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for unsafe or unknown names.
    pub fn set_media_type(&self, name: &str, kind: MediaKind) -> Result<MediaInfo> {
        validate_name(name)?;
        if !self.dir.join(name).is_file() {
            return Err(Error::InvalidName(name.to_string()));
        }
        let title = name.trim_end_matches(EXTENSION).replace(['.', '_'], " ");
        let media = match kind {
            MediaKind::Movie => MediaInfo::Movie {
                name: title,
                year: None,
            },
            MediaKind::Series => MediaInfo::Series {
                name: title,
                year: None,
                seasons: None,
                episodes: None,
            },
        };
        self.record(name, &media)?;
        Ok(media)
    }

    /// Recorded classification of `name`, if any.
    #[must_use]
    pub fn media_of(&self, name: &str) -> Option<MediaInfo> {
        self.load_metadata().remove(name)
    }

    /// Moves a processed descriptor into the done directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the move fails.
    pub fn archive(&self, descriptor: &Path) -> Result<PathBuf> {
        let done = self.done_dir();
        std::fs::create_dir_all(&done)?;
        let name = descriptor
            .file_name()
            .ok_or_else(|| Error::InvalidName(descriptor.display().to_string()))?;
        let target = done.join(name);
        crate::postprocess::organize::move_file(descriptor, &target)?;
        log::info!("Archived {}", target.display());
        Ok(target)
    }

    /// Reads the sidecar. Unreadable files and entries degrade to empty.
    fn load_metadata(&self) -> BTreeMap<String, MediaInfo> {
        let Ok(text) = std::fs::read_to_string(self.metadata_path()) else {
            return BTreeMap::new();
        };
        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Ignoring malformed {METADATA_FILE}: {e}");
                return BTreeMap::new();
            }
        };
        raw.into_iter()
            .map(|(name, value)| {
                let media = serde_json::from_value(value).unwrap_or(MediaInfo::Unknown);
                (name, media)
            })
            .collect()
    }

    fn save_metadata(&self, metadata: &BTreeMap<String, MediaInfo>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&self.metadata_path(), &bytes)?;
        Ok(())
    }
}
