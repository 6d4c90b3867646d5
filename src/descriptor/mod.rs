//! SFDL descriptor parsing.
//!
//! A descriptor is read with a well-formed markup parser first and, if the
//! document is malformed, with tag-level pattern matching. Both strategies
//! produce a [`RawDescriptor`] that is finalised by the same routine:
//! anonymous credential defaults, title fallback, and decryption of
//! encrypted fields with a bruteforced password.

mod markup;
mod pattern;

use std::path::{Path, PathBuf};

pub use markup::MarkupStrategy;
pub use pattern::PatternStrategy;

use crate::crypto::{self, strip_invisible};
use crate::error::{Error, Result};
use crate::passwords::PasswordList;

/// Username used when a descriptor does not require authentication.
pub const ANONYMOUS_USER: &str = "anonymous";
/// Password used when a descriptor does not require authentication.
pub const ANONYMOUS_PASSWORD: &str = "anonymous@anonymous.nix";

const DEFAULT_PORT: u16 = 21;
const DEFAULT_THREADS: usize = 3;

/// One remote file listed by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Remote location.
    pub path: String,
}

impl FileEntry {
    /// Remote directory to change into before retrieving the file.
    ///
    /// Full paths ending in the file name resolve to their parent.
    #[must_use]
    pub fn remote_dir(&self) -> Option<&str> {
        let path = self.path.trim();
        if path.is_empty() {
            return None;
        }
        let trimmed = path.trim_end_matches('/');
        let dir = match trimmed.rsplit_once('/') {
            Some((parent, last)) if last == self.name => {
                if parent.is_empty() { "/" } else { parent }
            }
            _ if trimmed == self.name => return None,
            _ => path,
        };
        Some(dir)
    }
}

/// What a descriptor asks to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Explicit list of files.
    FileList(Vec<FileEntry>),
    /// Remote directories to mirror.
    BulkFolder(Vec<String>),
}

/// Transfer strategy of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    FileList,
    BulkFolder,
}

/// Host, port and credentials of an FTP source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// A parsed, fully decrypted download job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Display title.
    pub name: String,
    /// Uploader credit, if any.
    pub uploader: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Whether the source file carried encrypted fields.
    pub encrypted: bool,
    pub auth_required: bool,
    /// Requested worker count.
    pub max_threads: usize,
    pub payload: Payload,
    /// File the descriptor was read from.
    pub source: PathBuf,
}

impl Descriptor {
    #[must_use]
    pub const fn mode(&self) -> TransferMode {
        match self.payload {
            Payload::FileList(_) => TransferMode::FileList,
            Payload::BulkFolder(_) => TransferMode::BulkFolder,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Worker count capped by the engine-wide maximum, never below one.
    #[must_use]
    pub fn effective_threads(&self, engine_max: usize) -> usize {
        self.max_threads.min(engine_max).max(1)
    }

    /// Descriptor file name, e.g. `Movie.sfdl`.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Fields collected by a parse strategy before finalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDescriptor {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encrypted: bool,
    pub auth_required: bool,
    pub max_threads: Option<String>,
    pub bulk_mode: bool,
    pub bulk_paths: Vec<String>,
    pub files: Vec<FileEntry>,
}

impl RawDescriptor {
    /// Stores a top-level tag value by tag name. Unknown tags are ignored.
    pub(crate) fn set_tag(&mut self, tag: &str, value: String) {
        match tag {
            "Description" => self.title = Some(value),
            "Uploader" => self.uploader = Some(value),
            "Host" => self.host = Some(value),
            "Port" => self.port = Some(value),
            "Username" => self.username = Some(value),
            "Password" => self.password = Some(value),
            "Encrypted" => self.encrypted = is_true(&value),
            "AuthRequired" => self.auth_required = is_true(&value),
            "MaxDownloadThreads" => self.max_threads = Some(value),
            _ => {}
        }
    }
}

/// Top-level tags collected by both strategies.
pub(crate) const KNOWN_TAGS: [&str; 9] = [
    "Description",
    "Uploader",
    "Host",
    "Port",
    "Username",
    "Password",
    "Encrypted",
    "AuthRequired",
    "MaxDownloadThreads",
];

pub(crate) fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Builds a file entry from its tag values; entries without a name are dropped.
pub(crate) fn file_entry(name: Option<String>, size: Option<String>, path: Option<String>) -> Option<FileEntry> {
    let name = name.filter(|n| !n.is_empty())?;
    Some(FileEntry {
        size: size.and_then(|s| s.trim().parse().ok()).unwrap_or(0),
        path: path.unwrap_or_default(),
        name,
    })
}

/// One way of extracting a [`RawDescriptor`] from descriptor text.
pub trait ParseStrategy {
    /// Short name for log messages.
    fn name(&self) -> &'static str;

    /// Extracts descriptor fields, or explains why this strategy cannot.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when the text is unusable for
    /// this strategy.
    fn extract(&self, text: &str) -> std::result::Result<RawDescriptor, String>;
}

/// Parses the descriptor at `path`, decrypting it with `passwords` if needed.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the file cannot be read or has no title, and
/// [`Error::Decryption`] if it is encrypted and no candidate password fits.
pub fn parse(path: &Path, passwords: &PasswordList) -> Result<Descriptor> {
    let bytes = std::fs::read(path).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_text(&String::from_utf8_lossy(&bytes), path, passwords)
}

/// Parses descriptor text read from `source`.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_text(text: &str, source: &Path, passwords: &PasswordList) -> Result<Descriptor> {
    let text = text.trim_start_matches('\u{FEFF}');
    let strategies: [&dyn ParseStrategy; 2] = [&MarkupStrategy, &PatternStrategy];

    let mut failures = Vec::new();
    for strategy in strategies {
        match strategy.extract(text) {
            Ok(raw) => {
                log::debug!("Parsed {} with the {} strategy", source.display(), strategy.name());
                return finalize(raw, source, passwords);
            }
            Err(reason) => {
                log::warn!("{} strategy rejected {}: {reason}", strategy.name(), source.display());
                failures.push(format!("{}: {reason}", strategy.name()));
            }
        }
    }

    Err(Error::Parse {
        path: source.display().to_string(),
        reason: failures.join("; "),
    })
}

fn finalize(raw: RawDescriptor, source: &Path, passwords: &PasswordList) -> Result<Descriptor> {
    let title = raw
        .title
        .as_deref()
        .map(strip_invisible)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            source
                .file_stem()
                .map(|s| strip_invisible(&s.to_string_lossy()))
                .filter(|s| !s.is_empty())
        })
        .ok_or_else(|| Error::Parse {
            path: source.display().to_string(),
            reason: "no title found".to_string(),
        })?;

    let (username, password) = if raw.auth_required {
        (
            raw.username.unwrap_or_else(|| ANONYMOUS_USER.to_string()),
            raw.password.unwrap_or_else(|| ANONYMOUS_PASSWORD.to_string()),
        )
    } else {
        (ANONYMOUS_USER.to_string(), ANONYMOUS_PASSWORD.to_string())
    };

    let mut descriptor = Descriptor {
        name: title,
        uploader: raw.uploader,
        host: raw.host.unwrap_or_default(),
        port: raw
            .port
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT),
        username,
        password,
        encrypted: raw.encrypted,
        auth_required: raw.auth_required,
        max_threads: raw
            .max_threads
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(DEFAULT_THREADS)
            .max(1),
        payload: if raw.bulk_mode {
            Payload::BulkFolder(raw.bulk_paths)
        } else {
            Payload::FileList(raw.files)
        },
        source: source.to_path_buf(),
    };

    if descriptor.encrypted {
        decrypt_fields(&mut descriptor, passwords)?;
    }
    Ok(descriptor)
}

fn decrypt_fields(descriptor: &mut Descriptor, passwords: &PasswordList) -> Result<()> {
    let key = crypto::bruteforce(passwords.candidates(), &descriptor.host)
        .ok_or_else(|| Error::Decryption {
            path: descriptor.source.display().to_string(),
        })?
        .to_string();
    log::info!("Decrypting {} with a candidate password", descriptor.file_name());

    let decrypt = |value: &str| crypto::decrypt(&key, value).filter(|v| !v.is_empty());
    let decrypt_or_keep = |value: &mut String| {
        if let Some(plain) = decrypt(value) {
            *value = plain;
        }
    };

    decrypt_or_keep(&mut descriptor.host);
    decrypt_or_keep(&mut descriptor.name);
    if let Some(uploader) = descriptor.uploader.as_mut() {
        decrypt_or_keep(uploader);
    }
    if descriptor.auth_required {
        decrypt_or_keep(&mut descriptor.username);
        decrypt_or_keep(&mut descriptor.password);
    }

    match &mut descriptor.payload {
        Payload::BulkFolder(paths) => {
            let before = paths.len();
            paths.retain_mut(|path| match decrypt(path) {
                Some(plain) => {
                    *path = plain;
                    true
                }
                None => false,
            });
            if paths.len() < before {
                log::warn!("Dropped {} bulk path(s) that failed to decrypt", before - paths.len());
            }
        }
        Payload::FileList(files) => {
            for file in files {
                decrypt_or_keep(&mut file.name);
                decrypt_or_keep(&mut file.path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const IV: [u8; 16] = *b"sfdl-test-iv-000";

    fn plain_descriptor() -> String {
        r#"<?xml version="1.0" encoding="utf-8"?>
<SFDLFile>
  <Description>Some.Movie.2021.1080p.BluRay.x264-GROUP</Description>
  <Uploader>someone</Uploader>
  <Encrypted>false</Encrypted>
  <ConnectionInfo>
    <Host>ftp.example.com</Host>
    <Port>2121</Port>
    <Username>user</Username>
    <Password>pass</Password>
    <AuthRequired>true</AuthRequired>
  </ConnectionInfo>
  <MaxDownloadThreads>5</MaxDownloadThreads>
  <Packages>
    <Package>
      <File>
        <FileName>movie.part1.rar</FileName>
        <FileSize>1000</FileSize>
        <FileFullPath>/release/movie.part1.rar</FileFullPath>
      </File>
      <File>
        <FileName>movie.nfo</FileName>
        <FileSize>50</FileSize>
        <FileFullPath>/release</FileFullPath>
      </File>
    </Package>
  </Packages>
</SFDLFile>"#
            .to_string()
    }

    fn encrypted_descriptor(password: &str) -> String {
        let enc = |v: &str| crypto::encrypt(password, v, IV);
        format!(
            r#"<SFDLFile>
  <Description>{title}</Description>
  <Encrypted>true</Encrypted>
  <ConnectionInfo>
    <Host>{host}</Host>
    <Port>21</Port>
    <Username>{user}</Username>
    <Password>{pass}</Password>
    <AuthRequired>true</AuthRequired>
  </ConnectionInfo>
  <Packages>
    <SFDLPackage>
      <BulkFolderMode>true</BulkFolderMode>
      <BulkFolderList>
        <BulkFolder><BulkFolderPath>{path}</BulkFolderPath></BulkFolder>
        <BulkFolder><BulkFolderPath>not-base64</BulkFolderPath></BulkFolder>
      </BulkFolderList>
    </SFDLPackage>
  </Packages>
</SFDLFile>"#,
            title = enc("Show.S01.German.1080p"),
            host = enc("ftp.example.com"),
            user = enc("ftpuser"),
            pass = enc("ftppass"),
            path = enc("/bulk/Show.S01"),
        )
    }

    fn source() -> PathBuf {
        PathBuf::from("/uploads/Fallback.Title.sfdl")
    }

    #[test]
    fn parses_plain_file_list() {
        let d = parse_text(&plain_descriptor(), &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.name, "Some.Movie.2021.1080p.BluRay.x264-GROUP");
        assert_eq!(d.uploader.as_deref(), Some("someone"));
        assert_eq!(d.host, "ftp.example.com");
        assert_eq!(d.port, 2121);
        assert_eq!(d.username, "user");
        assert_eq!(d.password, "pass");
        assert_eq!(d.max_threads, 5);
        assert_eq!(d.mode(), TransferMode::FileList);
        let Payload::FileList(files) = &d.payload else {
            panic!("expected file list");
        };
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 1000);
        assert_eq!(files[1].path, "/release");
    }

    #[test]
    fn unencrypted_fields_stay_literal() {
        let text = plain_descriptor().replace("ftp.example.com", &crypto::encrypt("pw", "other.host", IV));
        let passwords: PasswordList = ["pw"].into_iter().collect();
        let d = parse_text(&text, &source(), &passwords).unwrap();
        assert_eq!(d.host, crypto::encrypt("pw", "other.host", IV));
    }

    #[test]
    fn anonymous_when_auth_not_required() {
        let text = plain_descriptor().replace("<AuthRequired>true", "<AuthRequired>false");
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.username, ANONYMOUS_USER);
        assert_eq!(d.password, ANONYMOUS_PASSWORD);

        let text = plain_descriptor().replace("<AuthRequired>true</AuthRequired>", "");
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.username, ANONYMOUS_USER);
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let text = plain_descriptor().replace(
            "<Description>Some.Movie.2021.1080p.BluRay.x264-GROUP</Description>",
            "<Description>\u{200B}</Description>",
        );
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.name, "Fallback.Title");
    }

    #[test]
    fn title_strips_invisible_characters() {
        let text = plain_descriptor().replace("Some.Movie", "\u{FEFF}Some.\u{200D}Movie");
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert!(d.name.starts_with("Some.Movie.2021"));
    }

    #[test]
    fn invalid_numbers_use_defaults() {
        let text = plain_descriptor()
            .replace("<Port>2121</Port>", "<Port>ftp</Port>")
            .replace("<MaxDownloadThreads>5", "<MaxDownloadThreads>0")
            .replace("<FileSize>1000</FileSize>", "<FileSize>big</FileSize>");
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.port, 21);
        assert_eq!(d.max_threads, 1);
        let Payload::FileList(files) = &d.payload else {
            panic!("expected file list");
        };
        assert_eq!(files[0].size, 0);
    }

    #[test]
    fn malformed_markup_uses_pattern_strategy() {
        let text = plain_descriptor().replace("</Uploader>", "</Uploadr>");
        let d = parse_text(&text, &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.host, "ftp.example.com");
        assert_eq!(d.port, 2121);
        let Payload::FileList(files) = &d.payload else {
            panic!("expected file list");
        };
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn encrypted_bulk_descriptor_is_decrypted() {
        let passwords: PasswordList = ["wrong1", "correct", "wrong2"].into_iter().collect();
        let d = parse_text(&encrypted_descriptor("correct"), &source(), &passwords).unwrap();
        assert_eq!(d.host, "ftp.example.com");
        assert_eq!(d.name, "Show.S01.German.1080p");
        assert_eq!(d.username, "ftpuser");
        assert_eq!(d.password, "ftppass");
        assert_eq!(d.payload, Payload::BulkFolder(vec!["/bulk/Show.S01".to_string()]));
    }

    #[test]
    fn encrypted_without_password_fails() {
        let passwords: PasswordList = ["wrong1", "wrong2"].into_iter().collect();
        let err = parse_text(&encrypted_descriptor("correct"), &source(), &passwords).unwrap_err();
        assert!(matches!(err, Error::Decryption { .. }));
    }

    #[test]
    fn parse_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.sfdl");
        std::fs::write(&path, plain_descriptor()).unwrap();
        let d = parse(&path, &PasswordList::default()).unwrap();
        assert_eq!(d.file_name(), "job.sfdl");
    }

    #[test]
    fn parse_missing_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let err = parse(&dir.path().join("missing.sfdl"), &PasswordList::default()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn remote_dir_resolution() {
        let entry = |name: &str, path: &str| FileEntry {
            name: name.to_string(),
            size: 0,
            path: path.to_string(),
        };
        assert_eq!(entry("a.rar", "/rel/a.rar").remote_dir(), Some("/rel"));
        assert_eq!(entry("a.rar", "/a.rar").remote_dir(), Some("/"));
        assert_eq!(entry("a.rar", "/rel/").remote_dir(), Some("/rel/"));
        assert_eq!(entry("a.rar", "a.rar").remote_dir(), None);
        assert_eq!(entry("a.rar", "").remote_dir(), None);
    }

    #[test]
    fn effective_threads_is_capped() {
        let d = parse_text(&plain_descriptor(), &source(), &PasswordList::default()).unwrap();
        assert_eq!(d.effective_threads(3), 3);
        assert_eq!(d.effective_threads(10), 5);
        assert_eq!(d.effective_threads(0), 1);
    }
}
