//! Configuration types for the download engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for transfer and post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrent transfer workers per job.
    pub max_threads: usize,
    /// Whether archives are extracted after transfer.
    pub extract_archives: bool,
    /// Whether archives are deleted after a successful extraction.
    pub remove_archives: bool,
    /// Timeout for opening an FTP connection.
    pub connect_timeout_secs: u64,
    /// Timeout for the bulk directory listing.
    pub index_timeout_secs: u64,
    /// Interval of the bulk-mode local directory scan.
    pub monitor_interval_ms: u64,
    /// Interval at which the status snapshot is rewritten during transfer.
    pub status_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_threads: 3,
            extract_archives: true,
            remove_archives: true,
            connect_timeout_secs: 30,
            index_timeout_secs: 60,
            monitor_interval_ms: 2000,
            status_interval_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of transfer workers.
    #[must_use]
    pub const fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = threads;
        self
    }

    /// Sets whether archives are extracted.
    #[must_use]
    pub const fn with_extract_archives(mut self, extract: bool) -> Self {
        self.extract_archives = extract;
        self
    }

    /// Sets whether archives are removed after extraction.
    #[must_use]
    pub const fn with_remove_archives(mut self, remove: bool) -> Self {
        self.remove_archives = remove;
        self
    }

    /// Sets the FTP connect timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// Directory and file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding incoming `.sfdl` descriptors.
    pub files_dir: PathBuf,
    /// Root directory for downloaded output.
    pub downloads_dir: PathBuf,
    /// Location of the JSON status snapshot.
    pub status_file: PathBuf,
    /// Newline-delimited candidate password list.
    pub password_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let base = data_dir.join("sfdl-engine");

        Self {
            files_dir: base.join("files"),
            downloads_dir: base.join("downloads"),
            status_file: base.join("status").join("status.json"),
            password_file: config_dir.join("sfdl-engine").join("passwords.txt"),
        }
    }
}

/// Media classification and library layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// TMDB API read access token. Classification is disabled when unset.
    pub tmdb_api_key: Option<String>,
    /// Language passed to the classification service.
    pub language: String,
    /// Directory under the downloads root receiving movies.
    pub movies_dir: String,
    /// Directory under the downloads root receiving series.
    pub series_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            language: "de".to_string(),
            movies_dir: "movies".to_string(),
            series_dir: "serien".to_string(),
        }
    }
}

/// External executables used by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Directory mirroring client.
    pub lftp: String,
    /// RAR extractor.
    pub unrar: String,
    /// TAR extractor.
    pub tar: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            lftp: "lftp".to_string(),
            unrar: "unrar".to_string(),
            tar: "tar".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine tunables.
    pub engine: EngineConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// Media configuration.
    pub media: MediaConfig,
    /// External tools.
    pub tools: ToolConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the TOML config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sfdl-engine")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file (if present) and applies
    /// environment overrides on top.
    ///
    /// `$pwd` inside path values resolves to the directory holding the
    /// config file, or the current directory when no file is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment variable holds an invalid number.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        let base = path
            .parent()
            .filter(|p| path.exists() && !p.as_os_str().is_empty())
            .map_or_else(
                || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                Path::to_path_buf,
            );
        config.apply_env(|key| std::env::var(key).ok(), &base)?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, using the historical variable names.
    ///
    /// # Errors
    ///
    /// Returns an error if `MAX_THREADS` is not a positive integer.
    pub fn apply_env<F>(&mut self, lookup: F, base: &Path) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path_var = |key: &str| {
            lookup(key)
                .map(|v| clean_value(&v))
                .filter(|v| !v.is_empty())
                .map(|v| PathBuf::from(v.replace("$pwd", &base.to_string_lossy())))
        };

        if let Some(dir) = path_var("FILES_DIR") {
            self.paths.files_dir = dir;
        }
        if let Some(dir) = path_var("DOWNLOADS_DIR") {
            self.paths.downloads_dir = dir;
        }
        if let Some(file) = path_var("STATUS_FILE") {
            self.paths.status_file = file;
        }
        if let Some(file) = path_var("PASSWORD_FILE") {
            self.paths.password_file = file;
        }
        if let Some(raw) = lookup("MAX_THREADS") {
            let value = clean_value(&raw);
            self.engine.max_threads = value
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::Config(format!("MAX_THREADS must be a positive integer, got {value:?}")))?;
        }
        if let Some(raw) = lookup("EXTRACT_ARCHIVES") {
            self.engine.extract_archives = parse_flag(&raw);
        }
        if let Some(raw) = lookup("REMOVE_ARCHIVES") {
            self.engine.remove_archives = parse_flag(&raw);
        }
        if let Some(raw) = lookup("TMDB_API_KEY") {
            let key = clean_value(&raw);
            self.media.tmdb_api_key = (!key.is_empty()).then_some(key);
        }
        Ok(())
    }
}

/// Strips an inline `#` comment and surrounding quotes.
fn clean_value(raw: &str) -> String {
    raw.split('#')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn parse_flag(raw: &str) -> bool {
    clean_value(raw).eq_ignore_ascii_case("true")
}
