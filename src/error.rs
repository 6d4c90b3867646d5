//! Error types for the sfdl-engine library.

use thiserror::Error;

/// Errors that can occur while processing a descriptor.
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor could not be read or yielded no usable title.
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// Path of the descriptor file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// No candidate password produced a plausible plaintext.
    #[error("No candidate password decrypts {path}")]
    Decryption {
        /// Path of the descriptor file.
        path: String,
    },

    /// A single file transfer failed.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Error reported by the FTP client.
    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    /// An external tool failed to run or exited unsuccessfully.
    #[error("{tool} failed: {reason}")]
    Subprocess {
        /// Name of the executable.
        tool: String,
        /// Exit status or spawn error.
        reason: String,
    },

    /// The classification service returned something unusable.
    #[error("Classification failed: {0}")]
    Classification(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error for status or metadata files.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A job is already running on this engine.
    #[error("Engine is busy with another job")]
    Busy,

    /// A descriptor file name was rejected.
    #[error("Invalid descriptor name: {0}")]
    InvalidName(String),
}

/// A specialized `Result` type for sfdl-engine operations.
pub type Result<T> = std::result::Result<T, Error>;
