//! sfdl-engine - Downloads, unpacks and files the payloads of SFDL descriptors.
//!
//! A descriptor names an FTP server and either an explicit file list or a
//! set of directories to mirror. The [`Engine`] works through the pending
//! descriptors one at a time, publishing a polling-friendly status file as
//! it goes.
//!
//! # Example
//!
//! ```no_run
//! use sfdl_engine::{AppConfig, Engine, PasswordList};
//!
//! # async fn example() -> sfdl_engine::Result<()> {
//! let config = AppConfig::load(None)?;
//! let passwords = PasswordList::load(&config.paths.password_file)?;
//!
//! let engine = Engine::new(config, passwords);
//! for outcome in engine.run().await? {
//!     println!("{}: {}", outcome.source.display(), outcome.is_success());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod crypto;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod format;
pub mod library;
pub mod media;
pub mod passwords;
pub mod postprocess;
pub mod session;
pub mod status;
pub mod transfer;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use config::{AppConfig, EngineConfig, MediaConfig, PathConfig, ToolConfig};
pub use descriptor::{Descriptor, FileEntry, Payload};
pub use engine::{Engine, JobOutcome, JobSummary};
pub use error::{Error, Result};
pub use format::{format_bytes, format_clock, format_duration};
pub use library::{Library, LibraryEntry, MediaKind};
pub use media::{MediaClassifier, MediaInfo, NoClassifier, TmdbClassifier};
pub use passwords::PasswordList;
pub use postprocess::{Placement, PostReport};
pub use session::{DownloadSession, SessionProgress, TransferReport};
pub use status::{EngineStatus, StatusPublisher, StatusSnapshot};
pub use transfer::{DownloadProgress, FileTransport, FtpTransport, NoProgress};
