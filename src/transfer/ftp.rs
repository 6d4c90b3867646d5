//! Per-file FTP retrieval.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use suppaftp::FtpStream;
use suppaftp::types::FileType;

use crate::descriptor::{Endpoint, FileEntry};
use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Abstraction over fetching one remote file, for testability.
///
/// Implementations block; the orchestrator calls them from worker threads.
pub trait FileTransport: Send + Sync {
    /// Retrieves `entry` from `endpoint` into `local`, reporting every
    /// received chunk through `on_chunk`. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error on connection, authentication or I/O failure.
    fn fetch(
        &self,
        endpoint: &Endpoint,
        entry: &FileEntry,
        local: &Path,
        on_chunk: &mut dyn FnMut(u64),
    ) -> Result<u64>;
}

/// Plain FTP transport opening a fresh passive-mode connection per file.
#[derive(Debug, Clone, Copy)]
pub struct FtpTransport {
    connect_timeout: Duration,
}

impl Default for FtpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl FtpTransport {
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<FtpStream> {
        let addr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Transfer(format!("cannot resolve {}", endpoint.host)))?;

        let mut ftp = FtpStream::connect_timeout(addr, self.connect_timeout)?;
        ftp.login(endpoint.username.as_str(), endpoint.password.as_str())?;
        ftp.transfer_type(FileType::Binary)?;
        Ok(ftp)
    }
}

impl FileTransport for FtpTransport {
    fn fetch(
        &self,
        endpoint: &Endpoint,
        entry: &FileEntry,
        local: &Path,
        on_chunk: &mut dyn FnMut(u64),
    ) -> Result<u64> {
        let mut ftp = self.connect(endpoint)?;

        if let Some(dir) = entry.remote_dir() {
            if let Err(e) = ftp.cwd(dir) {
                log::warn!("Could not change to {dir} for {}: {e}", entry.name);
            }
        }

        let mut out = BufWriter::new(File::create(local)?);
        let mut stream = ftp.retr_as_stream(entry.name.as_str())?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            let n = n as u64;
            written += n;
            on_chunk(n);
        }
        out.flush()?;
        ftp.finalize_retr_stream(stream)?;

        if let Err(e) = ftp.quit() {
            log::debug!("QUIT after {} failed: {e}", entry.name);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FtpTransport>();
    }

    #[test]
    fn unresolvable_host_fails_without_writing() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = dir.path().join("out.bin");
        let endpoint = Endpoint {
            host: "host.invalid".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: "anonymous@anonymous.nix".to_string(),
        };
        let entry = FileEntry {
            name: "out.bin".to_string(),
            size: 1,
            path: String::new(),
        };

        let result = FtpTransport::new(Duration::from_secs(1)).fetch(&endpoint, &entry, &local, &mut |_| {});
        assert!(result.is_err());
        assert!(!local.exists());
    }
}
