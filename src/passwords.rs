//! Candidate password list used for bruteforce decryption.

use std::path::Path;

/// Ordered list of candidate passwords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordList {
    candidates: Vec<String>,
}

impl PasswordList {
    /// Builds a list from newline-delimited text.
    ///
    /// Lines are trimmed; empty lines and `#` comments are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let candidates = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { candidates }
    }

    /// Loads the list from `path`. A missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let list = Self::parse(&String::from_utf8_lossy(&bytes));
                log::info!("Loaded {} candidate password(s) from {}", list.len(), path.display());
                Ok(list)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Password file {} not found, encrypted descriptors will fail", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the candidates in file order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PasswordList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().map(Into::into).collect(),
        }
    }
}
