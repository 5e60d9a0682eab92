//! Trust store reading.
//!
//! The trust store is a line-oriented file of authorized public keys in
//! `authorized_keys` format. Blank lines and `#` comments are ignored and
//! malformed lines are skipped, so one bad line never locks out the rest of
//! the file.
//!
//! File access goes through the [`FileAccess`] capability so that the store
//! can be served from memory in tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use identity::{Fingerprint, IdentityError, PublicKeyEntry};

use super::AuthError;

/// Read-only access to text files.
pub trait FileAccess: Send + Sync {
    /// Reads the whole file at `path` as UTF-8.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

impl<F: FileAccess + ?Sized> FileAccess for Arc<F> {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }
}

/// [`FileAccess`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileAccess for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// [`FileAccess`] backed by an in-memory map of paths to contents.
#[derive(Debug, Default)]
pub struct InMemoryFiles {
    files: RwLock<HashMap<PathBuf, String>>,
}

impl InMemoryFiles {
    /// Creates an empty file map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let mut files = self
            .files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        files.insert(path.into(), contents.into());
    }

    /// Removes a file, returning its contents if it existed.
    pub fn remove(&self, path: &Path) -> Option<String> {
        let mut files = self
            .files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        files.remove(path)
    }
}

impl FileAccess for InMemoryFiles {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("in-memory file map lock poisoned"))?;

        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }
}

/// A snapshot of trust store contents.
///
/// Entries are parsed lazily while iterating.
#[derive(Debug, Clone)]
pub struct TrustedKeys {
    contents: String,
}

impl TrustedKeys {
    /// Wraps raw trust store contents.
    pub fn from_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    /// Iterates over every non-blank, non-comment line with its 1-based line
    /// number and parse result.
    pub fn scan(&self) -> impl Iterator<Item = (usize, Result<PublicKeyEntry, IdentityError>)> + '_ {
        self.contents
            .lines()
            .enumerate()
            .filter(|(_, line)| is_key_line(line))
            .map(|(index, line)| (index + 1, PublicKeyEntry::parse_line(line)))
    }

    /// Iterates over the well-formed entries, skipping malformed lines.
    pub fn iter(&self) -> impl Iterator<Item = PublicKeyEntry> + '_ {
        self.scan().filter_map(|(line_number, parsed)| match parsed {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("Skipping malformed trust store line {}: {}", line_number, err);
                None
            }
        })
    }

    /// Returns the first entry with the given fingerprint.
    pub fn find(&self, fingerprint: &Fingerprint) -> Option<PublicKeyEntry> {
        self.iter().find(|entry| &entry.fingerprint == fingerprint)
    }
}

fn is_key_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Loads trust store entries through a [`FileAccess`] capability.
///
/// Holds no cached state: every call reads the file again.
#[derive(Debug, Clone, Default)]
pub struct TrustStoreReader<F: FileAccess = LocalFs> {
    files: F,
}

impl<F: FileAccess> TrustStoreReader<F> {
    /// Creates a reader using the given file access.
    pub fn new(files: F) -> Self {
        Self { files }
    }

    /// Reads the trust store at `path`.
    pub fn load_entries(&self, path: &Path) -> Result<TrustedKeys, AuthError> {
        let contents =
            self.files
                .read_to_string(path)
                .map_err(|source| AuthError::TrustStoreUnreadable {
                    path: path.to_path_buf(),
                    source,
                })?;

        Ok(TrustedKeys::from_contents(contents))
    }
}

/// Returns the default trust store path, `~/.ssh/authorized_keys`.
pub fn default_authorized_keys_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssh")
        .join("authorized_keys")
}
