//! Injectable key/value store for persisted state (country list copy,
//! theme and game-mode preferences).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::fs::{FileSystem, TokioFileSystem, write_atomic};

/// Well-known store keys.
pub mod keys {
    /// Simplified country list fetched from the remote API.
    pub const COUNTRIES: &str = "flag-quiz.countries";
    /// Theme preference.
    pub const THEME: &str = "flag-quiz.theme";
    /// Game-mode preference.
    pub const MODE: &str = "flag-quiz.mode";
}

/// String key/value persistence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, used in tests and when persistence is unavailable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().expect("store lock").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .expect("store lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().expect("store lock").remove(key);
        Ok(())
    }
}

/// Store keeping one file per key in a directory.
///
/// Writes go through a `.part` file and a rename, so a crash never leaves a
/// half-written value behind.
#[derive(Debug, Clone)]
pub struct FileStore<F: FileSystem = TokioFileSystem> {
    dir: PathBuf,
    fs: F,
}

impl FileStore<TokioFileSystem> {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> FileStore<F> {
    /// Creates a store with a custom file system implementation.
    #[must_use]
    pub fn with_fs(dir: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    /// Directory holding the value files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maps a key to a file name inside the store directory. A leading dot
    /// is escaped so `.` and `..` never name the directory or its parent.
    fn key_path(&self, key: &str) -> PathBuf {
        let mut name: String = key
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let keep = c.is_ascii_alphanumeric()
                    || matches!(c, '-' | '_')
                    || (c == '.' && i > 0);
                if keep { c } else { '_' }
            })
            .collect();
        if name.is_empty() {
            name.push('_');
        }
        self.dir.join(name)
    }
}

#[async_trait]
impl<F: FileSystem> Store for FileStore<F> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match self.fs.read_file(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        write_atomic(&self.fs, &self.key_path(key), value.as_bytes()).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self.fs.remove_file(&self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
