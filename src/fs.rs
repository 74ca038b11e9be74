//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Abstraction over file system operations for testability.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads the whole file at the given path.
    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>>;

    /// Checks if a file exists at the given path.
    async fn file_exists(&self, path: &Path) -> bool;

    /// Returns the size of a file if it exists.
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Creates or truncates a file and writes `contents` to it.
    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()>;

    /// Renames a file from one path to another.
    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes a file at the given path.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Returns the `.part` path a file is written to before being renamed into place.
#[must_use]
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Writes `contents` to `{path}.part`, then renames it to `path`.
///
/// Parent directories are created as needed. The `.part` file is removed if
/// the write fails.
///
/// # Errors
///
/// Returns an error if the directory, the write or the rename fails.
pub async fn write_atomic<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    contents: &[u8],
) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs.create_dir_all(parent).await?;
    }

    let pp = part_path(path);
    if let Err(e) = fs.write_file(&pp, contents).await {
        let _ = fs.remove_file(&pp).await;
        return Err(e);
    }
    fs.rename_file(&pp, path).await
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn read_file(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn file_exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tokio_fs_file_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::File::create(&path).unwrap();

        let fs = TokioFileSystem::new();
        assert!(fs.file_exists(&path).await);
        assert!(!fs.file_exists(&dir.path().join("nonexistent.txt")).await);
    }

    #[tokio::test]
    async fn tokio_fs_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"hello").unwrap();

        let fs = TokioFileSystem::new();
        assert_eq!(fs.file_size(&path).await, Some(5));
        assert_eq!(
            fs.file_size(&dir.path().join("nonexistent.txt")).await,
            None
        );
    }

    #[tokio::test]
    async fn tokio_fs_read_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fr.svg");
        std::fs::write(&path, b"<svg/>").unwrap();

        let fs = TokioFileSystem::new();
        assert_eq!(fs.read_file(&path).await.unwrap(), b"<svg/>");
        assert!(fs.read_file(&dir.path().join("us.svg")).await.is_err());
    }

    #[tokio::test]
    async fn write_atomic_creates_parents_and_leaves_no_part() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/countries.json");

        let fs = TokioFileSystem::new();
        write_atomic(&fs, &path, b"[]").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn part_path_appends_extension() {
        assert_eq!(
            part_path(Path::new("flags/fr.svg")),
            PathBuf::from("flags/fr.svg.part")
        );
        assert_eq!(
            part_path(Path::new("countries.json")),
            PathBuf::from("countries.json.part")
        );
    }
}
