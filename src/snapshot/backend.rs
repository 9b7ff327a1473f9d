//! Backend trait for snapshot filesystem operations

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Abstraction over the filesystem primitives the snapshot cache relies on.
///
/// Every method is a single primitive; retrying is the caller's job.
#[async_trait]
pub trait SnapshotFs: Send + Sync {
    /// Create (or truncate) a file for writing
    async fn create(&self, path: &Path) -> std::io::Result<File>;

    /// Open an existing file for reading
    async fn open(&self, path: &Path) -> std::io::Result<File>;

    /// Rename `from` to `to`, replacing `to` if it exists
    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Delete a file
    async fn remove(&self, path: &Path) -> std::io::Result<()>;

    /// Whether a file exists at `path`
    async fn exists(&self, path: &Path) -> std::io::Result<bool>;

    /// Create a directory and all parent directories
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// List all entries in a directory
    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>>;
}
