//! Tokio-based filesystem backend (portable, works on all platforms)

use super::backend::SnapshotFs;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Portable snapshot backend using tokio::fs
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSnapshotFs;

impl TokioSnapshotFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotFs for TokioSnapshotFs {
    async fn create(&self, path: &Path) -> std::io::Result<File> {
        File::create(path).await
    }

    async fn open(&self, path: &Path) -> std::io::Result<File> {
        File::open(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_create_rename_remove() {
        let dir = TempDir::new().unwrap();
        let fs = TokioSnapshotFs::new();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");

        let mut file = fs.create(&a).await.unwrap();
        file.write_all(b"x,1,2024-01-01T00:00:00Z\n").await.unwrap();
        file.flush().await.unwrap();
        drop(file);
        assert!(fs.exists(&a).await.unwrap());

        fs.rename(&a, &b).await.unwrap();
        assert!(!fs.exists(&a).await.unwrap());
        assert!(fs.exists(&b).await.unwrap());

        fs.remove(&b).await.unwrap();
        assert!(!fs.exists(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let fs = TokioSnapshotFs::new();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        tokio::fs::write(&a, "new").await.unwrap();
        tokio::fs::write(&b, "old").await.unwrap();

        fs.rename(&a, &b).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&b).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_read_dir_lists_files() {
        let dir = TempDir::new().unwrap();
        let fs = TokioSnapshotFs::new();
        tokio::fs::write(dir.path().join("a.csv"), "").await.unwrap();
        tokio::fs::write(dir.path().join("b.csv"), "").await.unwrap();

        let mut listed = fs.read_dir(dir.path()).await.unwrap();
        listed.sort();
        assert_eq!(
            listed,
            vec![dir.path().join("a.csv"), dir.path().join("b.csv")]
        );
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let fs = TokioSnapshotFs::new();
        let err = fs.open(&dir.path().join("missing.csv")).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
