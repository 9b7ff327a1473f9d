//! Fault-injecting snapshot backend for testing (wraps the tokio backend)

use super::backend::SnapshotFs;
use super::tokio_backend::TokioSnapshotFs;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::fs::File;

/// Real files on disk, plus switchable failures for selected primitives
#[derive(Clone, Default)]
pub struct MockSnapshotFs {
    inner: TokioSnapshotFs,
    /// Renames for which this returns true fail
    rename_fault: Arc<RwLock<Option<RenameFault>>>,
    /// Number of upcoming `create` calls that fail
    failing_creates: Arc<AtomicU32>,
    simulate_remove_failure: Arc<RwLock<bool>>,
    rename_calls: Arc<AtomicU32>,
    create_calls: Arc<AtomicU32>,
    remove_calls: Arc<AtomicU32>,
}

type RenameFault = Arc<dyn Fn(&Path, &Path) -> bool + Send + Sync>;

fn simulated(kind: std::io::ErrorKind, what: &str) -> std::io::Error {
    std::io::Error::new(kind, format!("Simulated {} failure", what))
}

impl MockSnapshotFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every rename for which `fault(from, to)` returns true
    pub fn fail_renames_when<F>(&self, fault: F)
    where
        F: Fn(&Path, &Path) -> bool + Send + Sync + 'static,
    {
        *self.rename_fault.write() = Some(Arc::new(fault));
    }

    pub fn clear_rename_faults(&self) {
        *self.rename_fault.write() = None;
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn set_remove_failure(&self, enabled: bool) {
        *self.simulate_remove_failure.write() = enabled;
    }

    pub fn rename_calls(&self) -> u32 {
        self.rename_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> u32 {
        self.remove_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotFs for MockSnapshotFs {
    async fn create(&self, path: &Path) -> std::io::Result<File> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(simulated(std::io::ErrorKind::Other, "create"));
        }
        self.inner.create(path).await
    }

    async fn open(&self, path: &Path) -> std::io::Result<File> {
        self.inner.open(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        self.rename_calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.rename_fault.read().clone();
        if fault.is_some_and(|fault| fault(from, to)) {
            return Err(simulated(std::io::ErrorKind::PermissionDenied, "rename"));
        }
        self.inner.rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if *self.simulate_remove_failure.read() {
            return Err(simulated(std::io::ErrorKind::PermissionDenied, "remove"));
        }
        self.inner.remove(path).await
    }

    async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        self.inner.exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
        self.inner.read_dir(path).await
    }
}
