//! Per-container listing snapshot cache
//!
//! A [`ContainerCache`] owns the refresh cycle for one container:
//!
//! 1. pull every page from the [`ListingSource`] into a *staging* file
//! 2. promote: *current* → *previous*, *staging* → *current*
//! 3. roll back (*previous* → *current*) if the second rename fails
//! 4. prune *previous*
//!
//! Readers go through [`SnapshotReader`] and never look at the refresh state.
//! Only the refresh path writes `refreshing` and `last_refresh_at`.

use crate::config::CacheConfig;
use crate::error::{FileOp, ListCacheError, Result};
use crate::retry::FileRetryPolicy;
use crate::shutdown::Shutdown;
use crate::snapshot::{encode_record, SnapshotFs, SnapshotPaths, TokioSnapshotFs};
use crate::source::ListingSource;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};

pub mod query;

pub use self::query::{DirEntry, ListingQuery, SnapshotReader, WildcardPattern};

/// Result of a call to [`ContainerCache::refresh_once`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was written and promoted
    Promoted { entries: u64 },
    /// Promotion failed but the previous snapshot was restored as current
    RolledBack { entries: u64, reason: String },
    /// Another refresh of this container is in flight; nothing was done
    AlreadyRefreshing,
}

/// Refresh-only state
#[derive(Debug, Default)]
struct RefreshState {
    refreshing: AtomicBool,
    last_refresh_at: Mutex<Option<DateTime<Utc>>>,
}

/// Clears the `refreshing` flag when a cycle ends, however it ends
struct RefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Snapshot cache for one remote container
pub struct ContainerCache {
    config: CacheConfig,
    paths: SnapshotPaths,
    fs: Arc<dyn SnapshotFs>,
    source: Arc<dyn ListingSource>,
    shutdown: Shutdown,
    reader: SnapshotReader,
    state: RefreshState,
}

impl std::fmt::Debug for ContainerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCache")
            .field("container", &self.config.container)
            .field("storage_path", &self.config.storage_path)
            .field("refresh_interval", &self.config.refresh_interval)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

impl ContainerCache {
    /// Create a cache backed by the local filesystem. Nothing is fetched
    /// until the first [`refresh_once`](Self::refresh_once).
    pub fn new(config: CacheConfig, source: Arc<dyn ListingSource>) -> Self {
        Self::with_backend(config, source, Arc::new(TokioSnapshotFs::new()), Shutdown::never())
    }

    pub fn with_backend(
        config: CacheConfig,
        source: Arc<dyn ListingSource>,
        fs: Arc<dyn SnapshotFs>,
        shutdown: Shutdown,
    ) -> Self {
        let paths = SnapshotPaths::new(&config.storage_path, &config.container);
        let reader = SnapshotReader::new(
            config.container.clone(),
            paths.clone(),
            fs.clone(),
            config.retry,
            shutdown.clone(),
        );
        Self {
            config,
            paths,
            fs,
            source,
            shutdown,
            reader,
            state: RefreshState::default(),
        }
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    /// Read-only handle for queries, independent of the refresh state
    pub fn reader(&self) -> &SnapshotReader {
        &self.reader
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.refreshing.load(Ordering::Acquire)
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        *self.state.last_refresh_at.lock()
    }

    /// Whether the refresh interval has elapsed since the last successful refresh
    pub fn is_refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh_at() {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.config.refresh_interval,
                // Clock went backwards: not due
                Err(_) => false,
            },
        }
    }

    /// Serve a listing query from the current snapshot
    pub async fn query(&self, query: &ListingQuery) -> Result<Vec<DirEntry>> {
        self.reader.query(query).await
    }

    /// Run one refresh cycle: fetch, write staging, promote, prune.
    ///
    /// At most one cycle runs per cache; a concurrent call returns
    /// [`RefreshOutcome::AlreadyRefreshing`] without doing any work. A failed
    /// cycle leaves *current* untouched, except for
    /// [`ListCacheError::Unrecoverable`].
    pub async fn refresh_once(&self) -> Result<RefreshOutcome> {
        let Some(_guard) = RefreshGuard::acquire(&self.state.refreshing) else {
            tracing::debug!(container = %self.container(), "Refresh already in flight");
            return Ok(RefreshOutcome::AlreadyRefreshing);
        };

        tracing::info!(container = %self.container(), "Refreshing listing snapshot");

        let started_at = Utc::now();
        let staging = self.paths.staging(started_at);

        let entries = match self.write_staging(&staging).await {
            Ok(entries) => entries,
            Err(err) => {
                self.discard_staging(&staging).await;
                return Err(err);
            }
        };
        *self.state.last_refresh_at.lock() = Some(Utc::now());

        let outcome = match self.promote(&staging).await {
            Ok(None) => RefreshOutcome::Promoted { entries },
            Ok(Some(reason)) => {
                self.discard_staging(&staging).await;
                RefreshOutcome::RolledBack { entries, reason }
            }
            Err(err) => {
                self.discard_staging(&staging).await;
                return Err(err);
            }
        };

        self.prune().await;

        tracing::info!(
            container = %self.container(),
            entries = entries,
            rolled_back = matches!(outcome, RefreshOutcome::RolledBack { .. }),
            "Listing snapshot refreshed"
        );
        Ok(outcome)
    }

    /// Delete staging files left behind by a process that stopped mid-cycle.
    ///
    /// Returns how many were removed. Skipped while a refresh is in flight,
    /// since its own staging file would match.
    pub async fn sweep_orphaned_staging(&self) -> usize {
        let Some(_guard) = RefreshGuard::acquire(&self.state.refreshing) else {
            return 0;
        };

        let files = match self.fs.read_dir(self.paths.dir()).await {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(
                    container = %self.container(),
                    dir = %self.paths.dir().display(),
                    error = %e,
                    "Could not scan snapshot directory"
                );
                return 0;
            }
        };

        let mut removed = 0;
        for path in files.iter().filter(|p| self.paths.is_staging(p)) {
            match self.fs.remove(path).await {
                Ok(()) => {
                    tracing::info!(
                        container = %self.container(),
                        path = %path.display(),
                        "Removed orphaned staging snapshot"
                    );
                    removed += 1;
                }
                Err(e) => tracing::warn!(
                    container = %self.container(),
                    path = %path.display(),
                    error = %e,
                    "Could not remove orphaned staging snapshot"
                ),
            }
        }
        removed
    }

    fn retry(&self) -> &FileRetryPolicy {
        &self.config.retry
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.fs
            .exists(path)
            .await
            .map_err(|e| ListCacheError::io(FileOp::Stat, path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.retry()
            .run(FileOp::Rename, from, &self.shutdown, || self.fs.rename(from, to))
            .await
            .map_err(|e| ListCacheError::io(FileOp::Rename, from, e))
    }

    /// Stream every remote page into the staging file. Returns the entry count.
    async fn write_staging(&self, staging: &Path) -> Result<u64> {
        if let Err(e) = self.fs.create_dir_all(self.paths.dir()).await {
            tracing::warn!(
                container = %self.container(),
                dir = %self.paths.dir().display(),
                error = %e,
                "Could not create snapshot directory"
            );
        }

        let file = self
            .retry()
            .run(FileOp::Create, staging, &self.shutdown, || self.fs.create(staging))
            .await
            .map_err(|e| ListCacheError::io(FileOp::Create, staging, e))?;
        let mut writer = BufWriter::new(file);

        let write_err = |e: std::io::Error| ListCacheError::io(FileOp::Write, staging, e);
        let mut marker: Option<String> = None;
        let mut entries: u64 = 0;
        let mut pages: u64 = 0;

        loop {
            let mut shutdown = self.shutdown.clone();
            let page = tokio::select! {
                page = self.source.list_page(self.container(), marker.as_deref()) => page?,
                _ = shutdown.wait() => return Err(ListCacheError::Cancelled),
            };
            pages += 1;

            for entry in &page.entries {
                writer
                    .write_all(encode_record(entry).as_bytes())
                    .await
                    .map_err(write_err)?;
                entries += 1;
            }

            if page.is_last() {
                break;
            }
            marker = page.next_marker;
        }

        writer.flush().await.map_err(write_err)?;
        let file = writer.into_inner();
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tracing::debug!(
            container = %self.container(),
            staging = %staging.display(),
            pages = pages,
            entries = entries,
            "Staging snapshot written"
        );
        Ok(entries)
    }

    /// Best-effort removal of a staging file that will never be promoted
    async fn discard_staging(&self, staging: &Path) {
        match self.fs.remove(staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                container = %self.container(),
                staging = %staging.display(),
                error = %e,
                "Could not remove abandoned staging snapshot"
            ),
        }
    }

    /// Make `staging` the current snapshot.
    ///
    /// Returns `Ok(None)` on success, `Ok(Some(reason))` when the promotion
    /// failed but rollback restored a current snapshot.
    async fn promote(&self, staging: &Path) -> Result<Option<String>> {
        let current = self.paths.current();
        let previous = self.paths.previous();

        if self.exists(&current).await? {
            self.rename(&current, &previous).await?;
        }

        let promotion_err = match self.rename(staging, &current).await {
            Ok(()) => return Ok(None),
            Err(err) => err,
        };

        match self.rollback().await {
            Ok(()) => {
                tracing::warn!(
                    container = %self.container(),
                    error = %promotion_err,
                    "Rolled back to previous snapshot after failed promotion"
                );
                Ok(Some(promotion_err.to_string()))
            }
            Err(rollback_err) => {
                tracing::error!(
                    container = %self.container(),
                    promotion_error = %promotion_err,
                    rollback_error = %rollback_err,
                    "Promotion and rollback both failed; no current snapshot"
                );
                Err(ListCacheError::Unrecoverable {
                    container: self.container().to_string(),
                    reason: format!(
                        "promotion failed ({}); rollback failed ({})",
                        promotion_err, rollback_err
                    ),
                })
            }
        }
    }

    /// Restore *previous* as *current* if *current* went missing.
    ///
    /// Succeeds only if a current snapshot exists afterwards.
    async fn rollback(&self) -> Result<()> {
        let current = self.paths.current();
        let previous = self.paths.previous();

        if self.exists(&current).await? {
            return Ok(());
        }
        if !self.exists(&previous).await? {
            return Err(ListCacheError::Unavailable(self.container().to_string()));
        }
        self.rename(&previous, &current).await
    }

    /// Delete *previous*. Failures are logged and otherwise ignored.
    async fn prune(&self) {
        let previous = self.paths.previous();
        let exists = match self.exists(&previous).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::warn!(container = %self.container(), error = %err, "Could not stat previous snapshot");
                return;
            }
        };
        if !exists {
            return;
        }

        let removed = self
            .retry()
            .run(FileOp::Delete, &previous, &self.shutdown, || {
                self.fs.remove(&previous)
            })
            .await;
        if let Err(err) = removed {
            tracing::warn!(
                container = %self.container(),
                path = %previous.display(),
                error = %err,
                "Could not delete previous snapshot; will retry next cycle"
            );
        }
    }
}
