//! Process-wide registry of cached containers
//!
//! Listing requests for a container first consult the registry: a hit means
//! the listing is served from that container's local snapshot. A cached
//! container stays cached for the life of the process.

use crate::cache::ContainerCache;
use crate::config::{Config, ContainerConfig};
use crate::error::{FileOp, ListCacheError, Result};
use crate::retry::FileRetryPolicy;
use crate::scheduler::RefreshScheduler;
use crate::shutdown::Shutdown;
use crate::snapshot::{SnapshotFs, TokioSnapshotFs};
use crate::source::ListingSource;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// A registry entry: claimed while its initial refresh runs, then ready
#[derive(Debug)]
enum Slot {
    Initializing,
    Ready(Arc<ContainerCache>),
}

impl Slot {
    fn ready(&self) -> Option<&Arc<ContainerCache>> {
        match self {
            Slot::Ready(cache) => Some(cache),
            Slot::Initializing => None,
        }
    }
}

/// Container name → cache
#[derive(Debug, Default)]
pub struct Registry {
    slots: RwLock<HashMap<String, Slot>>,
}

/// Exclusive claim on a container name.
///
/// Dropped without [`commit`](Reservation::commit), the claim is released so
/// the name can be cached again.
#[must_use]
pub struct Reservation<'a> {
    registry: &'a Registry,
    name: String,
    committed: bool,
}

impl Reservation<'_> {
    pub fn container(&self) -> &str {
        &self.name
    }

    /// Publish `cache` under the reserved name
    pub fn commit(mut self, cache: Arc<ContainerCache>) -> Arc<ContainerCache> {
        self.registry
            .slots
            .write()
            .insert(self.name.clone(), Slot::Ready(cache.clone()));
        self.committed = true;
        cache
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.registry.slots.write();
        if matches!(slots.get(&self.name), Some(Slot::Initializing)) {
            slots.remove(&self.name);
        }
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::new)
    }

    /// Claim `container` before building its cache. Fails if the name is
    /// cached or another initialization holds it.
    pub fn reserve(&self, container: &str) -> Result<Reservation<'_>> {
        let mut slots = self.slots.write();
        match slots.get(container) {
            Some(Slot::Ready(_)) => Err(ListCacheError::Config(format!(
                "Container '{}' is already cached",
                container
            ))),
            Some(Slot::Initializing) => Err(ListCacheError::Config(format!(
                "Container '{}' is already being initialized",
                container
            ))),
            None => {
                slots.insert(container.to_string(), Slot::Initializing);
                Ok(Reservation {
                    registry: self,
                    name: container.to_string(),
                    committed: false,
                })
            }
        }
    }

    /// Add a cache. Registering the same container twice is a config error.
    pub fn register(&self, cache: Arc<ContainerCache>) -> Result<Arc<ContainerCache>> {
        let reservation = self.reserve(cache.container())?;
        Ok(reservation.commit(cache))
    }

    pub fn lookup(&self, container: &str) -> Result<Arc<ContainerCache>> {
        self.slots
            .read()
            .get(container)
            .and_then(Slot::ready)
            .cloned()
            .ok_or_else(|| ListCacheError::NotFound(container.to_string()))
    }

    pub fn contains(&self, container: &str) -> bool {
        self.slots
            .read()
            .get(container)
            .is_some_and(|slot| slot.ready().is_some())
    }

    pub fn is_initializing(&self, container: &str) -> bool {
        matches!(self.slots.read().get(container), Some(Slot::Initializing))
    }

    /// Names of all cached containers, sorted
    pub fn containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.ready().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| slot.ready().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a cache for one container: validate, run the initial refresh
/// synchronously, then register it.
///
/// The name is reserved up front and the cache is only published once a
/// current snapshot exists, so a registered container can always serve
/// queries unless a later cycle hits an unrecoverable promotion failure.
/// Staging files orphaned by an earlier process are removed first.
pub async fn create_container_cache(
    registry: &Registry,
    config: &ContainerConfig,
    retry: FileRetryPolicy,
    source: Arc<dyn ListingSource>,
    shutdown: Shutdown,
) -> Result<Arc<ContainerCache>> {
    create_container_cache_with_fs(
        registry,
        config,
        retry,
        source,
        Arc::new(TokioSnapshotFs::new()),
        shutdown,
    )
    .await
}

pub async fn create_container_cache_with_fs(
    registry: &Registry,
    config: &ContainerConfig,
    retry: FileRetryPolicy,
    source: Arc<dyn ListingSource>,
    fs: Arc<dyn SnapshotFs>,
    shutdown: Shutdown,
) -> Result<Arc<ContainerCache>> {
    let cache_config = config.to_cache_config(retry)?;
    // Held across the initial refresh so a second create for the same name
    // fails fast instead of fetching the listing again
    let reservation = registry.reserve(&cache_config.container)?;

    fs.create_dir_all(&cache_config.storage_path)
        .await
        .map_err(|e| ListCacheError::io(FileOp::Create, &cache_config.storage_path, e))?;

    let cache = Arc::new(ContainerCache::with_backend(cache_config, source, fs, shutdown));
    cache.sweep_orphaned_staging().await;
    let outcome = cache.refresh_once().await?;
    tracing::info!(
        container = %cache.container(),
        storage_path = %cache.paths().dir().display(),
        outcome = ?outcome,
        "Container cache initialized"
    );

    Ok(reservation.commit(cache))
}

async fn setup_container<F, Fut>(
    registry: &Registry,
    container: &ContainerConfig,
    make_source: &F,
    retry: FileRetryPolicy,
    shutdown: Shutdown,
) -> Result<Arc<ContainerCache>>
where
    F: Fn(ContainerConfig) -> Fut,
    Fut: Future<Output = Result<Arc<dyn ListingSource>>>,
{
    // Field errors are reported before any remote client is built
    container.validate()?;
    let source = make_source(container.clone()).await?;
    create_container_cache(registry, container, retry, source, shutdown).await
}

/// Result of [`init_cached_containers`]
#[derive(Debug, Default)]
pub struct InitSummary {
    /// Containers that were cached and are being refreshed
    pub registered: Vec<String>,
    /// Containers that could not be cached, with the reason
    pub failed: Vec<(String, ListCacheError)>,
    /// One scheduler task per registered container
    pub tasks: Vec<JoinHandle<()>>,
}

impl InitSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Set up every container named in `config`.
///
/// Containers are initialized concurrently. A container that fails (bad
/// config, unreachable source, I/O error) is logged and reported in
/// [`InitSummary::failed`]; the others still proceed.
pub async fn init_cached_containers<F, Fut>(
    registry: &Registry,
    config: &Config,
    make_source: F,
    shutdown: Shutdown,
) -> InitSummary
where
    F: Fn(ContainerConfig) -> Fut,
    Fut: Future<Output = Result<Arc<dyn ListingSource>>>,
{
    let retry = config.retry_policy();
    let scheduler = RefreshScheduler::new(config.tick());

    let setups = config.containers.iter().map(|container| {
        setup_container(registry, container, &make_source, retry, shutdown.clone())
    });
    let results = join_all(setups).await;

    let mut summary = InitSummary::default();
    for (container, result) in config.containers.iter().zip(results) {
        match result {
            Ok(cache) => {
                summary
                    .tasks
                    .push(scheduler.spawn(cache.clone(), shutdown.clone()));
                summary.registered.push(cache.container().to_string());
            }
            Err(err) => {
                tracing::error!(
                    container = %container.name,
                    error = %err,
                    "Failed to initialize container cache"
                );
                summary.failed.push((container.name.clone(), err));
            }
        }
    }

    tracing::info!(
        registered = summary.registered.len(),
        failed = summary.failed.len(),
        "Cached container initialization complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{InMemoryListingSource, ListingPage, RemoteEntry};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::{Notify, Semaphore};

    fn container_config(name: &str, dir: &Path) -> ContainerConfig {
        ContainerConfig {
            name: name.to_string(),
            refresh_interval_minutes: 5.0,
            storage_path: Some(dir.to_path_buf()),
            account_name: "id".to_string(),
            account_key: "secret".to_string(),
            region: None,
            endpoint: None,
        }
    }

    fn source(names: &[&str]) -> Arc<dyn ListingSource> {
        let entries = names
            .iter()
            .map(|n| RemoteEntry::new(*n, 1, Utc::now()))
            .collect();
        Arc::new(InMemoryListingSource::new(entries, 10))
    }

    fn fast_retry() -> FileRetryPolicy {
        FileRetryPolicy::new(1, Duration::from_millis(1))
    }

    /// Signals when the first page is requested, then waits for a permit
    struct GatedSource {
        inner: InMemoryListingSource,
        started: Arc<Notify>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ListingSource for GatedSource {
        async fn list_page(&self, container: &str, marker: Option<&str>) -> Result<ListingPage> {
            self.started.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ListCacheError::Remote(e.to_string()))?;
            permit.forget();
            self.inner.list_page(container, marker).await
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ListingSource for FailingSource {
        async fn list_page(&self, _container: &str, _marker: Option<&str>) -> Result<ListingPage> {
            Err(ListCacheError::Remote("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_create_registers_after_initial_refresh() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();

        let cache = create_container_cache(
            &registry,
            &container_config("photos", dir.path()),
            fast_retry(),
            source(&["a", "b"]),
            Shutdown::never(),
        )
        .await
        .unwrap();

        assert!(cache.paths().current().exists());
        assert!(cache.last_refresh_at().is_some());
        let found = registry.lookup("photos").unwrap();
        assert!(Arc::ptr_eq(&found, &cache));
        assert_eq!(registry.containers(), vec!["photos"]);
    }

    #[tokio::test]
    async fn test_create_creates_storage_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let registry = Registry::new();

        create_container_cache(
            &registry,
            &container_config("photos", &nested),
            fast_retry(),
            source(&["a"]),
            Shutdown::never(),
        )
        .await
        .unwrap();

        assert!(nested.join("cache-photos.csv").exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_not_registered() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let mut config = container_config("photos", dir.path());
        config.refresh_interval_minutes = 0.0;

        let err = create_container_cache(
            &registry,
            &config,
            fast_retry(),
            source(&["a"]),
            Shutdown::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ListCacheError::Config(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let config = container_config("photos", dir.path());

        create_container_cache(&registry, &config, fast_retry(), source(&["a"]), Shutdown::never())
            .await
            .unwrap();
        let err = create_container_cache(
            &registry,
            &config,
            fast_retry(),
            source(&["b"]),
            Shutdown::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ListCacheError::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_missing_is_not_found() {
        let registry = Registry::new();
        let err = registry.lookup("nope").unwrap_err();
        assert!(matches!(err, ListCacheError::NotFound(ref c) if c == "nope"));
    }

    #[tokio::test]
    async fn test_init_continues_past_failing_container() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let mut bad = container_config("broken", dir.path());
        bad.account_key.clear();
        let config = Config {
            containers: vec![
                container_config("photos", dir.path()),
                bad,
                container_config("logs", dir.path()),
            ],
            retry: Default::default(),
            tick_seconds: 60,
        };
        let (handle, shutdown) = crate::shutdown::ShutdownHandle::new();

        let summary = init_cached_containers(
            &registry,
            &config,
            |c: ContainerConfig| async move {
                Ok::<_, ListCacheError>(source(&[c.name.as_str()]))
            },
            shutdown,
        )
        .await;

        assert_eq!(summary.registered, vec!["photos", "logs"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "broken");
        assert!(!summary.is_complete());
        assert_eq!(registry.containers(), vec!["logs", "photos"]);
        assert_eq!(summary.tasks.len(), 2);

        handle.trigger();
        for task in summary.tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_init_reports_source_factory_failure() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let config = Config {
            containers: vec![container_config("photos", dir.path())],
            retry: Default::default(),
            tick_seconds: 60,
        };

        let summary = init_cached_containers(
            &registry,
            &config,
            |_c: ContainerConfig| async move {
                Err::<Arc<dyn ListingSource>, _>(ListCacheError::Remote(
                    "no credentials".to_string(),
                ))
            },
            Shutdown::never(),
        )
        .await;

        assert!(summary.registered.is_empty());
        assert!(matches!(summary.failed[0].1, ListCacheError::Remote(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_registration_of_distinct_containers() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let path = dir.path().to_path_buf();
            tasks.push(tokio::spawn(async move {
                create_container_cache(
                    &registry,
                    &container_config(&format!("c{}", i), &path),
                    fast_retry(),
                    source(&["x"]),
                    Shutdown::never(),
                )
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(registry.len(), 8);
        for i in 0..8 {
            assert!(registry.lookup(&format!("c{}", i)).is_ok());
        }
    }

    #[tokio::test]
    async fn test_concurrent_create_of_same_container_runs_one_refresh() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new());
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Semaphore::new(0));

        let first = {
            let registry = registry.clone();
            let config = container_config("photos", dir.path());
            let source = Arc::new(GatedSource {
                inner: InMemoryListingSource::new(
                    vec![RemoteEntry::new("from-first", 1, Utc::now())],
                    10,
                ),
                started: started.clone(),
                gate: gate.clone(),
            });
            tokio::spawn(async move {
                create_container_cache(&registry, &config, fast_retry(), source, Shutdown::never())
                    .await
            })
        };
        started.notified().await;
        assert!(registry.is_initializing("photos"));
        assert!(!registry.contains("photos"));

        let second_source =
            InMemoryListingSource::new(vec![RemoteEntry::new("from-second", 1, Utc::now())], 10);
        let err = create_container_cache(
            &registry,
            &container_config("photos", dir.path()),
            fast_retry(),
            Arc::new(second_source.clone()),
            Shutdown::never(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ListCacheError::Config(ref m) if m.contains("being initialized")));
        assert_eq!(second_source.pages_served(), 0);

        gate.add_permits(1);
        let cache = first.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&registry.lookup("photos").unwrap(), &cache));
        let names: Vec<String> = cache
            .query(&crate::cache::ListingQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["from-first"]);
    }

    #[tokio::test]
    async fn test_failed_create_releases_the_name() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new();
        let config = container_config("photos", dir.path());

        let err = create_container_cache(
            &registry,
            &config,
            fast_retry(),
            Arc::new(FailingSource),
            Shutdown::never(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ListCacheError::Remote(_)));
        assert!(!registry.is_initializing("photos"));
        assert!(registry.is_empty());

        create_container_cache(&registry, &config, fast_retry(), source(&["a"]), Shutdown::never())
            .await
            .unwrap();
        assert_eq!(registry.containers(), vec!["photos"]);
    }

    #[tokio::test]
    async fn test_create_removes_orphaned_staging_files() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("cache-photos-20240101000000.csv");
        std::fs::write(&stale, "partial").unwrap();
        let registry = Registry::new();

        create_container_cache(
            &registry,
            &container_config("photos", dir.path()),
            fast_retry(),
            source(&["a"]),
            Shutdown::never(),
        )
        .await
        .unwrap();

        assert!(!stale.exists());
        assert!(dir.path().join("cache-photos.csv").exists());
    }

    #[test]
    fn test_reservation_dropped_without_commit_is_released() {
        let registry = Registry::new();
        {
            let reservation = registry.reserve("photos").unwrap();
            assert_eq!(reservation.container(), "photos");
            assert!(registry.is_initializing("photos"));
            assert!(registry.reserve("photos").is_err());
            assert!(matches!(registry.lookup("photos"), Err(ListCacheError::NotFound(_))));
            assert!(registry.containers().is_empty());
        }
        assert!(!registry.is_initializing("photos"));
        assert!(registry.reserve("photos").is_ok());
    }
}
