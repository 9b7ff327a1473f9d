// Listcache: local snapshot cache for remote container listings

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod snapshot;
pub mod source;

pub use cache::{ContainerCache, DirEntry, ListingQuery, RefreshOutcome, SnapshotReader};
pub use error::{ListCacheError, Result};
pub use registry::Registry;
