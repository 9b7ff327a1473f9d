//! Remote listing sources
//!
//! A listing source supplies a container's entries one page at a time using a
//! continuation-marker protocol: the first request carries no marker, every
//! response carries the marker for the next page, and a response without a
//! marker ends the listing.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;
mod s3;

pub use self::memory::InMemoryListingSource;
pub use self::s3::S3ListingSource;

/// Metadata of one remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size_bytes: i64,
    pub last_modified: DateTime<Utc>,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, size_bytes: i64, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            last_modified,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub entries: Vec<RemoteEntry>,
    /// Marker for the next page; `None` once the listing is complete
    pub next_marker: Option<String>,
}

impl ListingPage {
    pub fn is_last(&self) -> bool {
        self.next_marker.is_none()
    }
}

/// Abstraction over the remote object store's listing API
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the page of `container` starting at `marker` (`None` = first page).
    ///
    /// Errors are reported as `ListCacheError::Remote` and are not retried by
    /// the cache.
    async fn list_page(&self, container: &str, marker: Option<&str>) -> Result<ListingPage>;
}
