//! In-memory listing source (fixed entry set, configurable page size)

use super::{ListingPage, ListingSource, RemoteEntry};
use crate::error::{ListCacheError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listing source that serves a replaceable, name-sorted entry list.
///
/// Markers are decimal offsets into the list.
#[derive(Clone)]
pub struct InMemoryListingSource {
    entries: Arc<RwLock<Vec<RemoteEntry>>>,
    page_size: usize,
    pages_served: Arc<AtomicU64>,
}

impl InMemoryListingSource {
    pub fn new(entries: Vec<RemoteEntry>, page_size: usize) -> Self {
        let source = Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            page_size: page_size.max(1),
            pages_served: Arc::new(AtomicU64::new(0)),
        };
        source.set_entries(entries);
        source
    }

    /// Replace the served entries (sorted by name like a real object store)
    pub fn set_entries(&self, mut entries: Vec<RemoteEntry>) {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        *self.entries.write() = entries;
    }

    /// Number of pages served so far
    pub fn pages_served(&self) -> u64 {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for InMemoryListingSource {
    async fn list_page(&self, _container: &str, marker: Option<&str>) -> Result<ListingPage> {
        let start = match marker {
            None => 0,
            Some(m) => m
                .parse::<usize>()
                .map_err(|_| ListCacheError::Remote(format!("invalid marker '{}'", m)))?,
        };

        let entries = self.entries.read();
        let end = (start + self.page_size).min(entries.len());
        let page = entries.get(start..end).unwrap_or_default().to_vec();
        let next_marker = (end < entries.len()).then(|| end.to_string());

        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(ListingPage {
            entries: page,
            next_marker,
        })
    }
}
