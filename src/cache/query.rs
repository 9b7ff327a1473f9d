//! Query and pagination over the current snapshot
//!
//! Readers only ever touch the immutable snapshot location and the file on
//! disk. A reader that opened *current* keeps reading the same file even if a
//! promotion renames a newer snapshot over it, so every query sees one
//! complete snapshot. While *current* is absent mid-promotion, *previous* is
//! served instead.
//!
//! Pagination contract: when a query returns exactly `limit` entries, call
//! again with `cursor` set to the last returned name. A shorter page (or an
//! empty one) means the end of the data.

use crate::error::{FileOp, ListCacheError, Result};
use crate::retry::FileRetryPolicy;
use crate::shutdown::Shutdown;
use crate::snapshot::{decode_record, split_fields, SnapshotFs, SnapshotPaths, SnapshotRecord};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Directory-entry record handed to the listing façade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size_bytes: i64,
    pub is_dir: bool,
    pub modified: DateTime<Utc>,
}

impl From<SnapshotRecord> for DirEntry {
    fn from(record: SnapshotRecord) -> Self {
        Self {
            name: record.name,
            size_bytes: record.size_bytes,
            is_dir: false,
            modified: record.last_modified,
        }
    }
}

/// Anchored wildcard filter: `*` matches any run of characters, `?` exactly one
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push_str("^(?s:");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                _ => expr.push_str(&regex::escape(c.encode_utf8(&mut buf))),
            }
        }
        expr.push_str(")$");

        let regex = Regex::new(&expr).map_err(|e| {
            ListCacheError::Config(format!("invalid wildcard pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Filters and page size for one read of the snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    /// Only names starting with this prefix (ignored when empty)
    pub prefix: String,
    /// Only names strictly greater than this one (ignored when empty)
    pub cursor: String,
    /// Maximum number of results; zero or negative means unbounded
    pub limit: i64,
    /// Optional wildcard filter applied to the full name
    pub pattern: Option<WildcardPattern>,
}

impl ListingQuery {
    pub fn new(prefix: impl Into<String>, cursor: impl Into<String>, limit: i64) -> Self {
        Self {
            prefix: prefix.into(),
            cursor: cursor.into(),
            limit,
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: WildcardPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Query for the page following `last_name`
    pub fn next_page(&self, last_name: &str) -> Self {
        Self {
            cursor: last_name.to_string(),
            ..self.clone()
        }
    }

    fn accepts(&self, name: &str) -> bool {
        if !self.prefix.is_empty() && !name.starts_with(&self.prefix) {
            return false;
        }
        if !self.cursor.is_empty() && name <= self.cursor.as_str() {
            return false;
        }
        match &self.pattern {
            Some(pattern) => pattern.matches(name),
            None => true,
        }
    }

    fn is_full(&self, collected: usize) -> bool {
        self.limit > 0 && collected as u64 >= self.limit as u64
    }
}

/// Read-only view of one container's current snapshot
#[derive(Clone)]
pub struct SnapshotReader {
    container: String,
    paths: SnapshotPaths,
    fs: Arc<dyn SnapshotFs>,
    retry: FileRetryPolicy,
    shutdown: Shutdown,
}

impl SnapshotReader {
    pub fn new(
        container: impl Into<String>,
        paths: SnapshotPaths,
        fs: Arc<dyn SnapshotFs>,
        retry: FileRetryPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            container: container.into(),
            paths,
            fs,
            retry,
            shutdown,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Whether a snapshot can be served: *current*, or *previous* while a
    /// promotion is between its two renames
    pub async fn is_available(&self) -> Result<bool> {
        for path in [self.paths.current(), self.paths.previous()] {
            let exists = self
                .fs
                .exists(&path)
                .await
                .map_err(|e| ListCacheError::io(FileOp::Stat, &path, e))?;
            if exists {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run `query` against the current snapshot.
    ///
    /// Fails with `Unavailable` when there is no snapshot at all and with
    /// `CorruptSnapshot` on the first record that does not parse.
    pub async fn query(&self, query: &ListingQuery) -> Result<Vec<DirEntry>> {
        let result = self.read_current(query).await;
        if let Err(err) = &result {
            tracing::error!(
                container = %self.container,
                error = %err,
                "Snapshot query failed"
            );
        }
        result
    }

    /// Open `path`, or `None` if it does not exist
    async fn open_if_exists(&self, path: &Path) -> Result<Option<File>> {
        self.retry
            .run(FileOp::Open, path, &self.shutdown, || async move {
                match self.fs.open(path).await {
                    Ok(file) => Ok(Some(file)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|e| ListCacheError::io(FileOp::Open, path, e))
    }

    /// Open the newest complete snapshot.
    ///
    /// Between the two promotion renames *current* is absent and *previous*
    /// holds the complete old snapshot. If *previous* is gone too, the second
    /// rename has landed, so *current* is tried once more.
    async fn open_snapshot(&self) -> Result<(PathBuf, File)> {
        let current = self.paths.current();
        let previous = self.paths.previous();

        for path in [&current, &previous, &current] {
            if let Some(file) = self.open_if_exists(path).await? {
                if *path == previous {
                    tracing::debug!(
                        container = %self.container,
                        "Serving previous snapshot during promotion"
                    );
                }
                return Ok((path.clone(), file));
            }
        }
        Err(ListCacheError::Unavailable(self.container.clone()))
    }

    async fn read_current(&self, query: &ListingQuery) -> Result<Vec<DirEntry>> {
        let (path, file) = self.open_snapshot().await?;

        let mut reader = BufReader::new(file);
        let mut results = Vec::new();
        let mut line = String::new();
        let mut record = String::new();
        let mut line_no = 0usize;
        let mut record_start = 0usize;

        while !query.is_full(results.len()) {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| ListCacheError::io(FileOp::Open, &path, e))?;
            if read == 0 {
                if !record.is_empty() {
                    return Err(ListCacheError::CorruptSnapshot {
                        line: record_start,
                        reason: "unterminated quoted field".to_string(),
                    });
                }
                break;
            }
            line_no += 1;

            let text = line.trim_end_matches('\n').trim_end_matches('\r');
            if record.is_empty() {
                if text.is_empty() {
                    continue;
                }
                record_start = line_no;
                record.push_str(text);
            } else {
                record.push('\n');
                record.push_str(text);
            }

            let fields = match split_fields(&record) {
                Ok(Some(fields)) => fields,
                Ok(None) => continue,
                Err(reason) => {
                    return Err(ListCacheError::CorruptSnapshot {
                        line: record_start,
                        reason,
                    })
                }
            };
            record.clear();

            let entry = decode_record(&fields).map_err(|reason| {
                ListCacheError::CorruptSnapshot {
                    line: record_start,
                    reason,
                }
            })?;

            if query.accepts(&entry.name) {
                results.push(DirEntry::from(entry));
            }
        }

        tracing::debug!(
            container = %self.container,
            prefix = %query.prefix,
            cursor = %query.cursor,
            limit = query.limit,
            returned = results.len(),
            "Served listing from snapshot"
        );
        Ok(results)
    }
}
