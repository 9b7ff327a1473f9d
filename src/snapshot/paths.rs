//! Snapshot file naming

use crate::constants::{
    PREVIOUS_SNAPSHOT_SUFFIX, SNAPSHOT_FILE_EXTENSION, SNAPSHOT_FILE_PREFIX,
    STAGING_SUFFIX_FORMAT,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// File locations for one container's snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    dir: PathBuf,
    container: String,
}

impl SnapshotPaths {
    pub fn new(dir: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            container: container.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `cache-<container>.csv`
    pub fn current(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            SNAPSHOT_FILE_PREFIX, self.container, SNAPSHOT_FILE_EXTENSION
        ))
    }

    /// `cache-<container>-<YYYYMMDDhhmmss>.csv` for a refresh started at `started_at`
    pub fn staging(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "{}{}-{}.{}",
            SNAPSHOT_FILE_PREFIX,
            self.container,
            started_at.format(STAGING_SUFFIX_FORMAT),
            SNAPSHOT_FILE_EXTENSION
        ))
    }

    /// `cache-<container>-old.csv`
    pub fn previous(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}-{}.{}",
            SNAPSHOT_FILE_PREFIX, self.container, PREVIOUS_SNAPSHOT_SUFFIX, SNAPSHOT_FILE_EXTENSION
        ))
    }

    /// Whether `path` names a staging snapshot of this container, from any
    /// start time
    pub fn is_staging(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let stamp = name
            .strip_prefix(SNAPSHOT_FILE_PREFIX)
            .and_then(|rest| rest.strip_prefix(self.container.as_str()))
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(SNAPSHOT_FILE_EXTENSION))
            .and_then(|rest| rest.strip_suffix('.'));
        // YYYYMMDDhhmmss
        matches!(stamp, Some(s) if s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit()))
    }
}
