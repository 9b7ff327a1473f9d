// Error types module

use std::path::PathBuf;
use thiserror::Error;

/// Local file operation on a snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Create,
    Open,
    Write,
    Rename,
    Delete,
    Stat,
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileOp::Create => "create",
            FileOp::Open => "open",
            FileOp::Write => "write",
            FileOp::Rename => "rename",
            FileOp::Delete => "delete",
            FileOp::Stat => "stat",
        };
        f.write_str(name)
    }
}

/// Centralized error type for the listing cache
///
/// Configuration errors are fatal to a single container's setup. I/O and
/// remote errors fail one refresh cycle and are logged by the scheduler.
/// Query errors are returned to the caller of that query.
#[derive(Error, Debug)]
pub enum ListCacheError {
    /// Bad or missing initialization fields
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local snapshot file operation failed (after all retry attempts, for
    /// the retried operations)
    #[error("I/O error during {op} of {}: {source}", .path.display())]
    Io {
        op: FileOp,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote listing source failed while fetching a page
    #[error("Remote listing error: {0}")]
    Remote(String),

    /// Promotion failed and rollback could not restore a current snapshot
    #[error("Unrecoverable cache state for container '{container}': {reason}")]
    Unrecoverable { container: String, reason: String },

    /// A snapshot record could not be parsed
    #[error("Corrupt snapshot at line {line}: {reason}")]
    CorruptSnapshot { line: usize, reason: String },

    /// No cache is registered for the requested container
    #[error("Container '{0}' is not cached")]
    NotFound(String),

    /// The container is cached but has no current snapshot on disk
    #[error("Cache unavailable for container '{0}': no current snapshot")]
    Unavailable(String),

    /// The operation was interrupted by shutdown
    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

impl ListCacheError {
    pub fn io(op: FileOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ListCacheError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ListCacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ListCacheError::Config("refresh interval must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: refresh interval must be > 0"
        );

        let err = ListCacheError::io(
            FileOp::Rename,
            "/tmp/cache-photos.csv",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "I/O error during rename of /tmp/cache-photos.csv: denied"
        );

        let err = ListCacheError::CorruptSnapshot {
            line: 3,
            reason: "invalid size 'abc'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt snapshot at line 3: invalid size 'abc'"
        );

        let err = ListCacheError::Unavailable("photos".to_string());
        assert!(err.to_string().contains("no current snapshot"));
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error;

        let err = ListCacheError::io(
            FileOp::Create,
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_file_op_display() {
        assert_eq!(FileOp::Create.to_string(), "create");
        assert_eq!(FileOp::Open.to_string(), "open");
        assert_eq!(FileOp::Rename.to_string(), "rename");
        assert_eq!(FileOp::Delete.to_string(), "delete");
        assert_eq!(FileOp::Stat.to_string(), "stat");
    }
}
