// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

// =============================================================================
// Scheduler defaults
// =============================================================================

/// How often each container's refresh task wakes up to check whether a
/// refresh is due, in seconds
pub const DEFAULT_TICK_SECS: u64 = 60;

// =============================================================================
// File operation retry defaults
// =============================================================================

/// Total attempts for a local snapshot file operation (including the first)
pub const DEFAULT_FILE_OP_MAX_ATTEMPTS: u32 = 10;

/// Fixed delay between file operation attempts in milliseconds
pub const DEFAULT_FILE_OP_DELAY_MS: u64 = 5000;

// =============================================================================
// Snapshot file format
// =============================================================================

/// Timestamp format of the `lastModified` field in a snapshot record
pub const SNAPSHOT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Timestamp suffix of a staging snapshot file name
pub const STAGING_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// Prefix shared by every snapshot file name
pub const SNAPSHOT_FILE_PREFIX: &str = "cache-";

/// Extension shared by every snapshot file name
pub const SNAPSHOT_FILE_EXTENSION: &str = "csv";

/// Suffix of the previous (demoted) snapshot file name
pub const PREVIOUS_SNAPSHOT_SUFFIX: &str = "old";
