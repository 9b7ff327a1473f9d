//! On-disk snapshot files
//!
//! Each cached container owns three files under its storage directory:
//!
//! - **current** `cache-<container>.csv` - the snapshot served to readers
//! - **staging** `cache-<container>-<YYYYMMDDhhmmss>.csv` - written by an
//!   in-progress refresh
//! - **previous** `cache-<container>-old.csv` - the snapshot demoted by the
//!   last promotion, kept only until pruning
//!
//! Writers never touch *current* in place; a finished staging file replaces it
//! with a rename. Filesystem access goes through [`SnapshotFs`] so that fault
//! injection is possible in tests.

pub mod backend;
mod codec;
mod paths;
pub mod tokio_backend;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use self::backend::SnapshotFs;
pub use self::codec::{decode_record, encode_record, split_fields, SnapshotRecord};
pub use self::paths::SnapshotPaths;
pub use self::tokio_backend::TokioSnapshotFs;
