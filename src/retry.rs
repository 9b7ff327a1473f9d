//! Bounded retry for local snapshot file operations
//!
//! Absorbs transient local storage faults (disk contention, a file briefly
//! held open by another process, momentary unavailability of a mount) by
//! repeating a single filesystem primitive a bounded number of times with a
//! fixed delay in between.
//!
//! ## What is retried
//!
//! - create (staging snapshot)
//! - open for read (current snapshot)
//! - rename (promotion and rollback)
//! - delete (pruning the previous snapshot)
//!
//! Errors from the remote listing source are never retried here: a failed
//! page fetch aborts the refresh cycle immediately.
//!
//! ## Fixed Delay
//!
//! - Attempt 1: immediate
//! - Attempt 2..=max_attempts: `delay` after the previous failure
//!
//! The wait between attempts listens for shutdown, so a process teardown
//! never blocks on a retry sleep.
//!
//! ## Configuration Example
//!
//! ```yaml
//! retry:
//!   max_attempts: 10
//!   delay_ms: 5000
//! ```

use crate::constants::{DEFAULT_FILE_OP_DELAY_MS, DEFAULT_FILE_OP_MAX_ATTEMPTS};
use crate::error::FileOp;
use crate::shutdown::Shutdown;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Retry policy for local file operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRetryPolicy {
    /// Maximum number of attempts (including the initial attempt), at least 1
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for FileRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_FILE_OP_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_FILE_OP_DELAY_MS),
        }
    }
}

impl FileRetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `operation` until it succeeds or attempts are exhausted.
    ///
    /// Each failed attempt is logged. Returns the first success, or the last
    /// observed error once `max_attempts` attempts have failed or shutdown
    /// interrupted the wait before the next attempt.
    pub async fn run<T, F, Fut>(
        &self,
        op: FileOp,
        path: &Path,
        shutdown: &Shutdown,
        mut operation: F,
    ) -> std::io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            tracing::warn!(
                op = %op,
                path = %path.display(),
                attempt = attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "Snapshot file operation failed"
            );

            if attempt >= self.max_attempts {
                return Err(err);
            }

            let mut shutdown = shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.wait() => {
                    tracing::debug!(
                        op = %op,
                        path = %path.display(),
                        "Shutdown during file operation retry, giving up"
                    );
                    return Err(err);
                }
            }

            attempt += 1;
        }
    }
}
