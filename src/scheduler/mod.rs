//! Periodic refresh scheduling
//!
//! One background task per cached container wakes up every tick and decides
//! whether a refresh cycle is due. Ticks that land while a cycle is still
//! running are no-ops, so cycles of one container never overlap.

use crate::cache::{ContainerCache, RefreshOutcome};
use crate::constants::DEFAULT_TICK_SECS;
use crate::shutdown::Shutdown;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a single scheduler tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A refresh cycle was already running
    InFlight,
    /// The refresh interval has not elapsed yet
    NotDue,
    /// A refresh cycle ran and completed
    Refreshed(RefreshOutcome),
    /// A refresh cycle ran and failed; the error was logged
    Failed(String),
}

/// Evaluate one tick for `cache` at time `now`
pub async fn tick_once(cache: &ContainerCache, now: DateTime<Utc>) -> TickOutcome {
    if cache.is_refreshing() {
        tracing::debug!(container = %cache.container(), "Refresh in flight, skipping tick");
        return TickOutcome::InFlight;
    }
    if !cache.is_refresh_due(now) {
        return TickOutcome::NotDue;
    }

    match cache.refresh_once().await {
        Ok(RefreshOutcome::AlreadyRefreshing) => TickOutcome::InFlight,
        Ok(outcome) => TickOutcome::Refreshed(outcome),
        Err(err) => {
            tracing::error!(
                container = %cache.container(),
                error = %err,
                "Scheduled refresh failed"
            );
            TickOutcome::Failed(err.to_string())
        }
    }
}

/// Spawns the per-container refresh loop
#[derive(Debug, Clone, Copy)]
pub struct RefreshScheduler {
    tick: Duration,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TICK_SECS))
    }
}

impl RefreshScheduler {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Start the refresh loop for `cache`. The task ends when `shutdown`
    /// fires; a cycle in progress at that point is cancelled by the cache
    /// itself.
    pub fn spawn(&self, cache: Arc<ContainerCache>, mut shutdown: Shutdown) -> JoinHandle<()> {
        let tick = self.tick;

        tracing::info!(
            container = %cache.container(),
            tick_ms = tick.as_millis() as u64,
            refresh_interval_secs = cache.config().refresh_interval.as_secs(),
            "Started refresh scheduler"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; the initial refresh
            // already happened during setup
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = tick_once(&cache, Utc::now()).await;
                        tracing::trace!(container = %cache.container(), outcome = ?outcome, "Scheduler tick");
                    }
                    _ = shutdown.wait() => {
                        tracing::debug!(container = %cache.container(), "Refresh scheduler shutting down");
                        break;
                    }
                }
            }
        })
    }
}
