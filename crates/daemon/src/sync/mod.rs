//! Change synchronization
//!
//! [`ChangeSyncEngine`] applies the remote change feed to the object store;
//! [`ChangeSyncTask`] runs it on the scheduler and backs off after failures.

mod engine;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

pub use engine::{ChangeSyncEngine, SyncError, SyncReport, SyncSnapshot, SyncStatus};

use crate::scheduler::PeriodicTask;

/// Longest wait between retries, in intervals
pub const MAX_BACKOFF_INTERVALS: u32 = 8;

/// Tick skipping after consecutive failures: wait 1, 2, 4 … intervals,
/// capped at [`MAX_BACKOFF_INTERVALS`].
#[derive(Debug, Default)]
struct Backoff {
    failures: u32,
    skip_remaining: u32,
}

impl Backoff {
    /// Consume a tick; `false` means skip this one.
    fn should_run(&mut self) -> bool {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            return false;
        }
        true
    }

    fn record_success(&mut self) {
        self.failures = 0;
        self.skip_remaining = 0;
    }

    fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        let wait = 1u32
            .checked_shl(self.failures - 1)
            .unwrap_or(MAX_BACKOFF_INTERVALS)
            .min(MAX_BACKOFF_INTERVALS);
        self.skip_remaining = wait - 1;
    }
}

/// Runs the sync engine on the scheduler.
pub struct ChangeSyncTask {
    engine: Arc<ChangeSyncEngine>,
    interval: Duration,
    backoff: Mutex<Backoff>,
}

impl ChangeSyncTask {
    pub fn new(engine: Arc<ChangeSyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            backoff: Mutex::new(Backoff::default()),
        }
    }
}

#[async_trait]
impl PeriodicTask for ChangeSyncTask {
    fn name(&self) -> &'static str {
        "change-sync"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) {
        if !self.backoff.lock().should_run() {
            debug!("backing off after failed sync");
            return;
        }

        match self.engine.run_once().await {
            Ok(_) => self.backoff.lock().record_success(),
            Err(e) => {
                let mut backoff = self.backoff.lock();
                backoff.record_failure();
                if e.is_auth() {
                    error!(error = %e, "remote rejected our credential; run `nimbus auth`");
                } else {
                    warn!(
                        error = %e,
                        failures = backoff.failures,
                        skip_ticks = backoff.skip_remaining,
                        "sync failed, will retry"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped_after(backoff: &mut Backoff) -> u32 {
        let mut skipped = 0;
        while !backoff.should_run() {
            skipped += 1;
        }
        skipped
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::default();
        let mut waits = vec![];
        for _ in 0..6 {
            backoff.record_failure();
            waits.push(skipped_after(&mut backoff) + 1);
        }
        assert_eq!(waits, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut backoff = Backoff::default();
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert!(backoff.should_run());

        backoff.record_failure();
        assert_eq!(skipped_after(&mut backoff), 0);
    }
}
