use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::db::Storage;

pub const ONGOING_ISSUANCE_BATCH: &str = "ongoing-issuance";
pub const CHECK_FOR_CODES_BATCH: &str = "check-for-codes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Another run (possibly on another instance) happened too recently.
    Skipped,
    Succeeded,
    Failed,
}

/// Best-effort cross-instance exclusion for periodic jobs.
///
/// The last-run time is read and then overwritten with `now` before the job
/// starts. Two instances passing the check between those two statements will
/// both run; this is accepted and not a lock.
pub struct BatchTimingGuard {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl BatchTimingGuard {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub async fn try_run<F, Fut>(
        &self,
        name: &str,
        min_interval: Duration,
        job: F,
    ) -> anyhow::Result<BatchOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let now = self.clock.now();
        let min_interval = chrono::Duration::from_std(min_interval)?;

        if let Some(last_run) = self.storage.last_run(name).await? {
            let elapsed = now - last_run;
            if elapsed < min_interval {
                tracing::debug!(
                    "Not enough time elapsed since last run of {name} ({}s < {}s)",
                    elapsed.num_seconds(),
                    min_interval.num_seconds()
                );
                return Ok(BatchOutcome::Skipped);
            }
        }

        self.storage.set_last_run(name, now).await?;

        match job().await {
            Ok(()) => Ok(BatchOutcome::Succeeded),
            Err(e) => {
                tracing::error!("Batch {name} failed: {e:#}");
                Ok(BatchOutcome::Failed)
            }
        }
    }
}
