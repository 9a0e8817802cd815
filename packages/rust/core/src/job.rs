//! The queue drain job.
//!
//! One [`ActionJob::run`] is one cycle:
//!
//! 1. heartbeat, then fetch up to [`BATCH_SIZE`] entries (empty: stop, idle)
//! 2. dispatch every entry in order, a heartbeat before each
//! 3. remove every handled entry in order, a heartbeat before each
//! 4. request another run of [`ACTION_JOB`]
//!
//! Dispatch and cleanup are two passes over the same fetched `Vec`; the queue
//! is never re-read mid-cycle. Delivery is at-least-once: a crash between a
//! remote call and the entry's removal replays the call on the next cycle,
//! which is safe because every remote operation is idempotent.
//!
//! A remote failure at entry *k* stops the dispatch pass. Entries before *k*
//! are still removed, entries from *k* on stay queued, the job is still
//! rescheduled, and the remote error is returned to the caller.

use std::sync::Arc;

use indexsync_client::IndexingClient;
use indexsync_shared::{IndexSyncError, QueueEntry, Result};
use tracing::{debug, info, instrument, warn};

use crate::dispatch::{Dispatch, Dispatcher};
use crate::queue::ActionQueue;
use crate::scheduler::{HeartbeatSink, JobScheduler};

/// Job identity used for scheduling and heartbeats.
pub const ACTION_JOB: &str = "ActionJob";

/// Maximum entries handled per cycle.
pub const BATCH_SIZE: usize = 100;

/// Counters for one non-idle cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries fetched from the queue.
    pub fetched: usize,
    /// Entries whose remote operation was applied.
    pub dispatched: usize,
    /// Entries dropped as invalid.
    pub rejected: usize,
    /// Entries deleted from the queue.
    pub removed: usize,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue was empty; no further run was requested.
    Idle,
    /// A batch was processed and another run was requested.
    Rescheduled(CycleReport),
}

/// Drains the action queue into the indexing backend.
#[derive(Clone)]
pub struct ActionJob {
    queue: Arc<dyn ActionQueue>,
    dispatcher: Dispatcher,
    scheduler: Arc<dyn JobScheduler>,
    heartbeat: Arc<dyn HeartbeatSink>,
}

impl ActionJob {
    pub fn new(
        queue: Arc<dyn ActionQueue>,
        client: Arc<dyn IndexingClient>,
        scheduler: Arc<dyn JobScheduler>,
        heartbeat: Arc<dyn HeartbeatSink>,
    ) -> Self {
        Self {
            queue,
            dispatcher: Dispatcher::new(client),
            scheduler,
            heartbeat,
        }
    }

    /// Run one cycle. `run_id` identifies this invocation in heartbeats.
    #[instrument(skip_all, fields(run_id = run_id))]
    pub async fn run(&self, run_id: i64) -> Result<CycleOutcome> {
        self.beat(run_id).await;

        let batch = self.queue.fetch_batch(BATCH_SIZE).await?;
        if batch.is_empty() {
            debug!("action queue empty");
            return Ok(CycleOutcome::Idle);
        }

        let mut report = CycleReport {
            fetched: batch.len(),
            ..CycleReport::default()
        };

        let (handled, remote_failure) = self.dispatch_all(run_id, &batch, &mut report).await;
        let remove_failures = self.remove_all(run_id, &batch[..handled], &mut report).await;
        let rescheduled = self.scheduler.request_run(ACTION_JOB).await;

        if let Some(err) = remote_failure {
            if let Err(e) = rescheduled {
                warn!(error = %e, "could not reschedule after remote failure");
            }
            warn!(
                handled,
                remaining = batch.len() - handled,
                error = %err,
                "remote operation failed, leaving the rest of the batch queued"
            );
            return Err(err);
        }
        rescheduled?;

        if remove_failures > 0 {
            return Err(IndexSyncError::Storage(format!(
                "{remove_failures} of {handled} processed queue entries could not be removed"
            )));
        }

        info!(
            fetched = report.fetched,
            dispatched = report.dispatched,
            rejected = report.rejected,
            removed = report.removed,
            "action batch processed"
        );
        Ok(CycleOutcome::Rescheduled(report))
    }

    /// Dispatch pass. Returns how many leading entries were handled and the
    /// remote error that stopped the pass, if any.
    async fn dispatch_all(
        &self,
        run_id: i64,
        batch: &[QueueEntry],
        report: &mut CycleReport,
    ) -> (usize, Option<IndexSyncError>) {
        for (index, entry) in batch.iter().enumerate() {
            self.beat(run_id).await;

            match self.dispatcher.dispatch(entry).await {
                Ok(Dispatch::Sent(_)) => report.dispatched += 1,
                Ok(Dispatch::Rejected(_)) => report.rejected += 1,
                Err(e) => return (index, Some(e)),
            }
        }
        (batch.len(), None)
    }

    /// Cleanup pass. Failed removals are logged and counted; the entry will
    /// simply be seen again next cycle.
    async fn remove_all(
        &self,
        run_id: i64,
        entries: &[QueueEntry],
        report: &mut CycleReport,
    ) -> usize {
        let mut failures = 0;
        for entry in entries {
            self.beat(run_id).await;

            match self.queue.remove(entry).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    failures += 1;
                    warn!(id = entry.id, error = %e, "failed to remove queue entry");
                }
            }
        }
        failures
    }

    async fn beat(&self, run_id: i64) {
        self.heartbeat.send_heartbeat(ACTION_JOB, run_id).await;
    }
}
