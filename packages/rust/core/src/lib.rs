//! Action queue processing for indexsync.
//!
//! Producers record index-maintenance actions with [`schedule_action`]. The
//! [`Worker`] picks up the resulting job and runs [`ActionJob`] cycles, each
//! forwarding one batch of queued actions to the indexing backend.

pub mod action;
pub mod dispatch;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use action::{Action, PayloadError};
pub use dispatch::{Dispatch, Dispatcher};
pub use job::{ACTION_JOB, ActionJob, BATCH_SIZE, CycleOutcome, CycleReport};
pub use queue::{ActionQueue, schedule_action};
pub use scheduler::{HeartbeatSink, JobScheduler};
pub use worker::{JobRun, Worker};
