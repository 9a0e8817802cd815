//! Host capabilities the drain job depends on: asking for another run, and
//! reporting liveness while a run is in progress.

use async_trait::async_trait;
use indexsync_shared::Result;
use indexsync_storage::Storage;
use tracing::{debug, warn};

/// Requests future runs of a job.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Ask for `job_class` to run again. Requesting an already-pending job is a no-op.
    async fn request_run(&self, job_class: &str) -> Result<()>;
}

/// Receives liveness signals so a supervisor can tell slow runs from hung ones.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    /// Fire-and-forget: implementations log their own failures.
    async fn send_heartbeat(&self, job_class: &str, run_id: i64);
}

#[async_trait]
impl JobScheduler for Storage {
    async fn request_run(&self, job_class: &str) -> Result<()> {
        if !self.add_job(job_class).await? {
            debug!(job_class, "run already pending");
        }
        Ok(())
    }
}

#[async_trait]
impl HeartbeatSink for Storage {
    async fn send_heartbeat(&self, job_class: &str, run_id: i64) {
        if let Err(e) = self.record_heartbeat(job_class, run_id).await {
            warn!(job_class, run_id, error = %e, "failed to record heartbeat");
        }
    }
}
