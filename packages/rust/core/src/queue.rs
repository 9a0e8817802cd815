//! The action queue as seen by the drain job, plus the producer entry point.

use async_trait::async_trait;
use indexsync_shared::{QueueEntry, Result};
use indexsync_storage::Storage;
use tracing::debug;

use crate::action::Action;
use crate::job::ACTION_JOB;
use crate::scheduler::JobScheduler;

/// Durable, ordered store of pending actions.
///
/// Used as `Arc<dyn ActionQueue>`.
#[async_trait]
pub trait ActionQueue: Send + Sync {
    /// Up to `limit` entries in insertion order. Never mutates the queue.
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<QueueEntry>>;

    /// Delete exactly `entry`. Removing an entry twice is not an error.
    async fn remove(&self, entry: &QueueEntry) -> Result<()>;
}

#[async_trait]
impl ActionQueue for Storage {
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        Storage::fetch_batch(self, limit).await
    }

    async fn remove(&self, entry: &QueueEntry) -> Result<()> {
        self.remove_from_queue(entry.id).await
    }
}

/// Record `action` in the queue and make sure the drain job will run.
///
/// Returns the id of the new queue entry.
pub async fn schedule_action(storage: &Storage, action: &Action) -> Result<i64> {
    let payload = action.payload_json();
    let id = storage
        .enqueue(action.action_type().as_str(), Some(&payload))
        .await?;
    storage.request_run(ACTION_JOB).await?;

    debug!(id, action_type = %action.action_type(), "action scheduled");
    Ok(id)
}
