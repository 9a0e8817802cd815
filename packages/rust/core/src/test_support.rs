//! In-memory stand-ins for the store, scheduler, heartbeat sink and backend.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use indexsync_client::IndexingClient;
use indexsync_shared::{AccessOp, IndexSyncError, QueueEntry, Result};

use crate::queue::ActionQueue;
use crate::scheduler::{HeartbeatSink, JobScheduler};

pub(crate) fn ids(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn entry(id: i64, action_type: &str, payload: &str) -> QueueEntry {
    QueueEntry {
        id,
        action_type: action_type.into(),
        payload: Some(payload.into()),
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    DeleteSources(BTreeSet<String>),
    DeleteProvider(String),
    DeleteUser(String),
    UpdateAccess(AccessOp, BTreeSet<String>, String),
    UpdateAccessProvider(AccessOp, BTreeSet<String>, String),
    UpdateAccessDeclarative(BTreeSet<String>, String),
}

/// Records every call; optionally fails the n-th one (1-based).
#[derive(Default)]
pub(crate) struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    fail_on: Option<usize>,
}

impl RecordingClient {
    pub(crate) fn failing_on(n: usize) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: Some(n),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        let mut calls = self.calls.lock().unwrap();
        if self.fail_on == Some(calls.len() + 1) {
            return Err(IndexSyncError::Remote {
                operation: "test",
                status: 503,
                body: "unavailable".into(),
            });
        }
        calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl IndexingClient for RecordingClient {
    async fn delete_sources(&self, source_ids: &BTreeSet<String>) -> Result<()> {
        self.record(Call::DeleteSources(source_ids.clone()))
    }

    async fn delete_provider(&self, provider_id: &str) -> Result<()> {
        self.record(Call::DeleteProvider(provider_id.into()))
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.record(Call::DeleteUser(user_id.into()))
    }

    async fn update_access(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        self.record(Call::UpdateAccess(op, user_ids.clone(), source_id.into()))
    }

    async fn update_access_provider(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        provider_id: &str,
    ) -> Result<()> {
        self.record(Call::UpdateAccessProvider(
            op,
            user_ids.clone(),
            provider_id.into(),
        ))
    }

    async fn update_access_declarative(
        &self,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        self.record(Call::UpdateAccessDeclarative(
            user_ids.clone(),
            source_id.into(),
        ))
    }
}

/// A toy index with the backend's set semantics, for replay checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct IndexState {
    /// source id -> (provider id, users with access)
    pub docs: BTreeMap<String, (String, BTreeSet<String>)>,
}

#[derive(Default)]
pub(crate) struct InMemoryIndex {
    pub state: Mutex<IndexState>,
}

impl InMemoryIndex {
    pub(crate) fn seeded(state: IndexState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn snapshot(&self) -> IndexState {
        self.state.lock().unwrap().clone()
    }
}

fn apply_op(users: &mut BTreeSet<String>, op: AccessOp, user_ids: &BTreeSet<String>) {
    match op {
        AccessOp::Grant => users.extend(user_ids.iter().cloned()),
        AccessOp::Revoke => users.retain(|u| !user_ids.contains(u)),
    }
}

#[async_trait]
impl IndexingClient for InMemoryIndex {
    async fn delete_sources(&self, source_ids: &BTreeSet<String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.docs.retain(|id, _| !source_ids.contains(id));
        Ok(())
    }

    async fn delete_provider(&self, provider_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.docs.retain(|_, (provider, _)| provider != provider_id);
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (_, users) in state.docs.values_mut() {
            users.remove(user_id);
        }
        Ok(())
    }

    async fn update_access(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, users)) = state.docs.get_mut(source_id) {
            apply_op(users, op, user_ids);
        }
        Ok(())
    }

    async fn update_access_provider(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        provider_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (provider, users) in state.docs.values_mut() {
            if provider == provider_id {
                apply_op(users, op, user_ids);
            }
        }
        Ok(())
    }

    async fn update_access_declarative(
        &self,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, users)) = state.docs.get_mut(source_id) {
            *users = user_ids.clone();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue, scheduler, heartbeats
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MemoryQueue {
    entries: Mutex<Vec<QueueEntry>>,
    next_id: Mutex<i64>,
    removals: Mutex<Vec<i64>>,
    fail_remove: Mutex<HashSet<i64>>,
    fail_fetch: bool,
}

impl MemoryQueue {
    pub(crate) fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub(crate) fn push(&self, action_type: &str, payload: Option<&str>) -> i64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        self.entries.lock().unwrap().push(QueueEntry {
            id: *next,
            action_type: action_type.into(),
            payload: payload.map(String::from),
        });
        *next
    }

    pub(crate) fn fail_remove_of(&self, id: i64) {
        self.fail_remove.lock().unwrap().insert(id);
    }

    pub(crate) fn ids(&self) -> Vec<i64> {
        self.entries.lock().unwrap().iter().map(|e| e.id).collect()
    }

    pub(crate) fn removals(&self) -> Vec<i64> {
        self.removals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionQueue for MemoryQueue {
    async fn fetch_batch(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        if self.fail_fetch {
            return Err(IndexSyncError::Storage("database is locked".into()));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn remove(&self, entry: &QueueEntry) -> Result<()> {
        if self.fail_remove.lock().unwrap().contains(&entry.id) {
            return Err(IndexSyncError::Storage("disk I/O error".into()));
        }
        self.entries.lock().unwrap().retain(|e| e.id != entry.id);
        self.removals.lock().unwrap().push(entry.id);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingScheduler {
    pub requests: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn request_run(&self, job_class: &str) -> Result<()> {
        self.requests.lock().unwrap().push(job_class.into());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingHeartbeat {
    pub beats: Mutex<Vec<(String, i64)>>,
}

impl RecordingHeartbeat {
    pub(crate) fn count(&self) -> usize {
        self.beats.lock().unwrap().len()
    }
}

#[async_trait]
impl HeartbeatSink for RecordingHeartbeat {
    async fn send_heartbeat(&self, job_class: &str, run_id: i64) {
        self.beats.lock().unwrap().push((job_class.into(), run_id));
    }
}
