//! Core domain types for the action queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// The closed set of actions a queue entry can request from the indexing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// `{ sourceIds: string[] }`
    DeleteSourceIds,
    /// `{ providerId: string }`
    DeleteProviderId,
    /// `{ userId: string }`
    DeleteUserId,
    /// `{ op, userIds: string[], sourceId }`
    UpdateAccessSourceId,
    /// `{ op, userIds: string[], providerId }`
    UpdateAccessProviderId,
    /// `{ userIds: string[], sourceId }`
    UpdateAccessDeclSourceId,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [ActionType; 6] = [
        ActionType::DeleteSourceIds,
        ActionType::DeleteProviderId,
        ActionType::DeleteUserId,
        ActionType::UpdateAccessSourceId,
        ActionType::UpdateAccessProviderId,
        ActionType::UpdateAccessDeclSourceId,
    ];

    /// The value stored in the queue's `type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::DeleteSourceIds => "delete_source_ids",
            ActionType::DeleteProviderId => "delete_provider_id",
            ActionType::DeleteUserId => "delete_user_id",
            ActionType::UpdateAccessSourceId => "update_access_source_id",
            ActionType::UpdateAccessProviderId => "update_access_provider_id",
            ActionType::UpdateAccessDeclSourceId => "update_access_decl_source_id",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a `type` column holds a value outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownActionType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// AccessOp
// ---------------------------------------------------------------------------

/// Delta applied by the op-based access updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOp {
    Grant,
    Revoke,
}

impl AccessOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessOp::Grant => "grant",
            AccessOp::Revoke => "revoke",
        }
    }
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// One row of the action queue, exactly as persisted.
///
/// `action_type` is kept as the raw column value so that rows written with an
/// unknown type can still be read, logged and removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned, monotonically increasing identifier.
    pub id: i64,
    /// Raw `type` column.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Raw JSON payload, if any was written.
    pub payload: Option<String>,
}

impl QueueEntry {
    /// Parse the `type` column into the closed set.
    pub fn kind(&self) -> std::result::Result<ActionType, UnknownActionType> {
        self.action_type.parse()
    }
}

// ---------------------------------------------------------------------------
// Job list
// ---------------------------------------------------------------------------

/// A pending run request in the job list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Row id; also the run id reported in heartbeats.
    pub id: i64,
    /// Job identity, e.g. `ActionJob`.
    pub job_class: String,
    /// When the run was requested.
    pub added_at: DateTime<Utc>,
}

/// Last liveness signal recorded for a job class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub job_class: String,
    pub run_id: i64,
    pub beat_at: DateTime<Utc>,
}
