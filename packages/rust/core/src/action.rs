//! Typed queue actions and payload decoding.
//!
//! A queue row carries a `type` string and an untyped JSON payload. [`Action`]
//! is the decoded form: one variant per action type, holding exactly the
//! fields that type requires. Anything that does not decode is a
//! [`PayloadError`] and will never be sent to the backend.

use std::collections::{BTreeMap, BTreeSet};

use indexsync_shared::{AccessOp, ActionType, QueueEntry, UnknownActionType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A queue entry whose payload matched its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DeleteSourceIds {
        source_ids: BTreeSet<String>,
    },
    DeleteProviderId {
        provider_id: String,
    },
    DeleteUserId {
        user_id: String,
    },
    UpdateAccessSourceId {
        op: AccessOp,
        user_ids: BTreeSet<String>,
        source_id: String,
    },
    UpdateAccessProviderId {
        op: AccessOp,
        user_ids: BTreeSet<String>,
        provider_id: String,
    },
    /// Replaces the source's access list instead of applying a delta.
    UpdateAccessDeclSourceId {
        user_ids: BTreeSet<String>,
        source_id: String,
    },
}

/// Why a queue entry cannot be dispatched. None of these ever heal on retry.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error(transparent)]
    UnknownType(#[from] UnknownActionType),

    #[error("payload is missing")]
    Missing,

    #[error("payload is not valid JSON: {0}")]
    Json(serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload does not match {action_type}: {source}")]
    Shape {
        action_type: ActionType,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceIdsPayload {
    #[serde(deserialize_with = "id_set")]
    source_ids: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderIdPayload {
    provider_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdPayload {
    user_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessSourcePayload {
    op: AccessOp,
    #[serde(deserialize_with = "id_set")]
    user_ids: BTreeSet<String>,
    source_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessProviderPayload {
    op: AccessOp,
    #[serde(deserialize_with = "id_set")]
    user_ids: BTreeSet<String>,
    provider_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessDeclPayload {
    #[serde(deserialize_with = "id_set")]
    user_ids: BTreeSet<String>,
    source_id: String,
}

/// Producers may write id lists as JSON objects (`{"0":"a","2":"b"}`) when
/// their array keys are not sequential; only the values matter.
fn id_set<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        List(BTreeSet<String>),
        Keyed(BTreeMap<String, String>),
    }

    Ok(match Ids::deserialize(deserializer)? {
        Ids::List(ids) => ids,
        Ids::Keyed(map) => map.into_values().collect(),
    })
}

// ---------------------------------------------------------------------------
// Decoding / encoding
// ---------------------------------------------------------------------------

impl Action {
    /// Decode a queue entry into an action, validating the payload shape.
    ///
    /// Unrecognised extra keys are ignored; a `null` required key is missing.
    pub fn decode(entry: &QueueEntry) -> Result<Self, PayloadError> {
        let action_type = entry.kind()?;
        Self::from_parts(action_type, entry.payload.as_deref())
    }

    /// Decode from a type and raw payload text.
    pub fn from_parts(action_type: ActionType, payload: Option<&str>) -> Result<Self, PayloadError> {
        let raw = payload.ok_or(PayloadError::Missing)?;
        let value: Value = serde_json::from_str(raw).map_err(PayloadError::Json)?;
        if !value.is_object() {
            return Err(PayloadError::NotAnObject);
        }

        Ok(match action_type {
            ActionType::DeleteSourceIds => {
                let p: SourceIdsPayload = fields(action_type, value)?;
                Action::DeleteSourceIds {
                    source_ids: p.source_ids,
                }
            }
            ActionType::DeleteProviderId => {
                let p: ProviderIdPayload = fields(action_type, value)?;
                Action::DeleteProviderId {
                    provider_id: p.provider_id,
                }
            }
            ActionType::DeleteUserId => {
                let p: UserIdPayload = fields(action_type, value)?;
                Action::DeleteUserId { user_id: p.user_id }
            }
            ActionType::UpdateAccessSourceId => {
                let p: AccessSourcePayload = fields(action_type, value)?;
                Action::UpdateAccessSourceId {
                    op: p.op,
                    user_ids: p.user_ids,
                    source_id: p.source_id,
                }
            }
            ActionType::UpdateAccessProviderId => {
                let p: AccessProviderPayload = fields(action_type, value)?;
                Action::UpdateAccessProviderId {
                    op: p.op,
                    user_ids: p.user_ids,
                    provider_id: p.provider_id,
                }
            }
            ActionType::UpdateAccessDeclSourceId => {
                let p: AccessDeclPayload = fields(action_type, value)?;
                Action::UpdateAccessDeclSourceId {
                    user_ids: p.user_ids,
                    source_id: p.source_id,
                }
            }
        })
    }

    /// The queue `type` this action is stored under.
    pub fn action_type(&self) -> ActionType {
        match self {
            Action::DeleteSourceIds { .. } => ActionType::DeleteSourceIds,
            Action::DeleteProviderId { .. } => ActionType::DeleteProviderId,
            Action::DeleteUserId { .. } => ActionType::DeleteUserId,
            Action::UpdateAccessSourceId { .. } => ActionType::UpdateAccessSourceId,
            Action::UpdateAccessProviderId { .. } => ActionType::UpdateAccessProviderId,
            Action::UpdateAccessDeclSourceId { .. } => ActionType::UpdateAccessDeclSourceId,
        }
    }

    /// Serialize the payload as producers write it to the queue.
    pub fn payload_json(&self) -> String {
        match self.clone() {
            Action::DeleteSourceIds { source_ids } => to_json(SourceIdsPayload { source_ids }),
            Action::DeleteProviderId { provider_id } => {
                to_json(ProviderIdPayload { provider_id })
            }
            Action::DeleteUserId { user_id } => to_json(UserIdPayload { user_id }),
            Action::UpdateAccessSourceId {
                op,
                user_ids,
                source_id,
            } => to_json(AccessSourcePayload {
                op,
                user_ids,
                source_id,
            }),
            Action::UpdateAccessProviderId {
                op,
                user_ids,
                provider_id,
            } => to_json(AccessProviderPayload {
                op,
                user_ids,
                provider_id,
            }),
            Action::UpdateAccessDeclSourceId {
                user_ids,
                source_id,
            } => to_json(AccessDeclPayload {
                user_ids,
                source_id,
            }),
        }
    }
}

fn fields<T: DeserializeOwned>(action_type: ActionType, value: Value) -> Result<T, PayloadError> {
    serde_json::from_value(value).map_err(|source| PayloadError::Shape {
        action_type,
        source,
    })
}

fn to_json<T: Serialize>(payload: T) -> String {
    // Plain structs of strings and string sets always serialize.
    serde_json::to_string(&payload).unwrap_or_default()
}
