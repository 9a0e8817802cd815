//! Maps one queue entry to one remote operation.

use std::sync::Arc;

use indexsync_client::IndexingClient;
use indexsync_shared::{ActionType, QueueEntry, Result};
use tracing::warn;

use crate::action::{Action, PayloadError};

/// What happened to an entry that did not fail remotely.
#[derive(Debug)]
pub enum Dispatch {
    /// The matching remote operation was applied.
    Sent(ActionType),
    /// The entry was malformed or of an unknown type; nothing was sent.
    Rejected(PayloadError),
}

/// Validates queue entries and forwards them to the indexing backend.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn IndexingClient>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn IndexingClient>) -> Self {
        Self { client }
    }

    /// Decode `entry` and apply it.
    ///
    /// Invalid entries come back as [`Dispatch::Rejected`] after a warning is
    /// logged. `Err` is reserved for remote failures, which are not retried here.
    pub async fn dispatch(&self, entry: &QueueEntry) -> Result<Dispatch> {
        let action = match Action::decode(entry) {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    id = entry.id,
                    action_type = %entry.action_type,
                    payload = entry.payload.as_deref().unwrap_or("<null>"),
                    error = %e,
                    "dropping invalid queue entry"
                );
                return Ok(Dispatch::Rejected(e));
            }
        };

        self.apply(&action).await?;
        Ok(Dispatch::Sent(action.action_type()))
    }

    /// Invoke the single remote operation corresponding to `action`.
    pub async fn apply(&self, action: &Action) -> Result<()> {
        match action {
            Action::DeleteSourceIds { source_ids } => self.client.delete_sources(source_ids).await,
            Action::DeleteProviderId { provider_id } => {
                self.client.delete_provider(provider_id).await
            }
            Action::DeleteUserId { user_id } => self.client.delete_user(user_id).await,
            Action::UpdateAccessSourceId {
                op,
                user_ids,
                source_id,
            } => self.client.update_access(*op, user_ids, source_id).await,
            Action::UpdateAccessProviderId {
                op,
                user_ids,
                provider_id,
            } => {
                self.client
                    .update_access_provider(*op, user_ids, provider_id)
                    .await
            }
            Action::UpdateAccessDeclSourceId {
                user_ids,
                source_id,
            } => {
                self.client
                    .update_access_declarative(user_ids, source_id)
                    .await
            }
        }
    }
}
