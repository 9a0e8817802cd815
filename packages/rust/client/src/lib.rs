//! Client for the external content-indexing backend.
//!
//! The drain job never talks HTTP itself; it goes through the
//! [`IndexingClient`] trait. [`HttpIndexingClient`] is the production
//! implementation, posting JSON bodies to the backend's action endpoints.
//!
//! Every operation is idempotent on the backend side: deletes of absent ids
//! are no-ops, grant/revoke are set insertions/removals, and the declarative
//! update replaces the whole access list. Replaying a call is always safe.

mod http;

use std::collections::BTreeSet;

use async_trait::async_trait;
use indexsync_shared::{AccessOp, Result};

pub use http::{ClientOptions, HttpIndexingClient};

/// The six remote operations the action queue can request.
///
/// Used as `Arc<dyn IndexingClient>`.
#[async_trait]
pub trait IndexingClient: Send + Sync {
    /// Drop every indexed document belonging to the given sources.
    async fn delete_sources(&self, source_ids: &BTreeSet<String>) -> Result<()>;

    /// Drop every document a provider contributed.
    async fn delete_provider(&self, provider_id: &str) -> Result<()>;

    /// Drop a user and their access entries.
    async fn delete_user(&self, user_id: &str) -> Result<()>;

    /// Grant or revoke access to a single source.
    async fn update_access(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()>;

    /// Grant or revoke access to every source of a provider.
    async fn update_access_provider(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        provider_id: &str,
    ) -> Result<()>;

    /// Replace the full access list of a source with `user_ids`.
    async fn update_access_declarative(
        &self,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()>;
}
