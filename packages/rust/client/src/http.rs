//! reqwest implementation of [`IndexingClient`].

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use indexsync_shared::{AccessOp, IndexSyncError, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::IndexingClient;

/// Default timeout in seconds for a single backend call.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error bodies longer than this are cut before they land in an error message.
const MAX_ERROR_BODY: usize = 512;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("indexsync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteSourcesBody<'a> {
    source_ids: &'a BTreeSet<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteProviderBody<'a> {
    provider_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteUserBody<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccessBody<'a> {
    op: AccessOp,
    user_ids: &'a BTreeSet<String>,
    source_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccessProviderBody<'a> {
    op: AccessOp,
    user_ids: &'a BTreeSet<String>,
    provider_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAccessDeclarativeBody<'a> {
    user_ids: &'a BTreeSet<String>,
    source_id: &'a str,
}

// ---------------------------------------------------------------------------
// HttpIndexingClient
// ---------------------------------------------------------------------------

/// Posts actions to `<base_url>/<operation>` as JSON.
#[derive(Debug, Clone)]
pub struct HttpIndexingClient {
    client: Client,
    base_url: String,
}

impl HttpIndexingClient {
    /// Build a client for the backend at `base_url`.
    pub fn new(base_url: &Url, opts: &ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| IndexSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// POST `body` to the endpoint named `operation`; any non-2xx is an error.
    async fn post<B: Serialize + Sync>(&self, operation: &'static str, body: &B) -> Result<()> {
        let url = format!("{}/{operation}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| IndexSyncError::Network(format!("{operation}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(IndexSyncError::Remote {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        debug!(operation, status = status.as_u16(), "remote operation applied");
        Ok(())
    }
}

#[async_trait]
impl IndexingClient for HttpIndexingClient {
    #[instrument(skip_all, fields(sources = source_ids.len()))]
    async fn delete_sources(&self, source_ids: &BTreeSet<String>) -> Result<()> {
        self.post("deleteSources", &DeleteSourcesBody { source_ids })
            .await
    }

    #[instrument(skip(self))]
    async fn delete_provider(&self, provider_id: &str) -> Result<()> {
        self.post(
            "deleteProvider",
            &DeleteProviderBody {
                provider_key: provider_id,
            },
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: &str) -> Result<()> {
        self.post("deleteUser", &DeleteUserBody { user_id }).await
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn update_access(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        self.post(
            "updateAccess",
            &UpdateAccessBody {
                op,
                user_ids,
                source_id,
            },
        )
        .await
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn update_access_provider(
        &self,
        op: AccessOp,
        user_ids: &BTreeSet<String>,
        provider_id: &str,
    ) -> Result<()> {
        self.post(
            "updateAccessProvider",
            &UpdateAccessProviderBody {
                op,
                user_ids,
                provider_id,
            },
        )
        .await
    }

    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    async fn update_access_declarative(
        &self,
        user_ids: &BTreeSet<String>,
        source_id: &str,
    ) -> Result<()> {
        self.post(
            "updateAccessDeclarative",
            &UpdateAccessDeclarativeBody {
                user_ids,
                source_id,
            },
        )
        .await
    }
}
