//! Read/bookmark state reconciliation through a sync relay.
//!
//! A round trip sends every known item's state to `<endpoint>/sync` and
//! applies whatever the relay sends back:
//!
//! ```text
//! serialize(list) ──POST──▶ relay ──merged document──▶ apply(list)
//! ```
//!
//! The relay resolves conflicts by keeping the highest timestamp per identity
//! key. Items the relay reports that are not known locally are ignored; sync
//! never creates items.

use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{read_limited_bytes, FetchError};
use crate::store::{List, ListError};

/// Key sent when none is configured.
pub const DEFAULT_API_KEY: &str = "localhost";

const SYNC_PATH: &str = "/sync";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No feeds in list")]
    NoFeedsInList,

    #[error("Sync request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Sync relay returned status {0}")]
    Status(u16),

    #[error("Malformed state document: {0}")]
    Protocol(String),

    #[error("Sync reply exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error(transparent)]
    List(#[from] ListError),
}

// ============================================================================
// Wire format
// ============================================================================

/// Mutable state of every known item, keyed by identity key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    /// Opaque key passed through to the relay.
    #[serde(rename = "ApiKey", default)]
    pub api_key: String,

    #[serde(rename = "ItemIndex", default, deserialize_with = "null_as_empty")]
    pub items: HashMap<String, ItemState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemState {
    /// Logical timestamp of the last change.
    #[serde(rename = "Ts")]
    pub ts: i64,
    #[serde(rename = "GUID")]
    pub guid: String,
    #[serde(rename = "Read")]
    pub read: bool,
    #[serde(rename = "Bookmark")]
    pub bookmark: bool,
}

// Relays written against the same format send `null` for an empty index.
fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, ItemState>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Serialize / Apply
// ============================================================================

/// How peer state is weighed against local state on apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplyPolicy {
    /// The relay has already resolved conflicts; take its state as is.
    #[default]
    Authoritative,
    /// Only take peer state whose timestamp is not older than the local one.
    NewerOnly,
}

/// Builds a state document from every item in the list's identity index.
///
/// # Errors
///
/// [`SyncError::NoFeedsInList`] when the list has no feeds.
pub fn serialize(list: &List, api_key: &str) -> Result<StateDocument, SyncError> {
    if list.is_empty() {
        return Err(SyncError::NoFeedsInList);
    }

    let items = list
        .items()
        .map(|item| {
            let state = ItemState {
                ts: item.last_changed(),
                guid: item.key().to_owned(),
                read: item.is_read(),
                bookmark: item.is_bookmarked(),
            };
            (item.key().to_owned(), state)
        })
        .collect();

    Ok(StateDocument {
        api_key: api_key.to_owned(),
        items,
    })
}

/// Applies a merged document to the items the list already knows.
///
/// The read flag and timestamp are overwritten; the bookmark goes through the
/// list so Bookmarks feed membership follows it. Returns the number of items
/// updated.
///
/// # Errors
///
/// [`ListError::NoBookmarkFeed`] when the list has no Bookmarks feed, before
/// any item is touched.
pub fn apply(
    list: &mut List,
    document: &StateDocument,
    policy: ApplyPolicy,
) -> Result<usize, SyncError> {
    if list.bookmarks_feed().is_none() {
        return Err(ListError::NoBookmarkFeed.into());
    }

    let mut applied = 0;
    let mut unknown = 0;
    for (key, state) in &document.items {
        let Some(item) = list.item(key).cloned() else {
            unknown += 1;
            continue;
        };
        if policy == ApplyPolicy::NewerOnly && state.ts < item.last_changed() {
            tracing::debug!(item = %key, "Keeping newer local state");
            continue;
        }

        list.set_bookmark(&item, state.bookmark)?;
        item.overwrite_state(state.read, state.bookmark, state.ts);
        applied += 1;
    }

    tracing::debug!(applied = applied, unknown = unknown, "Applied sync state");
    Ok(applied)
}

// ============================================================================
// Client
// ============================================================================

/// Talks to one sync relay.
#[derive(Debug)]
pub struct SyncClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    timeout: Duration,
    max_response_size: usize,
    policy: ApplyPolicy,
}

impl SyncClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: SecretString::from(DEFAULT_API_KEY.to_owned()),
            timeout: DEFAULT_TIMEOUT,
            max_response_size: MAX_RESPONSE_SIZE,
            policy: ApplyPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Caps the size of the relay's reply (10MB by default).
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn url(&self) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), SYNC_PATH)
    }

    /// Sends `document` to the relay and returns its merged document.
    pub async fn exchange(&self, document: &StateDocument) -> Result<StateDocument, SyncError> {
        let body =
            serde_json::to_vec(document).map_err(|e| SyncError::Protocol(e.to_string()))?;

        let response = self
            .client
            .post(self.url())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_response_size)
            .await
            .map_err(|e| match e {
                FetchError::Network(e) => SyncError::Transport(e),
                FetchError::ResponseTooLarge => {
                    SyncError::ResponseTooLarge(self.max_response_size)
                }
                other => SyncError::Protocol(other.to_string()),
            })?;
        let merged: StateDocument =
            serde_json::from_slice(&bytes).map_err(|e| SyncError::Protocol(e.to_string()))?;

        tracing::info!(
            endpoint = %self.endpoint,
            sent = document.items.len(),
            received = merged.items.len(),
            "Sync round trip complete"
        );
        Ok(merged)
    }

    /// Serialize, exchange and apply in one go. Local state is untouched
    /// unless the whole exchange succeeds.
    pub async fn sync_list(&self, list: &mut List) -> Result<usize, SyncError> {
        // Refresh streams leave the identity index behind their feeds.
        list.reindex();
        let document = serialize(list, self.api_key.expose_secret())?;
        let merged = self.exchange(&document).await?;
        apply(list, &merged, self.policy)
    }
}
